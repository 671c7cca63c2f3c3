use std::{env, fmt::Display, str::FromStr, time::Duration};

use chrono::FixedOffset;
use dotenvy::dotenv;
use tracing::{info, warn};

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,

    // Rate limiting
    pub rate_protected_per_min: u32,
    pub rate_check_in_per_min: u32,

    pub api_prefix: String,

    pub attendance: AttendanceConfig,
    pub cloudinary: CloudinaryConfig,
}

/// Settings of the check-in and retention core.
#[derive(Clone, Debug)]
pub struct AttendanceConfig {
    /// Age after which a photo may be reclaimed.
    pub retention_window: chrono::Duration,
    pub max_photo_bytes: usize,
    /// Reference timezone for the calendar-day boundary.
    pub timezone: FixedOffset,
    /// Upper bound for every object-store call.
    pub storage_timeout: Duration,
    pub sweep_page_size: u32,
    /// Hour of day (reference timezone) the daily sweep fires.
    pub sweep_hour: u32,
    /// HTTP statuses from the object store that will never succeed on retry.
    pub permanent_delete_statuses: Vec<u16>,
}

impl Default for AttendanceConfig {
    fn default() -> Self {
        Self {
            retention_window: chrono::Duration::days(7),
            max_photo_bytes: 5 * 1024 * 1024,
            timezone: FixedOffset::east_opt(0).expect("zero offset is valid"),
            storage_timeout: Duration::from_secs(15),
            sweep_page_size: 200,
            sweep_hour: 2,
            permanent_delete_statuses: vec![400, 410, 422],
        }
    }
}

#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv().ok();

        let tz_offset_minutes: i32 = try_load("TZ_OFFSET_MINUTES", "0");
        let timezone = FixedOffset::east_opt(tz_offset_minutes * 60)
            .expect("TZ_OFFSET_MINUTES must be within +/- 24h");

        let sweep_hour: u32 = try_load("SWEEP_HOUR", "2");
        assert!(sweep_hour < 24, "SWEEP_HOUR must be between 0 and 23");

        let attendance = AttendanceConfig {
            retention_window: chrono::Duration::days(try_load("RETENTION_DAYS", "7")),
            max_photo_bytes: try_load("MAX_PHOTO_BYTES", "5242880"),
            timezone,
            storage_timeout: Duration::from_secs(try_load("STORAGE_TIMEOUT_SECS", "15")),
            sweep_page_size: try_load("SWEEP_PAGE_SIZE", "200"),
            sweep_hour,
            permanent_delete_statuses: parse_statuses(
                &var("PERMANENT_DELETE_STATUSES").unwrap_or_else(|_| "400,410,422".to_string()),
            ),
        };

        Self {
            server_addr: env::var("SERVER_ADDR").expect("SERVER_ADDR must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),

            rate_protected_per_min: try_load("RATE_PROTECTED_PER_MIN", "1000"),
            rate_check_in_per_min: try_load("RATE_CHECK_IN_PER_MIN", "30"),

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),

            attendance,
            cloudinary: CloudinaryConfig {
                cloud_name: env::var("CLOUDINARY_CLOUD_NAME")
                    .expect("CLOUDINARY_CLOUD_NAME must be set"),
                api_key: env::var("CLOUDINARY_API_KEY").expect("CLOUDINARY_API_KEY must be set"),
                api_secret: env::var("CLOUDINARY_API_SECRET")
                    .expect("CLOUDINARY_API_SECRET must be set"),
                folder: env::var("CLOUDINARY_FOLDER").unwrap_or_else(|_| "attendance".to_string()),
            },
        }
    }
}

/// Read on its own so logging can start before the rest of the config,
/// whose fallbacks are logged.
pub fn log_dir() -> String {
    env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string())
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        info!("Environment variable {key} not set, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

/// Parses a comma separated status list, skipping blanks.
fn parse_statuses(raw: &str) -> Vec<u16> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse()
                .unwrap_or_else(|e| panic!("Invalid status {s:?} in PERMANENT_DELETE_STATUSES: {e}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_status_list_with_spaces() {
        assert_eq!(parse_statuses("400, 410 ,422"), vec![400, 410, 422]);
        assert!(parse_statuses("").is_empty());
    }

    #[derive(Clone, Default)]
    struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn fallbacks_are_logged_once_a_subscriber_is_installed() {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let pages: u32 = tracing::subscriber::with_default(subscriber, || {
            try_load("ATTENDANCE_TEST_UNSET_PAGE_SIZE", "200")
        });

        assert_eq!(pages, 200);
        let logged = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("ATTENDANCE_TEST_UNSET_PAGE_SIZE not set, using default"));
    }

    #[test]
    fn defaults_keep_a_week_of_photos() {
        let cfg = AttendanceConfig::default();
        assert_eq!(cfg.retention_window, chrono::Duration::days(7));
        assert_eq!(cfg.max_photo_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.timezone.local_minus_utc(), 0);
    }
}
