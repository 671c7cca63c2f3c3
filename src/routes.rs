use crate::{api::attendance, config::Config};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::web;
use std::sync::Arc;

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .expect("rate limiter period and burst are non-zero");
    Governor::new(&cfg)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: Config) {
    let protected_limiter = Arc::new(build_limiter(config.rate_protected_per_min));
    let check_in_limiter = Arc::new(build_limiter(config.rate_check_in_per_min));

    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(protected_limiter)
            .service(
                web::scope("/attendance")
                    // /attendance/check-in
                    .service(
                        web::resource("/check-in")
                            .wrap(check_in_limiter)
                            .route(web::post().to(attendance::check_in)),
                    )
                    // /attendance/status
                    .service(
                        web::resource("/status").route(web::get().to(attendance::check_in_status)),
                    )
                    // /attendance/history
                    .service(web::resource("/history").route(web::get().to(attendance::history)))
                    // /attendance/records
                    .service(
                        web::resource("/records").route(web::get().to(attendance::list_records)),
                    )
                    // /attendance/stats
                    .service(web::resource("/stats").route(web::get().to(attendance::stats)))
                    // /attendance/sweep
                    .service(web::resource("/sweep").route(web::post().to(attendance::run_sweep))),
            ),
    );
}

#[cfg(test)]
mod tests {
    use super::build_limiter;

    #[test]
    fn limiter_accepts_zero_and_large_rates() {
        let _ = build_limiter(0);
        let _ = build_limiter(120_000);
    }
}
