use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use tokio::sync::OnceCell;
use tracing::info;

static POOL: OnceCell<MySqlPool> = OnceCell::const_new();

/// Process-wide pool. The first caller connects and migrates; everyone else
/// gets the same handle.
pub async fn init_db(database_url: &str) -> anyhow::Result<MySqlPool> {
    let pool = POOL
        .get_or_try_init(|| async {
            let pool = MySqlPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await?;
            sqlx::migrate!("./migrations").run(&pool).await?;
            info!("Database connected and migrated");
            Ok::<_, anyhow::Error>(pool)
        })
        .await?;

    Ok(pool.clone())
}

/// Closes the shared pool; waits for checked-out connections to return.
pub async fn shutdown() {
    if let Some(pool) = POOL.get() {
        pool.close().await;
        info!("Database pool closed");
    }
}
