pub mod announcements;
pub mod contacts;
#[cfg(test)]
pub mod memory;
pub mod single_active;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub use announcements::{AnnouncementRepository, PgAnnouncementRepository};
pub use contacts::{ContactRepository, PgContactRepository};

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run the migrations embedded in ./migrations/
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
