use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use showcase_api::{
    config::Config,
    db::{self, PgAnnouncementRepository, PgContactRepository},
    routes,
    services::uploads::FileStore,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let config = Arc::new(config);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let files = FileStore::new(&config.upload_dir);
    files.ensure_dirs().await?;
    info!(root = %config.upload_dir, "Upload directories ready");

    if config.admin_codes.is_empty() {
        info!("ADMIN_CODES is empty, announcement deletion is disabled");
    }

    let state = AppState {
        announcements: Arc::new(PgAnnouncementRepository::new(pool.clone())),
        contacts: Arc::new(PgContactRepository::new(pool)),
        files,
        config: config.clone(),
    };

    let app = routes::build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("showcase API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
