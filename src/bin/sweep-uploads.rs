/// Find image files no announcement row references any more.
/// Orphans are left behind when a best-effort delete fails or the process
/// dies between a row delete and its file cleanup.
///
/// Usage: sweep-uploads [--delete] [--min-age-minutes N]
///   --delete            : remove the orphans (default only lists them)
///   --min-age-minutes N : skip files younger than N minutes (default 60),
///                         so uploads of in-flight requests are left alone

use std::collections::HashSet;
use std::time::{Duration, SystemTime};

use clap::Parser;

use showcase_api::{
    db::{self, AnnouncementRepository, PgAnnouncementRepository},
    services::uploads::{FileCategory, FileStore},
};

#[derive(Parser)]
#[command(name = "sweep-uploads", about = "List or delete unreferenced announcement images")]
struct Args {
    /// Delete orphaned files instead of only listing them
    #[arg(long)]
    delete: bool,

    /// Ignore files modified less than this many minutes ago
    #[arg(long, default_value_t = 60)]
    min_age_minutes: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not set"))?;
    let upload_dir = std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "./uploads".into());

    let pool = db::create_pool(&database_url).await?;
    // make sure the schema the query relies on exists
    db::run_migrations(&pool).await?;

    let repo = PgAnnouncementRepository::new(pool);
    let referenced: HashSet<String> = repo.referenced_files().await?.into_iter().collect();
    tracing::info!("{} file paths referenced by announcements", referenced.len());

    let files = FileStore::new(upload_dir);
    let cutoff = SystemTime::now() - Duration::from_secs(args.min_age_minutes * 60);

    let mut orphans = Vec::new();
    for category in [FileCategory::Primary, FileCategory::Slide] {
        for (path, modified) in files.list(category).await? {
            if modified <= cutoff && !referenced.contains(&path) {
                orphans.push(path);
            }
        }
    }
    orphans.sort();

    if orphans.is_empty() {
        tracing::info!("No orphaned uploads found");
        return Ok(());
    }

    for path in &orphans {
        if args.delete {
            files.delete(path).await;
        } else {
            println!("{path}");
        }
    }

    if args.delete {
        tracing::info!("Deleted {} orphaned uploads", orphans.len());
    } else {
        tracing::info!("{} orphaned uploads (re-run with --delete to remove)", orphans.len());
    }
    Ok(())
}
