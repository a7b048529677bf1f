use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

use review_prep::config;
use review_prep::db;
use review_prep::model::RawReview;

#[derive(Debug, Parser)]
#[command(author, version, about = "Load JSON-lines raw reviews into the raw_reviews table")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// File with one JSON review per line
    input: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/reviews.db", cfg.app.resolved_data_dir()));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let content = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    let mut imported = 0usize;
    let mut skipped = 0usize;
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<RawReview>(line) {
            Ok(review) => {
                db::upsert_raw_review(&pool, &review).await?;
                imported += 1;
            }
            Err(err) => {
                warn!(line = n + 1, %err, "skipping malformed review");
                skipped += 1;
            }
        }
    }
    info!(imported, skipped, "import finished");
    Ok(())
}
