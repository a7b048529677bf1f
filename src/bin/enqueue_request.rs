use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use review_prep::config;
use review_prep::db;
use review_prep::model::PrepareRequest;

#[derive(Debug, Parser)]
#[command(author, version, about = "Queue a prepare request for the review preprocessor")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[arg(long)]
    app_id: String,

    /// Country filter; repeat for several countries
    #[arg(long = "country")]
    countries: Vec<String>,

    /// RFC 3339 timestamp or YYYY-MM-DD
    #[arg(long, default_value = "")]
    from: String,

    /// RFC 3339 timestamp or YYYY-MM-DD
    #[arg(long, default_value = "")]
    to: String,

    #[arg(long)]
    limit: Option<u32>,

    /// Correlation id echoed on the completion event (random when omitted)
    #[arg(long)]
    saga_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.app_id.trim().is_empty() {
        bail!("--app-id must be non-empty");
    }
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/reviews.db", cfg.app.resolved_data_dir()));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let req = PrepareRequest {
        app_id: args.app_id,
        countries: args.countries,
        date_from: args.from,
        date_to: args.to,
        limit: args.limit,
    };
    let saga_id = args
        .saga_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let payload = serde_json::to_string(&req)?;
    let id = db::enqueue_request(&pool, &saga_id, &payload).await?;
    info!(id, saga_id = %saga_id, "queued prepare request");
    println!("{saga_id}");
    Ok(())
}
