use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use review_prep::config;
use review_prep::consumer::{self, ConsumerSettings};
use review_prep::db;
use review_prep::lang::WhatlangDetector;
use review_prep::service::PreprocessService;
use review_prep::storage::SqliteStore;
use review_prep::translate;

#[derive(Debug, Parser)]
#[command(author, version, about = "Clean, classify and translate raw reviews per prepare request")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Process every due request, then exit instead of polling
    #[arg(long)]
    drain: bool,

    /// Print an example config file and exit
    #[arg(long)]
    print_example_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.print_example_config {
        print!("{}", config::example());
        return Ok(());
    }
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/reviews.db", cfg.app.resolved_data_dir()));
    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let store = Arc::new(SqliteStore::new(pool.clone()));
    let translator = translate::from_config(&cfg)?;
    let svc = PreprocessService::new(
        store.clone(),
        store.clone(),
        store,
        Arc::new(WhatlangDetector),
        translator,
        cfg.processing.clone(),
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received ctrl-c");
                on_signal.cancel();
            }
            Err(err) => error!(?err, "failed to listen for ctrl-c"),
        }
    });

    let settings = ConsumerSettings::from_app(&cfg.app, args.drain);
    info!(database_url = %database_url, drain = args.drain, "starting review preprocessor");
    consumer::run(&pool, &svc, &settings, &cancel).await
}
