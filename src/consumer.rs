use crate::config::App;
use crate::db::{self, Pool};
use crate::model::PrepareRequest;
use crate::service::PreprocessService;
use anyhow::{anyhow, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub poll_interval: Duration,
    pub max_backoff_secs: i64,
    pub max_attempts: i32,
    /// Return once no request is due instead of polling forever.
    pub exit_when_idle: bool,
}

impl ConsumerSettings {
    pub fn from_app(app: &App, exit_when_idle: bool) -> Self {
        Self {
            poll_interval: app.poll_interval(),
            max_backoff_secs: i64::try_from(app.max_backoff_seconds).unwrap_or(i64::MAX),
            max_attempts: i32::try_from(app.max_attempts).unwrap_or(i32::MAX),
            exit_when_idle,
        }
    }
}

fn decode_request(payload: &str) -> Result<PrepareRequest> {
    let req: PrepareRequest = serde_json::from_str(payload)?;
    if req.app_id.trim().is_empty() {
        return Err(anyhow!("app_id must be non-empty"));
    }
    Ok(req)
}

/// Take the next due request from the inbox and run it. Returns `false` when
/// nothing was due.
#[instrument(skip_all)]
pub async fn process_next_request(
    pool: &Pool,
    svc: &PreprocessService,
    settings: &ConsumerSettings,
    cancel: &CancellationToken,
) -> Result<bool> {
    let Some(task) = db::next_due_request(pool).await? else {
        return Ok(false);
    };

    let req = match decode_request(&task.payload) {
        Ok(req) => req,
        Err(err) => {
            warn!(?err, id = task.id, saga_id = %task.saga_id, "invalid prepare request; dropping");
            db::fail_request(pool, task.id, task.attempt, &format!("invalid payload: {err}")).await?;
            return Ok(true);
        }
    };

    match svc.handle(&req, &task.saga_id, cancel).await {
        Ok(done) => {
            db::delete_request(pool, task.id).await?;
            info!(id = task.id, saga_id = %task.saga_id, clean_count = done.clean_count, "prepare request succeeded");
        }
        Err(err) if cancel.is_cancelled() => {
            info!(?err, id = task.id, "prepare request interrupted by shutdown; left pending");
        }
        Err(err) => {
            let attempt = task.attempt + 1;
            if attempt >= settings.max_attempts {
                error!(?err, id = task.id, attempt, "prepare request failed permanently");
                db::fail_request(pool, task.id, attempt, &format!("{err:#}")).await?;
            } else {
                warn!(?err, id = task.id, attempt = task.attempt, "prepare request failed; backoff");
                db::backoff_request_with_cap(pool, task.id, task.attempt, settings.max_backoff_secs, &format!("{err:#}"))
                    .await?;
            }
        }
    }
    Ok(true)
}

/// Poll the inbox until `cancel` fires (or until idle with `exit_when_idle`).
pub async fn run(
    pool: &Pool,
    svc: &PreprocessService,
    settings: &ConsumerSettings,
    cancel: &CancellationToken,
) -> Result<()> {
    info!(poll_ms = settings.poll_interval.as_millis() as u64, "consumer started");
    loop {
        if cancel.is_cancelled() {
            info!("shutdown requested; consumer stopping");
            return Ok(());
        }
        let pause = match process_next_request(pool, svc, settings, cancel).await {
            Ok(true) => continue,
            Ok(false) if settings.exit_when_idle => {
                info!("no due requests left; exiting");
                return Ok(());
            }
            Ok(false) => settings.poll_interval,
            Err(err) => {
                error!(?err, "consumer error");
                Duration::from_secs(1)
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = tokio::time::sleep(pause) => {}
        }
    }
}
