use super::model::{PendingRequest, RawFilters};
use crate::model::{CleanReview, RawReview, RequestStatus};
use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

const RAW_COLUMNS: &str =
    "id, app_id, country, rating, title, content, reviewed_at, response_date, response_content";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url: {normalized}"))?
        .create_if_missing(true)
        // WAL and stricter durability.
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full);
    let pool = SqlitePoolOptions::new()
        .connect_with(options)
        .await
        .context("failed to open sqlite database")?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Raw reviews for one request, ascending by review time.
#[instrument(skip_all, fields(app_id = %filters.app_id))]
pub async fn fetch_raw_reviews(pool: &Pool, filters: &RawFilters) -> Result<Vec<RawReview>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {RAW_COLUMNS} FROM raw_reviews WHERE app_id = "));
    qb.push_bind(filters.app_id.clone());
    if !filters.countries.is_empty() {
        qb.push(" AND country IN (");
        let mut sep = qb.separated(", ");
        for country in &filters.countries {
            sep.push_bind(country.clone());
        }
        sep.push_unseparated(")");
    }
    qb.push(" AND julianday(reviewed_at) >= julianday(")
        .push_bind(filters.from)
        .push(") AND julianday(reviewed_at) <= julianday(")
        .push_bind(filters.to)
        .push(") ORDER BY julianday(reviewed_at) ASC, id ASC");
    if let Some(limit) = filters.limit {
        qb.push(" LIMIT ").push_bind(i64::from(limit));
    }

    let rows = qb.build_query_as::<RawReview>().fetch_all(pool).await?;
    Ok(rows)
}

#[instrument(skip_all)]
pub async fn upsert_raw_review(pool: &Pool, review: &RawReview) -> Result<()> {
    sqlx::query(
        "INSERT INTO raw_reviews (id, app_id, country, rating, title, content, reviewed_at, response_date, response_content)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (id) DO UPDATE SET
            app_id = excluded.app_id,
            country = excluded.country,
            rating = excluded.rating,
            title = excluded.title,
            content = excluded.content,
            reviewed_at = excluded.reviewed_at,
            response_date = excluded.response_date,
            response_content = excluded.response_content",
    )
    .bind(&review.id)
    .bind(&review.app_id)
    .bind(&review.country)
    .bind(review.rating)
    .bind(&review.title)
    .bind(&review.content)
    .bind(review.reviewed_at)
    .bind(review.response_date)
    .bind(&review.response_content)
    .execute(pool)
    .await?;
    Ok(())
}

/// Upsert the whole batch in one transaction. An empty batch is a no-op.
#[instrument(skip_all, fields(rows = rows.len()))]
pub async fn upsert_clean_batch(pool: &Pool, rows: &[CleanReview]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    for row in rows {
        sqlx::query(
            "INSERT INTO clean_reviews (id, app_id, country, rating, title, content_clean, language, content_en, is_contentful, reviewed_at, response_date, response_content_clean)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (id) DO UPDATE SET
                app_id = excluded.app_id,
                country = excluded.country,
                rating = excluded.rating,
                title = excluded.title,
                content_clean = excluded.content_clean,
                language = excluded.language,
                content_en = excluded.content_en,
                is_contentful = excluded.is_contentful,
                reviewed_at = excluded.reviewed_at,
                response_date = excluded.response_date,
                response_content_clean = excluded.response_content_clean,
                processed_at = CURRENT_TIMESTAMP",
        )
        .bind(&row.id)
        .bind(&row.app_id)
        .bind(&row.country)
        .bind(row.rating)
        .bind(&row.title)
        .bind(&row.content_clean)
        .bind(&row.language)
        .bind(&row.content_en)
        .bind(row.is_contentful)
        .bind(row.reviewed_at)
        .bind(row.response_date)
        .bind(&row.response_content_clean)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to upsert clean review {}", row.id))?;
    }
    tx.commit().await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn fetch_clean_reviews(pool: &Pool, app_id: &str) -> Result<Vec<CleanReview>> {
    let rows = sqlx::query_as::<_, CleanReview>(
        "SELECT id, app_id, country, rating, title, content_clean, language, content_en, is_contentful, reviewed_at, response_date, response_content_clean
         FROM clean_reviews WHERE app_id = ? ORDER BY julianday(reviewed_at) ASC, id ASC",
    )
    .bind(app_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[instrument(skip_all)]
pub async fn enqueue_request(pool: &Pool, saga_id: &str, payload: &str) -> Result<i64> {
    let id = sqlx::query_scalar::<_, i64>(
        "INSERT INTO prepare_requests (saga_id, payload, attempt, status, due_at)
         VALUES (?, ?, 0, ?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now')) RETURNING id",
    )
    .bind(saga_id)
    .bind(payload)
    .bind(RequestStatus::Pending.as_str())
    .fetch_one(pool)
    .await?;
    Ok(id)
}

#[instrument(skip_all)]
pub async fn next_due_request(pool: &Pool) -> Result<Option<PendingRequest>> {
    let row = sqlx::query_as::<_, PendingRequest>(
        "SELECT id, saga_id, payload, attempt FROM prepare_requests
         WHERE status = ? AND julianday(due_at) <= julianday('now')
         ORDER BY julianday(due_at) ASC, id ASC LIMIT 1",
    )
    .bind(RequestStatus::Pending.as_str())
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[instrument(skip_all)]
pub async fn delete_request(pool: &Pool, id: i64) -> Result<()> {
    sqlx::query("DELETE FROM prepare_requests WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Park a request permanently; it is kept for inspection but never retried.
#[instrument(skip_all)]
pub async fn fail_request(pool: &Pool, id: i64, attempt: i32, reason: &str) -> Result<()> {
    sqlx::query("UPDATE prepare_requests SET status = ?, attempt = ?, last_error = ? WHERE id = ?")
        .bind(RequestStatus::Failed.as_str())
        .bind(attempt)
        .bind(reason)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Reschedule a failed request: 5s * 2^attempt, capped at `max_cap_secs`
/// (no cap when `max_cap_secs <= 0`).
#[instrument(skip_all)]
pub async fn backoff_request_with_cap(
    pool: &Pool,
    id: i64,
    attempt: i32,
    max_cap_secs: i64,
    reason: &str,
) -> Result<()> {
    let secs = 5_i64 * (1_i64 << attempt.clamp(0, 10));
    let secs = if max_cap_secs <= 0 { secs } else { secs.min(max_cap_secs) };
    sqlx::query(
        "UPDATE prepare_requests SET attempt = ?, last_error = ?, due_at = datetime('now', ? || ' seconds') WHERE id = ?",
    )
    .bind(attempt + 1)
    .bind(reason)
    .bind(secs)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_pending_requests(pool: &Pool) -> Result<i64> {
    let cnt = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM prepare_requests WHERE status = ?")
        .bind(RequestStatus::Pending.as_str())
        .fetch_one(pool)
        .await?;
    Ok(cnt)
}

#[instrument(skip_all)]
pub async fn insert_completed_event(pool: &Pool, event_id: &str, saga_id: &str, payload: &str) -> Result<()> {
    sqlx::query("INSERT INTO prepare_completed (event_id, saga_id, payload) VALUES (?, ?, ?)")
        .bind(event_id)
        .bind(saga_id)
        .bind(payload)
        .execute(pool)
        .await?;
    Ok(())
}

/// `(saga_id, payload)` of every emitted completion event, oldest first.
pub async fn list_completed_events(pool: &Pool) -> Result<Vec<(String, String)>> {
    let rows = sqlx::query_as::<_, (String, String)>(
        "SELECT saga_id, payload FROM prepare_completed ORDER BY rowid ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_urls_pass_through() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("sqlite::memory:?cache=shared"),
            "sqlite::memory:?cache=shared"
        );
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
    }

    #[test]
    fn file_urls_are_rebuilt_and_parent_created() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested").join("reviews.db");
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let out = prepare_sqlite_url(&url);
        assert_eq!(out, format!("sqlite://{}?mode=rwc", path.display()));
        assert!(td.path().join("nested").exists());
    }

    #[tokio::test]
    async fn file_backed_pool_runs_migrations() {
        let td = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/data/reviews.db", td.path().display());
        let pool = init_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        assert_eq!(count_pending_requests(&pool).await.unwrap(), 0);
    }
}
