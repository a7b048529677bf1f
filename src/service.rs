//! Per-request orchestration: fetch, clean, classify, detect, translate,
//! persist, signal.
use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ProcessingConfig;
use crate::db::RawFilters;
use crate::lang::LanguageDetector;
use crate::model::{CleanReview, PrepareCompleted, PrepareRequest, RawReview};
use crate::storage::{CleanReviewSink, EventPublisher, RawReviewSource};
use crate::textutil;
use crate::translate::{Item, Translator};

/// The only target language the translation pass runs for.
pub const SUPPORTED_TARGET_LANG: &str = "en";
const DEFAULT_TRANSLATE_BATCH_SIZE: usize = 20;

pub struct PreprocessService {
    raw: Arc<dyn RawReviewSource>,
    clean: Arc<dyn CleanReviewSink>,
    events: Arc<dyn EventPublisher>,
    detector: Arc<dyn LanguageDetector>,
    translator: Arc<dyn Translator>,
    cfg: ProcessingConfig,
}

impl PreprocessService {
    pub fn new(
        raw: Arc<dyn RawReviewSource>,
        clean: Arc<dyn CleanReviewSink>,
        events: Arc<dyn EventPublisher>,
        detector: Arc<dyn LanguageDetector>,
        translator: Arc<dyn Translator>,
        cfg: ProcessingConfig,
    ) -> Self {
        Self {
            raw,
            clean,
            events,
            detector,
            translator,
            cfg,
        }
    }

    /// Process one request end to end and return the emitted completion.
    ///
    /// Fetch, persist and publish failures propagate; translation failures
    /// only leave rows untranslated. `cancel` aborts an in-flight fetch or
    /// persist without committing anything.
    #[instrument(skip_all, fields(app_id = %req.app_id, saga_id = %saga_id))]
    pub async fn handle(
        &self,
        req: &PrepareRequest,
        saga_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PrepareCompleted> {
        let (from, to) = resolve_window(req, Utc::now());
        let filters = RawFilters {
            app_id: req.app_id.clone(),
            countries: req.countries.clone(),
            from,
            to,
            limit: req.limit,
        };

        let raw_items = cancellable(cancel, "raw fetch", self.raw.fetch(&filters)).await?;
        let (mut batch, mut ids) = self.build_clean_batch(&raw_items);
        let translated = self.run_translations(&mut batch).await;

        cancellable(cancel, "clean upsert", self.clean.upsert_batch(&batch)).await?;

        let clean_count = ids.len();
        if self.cfg.publish_ids_limit > 0 {
            ids.truncate(self.cfg.publish_ids_limit);
        }
        let completed = PrepareCompleted {
            request: req.clone(),
            clean_count,
            clean_ids: ids,
        };
        self.events.publish_completed(saga_id, &completed).await?;

        info!(
            fetched = raw_items.len(),
            persisted = batch.len(),
            contentful = clean_count,
            translated,
            "prepare request done"
        );
        Ok(completed)
    }

    /// Clean, classify and tag every raw row. Returns the batch plus the ids
    /// of contentful rows in fetch order.
    pub fn build_clean_batch(&self, raw_items: &[RawReview]) -> (Vec<CleanReview>, Vec<String>) {
        let cfg = &self.cfg;
        let mut batch = Vec::with_capacity(raw_items.len());
        let mut ids = Vec::with_capacity(raw_items.len());

        for rr in raw_items {
            let (text, ok) = self.clean_text(&rr.content);
            if !ok || !textutil::is_contentful(&text, cfg.min_words, cfg.min_chars, cfg.min_alpha_ratio) {
                if cfg.save_skipped {
                    batch.push(self.skipped_clean(rr, text));
                }
                continue;
            }

            let detection = self.detector.detect(&text);
            let language = if detection.is_undetermined() {
                cfg.default_lang.clone()
            } else {
                if detection.confidence < cfg.lang_detect_min_conf {
                    debug!(
                        id = %rr.id,
                        code = %detection.code,
                        confidence = detection.confidence,
                        "keeping reliable detection below confidence floor"
                    );
                }
                detection.code
            };

            let response_content_clean = rr
                .response_content
                .as_deref()
                .map(|r| self.clean_text(r))
                .and_then(|(r, ok)| ok.then_some(r));

            ids.push(rr.id.clone());
            batch.push(CleanReview {
                id: rr.id.clone(),
                app_id: rr.app_id.clone(),
                country: rr.country.clone(),
                rating: rr.rating,
                title: rr.title.clone(),
                content_clean: text,
                language,
                content_en: None,
                is_contentful: true,
                reviewed_at: rr.reviewed_at,
                response_date: rr.response_date,
                response_content_clean,
            });
        }
        (batch, ids)
    }

    fn clean_text(&self, text: &str) -> (String, bool) {
        let cfg = &self.cfg;
        textutil::clean(
            text,
            cfg.html_strip,
            cfg.emoji_strip,
            cfg.whitespace_normalize,
            cfg.max_review_len,
            cfg.min_content_len,
        )
    }

    fn skipped_clean(&self, rr: &RawReview, text: String) -> CleanReview {
        CleanReview {
            id: rr.id.clone(),
            app_id: rr.app_id.clone(),
            country: rr.country.clone(),
            rating: rr.rating,
            title: rr.title.clone(),
            content_clean: text,
            language: self.cfg.default_lang.clone(),
            content_en: None,
            is_contentful: false,
            reviewed_at: rr.reviewed_at,
            response_date: None,
            response_content_clean: None,
        }
    }

    /// Translate contentful rows not already in the target language, one
    /// sub-batch at a time. A failed or timed-out sub-batch is skipped.
    /// Returns how many rows received a translation.
    #[instrument(skip_all)]
    pub async fn run_translations(&self, batch: &mut [CleanReview]) -> usize {
        let cfg = &self.cfg;
        if !cfg.translate_enabled || cfg.translate_target_lang != SUPPORTED_TARGET_LANG {
            return 0;
        }
        let target = cfg.translate_target_lang.as_str();

        let mut index: HashMap<String, usize> = HashMap::new();
        let mut pending = Vec::new();
        for (i, row) in batch.iter().enumerate() {
            if row.is_contentful && row.language != target {
                index.insert(row.id.clone(), i);
                pending.push(Item {
                    id: row.id.clone(),
                    text: row.content_clean.clone(),
                });
            }
        }
        if pending.is_empty() {
            return 0;
        }

        let size = if cfg.translate_batch_size == 0 {
            DEFAULT_TRANSLATE_BATCH_SIZE
        } else {
            cfg.translate_batch_size
        };
        let timeout = cfg.translate_timeout();
        let mut translated = 0;

        for (n, sub) in pending.chunks(size).enumerate() {
            let call = self.translator.translate_batch(sub, target);
            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, call).await {
                    Ok(res) => res,
                    Err(_) => Err(anyhow!("translation sub-batch timed out after {:?}", limit)),
                },
                None => call.await,
            };
            let results = match outcome {
                Ok(results) => results,
                Err(err) => {
                    warn!(?err, sub_batch = n, items = sub.len(), "translation failed; keeping original text");
                    continue;
                }
            };

            for it in sub {
                let (Some(r), Some(&i)) = (results.get(&it.id), index.get(&it.id)) else {
                    continue;
                };
                let row = &mut batch[i];
                if !r.translated.is_empty() {
                    row.content_en = Some(r.translated.clone());
                    translated += 1;
                }
                if !r.lang.is_empty() {
                    row.language = r.lang.clone();
                }
            }
        }
        translated
    }
}

/// Run `fut` unless `cancel` fires first.
async fn cancellable<T>(
    cancel: &CancellationToken,
    what: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(anyhow!("{what} cancelled")),
        res = fut => res,
    }
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
/// Empty or unparseable input yields `default`.
pub fn parse_time(s: &str, default: DateTime<Utc>) -> DateTime<Utc> {
    let s = s.trim();
    if s.is_empty() {
        return default;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return t.with_timezone(&Utc);
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(t) = d.and_hms_opt(0, 0, 0) {
            return t.and_utc();
        }
    }
    default
}

/// Effective `[from, to]` window: missing bounds become the epoch and `now`.
pub fn resolve_window(req: &PrepareRequest, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (
        parse_time(&req.date_from, DateTime::<Utc>::UNIX_EPOCH),
        parse_time(&req.date_to, now),
    )
}
