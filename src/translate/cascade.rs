//! Primary/fallback translator with adequacy sampling.
//!
//! The primary handles every batch. A deterministic prefix of the batch is
//! checked with a length-ratio heuristic, and only the items that look poor
//! are re-submitted to the fallback. A failing fallback never fails a batch
//! the primary already translated.
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use super::{Item, Translations, Translator};

pub struct Cascade {
    primary: Option<Arc<dyn Translator>>,
    fallback: Option<Arc<dyn Translator>>,
    sample_size: usize,
    adequacy_ratio: f64,
}

impl Cascade {
    pub fn new(
        primary: Option<Arc<dyn Translator>>,
        fallback: Option<Arc<dyn Translator>>,
        sample_size: usize,
        adequacy_ratio: f64,
    ) -> Self {
        Self {
            primary,
            fallback,
            sample_size,
            adequacy_ratio,
        }
    }

    fn adequacy_enabled(&self) -> bool {
        self.sample_size > 0 && self.adequacy_ratio > 0.0
    }
}

/// Length-ratio proxy for a bad translation. Lengths are in bytes; a ratio
/// equal to `min_ratio` is acceptable.
pub fn is_poor_adequacy(src: &str, dst: &str, min_ratio: f64) -> bool {
    if src.is_empty() {
        return false;
    }
    if dst.is_empty() {
        return true;
    }
    (dst.len() as f64 / src.len() as f64) < min_ratio
}

#[async_trait]
impl Translator for Cascade {
    #[instrument(skip_all, fields(items = items.len(), target_lang = %target))]
    async fn translate_batch(&self, items: &[Item], target: &str) -> Result<Translations> {
        let Some(primary) = &self.primary else {
            return Ok(Translations::new());
        };

        let mut results = match primary.translate_batch(items, target).await {
            Ok(results) => results,
            Err(err) => {
                return match &self.fallback {
                    Some(fallback) => {
                        warn!(?err, "primary translator failed; delegating batch to fallback");
                        fallback.translate_batch(items, target).await
                    }
                    None => Err(err),
                };
            }
        };

        let Some(fallback) = &self.fallback else {
            return Ok(results);
        };
        if !self.adequacy_enabled() {
            return Ok(results);
        }

        let poor: Vec<Item> = items
            .iter()
            .take(self.sample_size)
            .filter(|it| {
                results
                    .get(&it.id)
                    .is_some_and(|r| is_poor_adequacy(&it.text, &r.translated, self.adequacy_ratio))
            })
            .cloned()
            .collect();
        if poor.is_empty() {
            return Ok(results);
        }
        debug!(poor = poor.len(), "re-translating poor samples with fallback");

        let mut retried = match fallback.translate_batch(&poor, target).await {
            Ok(retried) => retried,
            Err(err) => {
                warn!(?err, "fallback translator failed; keeping primary results");
                return Ok(results);
            }
        };

        for it in &poor {
            let Some(candidate) = retried.remove(&it.id) else {
                continue;
            };
            let primary_empty = results
                .get(&it.id)
                .map_or(true, |r| r.translated.is_empty());
            if primary_empty || !is_poor_adequacy(&it.text, &candidate.translated, self.adequacy_ratio) {
                results.insert(it.id.clone(), candidate);
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::TranslationResult;
    use anyhow::anyhow;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    /// Replays queued responses and records the ids of every call.
    #[derive(Default)]
    struct RecordingTranslator {
        responses: Mutex<VecDeque<Result<Translations>>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl RecordingTranslator {
        fn with_responses(responses: Vec<Result<Translations>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(VecDeque::from(responses)),
                ..Default::default()
            })
        }

        async fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait]
    impl Translator for RecordingTranslator {
        async fn translate_batch(&self, items: &[Item], _target: &str) -> Result<Translations> {
            self.calls
                .lock()
                .await
                .push(items.iter().map(|it| it.id.clone()).collect());
            self.responses
                .lock()
                .await
                .pop_front()
                .unwrap_or_else(|| Ok(Translations::new()))
        }
    }

    fn item(id: &str, text: &str) -> Item {
        Item {
            id: id.into(),
            text: text.into(),
        }
    }

    fn translations(entries: &[(&str, &str, &str)]) -> Translations {
        entries
            .iter()
            .map(|(id, lang, translated)| {
                (
                    id.to_string(),
                    TranslationResult {
                        id: id.to_string(),
                        lang: lang.to_string(),
                        translated: translated.to_string(),
                    },
                )
            })
            .collect()
    }

    fn as_dyn(t: &Arc<RecordingTranslator>) -> Option<Arc<dyn Translator>> {
        Some(t.clone() as Arc<dyn Translator>)
    }

    #[test]
    fn adequacy_heuristic() {
        assert!(!is_poor_adequacy("", "", 0.5));
        assert!(is_poor_adequacy("hola", "", 0.5));
        assert!(is_poor_adequacy("0123456789", "abc", 0.5));
        assert!(!is_poor_adequacy("0123456789", "abcde", 0.5));
    }

    #[tokio::test]
    async fn no_primary_is_a_noop() {
        let cascade = Cascade::new(None, None, 3, 0.5);
        let out = cascade.translate_batch(&[item("1", "hola")], "en").await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn empty_primary_result_without_fallback_is_empty() {
        let primary = RecordingTranslator::with_responses(vec![Ok(Translations::new())]);
        let cascade = Cascade::new(as_dyn(&primary), None, 3, 0.5);
        let out = cascade.translate_batch(&[item("1", "hola")], "en").await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn primary_error_propagates_without_fallback() {
        let primary = RecordingTranslator::with_responses(vec![Err(anyhow!("boom"))]);
        let cascade = Cascade::new(as_dyn(&primary), None, 3, 0.5);
        let err = cascade.translate_batch(&[item("1", "hola")], "en").await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn primary_error_delegates_whole_batch_to_fallback() {
        let primary = RecordingTranslator::with_responses(vec![Err(anyhow!("rate limited"))]);
        let fallback = RecordingTranslator::with_responses(vec![Ok(translations(&[
            ("1", "es", "hello"),
            ("2", "es", "bye"),
        ]))]);
        let cascade = Cascade::new(as_dyn(&primary), as_dyn(&fallback), 0, 0.0);
        let out = cascade
            .translate_batch(&[item("1", "hola"), item("2", "adiós")], "en")
            .await
            .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(fallback.calls().await, vec![vec!["1".to_string(), "2".to_string()]]);
    }

    #[tokio::test]
    async fn adequacy_is_opt_in() {
        let primary = RecordingTranslator::with_responses(vec![
            Ok(translations(&[("1", "es", "")])),
            Ok(translations(&[("1", "es", "")])),
        ]);
        let fallback = RecordingTranslator::with_responses(vec![]);

        let cascade = Cascade::new(as_dyn(&primary), as_dyn(&fallback), 0, 0.5);
        cascade.translate_batch(&[item("1", "hola")], "en").await.unwrap();
        let cascade = Cascade::new(as_dyn(&primary), as_dyn(&fallback), 3, 0.0);
        cascade.translate_batch(&[item("1", "hola")], "en").await.unwrap();

        assert!(fallback.calls().await.is_empty());
    }

    #[tokio::test]
    async fn short_sampled_translation_triggers_fallback() {
        let primary = RecordingTranslator::with_responses(vec![Ok(translations(&[("1", "fr", "abc")]))]);
        let fallback = RecordingTranslator::with_responses(vec![Ok(translations(&[("1", "fr", "abcdefgh")]))]);
        let cascade = Cascade::new(as_dyn(&primary), as_dyn(&fallback), 1, 0.5);
        let out = cascade
            .translate_batch(&[item("1", "0123456789")], "en")
            .await
            .unwrap();
        assert_eq!(fallback.calls().await, vec![vec!["1".to_string()]]);
        assert_eq!(out["1"].translated, "abcdefgh");
    }

    #[tokio::test]
    async fn only_the_sampled_prefix_is_checked() {
        let primary = RecordingTranslator::with_responses(vec![Ok(translations(&[
            ("1", "fr", "good enough"),
            ("2", "fr", ""),
            ("3", "fr", ""),
        ]))]);
        let fallback = RecordingTranslator::with_responses(vec![Ok(translations(&[("2", "fr", "second")]))]);
        let cascade = Cascade::new(as_dyn(&primary), as_dyn(&fallback), 2, 0.5);
        let items = [item("1", "assez bien"), item("2", "deuxième"), item("3", "troisième")];
        let out = cascade.translate_batch(&items, "en").await.unwrap();

        assert_eq!(fallback.calls().await, vec![vec!["2".to_string()]]);
        assert_eq!(out["2"].translated, "second");
        assert_eq!(out["3"].translated, "");
    }

    #[tokio::test]
    async fn fallback_failure_keeps_primary_results() {
        let primary = RecordingTranslator::with_responses(vec![Ok(translations(&[("1", "fr", "abc")]))]);
        let fallback = RecordingTranslator::with_responses(vec![Err(anyhow!("fallback down"))]);
        let cascade = Cascade::new(as_dyn(&primary), as_dyn(&fallback), 5, 0.5);
        let out = cascade
            .translate_batch(&[item("1", "0123456789")], "en")
            .await
            .unwrap();
        assert_eq!(out["1"].translated, "abc");
    }

    #[tokio::test]
    async fn worse_fallback_does_not_replace_nonempty_primary() {
        let primary = RecordingTranslator::with_responses(vec![Ok(translations(&[("1", "fr", "abc")]))]);
        let fallback = RecordingTranslator::with_responses(vec![Ok(translations(&[("1", "fr", "ab")]))]);
        let cascade = Cascade::new(as_dyn(&primary), as_dyn(&fallback), 5, 0.5);
        let out = cascade
            .translate_batch(&[item("1", "0123456789")], "en")
            .await
            .unwrap();
        assert_eq!(out["1"].translated, "abc");
    }

    #[tokio::test]
    async fn any_fallback_replaces_empty_primary() {
        let primary = RecordingTranslator::with_responses(vec![Ok(translations(&[("1", "fr", "")]))]);
        let fallback = RecordingTranslator::with_responses(vec![Ok(translations(&[("1", "fr", "ab")]))]);
        let cascade = Cascade::new(as_dyn(&primary), as_dyn(&fallback), 5, 0.5);
        let out = cascade
            .translate_batch(&[item("1", "0123456789")], "en")
            .await
            .unwrap();
        assert_eq!(out["1"].translated, "ab");
    }

    #[tokio::test]
    async fn ratio_at_threshold_is_acceptable() {
        let primary = RecordingTranslator::with_responses(vec![Ok(translations(&[("1", "fr", "abcde")]))]);
        let fallback = RecordingTranslator::with_responses(vec![]);
        let cascade = Cascade::new(as_dyn(&primary), as_dyn(&fallback), 5, 0.5);
        cascade
            .translate_batch(&[item("1", "0123456789")], "en")
            .await
            .unwrap();
        assert!(fallback.calls().await.is_empty());
    }
}
