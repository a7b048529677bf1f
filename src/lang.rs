//! Language identification over cleaned review text.
//!
//! This module only reports the detector's signal; the confidence floor and
//! default-language policy live with the caller.

pub const UNDETERMINED: &str = "und";

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// ISO 639-1 code, or `und`.
    pub code: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Detection {
    pub fn undetermined() -> Self {
        Self {
            code: UNDETERMINED.to_string(),
            confidence: 0.0,
        }
    }

    pub fn is_undetermined(&self) -> bool {
        self.code == UNDETERMINED
    }
}

pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Detection;
}

/// Trigram-based detector backed by `whatlang`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Detection {
        if text.is_empty() {
            return Detection::undetermined();
        }
        match whatlang::detect(text) {
            Some(info) => detection_from(info.lang().code(), info.is_reliable(), info.confidence()),
            None => Detection::undetermined(),
        }
    }
}

/// Apply the reporting rules to a raw detector result.
///
/// Unreliable results are `und` with zero confidence. A reliable result
/// without a two-letter code is `und` but keeps its confidence, so callers
/// can tell it apart from an unreliable detection.
pub fn detection_from(code3: &str, reliable: bool, confidence: f64) -> Detection {
    if !reliable {
        return Detection::undetermined();
    }
    Detection {
        code: iso639_1(code3).unwrap_or(UNDETERMINED).to_string(),
        confidence,
    }
}

/// Map an ISO 639-3 code to its two-letter ISO 639-1 form.
pub fn iso639_1(code3: &str) -> Option<&'static str> {
    let code = match code3 {
        "afr" => "af",
        "aka" => "ak",
        "amh" => "am",
        "ara" => "ar",
        "aze" => "az",
        "bel" => "be",
        "ben" => "bn",
        "bul" => "bg",
        "cat" => "ca",
        "ces" => "cs",
        "cmn" => "zh",
        "dan" => "da",
        "deu" => "de",
        "ell" => "el",
        "eng" => "en",
        "epo" => "eo",
        "est" => "et",
        "fin" => "fi",
        "fra" => "fr",
        "guj" => "gu",
        "heb" => "he",
        "hin" => "hi",
        "hrv" => "hr",
        "hun" => "hu",
        "hye" => "hy",
        "ind" => "id",
        "ita" => "it",
        "jav" => "jv",
        "jpn" => "ja",
        "kan" => "kn",
        "kat" => "ka",
        "khm" => "km",
        "kor" => "ko",
        "lat" => "la",
        "lav" => "lv",
        "lit" => "lt",
        "mal" => "ml",
        "mar" => "mr",
        "mkd" => "mk",
        "mya" => "my",
        "nep" => "ne",
        "nld" => "nl",
        "nob" => "nb",
        "ori" => "or",
        "pan" => "pa",
        "pes" => "fa",
        "pol" => "pl",
        "por" => "pt",
        "ron" => "ro",
        "rus" => "ru",
        "sin" => "si",
        "slk" => "sk",
        "slv" => "sl",
        "sna" => "sn",
        "spa" => "es",
        "srp" => "sr",
        "swe" => "sv",
        "tam" => "ta",
        "tel" => "te",
        "tgl" => "tl",
        "tha" => "th",
        "tuk" => "tk",
        "tur" => "tr",
        "ukr" => "uk",
        "urd" => "ur",
        "uzb" => "uz",
        "vie" => "vi",
        "yid" => "yi",
        "zul" => "zu",
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_undetermined() {
        assert_eq!(WhatlangDetector.detect(""), Detection::undetermined());
    }

    #[test]
    fn detects_a_long_english_sentence() {
        let d = WhatlangDetector.detect(
            "The application is really useful and I use it every day to keep track of my work and all of my personal notes",
        );
        assert_eq!(d.code, "en");
        assert!(d.confidence > 0.0 && d.confidence <= 1.0);
    }

    #[test]
    fn confidence_stays_in_range() {
        for t in ["a", "hello", "Bonjour le monde, ceci est un test", "12345"] {
            let d = WhatlangDetector.detect(t);
            assert!((0.0..=1.0).contains(&d.confidence), "{t:?} -> {d:?}");
        }
    }

    #[test]
    fn short_unreliable_text_is_undetermined() {
        for t in ["ok", "hi there"] {
            assert_eq!(WhatlangDetector.detect(t), Detection::undetermined(), "{t:?}");
        }
    }

    #[test]
    fn reliable_mapped_detection_keeps_code_and_confidence() {
        let d = detection_from("fra", true, 0.92);
        assert_eq!(d.code, "fr");
        assert_eq!(d.confidence, 0.92);
    }

    #[test]
    fn reliable_unmapped_detection_keeps_confidence() {
        let d = detection_from("xyz", true, 0.8);
        assert!(d.is_undetermined());
        assert_eq!(d.confidence, 0.8);
    }

    #[test]
    fn unreliable_detection_drops_confidence() {
        assert_eq!(detection_from("eng", false, 0.6), Detection::undetermined());
    }

    #[test]
    fn maps_three_letter_codes() {
        assert_eq!(iso639_1("eng"), Some("en"));
        assert_eq!(iso639_1("cmn"), Some("zh"));
        assert_eq!(iso639_1("pes"), Some("fa"));
        assert_eq!(iso639_1("xyz"), None);
    }
}
