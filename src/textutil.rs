//! Text cleaning and the contentfulness heuristic applied to review bodies.
use once_cell::sync::Lazy;
use regex::Regex;

static HTML_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));

/// Pictographic/symbol blocks blanked out when emoji stripping is on.
const EMOJI_RANGES: &[(char, char)] = &[
    ('\u{2190}', '\u{21FF}'),
    ('\u{2600}', '\u{27BF}'),
    ('\u{1F300}', '\u{1F6FF}'),
    ('\u{1F900}', '\u{1F9FF}'),
    ('\u{1FA70}', '\u{1FAFF}'),
];

fn is_emoji(c: char) -> bool {
    EMOJI_RANGES.iter().any(|&(lo, hi)| (lo..=hi).contains(&c))
}

/// Clean `text` according to the toggles and report whether the result is at
/// least `min_len` bytes long.
///
/// A `false` flag is a classification outcome, not an error: the partially
/// cleaned text is still returned so callers can keep it as a skipped row.
pub fn clean(
    text: &str,
    strip_html: bool,
    strip_emoji: bool,
    normalize_whitespace: bool,
    max_len: usize,
    min_len: usize,
) -> (String, bool) {
    let mut out = if strip_html {
        HTML_TAGS.replace_all(text, " ").into_owned()
    } else {
        text.to_string()
    };
    if strip_emoji {
        out = out
            .chars()
            .map(|c| if is_emoji(c) { ' ' } else { c })
            .collect();
    }
    if normalize_whitespace {
        out = out.split_whitespace().collect::<Vec<_>>().join(" ");
    }
    if max_len > 0 && out.len() > max_len {
        out.truncate(char_floor(&out, max_len));
    }
    let ok = out.len() >= min_len;
    (out, ok)
}

/// Largest char boundary of `s` that is `<= idx`.
fn char_floor(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Heuristic gate: does `text` carry enough signal to be worth keeping?
///
/// Every enabled threshold must pass. Non-ASCII code points count as
/// informative so non-Latin scripts are not penalized by the ratio check.
pub fn is_contentful(text: &str, min_words: usize, min_chars: usize, min_alpha_ratio: f64) -> bool {
    if text.trim().is_empty() {
        return false;
    }
    let total = text.chars().count();
    if min_chars > 0 && total < min_chars {
        return false;
    }
    if min_words > 0 && text.split_whitespace().count() < min_words {
        return false;
    }
    let informative = text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || !c.is_ascii())
        .count();
    let ratio = informative as f64 / total as f64;
    ratio >= min_alpha_ratio
}
