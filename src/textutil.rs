use once_cell::sync::Lazy;
use regex::Regex;

static PUNCT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[[:punct:]]").expect("punct regex"));
// ASCII punctuation minus ':' and '\'.
static PUNCT_KEEP_COLON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[!-/;-@\[\]-`{-~]").expect("punct keep-colon regex"));

/// Corpus-line normalization: trim, lower-case, drop ASCII punctuation.
pub fn normalize_line(line: &str) -> String {
    let lowered = line.trim().to_lowercase();
    PUNCT_RE.replace_all(&lowered, "").trim().to_string()
}

/// Looser cleanup applied to target text before it is tokenized for a prompt.
/// Keeps `:` and `\` so `target:` labels survive.
pub fn filter_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    PUNCT_KEEP_COLON_RE.replace_all(&lowered, "").into_owned()
}

pub fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
