//! Lightweight lexical helpers: content-word extraction and a stopword
//! based language guess.
//!
//! The detector only distinguishes the languages the stopword tables
//! below cover. Anything else yields `None` and the prompts fall back to a
//! generic "same language as the customer" instruction.

use std::collections::HashSet;

use unicode_segmentation::UnicodeSegmentation;

/// A language the heuristic detector can recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    English,
    Indonesian,
}

impl Language {
    pub fn name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Indonesian => "Indonesian",
        }
    }

    fn stopwords(&self) -> &'static [&'static str] {
        match self {
            Language::English => ENGLISH_STOPWORDS,
            Language::Indonesian => INDONESIAN_STOPWORDS,
        }
    }
}

const ENGLISH_STOPWORDS: &[&str] = &[
    "a", "an", "the", "in", "on", "at", "to", "of", "with", "by", "from", "for", "as", "into",
    "about", "and", "or", "but", "so", "i", "you", "he", "she", "it", "we", "they", "me", "my",
    "your", "our", "their", "this", "that", "these", "those", "which", "who", "what", "where",
    "when", "how", "why", "is", "are", "was", "were", "be", "been", "have", "has", "had", "do",
    "does", "did", "will", "would", "could", "should", "can", "not", "no", "yes", "any", "some",
    "there", "here", "please", "if", "then", "than", "also", "just", "very",
];

const INDONESIAN_STOPWORDS: &[&str] = &[
    "yang", "dan", "di", "ke", "dari", "untuk", "dengan", "ini", "itu", "ada", "adalah", "akan",
    "apa", "apakah", "bagaimana", "berapa", "bisa", "dalam", "juga", "karena", "kami", "kita",
    "saya", "anda", "kamu", "mereka", "pada", "sudah", "belum", "tidak", "bukan", "atau", "jika",
    "kalau", "saja", "sebagai", "oleh", "mau", "ingin", "tolong", "mohon", "bagi", "tentang",
    "lagi", "sama", "agar", "supaya", "harus", "dong", "ya", "kah", "gimana", "kenapa", "mengapa",
];

const DETECTABLE: [Language; 2] = [Language::English, Language::Indonesian];

/// Minimum stopword hits before a guess is trusted.
const MIN_HITS: usize = 1;

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.unicode_words()
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().any(|c| c.is_alphabetic()))
}

fn is_stopword(word: &str) -> bool {
    DETECTABLE.iter().any(|l| l.stopwords().contains(&word))
}

/// Lowercased words of `text` with stopwords of every known language and
/// one-letter tokens removed.
pub fn content_words(text: &str) -> HashSet<String> {
    words(text)
        .filter(|w| w.chars().count() > 1 && !is_stopword(w))
        .collect()
}

/// Guess the language of `text` by counting stopword hits.
///
/// Returns `None` when no known language scores, or when two languages tie.
pub fn detect_language(text: &str) -> Option<Language> {
    let tokens: Vec<String> = words(text).collect();
    let mut scores: Vec<(Language, usize)> = DETECTABLE
        .iter()
        .map(|lang| {
            let stop = lang.stopwords();
            let hits = tokens.iter().filter(|t| stop.contains(&t.as_str())).count();
            (*lang, hits)
        })
        .collect();
    scores.sort_by(|a, b| b.1.cmp(&a.1));

    match scores.as_slice() {
        [(lang, top), (_, second), ..] if *top >= MIN_HITS && top > second => Some(*lang),
        [(lang, top)] if *top >= MIN_HITS => Some(*lang),
        _ => None,
    }
}

/// Fraction of the content words of `text` that also appear in `reference`.
///
/// `text` without content words scores 0.0.
pub fn overlap_ratio(text: &str, reference: &str) -> f64 {
    let needles = content_words(text);
    if needles.is_empty() {
        return 0.0;
    }
    let haystack = content_words(reference);
    let hits = needles.iter().filter(|w| haystack.contains(*w)).count();
    hits as f64 / needles.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_english() {
        assert_eq!(
            detect_language("What is the refund policy for enterprise plans?"),
            Some(Language::English)
        );
    }

    #[test]
    fn test_detects_indonesian() {
        assert_eq!(
            detect_language("Bagaimana cara mengganti password email saya?"),
            Some(Language::Indonesian)
        );
    }

    #[test]
    fn test_unknown_text_is_none() {
        assert_eq!(detect_language("Rückerstattung Unternehmen"), None);
        assert_eq!(detect_language(""), None);
    }

    #[test]
    fn test_content_words_drop_stopwords() {
        let words = content_words("What is the price of the Enterprise plan?");
        assert!(words.contains("price"));
        assert!(words.contains("enterprise"));
        assert!(!words.contains("the"));
        assert!(!words.contains("what"));
    }

    #[test]
    fn test_overlap_ratio() {
        let ratio = overlap_ratio(
            "refund policy enterprise",
            "Customer: what is your refund policy?",
        );
        assert!((ratio - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(overlap_ratio("the a of", "anything"), 0.0);
    }
}
