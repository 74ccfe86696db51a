use std::collections::HashSet;

use lazy_static::lazy_static;

lazy_static! {
    static ref ENGLISH_STOP_WORDS: HashSet<String> = [
        "a", "an", "and", "at", "by", "for", "from", "in", "of", "on", "or", "the", "to", "with",
    ]
    .iter()
    .map(|w| w.to_string())
    .collect();
}

/// Returns a small built-in set of English stop words.
///
/// Transaction descriptions are short, so only connectives that carry no
/// merchant or category signal are included.
pub fn english_stop_words() -> HashSet<String> {
    ENGLISH_STOP_WORDS.clone()
}

/// Splits transaction descriptions into normalized word features.
///
/// Text is lower-cased and split on every non-alphanumeric character. Tokens
/// shorter than `min_length` characters and stop words are dropped. The
/// tokenizer holds no mutable state, so one instance can be shared freely
/// between threads.
///
/// ```rust
/// use categorist::Tokenizer;
///
/// let tokenizer = Tokenizer::default();
/// assert_eq!(tokenizer.tokenize("TESCO Store #42"), vec!["tesco", "store", "42"]);
/// assert!(tokenizer.tokenize("").is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct Tokenizer {
    min_length: usize,
    stop_words: HashSet<String>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(1, HashSet::new())
    }
}

impl Tokenizer {
    /// Creates a tokenizer. Stop words are matched after lower-casing, so they
    /// are normalized here as well.
    pub fn new(min_length: usize, stop_words: HashSet<String>) -> Self {
        Self {
            min_length,
            stop_words: stop_words.into_iter().map(|w| w.to_lowercase()).collect(),
        }
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    pub fn stop_words(&self) -> &HashSet<String> {
        &self.stop_words
    }

    /// Tokenizes `text` into an ordered sequence. Duplicates are kept since
    /// every occurrence counts toward the class statistics.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|token| !token.is_empty())
            .filter(|token| token.chars().count() >= self.min_length)
            .filter(|token| !self.stop_words.contains(*token))
            .map(str::to_string)
            .collect()
    }
}
