//! Analyzers turn field text into token streams.
//!
//! The index writer only needs the resulting tokens; how the text was split
//! is up to the [`Analyzer`] implementation.
//!
//! - [`StandardAnalyzer`] splits on Unicode word boundaries (UAX #29),
//!   lower-cases and drops common English stop words.
//! - [`KeywordAnalyzer`] emits the whole input as a single token.
//!
//! # Examples
//!
//! ```
//! use stratum::analysis::analyzer::{Analyzer, StandardAnalyzer};
//!
//! let analyzer = StandardAnalyzer::new();
//! let tokens: Vec<_> = analyzer.analyze("Hello the World").unwrap().collect();
//!
//! assert_eq!(tokens.len(), 2);
//! assert_eq!(tokens[0].text, "hello");
//! assert_eq!(tokens[1].text, "world");
//! assert_eq!(tokens[1].position, 1);
//! ```

use std::collections::HashSet;
use std::sync::LazyLock;

use unicode_segmentation::UnicodeSegmentation;

use crate::analysis::token::{Token, TokenStream};
use crate::error::Result;

/// Common English words that are filtered out during indexing.
const DEFAULT_ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Default English stop words as a HashSet.
pub static DEFAULT_ENGLISH_STOP_WORDS_SET: LazyLock<HashSet<String>> = LazyLock::new(|| {
    DEFAULT_ENGLISH_STOP_WORDS
        .iter()
        .map(|&s| s.to_string())
        .collect()
});

/// Converts text into a stream of tokens.
pub trait Analyzer: Send + Sync + std::fmt::Debug {
    /// Analyze `text` into tokens with consecutive positions starting at 0.
    fn analyze(&self, text: &str) -> Result<TokenStream>;

    /// Name of this analyzer, used in logs and statistics.
    fn name(&self) -> &'static str;
}

/// Unicode word tokenizer, lowercase normalization and stop word removal.
#[derive(Debug, Clone)]
pub struct StandardAnalyzer {
    stop_words: HashSet<String>,
}

impl StandardAnalyzer {
    pub fn new() -> Self {
        StandardAnalyzer {
            stop_words: DEFAULT_ENGLISH_STOP_WORDS_SET.clone(),
        }
    }

    pub fn without_stop_words() -> Self {
        StandardAnalyzer {
            stop_words: HashSet::new(),
        }
    }

    pub fn with_stop_words<I, S>(stop_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StandardAnalyzer {
            stop_words: stop_words.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for StandardAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let tokens: Vec<Token> = text
            .unicode_word_indices()
            .map(|(offset, word)| (offset, word.to_lowercase(), word.len()))
            .filter(|(_, word, _)| !self.stop_words.contains(word))
            .enumerate()
            .map(|(position, (offset, word, len))| {
                Token::with_offsets(word, position, offset, offset + len)
            })
            .collect();

        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

/// Treats the entire input as one token.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    pub fn new() -> Self {
        KeywordAnalyzer
    }
}

impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        if text.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }
        let token = Token::with_offsets(text, 0, 0, text.len());
        Ok(Box::new(std::iter::once(token)))
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}
