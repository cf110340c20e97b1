//! Token types for text analysis.
//!
//! A [`Token`] is one indexed unit of text. Analyzers hand the index writer a
//! [`TokenStream`]; the writer records each token's text and its ordinal
//! position within the field.
//!
//! # Examples
//!
//! ```
//! use stratum::analysis::token::Token;
//!
//! let token = Token::with_offsets("world", 1, 6, 11);
//! assert_eq!(token.text, "world");
//! assert_eq!(token.start_offset, 6);
//! assert_eq!(token.end_offset, 11);
//! ```

use serde::{Deserialize, Serialize};

/// A single analyzed token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The term text as it will be indexed.
    pub text: String,

    /// Ordinal position of the token in its token stream.
    pub position: usize,

    /// Byte offset of the token start in the source text.
    pub start_offset: usize,

    /// Byte offset one past the token end in the source text.
    pub end_offset: usize,
}

impl Token {
    pub fn new<S: Into<String>>(text: S, position: usize) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset: 0,
            end_offset: 0,
        }
    }

    pub fn with_offsets<S: Into<String>>(
        text: S,
        position: usize,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset,
            end_offset,
        }
    }

    /// Replace the token text, keeping position and offsets.
    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = text.into();
        self
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// A stream of tokens produced by an analyzer.
pub type TokenStream = Box<dyn Iterator<Item = Token> + Send>;
