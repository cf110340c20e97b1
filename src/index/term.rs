//! Terms and their dictionary entries.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A word from a field: the unit of indexing.
///
/// Terms order by field name first, then by text; both compare as UTF-8
/// bytes. This single order is used for dictionary writes, dictionary
/// seeks and the merge queue.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term {
    pub field: String,
    pub text: String,
}

impl Term {
    pub fn new<F: Into<String>, T: Into<String>>(field: F, text: T) -> Self {
        Term {
            field: field.into(),
            text: text.into(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

impl Default for Term {
    fn default() -> Self {
        Term::new("", "")
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}

/// Dictionary entry for one term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermInfo {
    /// Number of documents containing the term.
    pub doc_freq: u32,

    /// Offset of the term's postings in the `.frq` file.
    pub freq_pointer: u64,

    /// Offset of the term's positions in the `.prx` file.
    pub prox_pointer: u64,
}

impl TermInfo {
    pub fn new(doc_freq: u32, freq_pointer: u64, prox_pointer: u64) -> Self {
        TermInfo {
            doc_freq,
            freq_pointer,
            prox_pointer,
        }
    }
}
