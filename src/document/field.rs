//! Document fields.
//!
//! A [`Field`] pairs a name with a string value and three flags that decide
//! how the index writer treats it: whether the value is stored verbatim in the
//! segment's stored-field files, whether it is indexed at all, and whether an
//! indexed value is run through the analyzer or indexed as one term.

use serde::{Deserialize, Serialize};

/// A named field value with storage and indexing flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    name: String,
    value: String,
    stored: bool,
    indexed: bool,
    tokenized: bool,
}

impl Field {
    pub fn new<N, V>(name: N, value: V, stored: bool, indexed: bool, tokenized: bool) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Field {
            name: name.into(),
            value: value.into(),
            stored,
            indexed,
            tokenized,
        }
    }

    /// Stored and indexed as a single untokenized term (ids, dates, paths).
    pub fn keyword<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self::new(name, value, true, true, false)
    }

    /// Stored, indexed and tokenized.
    pub fn text<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self::new(name, value, true, true, true)
    }

    /// Stored only; not searchable.
    pub fn unindexed<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self::new(name, value, true, false, false)
    }

    /// Indexed and tokenized but not stored (large bodies).
    pub fn unstored<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self::new(name, value, false, true, true)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn is_stored(&self) -> bool {
        self.stored
    }

    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    pub fn is_tokenized(&self) -> bool {
        self.tokenized
    }
}
