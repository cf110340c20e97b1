//! # Stratum
//!
//! An embeddable, segment-based inverted-index engine.
//!
//! ## Features
//!
//! - Documents are inverted into small segments and merged geometrically
//! - Compact prefix-compressed term dictionary with a sparse seek index
//! - Delta-encoded postings with positions and per-field norms
//! - Deletions kept in per-segment bitmaps and dropped by merging
//! - Single-writer locking with atomic commits of the segment list
//! - File-system and in-memory storage backends

pub mod analysis;
pub mod cli;
pub mod document;
pub mod error;
pub mod index;
pub mod storage;
pub mod util;

pub mod prelude {
    pub use crate::analysis::analyzer::{Analyzer, KeywordAnalyzer, StandardAnalyzer};
    pub use crate::document::document::Document;
    pub use crate::document::field::Field;
    pub use crate::error::{Result, StratumError};
    pub use crate::index::reader::{IndexReader, TermEnum, TermPositions, open_reader};
    pub use crate::index::term::Term;
    pub use crate::index::writer::{IndexWriter, IndexWriterConfig};
    pub use crate::storage::Storage;
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
