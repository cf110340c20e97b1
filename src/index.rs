//! The segment-based inverted index.
//!
//! An index is a stack of segments listed in the `segments` file. Each
//! segment is a self-contained set of files named `<segment>.<ext>`:
//!
//! | ext         | content                                        |
//! |-------------|------------------------------------------------|
//! | `fnm`       | field names and numbers ([`field_infos`])      |
//! | `fdx`/`fdt` | stored field values ([`fields`])               |
//! | `tis`/`tii` | term dictionary and its sparse index ([`term_infos`]) |
//! | `frq`/`prx` | postings: doc ids, frequencies and positions ([`postings`]) |
//! | `f<N>`      | norms of field number `N` ([`norms`])          |
//! | `del`       | deleted documents, when there are any          |
//!
//! [`writer::IndexWriter`] adds documents and merges segments;
//! [`reader::open_reader`] opens the current segments for reading.

pub mod document_writer;
pub mod field_infos;
pub mod fields;
pub mod lock;
pub mod merge_policy;
pub mod merge_queue;
pub mod merger;
pub mod multi_reader;
pub mod norms;
pub mod postings;
pub mod reader;
pub mod segment_infos;
pub mod segment_reader;
pub mod term;
pub mod term_infos;
pub mod writer;

/// Name of the file with extension `ext` of segment `segment`.
pub fn segment_file(segment: &str, ext: &str) -> String {
    format!("{segment}.{ext}")
}
