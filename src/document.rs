//! Documents: ordered collections of named fields.
//!
//! # Examples
//!
//! ```
//! use stratum::document::document::Document;
//!
//! let doc = Document::builder()
//!     .add_keyword("path", "docs/intro.txt")
//!     .add_text("title", "Introduction")
//!     .add_unstored("contents", "Segments are merged geometrically.")
//!     .build();
//!
//! assert_eq!(doc.len(), 3);
//! assert_eq!(doc.get("path"), Some("docs/intro.txt"));
//! ```

pub mod document;
pub mod field;
