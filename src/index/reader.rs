//! Read access to an index.
//!
//! [`IndexReader`] is implemented by [`SegmentReader`] (one segment) and
//! [`MultiSegmentReader`] (several segments behind one document id space).
//! [`open_reader`] picks the right one for the current segment list.

use std::fmt::Debug;
use std::sync::Arc;

use log::debug;

use crate::document::document::Document;
use crate::error::Result;
use crate::index::lock::with_commit_lock;
use crate::index::multi_reader::MultiSegmentReader;
use crate::index::segment_infos::SegmentInfos;
use crate::index::segment_reader::SegmentReader;
use crate::index::term::Term;
use crate::storage::Storage;

/// Cursor over terms in ascending order.
pub trait TermEnum: Send + Debug {
    /// Advance to the next term. Returns `false` when exhausted.
    fn next(&mut self) -> Result<bool>;

    /// The current term, or `None` before the first `next` and after the end.
    fn term(&self) -> Option<&Term>;

    /// Number of documents containing the current term, deleted ones included.
    fn doc_freq(&self) -> u32;
}

/// Cursor over the live documents containing one term, with positions.
pub trait TermPositions: Send + Debug {
    /// Advance to the next live document. Returns `false` when exhausted.
    fn next(&mut self) -> Result<bool>;

    /// Current document id.
    fn doc(&self) -> u32;

    /// Occurrences of the term in the current document.
    fn freq(&self) -> u32;

    /// Next position of the term in the current document. May be called at
    /// most `freq()` times per document.
    fn next_position(&mut self) -> Result<u32>;
}

/// Read (and delete) access to the documents of an index.
pub trait IndexReader: Send + Debug {
    /// One greater than the largest document id.
    fn max_doc(&self) -> u32;

    /// Number of documents that are not deleted.
    fn num_docs(&self) -> u32;

    /// Stored fields of document `n`. Fails if the document is deleted.
    fn document(&self, n: u32) -> Result<Document>;

    fn is_deleted(&self, n: u32) -> bool;

    fn has_deletions(&self) -> bool;

    /// Mark document `n` deleted. Persisted on close.
    fn delete(&mut self, n: u32) -> Result<()>;

    /// All terms, positioned before the first one.
    fn terms(&self) -> Result<Box<dyn TermEnum>>;

    /// Terms positioned on the first term `>= term`.
    fn terms_from(&self, term: &Term) -> Result<Box<dyn TermEnum>>;

    /// Number of documents containing `term`, deleted ones included.
    fn doc_freq(&self, term: &Term) -> Result<u32>;

    fn term_positions(&self, term: &Term) -> Result<Box<dyn TermPositions>>;

    /// Norm bytes of `field`, one per document, or `None` if the field is not
    /// indexed anywhere in this reader.
    fn norms(&self, field: &str) -> Result<Option<Arc<[u8]>>>;

    /// Commit pending deletions and release resources.
    fn close(&mut self) -> Result<()>;
}

/// Open a reader over the current segments of `storage`.
///
/// The returned reader takes the store's write lock on its first delete.
pub fn open_reader(storage: Arc<dyn Storage>) -> Result<Box<dyn IndexReader>> {
    let lock_storage = Arc::clone(&storage);
    with_commit_lock(lock_storage.as_ref(), || {
        let infos = SegmentInfos::read(Arc::clone(&storage))?;
        debug!("opening reader over {} segments", infos.len());

        if infos.len() == 1
            && let Some(info) = infos.info(0)
        {
            let reader = SegmentReader::open(info)?.with_delete_lock(Arc::clone(&storage));
            return Ok(Box::new(reader) as Box<dyn IndexReader>);
        }

        let readers = infos
            .iter()
            .map(SegmentReader::open)
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(MultiSegmentReader::with_delete_lock(readers, storage)) as Box<dyn IndexReader>)
    })
}
