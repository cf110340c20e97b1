//! Reader over several segments presented as one document id space.
//!
//! Segment `i` owns ids `starts[i]..starts[i + 1]`.

use std::sync::Arc;

use ahash::AHashMap;
use log::error;
use parking_lot::Mutex;

use crate::document::document::Document;
use crate::error::{Result, StratumError};
use crate::index::lock::DeleteLock;
use crate::index::merge_queue::{SegmentMergeInfo, SegmentMergeQueue};
use crate::index::postings::SegmentTermPositions;
use crate::index::reader::{IndexReader, TermEnum, TermPositions};
use crate::index::segment_reader::SegmentReader;
use crate::index::term::Term;
use crate::storage::Storage;

#[derive(Debug)]
pub struct MultiSegmentReader {
    readers: Vec<SegmentReader>,
    starts: Vec<u32>,
    max_doc: u32,
    num_docs_cache: Mutex<Option<u32>>,
    norms_cache: Mutex<AHashMap<String, Arc<[u8]>>>,
    delete_lock: DeleteLock,
    closed: bool,
}

impl MultiSegmentReader {
    pub fn new(readers: Vec<SegmentReader>) -> Self {
        let mut starts = Vec::with_capacity(readers.len() + 1);
        let mut max_doc = 0;
        for reader in &readers {
            starts.push(max_doc);
            max_doc += reader.max_doc();
        }
        starts.push(max_doc);

        MultiSegmentReader {
            readers,
            starts,
            max_doc,
            num_docs_cache: Mutex::new(None),
            norms_cache: Mutex::new(AHashMap::new()),
            delete_lock: DeleteLock::disabled(),
            closed: false,
        }
    }

    pub(crate) fn with_delete_lock(readers: Vec<SegmentReader>, storage: Arc<dyn Storage>) -> Self {
        let mut reader = Self::new(readers);
        reader.delete_lock = DeleteLock::new(storage);
        reader
    }

    pub fn readers(&self) -> &[SegmentReader] {
        &self.readers
    }

    /// Segment holding document `n`. Empty segments share their start with
    /// the following segment; the last segment with that start wins.
    fn reader_index(&self, n: u32) -> usize {
        self.starts[..self.readers.len()]
            .partition_point(|&start| start <= n)
            .saturating_sub(1)
    }

    fn locate(&self, n: u32) -> Result<(usize, u32)> {
        if n >= self.max_doc {
            return Err(StratumError::invalid_argument(format!(
                "document {n} out of range 0..{}",
                self.max_doc
            )));
        }
        let i = self.reader_index(n);
        Ok((i, n - self.starts[i]))
    }

    fn invalidate_caches(&self) {
        *self.num_docs_cache.lock() = None;
        self.norms_cache.lock().clear();
    }
}

impl IndexReader for MultiSegmentReader {
    fn max_doc(&self) -> u32 {
        self.max_doc
    }

    fn num_docs(&self) -> u32 {
        let mut cache = self.num_docs_cache.lock();
        *cache.get_or_insert_with(|| self.readers.iter().map(|r| r.num_docs()).sum())
    }

    fn document(&self, n: u32) -> Result<Document> {
        let (i, local) = self.locate(n)?;
        self.readers[i].document(local).map_err(|e| match e {
            StratumError::DeletedDocument(_) => StratumError::DeletedDocument(n),
            other => other,
        })
    }

    fn is_deleted(&self, n: u32) -> bool {
        self.locate(n)
            .is_ok_and(|(i, local)| self.readers[i].is_deleted(local))
    }

    fn has_deletions(&self) -> bool {
        self.readers.iter().any(|r| r.has_deletions())
    }

    fn delete(&mut self, n: u32) -> Result<()> {
        let (i, local) = self.locate(n)?;
        self.delete_lock.ensure()?;
        self.invalidate_caches();
        self.readers[i].delete(local)
    }

    fn terms(&self) -> Result<Box<dyn TermEnum>> {
        Ok(Box::new(MultiTermEnum::new(&self.readers, &self.starts, None)?))
    }

    fn terms_from(&self, term: &Term) -> Result<Box<dyn TermEnum>> {
        Ok(Box::new(MultiTermEnum::new(
            &self.readers,
            &self.starts,
            Some(term),
        )?))
    }

    fn doc_freq(&self, term: &Term) -> Result<u32> {
        let mut total = 0;
        for reader in &self.readers {
            total += reader.doc_freq(term)?;
        }
        Ok(total)
    }

    fn term_positions(&self, term: &Term) -> Result<Box<dyn TermPositions>> {
        let mut segments = Vec::with_capacity(self.readers.len());
        for (reader, &base) in self.readers.iter().zip(&self.starts) {
            if let Some(info) = reader.term_info(term)? {
                segments.push((base, reader.segment_term_positions(Some(&info))?));
            }
        }
        Ok(Box::new(MultiTermPositions {
            segments,
            current: 0,
        }))
    }

    fn norms(&self, field: &str) -> Result<Option<Arc<[u8]>>> {
        let mut cache = self.norms_cache.lock();
        if let Some(norms) = cache.get(field) {
            return Ok(Some(Arc::clone(norms)));
        }

        let mut found = false;
        let mut bytes = vec![0u8; self.max_doc as usize];
        for (reader, &start) in self.readers.iter().zip(&self.starts) {
            if let Some(norms) = reader.norms(field)? {
                let start = start as usize;
                bytes[start..start + norms.len()].copy_from_slice(&norms);
                found = true;
            }
        }
        if !found {
            return Ok(None);
        }

        let norms: Arc<[u8]> = bytes.into();
        cache.insert(field.to_string(), Arc::clone(&norms));
        Ok(Some(norms))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut result = Ok(());
        for reader in &mut self.readers {
            if let Err(e) = reader.close()
                && result.is_ok()
            {
                result = Err(e);
            }
        }
        result.and(self.delete_lock.release())
    }
}

impl Drop for MultiSegmentReader {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("failed to close multi-segment reader: {e}");
        }
    }
}

/// Union of the dictionaries of several segments, with summed frequencies.
#[derive(Debug)]
pub struct MultiTermEnum {
    queue: SegmentMergeQueue,
    term: Option<Term>,
    doc_freq: u32,
}

impl MultiTermEnum {
    fn new(readers: &[SegmentReader], starts: &[u32], from: Option<&Term>) -> Result<Self> {
        let mut queue = SegmentMergeQueue::new();
        for (i, (reader, &base)) in readers.iter().zip(starts).enumerate() {
            let term_enum = match from {
                Some(term) => reader.segment_terms_from(term)?,
                None => reader.segment_terms()?,
            };
            if let Some(info) = SegmentMergeInfo::new(base, i, term_enum)? {
                queue.push(info);
            }
        }

        let mut term_enum = MultiTermEnum {
            queue,
            term: None,
            doc_freq: 0,
        };
        if from.is_some() {
            term_enum.next()?;
        }
        Ok(term_enum)
    }
}

impl TermEnum for MultiTermEnum {
    fn next(&mut self) -> Result<bool> {
        let Some((term, matching)) = self.queue.pop_matching() else {
            self.term = None;
            self.doc_freq = 0;
            return Ok(false);
        };
        self.doc_freq = matching.iter().map(|m| m.term_enum.doc_freq()).sum();
        self.term = Some(term);
        self.queue.advance_and_requeue(matching)?;
        Ok(true)
    }

    fn term(&self) -> Option<&Term> {
        self.term.as_ref()
    }

    fn doc_freq(&self) -> u32 {
        self.doc_freq
    }
}

/// Postings of one term across segments, ids shifted by each segment's base.
#[derive(Debug)]
struct MultiTermPositions {
    segments: Vec<(u32, SegmentTermPositions)>,
    current: usize,
}

impl TermPositions for MultiTermPositions {
    fn next(&mut self) -> Result<bool> {
        while let Some((_, positions)) = self.segments.get_mut(self.current) {
            if positions.next()? {
                return Ok(true);
            }
            self.current += 1;
        }
        Ok(false)
    }

    fn doc(&self) -> u32 {
        self.segments
            .get(self.current)
            .map_or(0, |(base, positions)| base + positions.doc())
    }

    fn freq(&self) -> u32 {
        self.segments
            .get(self.current)
            .map_or(0, |(_, positions)| positions.freq())
    }

    fn next_position(&mut self) -> Result<u32> {
        match self.segments.get_mut(self.current) {
            Some((_, positions)) => positions.next_position(),
            None => Err(StratumError::invalid_operation("postings exhausted")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::StandardAnalyzer;
    use crate::index::document_writer::DocumentWriter;
    use crate::index::merger::SegmentMerger;
    use crate::index::segment_infos::SegmentInfo;
    use crate::storage::memory::MemoryStorage;

    fn segment(storage: &Arc<dyn Storage>, name: &str, id: &str, body: &str) -> SegmentInfo {
        let analyzer = StandardAnalyzer::new();
        let doc = Document::builder()
            .add_keyword("id", id)
            .add_text("body", body)
            .build();
        DocumentWriter::new(storage.as_ref(), &analyzer, 10_000)
            .add_document(name, &doc)
            .unwrap();
        SegmentInfo::new(name, 1, Arc::clone(storage))
    }

    /// A segment with no documents, made by merging a fully deleted one.
    fn empty_segment(storage: &Arc<dyn Storage>, name: &str) -> SegmentInfo {
        let source = segment(storage, "_tmp", "gone", "vanished words");
        let mut reader = SegmentReader::open(&source).unwrap();
        reader.delete(0).unwrap();

        let mut merger = SegmentMerger::new(Arc::clone(storage), name);
        merger.add(reader);
        assert_eq!(merger.merge().unwrap(), 0);
        SegmentInfo::new(name, 0, Arc::clone(storage))
    }

    fn open(infos: &[SegmentInfo]) -> MultiSegmentReader {
        MultiSegmentReader::new(infos.iter().map(|i| SegmentReader::open(i).unwrap()).collect())
    }

    #[test]
    fn test_document_id_space() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let infos = vec![
            segment(&storage, "_0", "a", "apple banana"),
            empty_segment(&storage, "_1"),
            segment(&storage, "_2", "b", "banana cherry"),
            segment(&storage, "_3", "c", "cherry apple apple"),
        ];
        let reader = open(&infos);

        assert_eq!(reader.max_doc(), 3);
        assert_eq!(reader.num_docs(), 3);
        assert_eq!(reader.starts, vec![0, 1, 1, 2, 3]);
        assert_eq!(reader.reader_index(0), 0);
        assert_eq!(reader.reader_index(1), 2);
        assert_eq!(reader.reader_index(2), 3);

        let ids: Vec<String> = (0..3)
            .map(|n| reader.document(n).unwrap().get("id").unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(reader.document(3).is_err());
    }

    #[test]
    fn test_terms_and_postings() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let infos = vec![
            segment(&storage, "_0", "a", "apple banana"),
            segment(&storage, "_1", "b", "banana cherry"),
            segment(&storage, "_2", "c", "cherry apple apple"),
        ];
        let reader = open(&infos);

        assert_eq!(reader.doc_freq(&Term::new("body", "apple")).unwrap(), 2);
        assert_eq!(reader.doc_freq(&Term::new("body", "durian")).unwrap(), 0);

        let mut terms = reader.terms().unwrap();
        let mut seen = Vec::new();
        while terms.next().unwrap() {
            let term = terms.term().unwrap();
            if term.field == "body" {
                seen.push((term.text.clone(), terms.doc_freq()));
            }
        }
        assert_eq!(
            seen,
            vec![
                ("apple".to_string(), 2),
                ("banana".to_string(), 2),
                ("cherry".to_string(), 2)
            ]
        );

        let terms = reader.terms_from(&Term::new("body", "b")).unwrap();
        assert_eq!(terms.term(), Some(&Term::new("body", "banana")));
        assert_eq!(terms.doc_freq(), 2);

        let mut tp = reader.term_positions(&Term::new("body", "apple")).unwrap();
        assert!(tp.next().unwrap());
        assert_eq!((tp.doc(), tp.freq()), (0, 1));
        assert!(tp.next().unwrap());
        assert_eq!((tp.doc(), tp.freq()), (2, 2));
        assert_eq!(tp.next_position().unwrap(), 1);
        assert_eq!(tp.next_position().unwrap(), 2);
        assert!(!tp.next().unwrap());
    }

    #[test]
    fn test_delete_invalidates_caches() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let infos = vec![
            segment(&storage, "_0", "a", "one"),
            segment(&storage, "_1", "b", "two words"),
        ];
        let mut reader = open(&infos);

        let norms = reader.norms("body").unwrap().unwrap();
        assert_eq!(norms.len(), 2);
        assert!(norms[0] > norms[1]);
        assert!(reader.norms("missing").unwrap().is_none());

        assert_eq!(reader.num_docs(), 2);
        reader.delete(1).unwrap();
        assert_eq!(reader.num_docs(), 1);
        assert!(reader.is_deleted(1));
        assert!(reader.has_deletions());
        assert!(matches!(
            reader.document(1),
            Err(StratumError::DeletedDocument(1))
        ));
        reader.close().unwrap();

        assert!(storage.file_exists("_1.del"));
        assert!(!storage.file_exists("_0.del"));
    }
}
