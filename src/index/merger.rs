//! Merging of several segments into one.
//!
//! The merged segment gets the union of the inputs' field tables, the live
//! documents of every input in order, the merged dictionary with remapped
//! postings, and norms filtered the same way as the documents. Document ids
//! are renumbered densely: input `i` starts at the number of live documents
//! in inputs `0..i`.

use std::sync::Arc;

use log::{debug, trace};

use crate::error::{Result, StratumError};
use crate::index::field_infos::FieldInfos;
use crate::index::fields::FieldsWriter;
use crate::index::merge_queue::{SegmentMergeInfo, SegmentMergeQueue};
use crate::index::norms::norm_file;
use crate::index::postings::PostingsWriter;
use crate::index::reader::{IndexReader, TermPositions};
use crate::index::segment_file;
use crate::index::segment_reader::SegmentReader;
use crate::index::term_infos::TermInfosWriter;
use crate::storage::Storage;
use crate::storage::structured::create_output;

#[derive(Debug)]
pub struct SegmentMerger {
    storage: Arc<dyn Storage>,
    segment: String,
    readers: Vec<SegmentReader>,
}

impl SegmentMerger {
    /// Prepare a merge into segment `segment` of `storage`.
    pub fn new<S: Into<String>>(storage: Arc<dyn Storage>, segment: S) -> Self {
        SegmentMerger {
            storage,
            segment: segment.into(),
            readers: Vec::new(),
        }
    }

    /// Queue `reader` as the next input.
    pub fn add(&mut self, reader: SegmentReader) {
        self.readers.push(reader);
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Write the merged segment and return its document count.
    ///
    /// The input readers are closed whether or not the merge succeeds.
    pub fn merge(mut self) -> Result<u32> {
        let merged = self.merge_segment();

        let mut closed = Ok(());
        for reader in &mut self.readers {
            if let Err(e) = reader.close()
                && closed.is_ok()
            {
                closed = Err(e);
            }
        }

        let doc_count = merged?;
        closed?;
        Ok(doc_count)
    }

    fn merge_segment(&self) -> Result<u32> {
        let field_infos = self.merge_fields()?;
        let doc_count = self.merge_documents(&field_infos)?;
        self.merge_terms(&field_infos)?;
        self.merge_norms(&field_infos)?;
        debug!(
            "merged {} segments into {} ({doc_count} docs)",
            self.readers.len(),
            self.segment
        );
        Ok(doc_count)
    }

    fn merge_fields(&self) -> Result<FieldInfos> {
        let mut field_infos = FieldInfos::new();
        for reader in &self.readers {
            field_infos.add_all(reader.field_infos());
        }
        field_infos.write(
            self.storage.as_ref(),
            &segment_file(&self.segment, "fnm"),
        )?;
        Ok(field_infos)
    }

    fn merge_documents(&self, field_infos: &FieldInfos) -> Result<u32> {
        let mut fields_writer = FieldsWriter::new(self.storage.as_ref(), &self.segment, field_infos)?;
        let mut doc_count = 0;
        for reader in &self.readers {
            for n in 0..reader.max_doc() {
                if !reader.is_deleted(n) {
                    fields_writer.add_document(&reader.document(n)?)?;
                    doc_count += 1;
                }
            }
        }
        fields_writer.close()?;
        Ok(doc_count)
    }

    fn merge_terms(&self, field_infos: &FieldInfos) -> Result<()> {
        let mut term_writer = TermInfosWriter::new(self.storage.as_ref(), &self.segment, field_infos)?;
        let mut postings_writer = PostingsWriter::new(self.storage.as_ref(), &self.segment)?;

        let mut queue = SegmentMergeQueue::new();
        let mut doc_maps = Vec::with_capacity(self.readers.len());
        let mut base = 0;
        for (i, reader) in self.readers.iter().enumerate() {
            if let Some(info) = SegmentMergeInfo::new(base, i, reader.segment_terms()?)? {
                queue.push(info);
            }
            doc_maps.push(doc_map(reader));
            base += reader.num_docs();
        }

        let mut term_count = 0u64;
        while let Some((term, matching)) = queue.pop_matching() {
            postings_writer.start_term();
            for info in &matching {
                let reader = &self.readers[info.index];
                let doc_map = doc_maps[info.index].as_deref();
                let mut positions =
                    reader.segment_term_positions(Some(info.term_enum.term_info()))?;
                while positions.next()? {
                    let local = positions.doc();
                    let mapped = match doc_map {
                        Some(map) => map.get(local as usize).copied().ok_or_else(|| {
                            StratumError::corruption(format!(
                                "posting for doc {local} beyond segment {}",
                                reader.segment_name()
                            ))
                        })?,
                        None => local,
                    };
                    postings_writer.add(info.base + mapped, &positions.positions()?)?;
                }
            }

            let term_info = postings_writer.finish_term();
            if term_info.doc_freq > 0 {
                term_writer.add(&term, &term_info)?;
                term_count += 1;
            }
            queue.advance_and_requeue(matching)?;
        }
        trace!("segment {}: {term_count} merged terms", self.segment);

        term_writer.close()?;
        postings_writer.close()
    }

    fn merge_norms(&self, field_infos: &FieldInfos) -> Result<()> {
        for fi in field_infos.indexed_fields() {
            let mut output = create_output(
                self.storage.as_ref(),
                &norm_file(&self.segment, fi.number),
            )?;
            for reader in &self.readers {
                let norms = reader.norms(&fi.name)?;
                for n in 0..reader.max_doc() {
                    if !reader.is_deleted(n) {
                        let norm = norms.as_ref().and_then(|b| b.get(n as usize)).copied();
                        output.write_u8(norm.unwrap_or(0))?;
                    }
                }
            }
            output.close()?;
        }
        Ok(())
    }
}

/// For a segment with deletions, the new id of every document relative to the
/// segment's base: the number of live documents before it.
fn doc_map(reader: &SegmentReader) -> Option<Vec<u32>> {
    if !reader.has_deletions() {
        return None;
    }
    let mut map = Vec::with_capacity(reader.max_doc() as usize);
    let mut next = 0;
    for n in 0..reader.max_doc() {
        map.push(next);
        if !reader.is_deleted(n) {
            next += 1;
        }
    }
    Some(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::StandardAnalyzer;
    use crate::document::document::Document;
    use crate::index::document_writer::DocumentWriter;
    use crate::index::segment_infos::SegmentInfo;
    use crate::index::term::Term;
    use crate::storage::memory::MemoryStorage;

    fn write_segments(storage: &Arc<dyn Storage>, texts: &[&str]) -> Vec<SegmentInfo> {
        let analyzer = StandardAnalyzer::new();
        let writer = DocumentWriter::new(storage.as_ref(), &analyzer, 10_000);
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let name = format!("_{i}");
                let doc = Document::builder()
                    .add_keyword("id", i.to_string())
                    .add_text("body", *text)
                    .build();
                writer.add_document(&name, &doc).unwrap();
                SegmentInfo::new(name, 1, Arc::clone(storage))
            })
            .collect()
    }

    fn merge(storage: &Arc<dyn Storage>, infos: &[SegmentInfo], name: &str) -> u32 {
        let mut merger = SegmentMerger::new(Arc::clone(storage), name);
        for info in infos {
            merger.add(SegmentReader::open(info).unwrap());
        }
        merger.merge().unwrap()
    }

    #[test]
    fn test_merge_single_document_segments() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let infos = write_segments(&storage, &["red apple", "green apple", "red pepper"]);

        assert_eq!(merge(&storage, &infos, "_m"), 3);

        let reader = SegmentReader::open(&SegmentInfo::new("_m", 3, Arc::clone(&storage))).unwrap();
        assert_eq!(reader.max_doc(), 3);
        assert_eq!(reader.doc_freq(&Term::new("body", "apple")).unwrap(), 2);
        assert_eq!(reader.doc_freq(&Term::new("body", "red")).unwrap(), 2);
        assert_eq!(reader.document(2).unwrap().get("id"), Some("2"));

        let mut tp = reader.term_positions(&Term::new("body", "red")).unwrap();
        assert!(tp.next().unwrap());
        assert_eq!(tp.doc(), 0);
        assert!(tp.next().unwrap());
        assert_eq!(tp.doc(), 2);
        assert_eq!(tp.next_position().unwrap(), 0);
        assert!(!tp.next().unwrap());

        assert_eq!(reader.norms("body").unwrap().unwrap().len(), 3);

        let mut terms = reader.segment_terms().unwrap();
        let mut previous: Option<Term> = None;
        while terms.next().unwrap() {
            let term = terms.term().unwrap().clone();
            if let Some(previous) = &previous {
                assert!(previous < &term);
            }
            previous = Some(term);
        }
    }

    #[test]
    fn test_merge_drops_deleted_documents() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let infos = write_segments(&storage, &["one", "two", "three"]);
        let first = merge(&storage, &infos, "_a");
        assert_eq!(first, 3);

        let merged = SegmentInfo::new("_a", 3, Arc::clone(&storage));
        let mut reader = SegmentReader::open(&merged).unwrap();
        reader.delete(1).unwrap();
        reader.close().unwrap();

        let extra = write_segments(&storage, &["four"]);
        let renamed = SegmentInfo::new("_0", 1, Arc::clone(&storage));
        assert_eq!(extra[0].name, renamed.name);

        assert_eq!(merge(&storage, &[merged, renamed], "_b"), 3);

        let reader = SegmentReader::open(&SegmentInfo::new("_b", 3, Arc::clone(&storage))).unwrap();
        assert!(!reader.has_deletions());
        let ids: Vec<String> = (0..reader.max_doc())
            .map(|n| reader.document(n).unwrap().get("id").unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["0", "2", "0"]);
        assert_eq!(reader.doc_freq(&Term::new("body", "two")).unwrap(), 0);
        assert_eq!(reader.doc_freq(&Term::new("body", "three")).unwrap(), 1);

        let mut tp = reader.term_positions(&Term::new("body", "four")).unwrap();
        assert!(tp.next().unwrap());
        assert_eq!(tp.doc(), 2);
    }

    #[test]
    fn test_doc_map() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
        let infos = write_segments(&storage, &["a b", "c d", "e f", "g h"]);
        merge(&storage, &infos, "_x");

        let mut reader = SegmentReader::open(&SegmentInfo::new("_x", 4, Arc::clone(&storage))).unwrap();
        assert!(doc_map(&reader).is_none());
        reader.delete(0).unwrap();
        reader.delete(2).unwrap();
        assert_eq!(doc_map(&reader), Some(vec![0, 0, 1, 1]));
    }
}
