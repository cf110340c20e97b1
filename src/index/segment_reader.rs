//! Reader over a single segment.

use std::sync::Arc;

use ahash::AHashMap;
use log::{debug, error};
use parking_lot::Mutex;

use crate::document::document::Document;
use crate::error::{Result, StratumError};
use crate::index::field_infos::FieldInfos;
use crate::index::fields::FieldsReader;
use crate::index::lock::{DeleteLock, with_commit_lock};
use crate::index::norms::norm_file;
use crate::index::postings::SegmentTermPositions;
use crate::index::reader::{IndexReader, TermEnum, TermPositions};
use crate::index::segment_file;
use crate::index::segment_infos::SegmentInfo;
use crate::index::term::{Term, TermInfo};
use crate::index::term_infos::{SegmentTermEnum, TermInfosReader};
use crate::storage::Storage;
use crate::storage::structured::{IndexInput, open_input};
use crate::util::bit_vector::BitVector;

/// Read view of one segment's documents, dictionary, postings and norms.
///
/// Deletions are buffered in memory and written to `<segment>.del` on close.
#[derive(Debug)]
pub struct SegmentReader {
    segment: String,
    storage: Arc<dyn Storage>,
    field_infos: Arc<FieldInfos>,
    fields_reader: Mutex<FieldsReader>,
    term_infos: TermInfosReader,
    deleted_docs: Option<Arc<BitVector>>,
    deleted_docs_dirty: bool,
    freq_stream: IndexInput,
    prox_stream: IndexInput,
    norm_inputs: AHashMap<String, IndexInput>,
    norms_cache: Mutex<AHashMap<String, Arc<[u8]>>>,
    delete_lock: DeleteLock,
    closed: bool,
}

impl SegmentReader {
    pub fn open(info: &SegmentInfo) -> Result<Self> {
        let storage = Arc::clone(&info.storage);
        let segment = info.name.clone();

        let field_infos = Arc::new(FieldInfos::read(
            storage.as_ref(),
            &segment_file(&segment, "fnm"),
        )?);
        let fields_reader = FieldsReader::open(storage.as_ref(), &segment)?;
        let term_infos = TermInfosReader::open(storage.as_ref(), &segment, Arc::clone(&field_infos))?;

        let deleted_docs = if Self::has_deletions_in(info) {
            let deleted = BitVector::read(storage.as_ref(), &segment_file(&segment, "del"))?;
            let max_doc = fields_reader.size() as usize;
            if deleted.size() != max_doc {
                return Err(StratumError::corruption(format!(
                    "segment {segment}: deletion bitmap covers {} docs, segment has {max_doc}",
                    deleted.size()
                )));
            }
            Some(Arc::new(deleted))
        } else {
            None
        };

        let freq_stream = open_input(storage.as_ref(), &segment_file(&segment, "frq"))?;
        let prox_stream = open_input(storage.as_ref(), &segment_file(&segment, "prx"))?;

        let mut norm_inputs = AHashMap::new();
        for fi in field_infos.indexed_fields() {
            let input = open_input(storage.as_ref(), &norm_file(&segment, fi.number))?;
            norm_inputs.insert(fi.name.clone(), input);
        }

        debug!(
            "opened segment {segment} ({} docs, {} terms)",
            fields_reader.size(),
            term_infos.size()
        );

        Ok(SegmentReader {
            segment,
            storage,
            field_infos,
            fields_reader: Mutex::new(fields_reader),
            term_infos,
            deleted_docs,
            deleted_docs_dirty: false,
            freq_stream,
            prox_stream,
            norm_inputs,
            norms_cache: Mutex::new(AHashMap::new()),
            delete_lock: DeleteLock::disabled(),
            closed: false,
        })
    }

    /// Take the store's write lock on the first delete through this reader.
    pub(crate) fn with_delete_lock(mut self, storage: Arc<dyn Storage>) -> Self {
        self.delete_lock = DeleteLock::new(storage);
        self
    }

    /// Whether the segment has a committed deletion file.
    pub fn has_deletions_in(info: &SegmentInfo) -> bool {
        info.storage.file_exists(&segment_file(&info.name, "del"))
    }

    pub fn segment_name(&self) -> &str {
        &self.segment
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn field_infos(&self) -> &FieldInfos {
        &self.field_infos
    }

    pub fn deleted_docs(&self) -> Option<&Arc<BitVector>> {
        self.deleted_docs.as_ref()
    }

    /// Every file backing this segment in its store.
    pub fn files(&self) -> Vec<String> {
        let mut files: Vec<String> = ["fnm", "fdx", "fdt", "tii", "tis", "frq", "prx"]
            .iter()
            .map(|ext| segment_file(&self.segment, ext))
            .collect();

        let del = segment_file(&self.segment, "del");
        if self.storage.file_exists(&del) {
            files.push(del);
        }

        files.extend(
            self.field_infos
                .indexed_fields()
                .map(|fi| norm_file(&self.segment, fi.number)),
        );
        files
    }

    /// Dictionary cursor positioned before the first term.
    pub fn segment_terms(&self) -> Result<SegmentTermEnum> {
        self.term_infos.terms()
    }

    /// Dictionary cursor positioned on the first term `>= term`.
    pub fn segment_terms_from(&self, term: &Term) -> Result<SegmentTermEnum> {
        self.term_infos.terms_from(term)
    }

    /// Dictionary entry of `term`, if the segment contains it.
    pub fn term_info(&self, term: &Term) -> Result<Option<TermInfo>> {
        self.term_infos.get(term)
    }

    /// Postings cursor for a dictionary entry of this segment.
    pub fn segment_term_positions(&self, info: Option<&TermInfo>) -> Result<SegmentTermPositions> {
        SegmentTermPositions::new(
            self.freq_stream.try_clone()?,
            self.prox_stream.try_clone()?,
            info,
            self.deleted_docs.clone(),
        )
    }

    fn commit_deletions(&mut self) -> Result<()> {
        let Some(deleted_docs) = self.deleted_docs.as_ref().filter(|_| self.deleted_docs_dirty)
        else {
            return Ok(());
        };

        let storage = self.storage.as_ref();
        let tmp = segment_file(&self.segment, "tmp");
        let del = segment_file(&self.segment, "del");
        with_commit_lock(storage, || {
            deleted_docs.write(storage, &tmp)?;
            storage.rename_file(&tmp, &del)
        })?;

        debug!(
            "committed {} deletions for segment {}",
            deleted_docs.count(),
            self.segment
        );
        self.deleted_docs_dirty = false;
        Ok(())
    }
}

impl IndexReader for SegmentReader {
    fn max_doc(&self) -> u32 {
        self.fields_reader.lock().size()
    }

    fn num_docs(&self) -> u32 {
        let deleted = self.deleted_docs.as_ref().map_or(0, |d| d.count() as u32);
        self.max_doc() - deleted
    }

    fn document(&self, n: u32) -> Result<Document> {
        if self.is_deleted(n) {
            return Err(StratumError::DeletedDocument(n));
        }
        self.fields_reader.lock().doc(n, &self.field_infos)
    }

    fn is_deleted(&self, n: u32) -> bool {
        self.deleted_docs
            .as_ref()
            .is_some_and(|d| d.get(n as usize))
    }

    fn has_deletions(&self) -> bool {
        self.deleted_docs.is_some()
    }

    fn delete(&mut self, n: u32) -> Result<()> {
        let max_doc = self.max_doc();
        if n >= max_doc {
            return Err(StratumError::invalid_argument(format!(
                "document {n} out of range 0..{max_doc}"
            )));
        }
        self.delete_lock.ensure()?;

        let deleted_docs = self
            .deleted_docs
            .get_or_insert_with(|| Arc::new(BitVector::new(max_doc as usize)));
        Arc::make_mut(deleted_docs).set(n as usize);
        self.deleted_docs_dirty = true;
        Ok(())
    }

    fn terms(&self) -> Result<Box<dyn TermEnum>> {
        Ok(Box::new(self.segment_terms()?))
    }

    fn terms_from(&self, term: &Term) -> Result<Box<dyn TermEnum>> {
        Ok(Box::new(self.segment_terms_from(term)?))
    }

    fn doc_freq(&self, term: &Term) -> Result<u32> {
        Ok(self.term_info(term)?.map_or(0, |ti| ti.doc_freq))
    }

    fn term_positions(&self, term: &Term) -> Result<Box<dyn TermPositions>> {
        let info = self.term_info(term)?;
        Ok(Box::new(self.segment_term_positions(info.as_ref())?))
    }

    fn norms(&self, field: &str) -> Result<Option<Arc<[u8]>>> {
        let mut cache = self.norms_cache.lock();
        if let Some(norms) = cache.get(field) {
            return Ok(Some(Arc::clone(norms)));
        }

        let Some(input) = self.norm_inputs.get(field) else {
            return Ok(None);
        };
        let mut input = input.try_clone()?;
        input.seek(0)?;
        let norms: Arc<[u8]> = input.read_raw(self.max_doc() as usize)?.into();
        cache.insert(field.to_string(), Arc::clone(&norms));
        Ok(Some(norms))
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let committed = self.commit_deletions();
        let released = if self.delete_lock.is_enabled() {
            self.delete_lock.release()
        } else {
            Ok(())
        };
        self.closed = true;
        committed.and(released)
    }
}

impl Drop for SegmentReader {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("failed to close segment {}: {e}", self.segment);
        }
    }
}
