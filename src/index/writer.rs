//! Index writer: document ingestion, incremental merging and optimization.
//!
//! Every added document becomes a one-document segment in an in-memory
//! buffer store. After each addition the [`LogMergePolicy`] folds runs of
//! small segments into larger ones in the durable store. Obsolete segment
//! files are deleted after each merge commit; deletions that fail are
//! recorded in the `deletable` file and retried on the next pass.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use stratum::analysis::analyzer::StandardAnalyzer;
//! use stratum::document::document::Document;
//! use stratum::index::writer::{IndexWriter, IndexWriterConfig};
//! use stratum::storage::Storage;
//! use stratum::storage::memory::MemoryStorage;
//!
//! # fn main() -> stratum::error::Result<()> {
//! let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new_default());
//! let config = IndexWriterConfig { create: true, ..Default::default() };
//! let mut writer = IndexWriter::new(storage, Arc::new(StandardAnalyzer::new()), config)?;
//!
//! writer.add_document(&Document::builder().add_text("body", "hello world").build())?;
//! writer.optimize()?;
//! assert_eq!(writer.segment_count(), 1);
//! writer.close()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::analyzer::Analyzer;
use crate::document::document::Document;
use crate::error::{Result, StratumError};
use crate::index::document_writer::DocumentWriter;
use crate::index::lock::{acquire_write_lock, with_commit_lock};
use crate::index::merge_policy::{LogMergePolicy, SegmentSummary};
use crate::index::merger::SegmentMerger;
use crate::index::segment_infos::{SegmentInfo, SegmentInfos};
use crate::index::segment_reader::SegmentReader;
use crate::storage::memory::MemoryStorage;
use crate::storage::structured::{create_output, open_input};
use crate::storage::{Storage, StorageLock, same_storage};

const DELETABLE_FILE: &str = "deletable";
const DELETABLE_TMP_FILE: &str = "deletable.new";

/// Configuration for [`IndexWriter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexWriterConfig {
    /// Number of same-level segments folded by one merge. At least 2.
    pub merge_factor: u32,

    /// Largest segment the incremental merges build. Optimize ignores it.
    pub max_merge_docs: u32,

    /// Maximum number of tokens indexed per field name of a document.
    pub max_field_length: usize,

    /// Start a new, empty index instead of opening the existing one.
    pub create: bool,
}

impl Default for IndexWriterConfig {
    fn default() -> Self {
        IndexWriterConfig {
            merge_factor: 10,
            max_merge_docs: i32::MAX as u32,
            max_field_length: 10_000,
            create: false,
        }
    }
}

impl IndexWriterConfig {
    /// Parse a configuration from JSON. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: IndexWriterConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.merge_factor < 2 {
            return Err(StratumError::invalid_config(format!(
                "merge_factor must be at least 2, got {}",
                self.merge_factor
            )));
        }
        if self.max_field_length == 0 {
            return Err(StratumError::invalid_config(
                "max_field_length must be positive",
            ));
        }
        Ok(())
    }

    fn merge_policy(&self) -> LogMergePolicy {
        LogMergePolicy::new(self.merge_factor, self.max_merge_docs)
    }
}

/// Files of merged-away segments, grouped by the store holding them.
type ObsoleteFiles = Vec<(Arc<dyn Storage>, Vec<String>)>;

/// Single writer of an index.
///
/// Holds the store's write lock from construction until [`close`] (or drop).
///
/// [`close`]: IndexWriter::close
#[derive(Debug)]
pub struct IndexWriter {
    storage: Arc<dyn Storage>,
    ram_storage: Arc<dyn Storage>,
    analyzer: Arc<dyn Analyzer>,
    config: IndexWriterConfig,
    merge_policy: LogMergePolicy,
    segment_infos: SegmentInfos,
    write_lock: Option<Box<dyn StorageLock>>,
}

impl IndexWriter {
    /// Open a writer on `storage`.
    ///
    /// Fails with [`StratumError::IndexLocked`] if another writer is open.
    pub fn new(
        storage: Arc<dyn Storage>,
        analyzer: Arc<dyn Analyzer>,
        config: IndexWriterConfig,
    ) -> Result<Self> {
        config.validate()?;
        let write_lock = acquire_write_lock(storage.as_ref())?;

        let segment_infos = with_commit_lock(storage.as_ref(), || {
            if config.create {
                let infos = SegmentInfos::new();
                infos.write(storage.as_ref())?;
                Ok(infos)
            } else {
                SegmentInfos::read(Arc::clone(&storage))
            }
        })?;
        info!(
            "opened index writer ({} segments, {} docs)",
            segment_infos.len(),
            segment_infos.doc_count()
        );

        Ok(IndexWriter {
            storage,
            ram_storage: Arc::new(MemoryStorage::new_default()),
            analyzer,
            merge_policy: config.merge_policy(),
            config,
            segment_infos,
            write_lock: Some(write_lock),
        })
    }

    pub fn config(&self) -> &IndexWriterConfig {
        &self.config
    }

    pub fn segment_infos(&self) -> &SegmentInfos {
        &self.segment_infos
    }

    pub fn segment_count(&self) -> usize {
        self.segment_infos.len()
    }

    /// Total documents over all segments, including buffered ones. Deletions
    /// are counted until a merge drops them.
    pub fn doc_count(&self) -> u64 {
        self.segment_infos.doc_count()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.write_lock.is_none() {
            return Err(StratumError::invalid_operation("index writer is closed"));
        }
        Ok(())
    }

    /// Index `doc` into a new buffered segment, then merge if a size level
    /// is full.
    pub fn add_document(&mut self, doc: &Document) -> Result<()> {
        self.ensure_open()?;

        let name = self.segment_infos.next_segment_name();
        DocumentWriter::new(
            self.ram_storage.as_ref(),
            self.analyzer.as_ref(),
            self.config.max_field_length,
        )
        .add_document(&name, doc)?;
        debug!("buffered document as segment {name}");

        self.segment_infos
            .add(SegmentInfo::new(name, 1, Arc::clone(&self.ram_storage)));
        self.maybe_merge_segments()
    }

    /// Merge everything into a single durable segment without deletions.
    pub fn optimize(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.flush_ram_segments()?;

        while self.needs_optimize() {
            let min = self.merge_policy.select_optimize(self.segment_infos.len());
            self.merge_segments(min)?;
        }
        info!("optimized index into {} segment(s)", self.segment_infos.len());
        Ok(())
    }

    fn needs_optimize(&self) -> bool {
        match self.segment_infos.len() {
            0 => false,
            1 => self.segment_infos.info(0).is_some_and(|info| {
                SegmentReader::has_deletions_in(info)
                    || !same_storage(&info.storage, &self.storage)
            }),
            _ => true,
        }
    }

    /// Merge the indexes in `stores` into this one. The result is optimized.
    ///
    /// Documents deleted in a source index are not carried over. Source
    /// stores are only read.
    pub fn add_indexes(&mut self, stores: &[Arc<dyn Storage>]) -> Result<()> {
        self.optimize()?;
        for store in stores {
            let infos = with_commit_lock(store.as_ref(), || SegmentInfos::read(Arc::clone(store)))?;
            info!("adding {} segments from {store:?}", infos.len());
            for info in infos.iter() {
                self.segment_infos.add(info.clone());
            }
        }
        self.optimize()
    }

    /// Merge buffered segments into the durable store.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.flush_ram_segments()
    }

    /// Flush buffered segments and release the write lock.
    ///
    /// The durable store is closed when this writer holds the last
    /// reference to it.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut write_lock) = self.write_lock.take() else {
            return Ok(());
        };

        let flushed = self.flush_ram_segments();
        let ram_closed = self.ram_storage.close();
        let released = write_lock.release();
        flushed?;
        ram_closed?;
        released?;

        if !self.storage_shared() {
            self.storage.close()?;
        }
        info!("closed index writer ({} docs)", self.doc_count());
        Ok(())
    }

    /// Whether anything besides this writer and its segment list holds the
    /// durable store.
    fn storage_shared(&self) -> bool {
        let own = 1 + self
            .segment_infos
            .iter()
            .filter(|info| same_storage(&info.storage, &self.storage))
            .count();
        Arc::strong_count(&self.storage) > own
    }

    fn summaries(&self) -> Vec<SegmentSummary> {
        self.segment_infos
            .iter()
            .map(|info| SegmentSummary {
                doc_count: info.doc_count,
                buffered: same_storage(&info.storage, &self.ram_storage),
            })
            .collect()
    }

    fn flush_ram_segments(&mut self) -> Result<()> {
        match self.merge_policy.select_flush(&self.summaries()) {
            Some(min) => self.merge_segments(min),
            None => Ok(()),
        }
    }

    fn maybe_merge_segments(&mut self) -> Result<()> {
        for target in self.merge_policy.targets() {
            match self.merge_policy.select_level_merge(&self.summaries(), target) {
                Some(min) => self.merge_segments(min)?,
                None => break,
            }
        }
        Ok(())
    }

    /// Replace segments `min..` with one merged durable segment.
    fn merge_segments(&mut self, min: usize) -> Result<()> {
        let merged_name = self.segment_infos.next_segment_name();
        let mut merger = SegmentMerger::new(Arc::clone(&self.storage), merged_name.clone());
        let mut obsolete: ObsoleteFiles = Vec::new();

        let sources: Vec<&str> = self
            .segment_infos
            .iter()
            .skip(min)
            .map(|info| info.name.as_str())
            .collect();
        info!("merging segments {sources:?} into {merged_name}");

        for info in self.segment_infos.iter().skip(min) {
            let reader = SegmentReader::open(info)?;
            if same_storage(&info.storage, &self.storage)
                || same_storage(&info.storage, &self.ram_storage)
            {
                obsolete.push((Arc::clone(&info.storage), reader.files()));
            }
            merger.add(reader);
        }

        let doc_count = match merger.merge() {
            Ok(doc_count) => doc_count,
            Err(e) => {
                self.remove_partial_segment(&merged_name);
                return Err(e);
            }
        };

        let mut new_infos = self.segment_infos.clone();
        new_infos.truncate(min);
        new_infos.add(SegmentInfo::new(
            merged_name.clone(),
            doc_count,
            Arc::clone(&self.storage),
        ));

        let cleanup = with_commit_lock(self.storage.as_ref(), || {
            new_infos.write(self.storage.as_ref())?;
            Ok(self.delete_segments(&obsolete))
        });
        let cleanup = match cleanup {
            Ok(cleanup) => cleanup,
            Err(e) => {
                self.remove_partial_segment(&merged_name);
                return Err(e);
            }
        };

        self.segment_infos = new_infos;
        debug!("merged segment {merged_name} has {doc_count} docs");
        cleanup
    }

    /// Best-effort removal of a merged segment that was never committed.
    fn remove_partial_segment(&self, name: &str) {
        let prefix = format!("{name}.");
        let files = match self.storage.list_files() {
            Ok(files) => files,
            Err(e) => {
                warn!("cannot list files to clean up segment {name}: {e}");
                return;
            }
        };
        for file in files.iter().filter(|f| f.starts_with(&prefix)) {
            if let Err(e) = self.storage.delete_file(file) {
                warn!("cannot remove partial file {file}: {e}");
            }
        }
    }

    /// Delete the files of merged-away segments, retrying earlier failures
    /// first. Must run under the commit lock.
    fn delete_segments(&self, obsolete: &ObsoleteFiles) -> Result<()> {
        let mut deletable = Vec::new();

        let pending = self.read_deletable_files()?;
        if !pending.is_empty() {
            debug!("retrying deletion of {} files", pending.len());
        }
        self.delete_files(&pending, &mut deletable);

        for (storage, files) in obsolete {
            if same_storage(storage, &self.storage) {
                self.delete_files(files, &mut deletable);
            } else {
                for file in files {
                    if let Err(e) = storage.delete_file(file) {
                        debug!("cannot delete buffered file {file}: {e}");
                    }
                }
            }
        }

        self.write_deletable_files(&deletable)
    }

    fn delete_files(&self, files: &[String], deletable: &mut Vec<String>) {
        for file in files {
            if let Err(e) = self.storage.delete_file(file)
                && self.storage.file_exists(file)
            {
                warn!("deferring deletion of {file}: {e}");
                deletable.push(file.clone());
            }
        }
    }

    fn read_deletable_files(&self) -> Result<Vec<String>> {
        if !self.storage.file_exists(DELETABLE_FILE) {
            return Ok(Vec::new());
        }

        let mut input = open_input(self.storage.as_ref(), DELETABLE_FILE)?;
        let count = input.read_i32()?;
        if count < 0 {
            return Err(StratumError::corruption(format!(
                "{DELETABLE_FILE}: negative file count {count}"
            )));
        }
        (0..count).map(|_| input.read_string()).collect()
    }

    fn write_deletable_files(&self, files: &[String]) -> Result<()> {
        let mut output = create_output(self.storage.as_ref(), DELETABLE_TMP_FILE)?;
        output.write_i32(files.len() as i32)?;
        for file in files {
            output.write_string(file)?;
        }
        output.close()?;
        self.storage.rename_file(DELETABLE_TMP_FILE, DELETABLE_FILE)
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        if let Some(mut write_lock) = self.write_lock.take() {
            warn!("index writer dropped without close; buffered documents are lost");
            if let Err(e) = write_lock.release() {
                warn!("failed to release write lock: {e}");
            }
        }
    }
}
