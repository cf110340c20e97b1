//! The segment list of an index (`segments` file).
//!
//! Layout: `i32` name counter, `i32` segment count, then per segment its name
//! as a string and its document count as an `i32`. The file is always
//! written as `segments.new` and renamed over `segments`.

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use crate::error::{Result, StratumError};
use crate::storage::Storage;
use crate::storage::structured::{create_output, open_input};

pub const SEGMENTS_FILE: &str = "segments";
const SEGMENTS_TMP_FILE: &str = "segments.new";

/// One segment: its name, document count and the store holding its files.
#[derive(Clone)]
pub struct SegmentInfo {
    pub name: String,
    pub doc_count: u32,
    pub storage: Arc<dyn Storage>,
}

impl SegmentInfo {
    pub fn new<S: Into<String>>(name: S, doc_count: u32, storage: Arc<dyn Storage>) -> Self {
        SegmentInfo {
            name: name.into(),
            doc_count,
            storage,
        }
    }
}

impl fmt::Debug for SegmentInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegmentInfo")
            .field("name", &self.name)
            .field("doc_count", &self.doc_count)
            .finish()
    }
}

/// Ordered segment list plus the generator for new segment names.
#[derive(Debug, Clone, Default)]
pub struct SegmentInfos {
    counter: u32,
    segments: Vec<SegmentInfo>,
}

impl SegmentInfos {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh segment name, `_<counter in hex>`.
    pub fn next_segment_name(&mut self) -> String {
        let name = format!("_{:x}", self.counter);
        self.counter += 1;
        name
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn add(&mut self, info: SegmentInfo) {
        self.segments.push(info);
    }

    pub fn info(&self, i: usize) -> Option<&SegmentInfo> {
        self.segments.get(i)
    }

    pub fn find(&self, name: &str) -> Option<&SegmentInfo> {
        self.segments.iter().find(|s| s.name == name)
    }

    /// Remove the segments in `range`, returning them.
    pub fn remove_range(&mut self, range: Range<usize>) -> Vec<SegmentInfo> {
        self.segments.drain(range).collect()
    }

    /// Keep the first `len` segments.
    pub fn truncate(&mut self, len: usize) {
        self.segments.truncate(len);
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SegmentInfo> {
        self.segments.iter()
    }

    /// Sum of the published document counts.
    pub fn doc_count(&self) -> u64 {
        self.segments.iter().map(|s| s.doc_count as u64).sum()
    }

    /// Read the segment list of `storage`. Every segment is owned by it.
    pub fn read(storage: Arc<dyn Storage>) -> Result<Self> {
        if !storage.file_exists(SEGMENTS_FILE) {
            return Err(StratumError::index(format!(
                "no {SEGMENTS_FILE} file found; index does not exist"
            )));
        }

        let mut input = open_input(storage.as_ref(), SEGMENTS_FILE)?;
        let counter = input.read_i32()?;
        let count = input.read_i32()?;
        if counter < 0 || count < 0 {
            return Err(StratumError::corruption(format!(
                "invalid {SEGMENTS_FILE} header (counter {counter}, count {count})"
            )));
        }

        let mut segments = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = input.read_string()?;
            let doc_count = input.read_i32()?;
            if doc_count < 0 {
                return Err(StratumError::corruption(format!(
                    "segment {name} has negative document count {doc_count}"
                )));
            }
            segments.push(SegmentInfo::new(name, doc_count as u32, Arc::clone(&storage)));
        }

        Ok(SegmentInfos {
            counter: counter as u32,
            segments,
        })
    }

    /// Persist the list into `storage`, replacing the previous one atomically.
    pub fn write(&self, storage: &dyn Storage) -> Result<()> {
        let mut output = create_output(storage, SEGMENTS_TMP_FILE)?;
        output.write_i32(self.counter as i32)?;
        output.write_i32(self.segments.len() as i32)?;
        for segment in &self.segments {
            output.write_string(&segment.name)?;
            output.write_i32(segment.doc_count as i32)?;
        }
        output.close()?;

        storage.rename_file(SEGMENTS_TMP_FILE, SEGMENTS_FILE)
    }
}
