//! Term dictionary of a segment.
//!
//! The primary dictionary (`<segment>.tis`) holds every term in ascending
//! order; the secondary dictionary (`<segment>.tii`) holds every
//! [`INDEX_INTERVAL`]th entry plus the primary-file offset where the
//! following block starts. Both files begin with a big-endian `i32` entry
//! count that is reserved on open and patched on close.
//!
//! Entry layout, all integers variable-length:
//!
//! ```text
//! prefix_len  suffix_len  suffix_bytes  field_number  doc_freq
//! freq_pointer_delta  prox_pointer_delta  [tis_pointer_delta  (.tii only)]
//! ```
//!
//! Prefix and suffix are measured in UTF-8 bytes against the previous entry's
//! text. Entry `k` of the secondary dictionary is the primary dictionary
//! state right before primary entry `k * INDEX_INTERVAL`; entry 0 is the
//! empty sentinel term.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Result, StratumError};
use crate::index::field_infos::FieldInfos;
use crate::index::reader::TermEnum;
use crate::index::segment_file;
use crate::index::term::{Term, TermInfo};
use crate::storage::Storage;
use crate::storage::structured::{IndexInput, IndexOutput, create_output, open_input};

/// Number of primary entries between two secondary entries.
pub const INDEX_INTERVAL: u64 = 128;

/// Append-only writer for one segment's dictionary pair.
#[derive(Debug)]
pub struct TermInfosWriter<'a> {
    field_infos: &'a FieldInfos,
    output: IndexOutput,
    last_term: Term,
    last_info: TermInfo,
    last_index_pointer: u64,
    size: u64,
    is_index: bool,
    index: Option<Box<TermInfosWriter<'a>>>,
}

impl<'a> TermInfosWriter<'a> {
    pub fn new(storage: &dyn Storage, segment: &str, field_infos: &'a FieldInfos) -> Result<Self> {
        let index = Self::open(storage, &segment_file(segment, "tii"), field_infos, true)?;
        let mut writer = Self::open(storage, &segment_file(segment, "tis"), field_infos, false)?;
        writer.index = Some(Box::new(index));
        Ok(writer)
    }

    fn open(
        storage: &dyn Storage,
        name: &str,
        field_infos: &'a FieldInfos,
        is_index: bool,
    ) -> Result<Self> {
        let mut output = create_output(storage, name)?;
        output.write_i32(0)?;
        Ok(TermInfosWriter {
            field_infos,
            output,
            last_term: Term::default(),
            last_info: TermInfo::default(),
            last_index_pointer: 0,
            size: 0,
            is_index,
            index: None,
        })
    }

    /// Append `term` with its postings pointers.
    ///
    /// `term` must sort strictly after the previously added term and its
    /// pointers must not be smaller than the previous entry's.
    pub fn add(&mut self, term: &Term, info: &TermInfo) -> Result<()> {
        if !self.is_index && term <= &self.last_term {
            return Err(StratumError::corruption(format!(
                "term out of order: {term} after {}",
                self.last_term
            )));
        }
        if info.freq_pointer < self.last_info.freq_pointer {
            return Err(StratumError::corruption(format!(
                "freq pointer out of order for {term}: {} < {}",
                info.freq_pointer, self.last_info.freq_pointer
            )));
        }
        if info.prox_pointer < self.last_info.prox_pointer {
            return Err(StratumError::corruption(format!(
                "prox pointer out of order for {term}: {} < {}",
                info.prox_pointer, self.last_info.prox_pointer
            )));
        }

        if self.size % INDEX_INTERVAL == 0 {
            let pointer = self.output.position();
            if let Some(index) = self.index.as_mut() {
                index.add_indexed(&self.last_term, &self.last_info, pointer)?;
            }
        }

        self.write_entry(term, info)?;
        Ok(())
    }

    fn add_indexed(&mut self, term: &Term, info: &TermInfo, pointer: u64) -> Result<()> {
        if info.freq_pointer < self.last_info.freq_pointer
            || info.prox_pointer < self.last_info.prox_pointer
            || pointer < self.last_index_pointer
        {
            return Err(StratumError::corruption(format!(
                "index entry for {term} goes backward"
            )));
        }
        self.write_entry(term, info)?;
        self.output.write_vlong(pointer - self.last_index_pointer)?;
        self.last_index_pointer = pointer;
        Ok(())
    }

    fn write_entry(&mut self, term: &Term, info: &TermInfo) -> Result<()> {
        let field_number = self.field_infos.field_number(&term.field).ok_or_else(|| {
            StratumError::index(format!("field {:?} missing from field infos", term.field))
        })?;

        let text = term.text.as_bytes();
        let prefix = shared_prefix(&self.last_term.text, &term.text);
        self.output.write_vint(prefix as u32)?;
        self.output.write_bytes(&text[prefix..])?;
        self.output.write_vint(field_number)?;
        self.output.write_vint(info.doc_freq)?;
        self.output
            .write_vlong(info.freq_pointer - self.last_info.freq_pointer)?;
        self.output
            .write_vlong(info.prox_pointer - self.last_info.prox_pointer)?;

        self.last_term = term.clone();
        self.last_info = *info;
        self.size += 1;
        Ok(())
    }

    /// Number of entries added so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Patch the entry counts and close both files.
    pub fn close(mut self) -> Result<()> {
        let index = self.index.take();
        self.output.seek(0)?;
        self.output.write_i32(self.size as i32)?;
        self.output.close()?;
        if let Some(index) = index {
            index.close()?;
        }
        Ok(())
    }
}

/// Length in bytes of the common prefix of `a` and `b`, cut back to a char
/// boundary of `b`.
fn shared_prefix(a: &str, b: &str) -> usize {
    let mut len = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count();
    while !b.is_char_boundary(len) {
        len -= 1;
    }
    len
}

/// Sequential cursor over a dictionary file.
#[derive(Debug)]
pub struct SegmentTermEnum {
    input: IndexInput,
    field_infos: Arc<FieldInfos>,
    size: u64,
    position: i64,
    term: Term,
    positioned: bool,
    term_info: TermInfo,
    is_index: bool,
    index_pointer: u64,
}

impl SegmentTermEnum {
    fn open(mut input: IndexInput, field_infos: Arc<FieldInfos>, is_index: bool) -> Result<Self> {
        let size = input.read_i32()?;
        if size < 0 {
            return Err(StratumError::corruption(format!(
                "negative term dictionary size {size}"
            )));
        }
        Ok(SegmentTermEnum {
            input,
            field_infos,
            size: size as u64,
            position: -1,
            term: Term::default(),
            positioned: false,
            term_info: TermInfo::default(),
            is_index,
            index_pointer: 0,
        })
    }

    /// Advance to the next entry. Returns `false` once the dictionary is
    /// exhausted.
    pub fn next(&mut self) -> Result<bool> {
        if self.position + 1 >= self.size as i64 {
            self.position = self.size as i64;
            self.positioned = false;
            return Ok(false);
        }

        let prefix = self.input.read_vint()? as usize;
        let suffix = self.input.read_bytes()?;
        let previous = self.term.text.as_bytes();
        if prefix > previous.len() {
            return Err(StratumError::corruption(format!(
                "term prefix {prefix} longer than previous term at entry {}",
                self.position + 1
            )));
        }
        let mut text = Vec::with_capacity(prefix + suffix.len());
        text.extend_from_slice(&previous[..prefix]);
        text.extend_from_slice(&suffix);
        let text = String::from_utf8(text)
            .map_err(|e| StratumError::corruption(format!("invalid UTF-8 in term: {e}")))?;

        let field_number = self.input.read_vint()?;
        let field = self.field_infos.field_name(field_number).ok_or_else(|| {
            StratumError::corruption(format!("unknown field number {field_number} in dictionary"))
        })?;

        self.term = Term::new(field, text);
        self.term_info.doc_freq = self.input.read_vint()?;
        self.term_info.freq_pointer += self.input.read_vlong()?;
        self.term_info.prox_pointer += self.input.read_vlong()?;
        if self.is_index {
            self.index_pointer += self.input.read_vlong()?;
        }

        self.position += 1;
        self.positioned = true;
        Ok(true)
    }

    /// Reposition onto a state recorded in the secondary dictionary.
    fn seek(&mut self, pointer: u64, position: i64, term: &Term, info: &TermInfo) -> Result<()> {
        self.input.seek(pointer)?;
        self.position = position;
        self.term = term.clone();
        self.positioned = position >= 0;
        self.term_info = *info;
        Ok(())
    }

    pub fn term(&self) -> Option<&Term> {
        self.positioned.then_some(&self.term)
    }

    pub fn term_info(&self) -> &TermInfo {
        &self.term_info
    }

    pub fn doc_freq(&self) -> u32 {
        self.term_info.doc_freq
    }

    /// Ordinal of the current entry, `-1` before the first.
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Independent cursor at the same state.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(SegmentTermEnum {
            input: self.input.try_clone()?,
            field_infos: Arc::clone(&self.field_infos),
            size: self.size,
            position: self.position,
            term: self.term.clone(),
            positioned: self.positioned,
            term_info: self.term_info,
            is_index: self.is_index,
            index_pointer: self.index_pointer,
        })
    }

    /// Advance until positioned on a term `>= target` or exhausted.
    fn scan_to(&mut self, target: &Term) -> Result<()> {
        loop {
            if let Some(term) = self.term()
                && term >= target
            {
                return Ok(());
            }
            if !self.next()? {
                return Ok(());
            }
        }
    }
}

impl TermEnum for SegmentTermEnum {
    fn next(&mut self) -> Result<bool> {
        SegmentTermEnum::next(self)
    }

    fn term(&self) -> Option<&Term> {
        SegmentTermEnum::term(self)
    }

    fn doc_freq(&self) -> u32 {
        SegmentTermEnum::doc_freq(self)
    }
}

/// Random access to a segment's dictionary.
#[derive(Debug)]
pub struct TermInfosReader {
    origin: SegmentTermEnum,
    cursor: Mutex<SegmentTermEnum>,
    index_terms: Vec<Term>,
    index_infos: Vec<TermInfo>,
    index_pointers: Vec<u64>,
}

impl TermInfosReader {
    pub fn open(storage: &dyn Storage, segment: &str, field_infos: Arc<FieldInfos>) -> Result<Self> {
        let origin = SegmentTermEnum::open(
            open_input(storage, &segment_file(segment, "tis"))?,
            Arc::clone(&field_infos),
            false,
        )?;

        let mut index = SegmentTermEnum::open(
            open_input(storage, &segment_file(segment, "tii"))?,
            field_infos,
            true,
        )?;
        let capacity = index.size() as usize;
        let mut index_terms = Vec::with_capacity(capacity);
        let mut index_infos = Vec::with_capacity(capacity);
        let mut index_pointers = Vec::with_capacity(capacity);
        while index.next()? {
            index_terms.push(index.term.clone());
            index_infos.push(index.term_info);
            index_pointers.push(index.index_pointer);
        }

        let cursor = Mutex::new(origin.try_clone()?);
        Ok(TermInfosReader {
            origin,
            cursor,
            index_terms,
            index_infos,
            index_pointers,
        })
    }

    /// Number of terms in the dictionary.
    pub fn size(&self) -> u64 {
        self.origin.size()
    }

    /// Look up the dictionary entry for `term`.
    pub fn get(&self, term: &Term) -> Result<Option<TermInfo>> {
        if self.size() == 0 {
            return Ok(None);
        }

        let mut cursor = self.cursor.lock();
        self.position_cursor(&mut cursor, term)?;
        match cursor.term() {
            Some(found) if found == term => Ok(Some(*cursor.term_info())),
            _ => Ok(None),
        }
    }

    /// Cursor positioned before the first term.
    pub fn terms(&self) -> Result<SegmentTermEnum> {
        self.origin.try_clone()
    }

    /// Cursor positioned on the first term `>= term`.
    pub fn terms_from(&self, term: &Term) -> Result<SegmentTermEnum> {
        let mut cursor = self.cursor.lock();
        self.position_cursor(&mut cursor, term)?;
        cursor.try_clone()
    }

    fn position_cursor(&self, cursor: &mut SegmentTermEnum, term: &Term) -> Result<()> {
        if self.index_terms.is_empty() {
            return cursor.scan_to(term);
        }

        // stay in the current block when the target can't be past it
        if let Some(current) = cursor.term()
            && current <= term
        {
            let next_block = ((cursor.position() as u64 + 1) / INDEX_INTERVAL + 1) as usize;
            if next_block >= self.index_terms.len() || term < &self.index_terms[next_block] {
                return cursor.scan_to(term);
            }
        }

        let offset = self
            .index_terms
            .partition_point(|t| t <= term)
            .saturating_sub(1);
        cursor.seek(
            self.index_pointers[offset],
            offset as i64 * INDEX_INTERVAL as i64 - 1,
            &self.index_terms[offset],
            &self.index_infos[offset],
        )?;
        cursor.scan_to(term)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn field_infos() -> FieldInfos {
        let mut infos = FieldInfos::new();
        infos.add("body", true);
        infos.add("title", true);
        infos
    }

    fn write_terms(storage: &dyn Storage, infos: &FieldInfos, terms: &[Term]) {
        let mut writer = TermInfosWriter::new(storage, "_0", infos).unwrap();
        for (i, term) in terms.iter().enumerate() {
            let info = TermInfo::new(i as u32 + 1, i as u64 * 3, i as u64 * 5);
            writer.add(term, &info).unwrap();
        }
        writer.close().unwrap();
    }

    fn sample_terms(n: usize) -> Vec<Term> {
        let mut terms: Vec<Term> = (0..n)
            .map(|i| Term::new("body", format!("term{i:05}")))
            .collect();
        terms.push(Term::new("title", "über"));
        terms.push(Term::new("title", "übung"));
        terms
    }

    #[test]
    fn test_round_trip_in_order() {
        let storage = MemoryStorage::new_default();
        let infos = field_infos();
        let terms = sample_terms(300);
        write_terms(&storage, &infos, &terms);

        let reader = TermInfosReader::open(&storage, "_0", Arc::new(infos)).unwrap();
        assert_eq!(reader.size(), terms.len() as u64);

        let mut e = reader.terms().unwrap();
        assert!(e.term().is_none());
        let mut read = Vec::new();
        while e.next().unwrap() {
            let info = *e.term_info();
            assert_eq!(info.doc_freq as usize, read.len() + 1);
            assert_eq!(info.freq_pointer, read.len() as u64 * 3);
            read.push(e.term().unwrap().clone());
        }
        assert_eq!(read, terms);
        assert!(read.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_get_and_seek() {
        let storage = MemoryStorage::new_default();
        let infos = field_infos();
        let terms = sample_terms(300);
        write_terms(&storage, &infos, &terms);

        let reader = TermInfosReader::open(&storage, "_0", Arc::new(infos)).unwrap();
        assert_eq!(reader.index_terms.len(), 3);

        for i in [0usize, 127, 128, 129, 255, 256, 299, 300, 301] {
            let info = reader.get(&terms[i]).unwrap().unwrap();
            assert_eq!(info.doc_freq as usize, i + 1, "term {}", terms[i]);
        }
        // backward lookup after a forward one
        assert_eq!(reader.get(&terms[5]).unwrap().unwrap().doc_freq, 6);

        assert!(reader.get(&Term::new("body", "term00005x")).unwrap().is_none());
        assert!(reader.get(&Term::new("zzz", "a")).unwrap().is_none());

        let e = reader.terms_from(&Term::new("body", "term00200a")).unwrap();
        assert_eq!(e.term(), Some(&terms[201]));

        let mut e = reader.terms_from(&Term::new("a", "")).unwrap();
        assert_eq!(e.term(), Some(&terms[0]));
        assert!(e.next().unwrap());
        assert_eq!(e.term(), Some(&terms[1]));

        let e = reader.terms_from(&Term::new("zzz", "")).unwrap();
        assert!(e.term().is_none());
    }

    #[test]
    fn test_empty_dictionary() {
        let storage = MemoryStorage::new_default();
        let infos = field_infos();
        write_terms(&storage, &infos, &[]);

        let reader = TermInfosReader::open(&storage, "_0", Arc::new(infos)).unwrap();
        assert_eq!(reader.size(), 0);
        assert!(reader.get(&Term::new("body", "x")).unwrap().is_none());
        assert!(!reader.terms().unwrap().next().unwrap());
    }

    #[test]
    fn test_rejects_out_of_order_term() {
        let storage = MemoryStorage::new_default();
        let infos = field_infos();
        let mut writer = TermInfosWriter::new(&storage, "_0", &infos).unwrap();
        writer
            .add(&Term::new("body", "b"), &TermInfo::default())
            .unwrap();

        let err = writer
            .add(&Term::new("body", "a"), &TermInfo::default())
            .unwrap_err();
        assert!(err.is_corruption());

        let err = writer
            .add(&Term::new("body", "b"), &TermInfo::default())
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_rejects_pointer_regression() {
        let storage = MemoryStorage::new_default();
        let infos = field_infos();
        let mut writer = TermInfosWriter::new(&storage, "_0", &infos).unwrap();
        writer
            .add(&Term::new("body", "a"), &TermInfo::new(1, 10, 10))
            .unwrap();
        let err = writer
            .add(&Term::new("body", "b"), &TermInfo::new(1, 9, 12))
            .unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_shared_prefix_respects_char_boundaries() {
        assert_eq!(shared_prefix("über", "übung"), 3);
        assert_eq!(shared_prefix("é", "è"), 0);
        assert_eq!(shared_prefix("abc", "abd"), 2);
        assert_eq!(shared_prefix("", "abc"), 0);
    }
}
