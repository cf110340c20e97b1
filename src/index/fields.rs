//! Stored field values of a segment.
//!
//! `<segment>.fdx` holds one big-endian `i64` per document: the offset of
//! that document's record in `<segment>.fdt`. Each `.fdt` record is a vint
//! count of stored fields followed by, per field, the vint field number, a
//! flags byte (`0x1` = tokenized) and the string value.

use crate::document::document::Document;
use crate::document::field::Field;
use crate::error::{Result, StratumError};
use crate::index::field_infos::FieldInfos;
use crate::index::segment_file;
use crate::storage::Storage;
use crate::storage::structured::{IndexInput, IndexOutput, create_output, open_input};

const TOKENIZED: u8 = 0x1;

/// Appends stored documents to a segment's `.fdx`/`.fdt` pair.
#[derive(Debug)]
pub struct FieldsWriter<'a> {
    field_infos: &'a FieldInfos,
    index_output: IndexOutput,
    data_output: IndexOutput,
}

impl<'a> FieldsWriter<'a> {
    pub fn new(storage: &dyn Storage, segment: &str, field_infos: &'a FieldInfos) -> Result<Self> {
        Ok(FieldsWriter {
            field_infos,
            index_output: create_output(storage, &segment_file(segment, "fdx"))?,
            data_output: create_output(storage, &segment_file(segment, "fdt"))?,
        })
    }

    /// Append the stored fields of `doc` as the next document.
    pub fn add_document(&mut self, doc: &Document) -> Result<()> {
        self.index_output
            .write_i64(self.data_output.position() as i64)?;

        let stored: Vec<&Field> = doc.fields().iter().filter(|f| f.is_stored()).collect();
        self.data_output.write_vint(stored.len() as u32)?;
        for field in stored {
            let number = self.field_infos.field_number(field.name()).ok_or_else(|| {
                StratumError::index(format!("field {:?} missing from field infos", field.name()))
            })?;
            self.data_output.write_vint(number)?;
            self.data_output
                .write_u8(if field.is_tokenized() { TOKENIZED } else { 0 })?;
            self.data_output.write_string(field.value())?;
        }
        Ok(())
    }

    pub fn close(self) -> Result<()> {
        self.index_output.close()?;
        self.data_output.close()
    }
}

/// Random access to the stored documents of a segment.
#[derive(Debug)]
pub struct FieldsReader {
    index_input: IndexInput,
    data_input: IndexInput,
    size: u32,
}

impl FieldsReader {
    pub fn open(storage: &dyn Storage, segment: &str) -> Result<Self> {
        let index_input = open_input(storage, &segment_file(segment, "fdx"))?;
        let data_input = open_input(storage, &segment_file(segment, "fdt"))?;
        let size = (index_input.size() / 8) as u32;
        Ok(FieldsReader {
            index_input,
            data_input,
            size,
        })
    }

    /// Number of document records, deleted or not.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Load document `n`, rebuilding each stored field from its flags.
    ///
    /// Indexed-ness is taken from the segment's field table.
    pub fn doc(&mut self, n: u32, field_infos: &FieldInfos) -> Result<Document> {
        if n >= self.size {
            return Err(StratumError::invalid_argument(format!(
                "document {n} out of range 0..{}",
                self.size
            )));
        }

        self.index_input.seek(n as u64 * 8)?;
        let position = self.index_input.read_i64()?;
        if position < 0 || position as u64 > self.data_input.size() {
            return Err(StratumError::corruption(format!(
                "stored field pointer {position} for document {n} is out of range"
            )));
        }
        self.data_input.seek(position as u64)?;

        let mut doc = Document::new();
        let count = self.data_input.read_vint()?;
        for _ in 0..count {
            let number = self.data_input.read_vint()?;
            let info = field_infos.field_info(number).ok_or_else(|| {
                StratumError::corruption(format!("unknown field number {number} in stored fields"))
            })?;
            let bits = self.data_input.read_u8()?;
            let value = self.data_input.read_string()?;
            doc.add(Field::new(
                info.name.clone(),
                value,
                true,
                info.indexed,
                bits & TOKENIZED != 0,
            ));
        }
        Ok(doc)
    }
}
