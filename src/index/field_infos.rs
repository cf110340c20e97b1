//! Field name and number table of a segment (`<segment>.fnm`).
//!
//! Field numbers are dense and assigned in first-seen order. Number 0 is
//! always the empty field name, which the term dictionary uses for its
//! leading sentinel term.
//!
//! File layout: `vint count`, then per field a string name and a flags
//! byte (`0x1` = indexed).

use ahash::AHashMap;

use crate::document::document::Document;
use crate::error::{Result, StratumError};
use crate::storage::Storage;
use crate::storage::structured::{create_output, open_input};

const INDEXED: u8 = 0x1;

/// Name, number and indexing flag of one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    pub indexed: bool,
}

/// The field table of one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfos {
    by_number: Vec<FieldInfo>,
    by_name: AHashMap<String, u32>,
}

impl FieldInfos {
    pub fn new() -> Self {
        let mut infos = FieldInfos {
            by_number: Vec::new(),
            by_name: AHashMap::new(),
        };
        infos.add("", false);
        infos
    }

    /// Add every field of `doc`.
    pub fn add_document(&mut self, doc: &Document) {
        for field in doc.fields() {
            self.add(field.name(), field.is_indexed());
        }
    }

    /// Add every field of another table, in its numbering order.
    pub fn add_all(&mut self, other: &FieldInfos) {
        for info in &other.by_number {
            self.add(&info.name, info.indexed);
        }
    }

    /// Add a field. A field indexed anywhere stays indexed.
    pub fn add(&mut self, name: &str, indexed: bool) {
        match self.by_name.get(name) {
            Some(&number) => {
                if indexed {
                    self.by_number[number as usize].indexed = true;
                }
            }
            None => {
                let number = self.by_number.len() as u32;
                self.by_number.push(FieldInfo {
                    name: name.to_string(),
                    number,
                    indexed,
                });
                self.by_name.insert(name.to_string(), number);
            }
        }
    }

    pub fn field_number(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn field_name(&self, number: u32) -> Option<&str> {
        self.by_number.get(number as usize).map(|fi| fi.name.as_str())
    }

    pub fn field_info(&self, number: u32) -> Option<&FieldInfo> {
        self.by_number.get(number as usize)
    }

    pub fn field_info_by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.field_number(name).and_then(|n| self.field_info(n))
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.by_number.iter()
    }

    /// Indexed fields, which are exactly the fields that carry norms.
    pub fn indexed_fields(&self) -> impl Iterator<Item = &FieldInfo> {
        self.by_number.iter().filter(|fi| fi.indexed)
    }

    pub fn write(&self, storage: &dyn Storage, name: &str) -> Result<()> {
        let mut output = create_output(storage, name)?;
        output.write_vint(self.by_number.len() as u32)?;
        for info in &self.by_number {
            output.write_string(&info.name)?;
            output.write_u8(if info.indexed { INDEXED } else { 0 })?;
        }
        output.close()
    }

    pub fn read(storage: &dyn Storage, name: &str) -> Result<Self> {
        let mut input = open_input(storage, name)?;
        let count = input.read_vint()?;

        let mut infos = FieldInfos {
            by_number: Vec::with_capacity(count as usize),
            by_name: AHashMap::with_capacity(count as usize),
        };
        for _ in 0..count {
            let field = input.read_string()?;
            let flags = input.read_u8()?;
            if infos.by_name.contains_key(&field) {
                return Err(StratumError::corruption(format!(
                    "{name}: duplicate field {field:?}"
                )));
            }
            infos.add(&field, flags & INDEXED != 0);
        }
        Ok(infos)
    }
}

impl Default for FieldInfos {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn test_numbering_and_flags() {
        let mut infos = FieldInfos::new();
        infos.add("title", true);
        infos.add("path", false);
        infos.add("title", false);
        infos.add("path", true);

        assert_eq!(infos.len(), 3);
        assert_eq!(infos.field_number(""), Some(0));
        assert_eq!(infos.field_number("title"), Some(1));
        assert_eq!(infos.field_name(2), Some("path"));
        assert!(infos.field_info(1).unwrap().indexed);
        assert!(infos.field_info(2).unwrap().indexed);
        assert_eq!(infos.indexed_fields().count(), 2);
    }

    #[test]
    fn test_write_read() {
        let storage = MemoryStorage::new_default();
        let doc = Document::builder()
            .add_text("title", "a")
            .add_unindexed("raw", "b")
            .build();

        let mut infos = FieldInfos::new();
        infos.add_document(&doc);
        infos.write(&storage, "_0.fnm").unwrap();

        let read = FieldInfos::read(&storage, "_0.fnm").unwrap();
        assert_eq!(read, infos);
        assert!(!read.field_info_by_name("raw").unwrap().indexed);
    }

    #[test]
    fn test_add_all_unions_in_order() {
        let mut a = FieldInfos::new();
        a.add("x", false);
        let mut b = FieldInfos::new();
        b.add("y", true);
        b.add("x", true);

        let mut merged = FieldInfos::new();
        merged.add_all(&a);
        merged.add_all(&b);
        assert_eq!(merged.field_number("x"), Some(1));
        assert_eq!(merged.field_number("y"), Some(2));
        assert!(merged.field_info_by_name("x").unwrap().indexed);
    }
}
