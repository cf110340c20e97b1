//! Document structure.

use serde::{Deserialize, Serialize};

use crate::document::field::Field;

/// An ordered list of fields. Several fields may share a name.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub struct Document {
    fields: Vec<Field>,
}

impl Document {
    pub fn new() -> Self {
        Document { fields: Vec::new() }
    }

    pub fn add(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// First field with the given name.
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Value of the first field with the given name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_field(name).map(Field::value)
    }

    /// Values of all fields with the given name, in insertion order.
    pub fn get_values(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.name() == name)
            .map(Field::value)
            .collect()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get_field(name).is_some()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::new()
    }
}

#[derive(Debug, Default)]
pub struct DocumentBuilder {
    document: Document,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        DocumentBuilder {
            document: Document::new(),
        }
    }

    pub fn add_text<S: Into<String>, T: Into<String>>(mut self, name: S, value: T) -> Self {
        self.document.add(Field::text(name, value));
        self
    }

    pub fn add_keyword<S: Into<String>, T: Into<String>>(mut self, name: S, value: T) -> Self {
        self.document.add(Field::keyword(name, value));
        self
    }

    pub fn add_unindexed<S: Into<String>, T: Into<String>>(mut self, name: S, value: T) -> Self {
        self.document.add(Field::unindexed(name, value));
        self
    }

    pub fn add_unstored<S: Into<String>, T: Into<String>>(mut self, name: S, value: T) -> Self {
        self.document.add(Field::unstored(name, value));
        self
    }

    pub fn add_field(mut self, field: Field) -> Self {
        self.document.add(field);
        self
    }

    pub fn build(self) -> Document {
        self.document
    }
}
