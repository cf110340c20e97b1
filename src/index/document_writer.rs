//! Inversion of a single document into a complete one-document segment.

use std::collections::BTreeMap;

use log::trace;

use crate::analysis::analyzer::Analyzer;
use crate::document::document::Document;
use crate::error::Result;
use crate::index::field_infos::FieldInfos;
use crate::index::fields::FieldsWriter;
use crate::index::norms::{self, norm_file};
use crate::index::postings::PostingsWriter;
use crate::index::segment_file;
use crate::index::term::Term;
use crate::index::term_infos::TermInfosWriter;
use crate::storage::Storage;
use crate::storage::structured::create_output;

/// Writes one document as its own segment.
///
/// Fields sharing a name are indexed as one stream: positions and token
/// counts continue from field to field. Each field name contributes at most
/// `max_field_length` tokens.
#[derive(Debug)]
pub struct DocumentWriter<'a> {
    storage: &'a dyn Storage,
    analyzer: &'a dyn Analyzer,
    max_field_length: usize,
}

impl<'a> DocumentWriter<'a> {
    pub fn new(storage: &'a dyn Storage, analyzer: &'a dyn Analyzer, max_field_length: usize) -> Self {
        DocumentWriter {
            storage,
            analyzer,
            max_field_length,
        }
    }

    pub fn add_document(&self, segment: &str, doc: &Document) -> Result<()> {
        let mut field_infos = FieldInfos::new();
        field_infos.add_document(doc);
        field_infos.write(self.storage, &segment_file(segment, "fnm"))?;

        let mut fields_writer = FieldsWriter::new(self.storage, segment, &field_infos)?;
        fields_writer.add_document(doc)?;
        fields_writer.close()?;

        let mut field_lengths = vec![0usize; field_infos.len()];
        let postings = self.invert(doc, &field_infos, &mut field_lengths)?;
        trace!("segment {segment}: {} distinct terms", postings.len());

        self.write_postings(segment, &field_infos, &postings)?;
        self.write_norms(segment, &field_infos, &field_lengths)
    }

    fn invert(
        &self,
        doc: &Document,
        field_infos: &FieldInfos,
        field_lengths: &mut [usize],
    ) -> Result<BTreeMap<Term, Vec<u32>>> {
        let mut postings: BTreeMap<Term, Vec<u32>> = BTreeMap::new();

        for field in doc.fields().iter().filter(|f| f.is_indexed()) {
            let Some(number) = field_infos.field_number(field.name()) else {
                continue;
            };
            let length = &mut field_lengths[number as usize];

            if field.is_tokenized() {
                for token in self.analyzer.analyze(field.value())? {
                    if *length >= self.max_field_length {
                        break;
                    }
                    postings
                        .entry(Term::new(field.name(), token.text))
                        .or_default()
                        .push(*length as u32);
                    *length += 1;
                }
            } else if *length < self.max_field_length {
                postings
                    .entry(Term::new(field.name(), field.value()))
                    .or_default()
                    .push(*length as u32);
                *length += 1;
            }
        }

        Ok(postings)
    }

    fn write_postings(
        &self,
        segment: &str,
        field_infos: &FieldInfos,
        postings: &BTreeMap<Term, Vec<u32>>,
    ) -> Result<()> {
        let mut term_writer = TermInfosWriter::new(self.storage, segment, field_infos)?;
        let mut postings_writer = PostingsWriter::new(self.storage, segment)?;

        for (term, positions) in postings {
            postings_writer.start_term();
            postings_writer.add(0, positions)?;
            term_writer.add(term, &postings_writer.finish_term())?;
        }

        term_writer.close()?;
        postings_writer.close()
    }

    fn write_norms(&self, segment: &str, field_infos: &FieldInfos, field_lengths: &[usize]) -> Result<()> {
        for fi in field_infos.indexed_fields() {
            let mut output = create_output(self.storage, &norm_file(segment, fi.number))?;
            output.write_u8(norms::encode(field_lengths[fi.number as usize]))?;
            output.close()?;
        }
        Ok(())
    }
}
