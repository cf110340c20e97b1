//! Postings streams of a segment.
//!
//! For each term, `<segment>.frq` holds the ascending document ids as deltas
//! with the frequency folded in: `doc_code = delta << 1`, with the low bit set
//! when the frequency is 1; otherwise the frequency follows as its own vint.
//! `<segment>.prx` holds, per posting, `freq` position deltas.

use std::sync::Arc;

use crate::error::{Result, StratumError};
use crate::index::reader::TermPositions;
use crate::index::segment_file;
use crate::index::term::TermInfo;
use crate::storage::Storage;
use crate::storage::structured::{IndexInput, IndexOutput, create_output};
use crate::util::bit_vector::BitVector;

/// Writes the `.frq`/`.prx` pair of a segment, one term at a time.
#[derive(Debug)]
pub struct PostingsWriter {
    freq_output: IndexOutput,
    prox_output: IndexOutput,
    current: TermInfo,
    last_doc: u32,
}

impl PostingsWriter {
    pub fn new(storage: &dyn Storage, segment: &str) -> Result<Self> {
        Ok(PostingsWriter {
            freq_output: create_output(storage, &segment_file(segment, "frq"))?,
            prox_output: create_output(storage, &segment_file(segment, "prx"))?,
            current: TermInfo::default(),
            last_doc: 0,
        })
    }

    /// Begin the postings of a new term at the current stream positions.
    pub fn start_term(&mut self) {
        self.current = TermInfo::new(
            0,
            self.freq_output.position(),
            self.prox_output.position(),
        );
        self.last_doc = 0;
    }

    /// Append one posting. Documents must arrive in strictly ascending order
    /// and positions in ascending order.
    pub fn add(&mut self, doc: u32, positions: &[u32]) -> Result<()> {
        if self.current.doc_freq > 0 && doc <= self.last_doc {
            return Err(StratumError::corruption(format!(
                "docs out of order: {doc} after {}",
                self.last_doc
            )));
        }
        if positions.is_empty() {
            return Err(StratumError::invalid_argument(format!(
                "posting for doc {doc} has no positions"
            )));
        }

        let delta = doc - self.last_doc;
        let freq = positions.len() as u32;
        if freq == 1 {
            self.freq_output.write_vint((delta << 1) | 1)?;
        } else {
            self.freq_output.write_vint(delta << 1)?;
            self.freq_output.write_vint(freq)?;
        }

        let mut last_position = 0;
        for &position in positions {
            if position < last_position {
                return Err(StratumError::corruption(format!(
                    "positions out of order in doc {doc}: {position} after {last_position}"
                )));
            }
            self.prox_output.write_vint(position - last_position)?;
            last_position = position;
        }

        self.last_doc = doc;
        self.current.doc_freq += 1;
        Ok(())
    }

    /// Finish the current term, returning its dictionary entry.
    pub fn finish_term(&self) -> TermInfo {
        self.current
    }

    pub fn close(self) -> Result<()> {
        self.freq_output.close()?;
        self.prox_output.close()
    }
}

/// Cursor over the postings of one term in one segment.
///
/// Documents marked in the deletion bitmap are skipped, along with their
/// positions.
#[derive(Debug)]
pub struct SegmentTermPositions {
    freq_stream: IndexInput,
    prox_stream: IndexInput,
    deleted: Option<Arc<BitVector>>,
    doc_freq: u32,
    read: u32,
    doc: u32,
    freq: u32,
    prox_pending: u32,
    position: u32,
}

impl SegmentTermPositions {
    /// Position `freq_stream` and `prox_stream` on the postings of `info`.
    ///
    /// A `None` info yields a cursor with no documents.
    pub fn new(
        mut freq_stream: IndexInput,
        mut prox_stream: IndexInput,
        info: Option<&TermInfo>,
        deleted: Option<Arc<BitVector>>,
    ) -> Result<Self> {
        let doc_freq = match info {
            Some(info) => {
                freq_stream.seek(info.freq_pointer)?;
                prox_stream.seek(info.prox_pointer)?;
                info.doc_freq
            }
            None => 0,
        };
        Ok(SegmentTermPositions {
            freq_stream,
            prox_stream,
            deleted,
            doc_freq,
            read: 0,
            doc: 0,
            freq: 0,
            prox_pending: 0,
            position: 0,
        })
    }

    fn skip_pending_positions(&mut self) -> Result<()> {
        while self.prox_pending > 0 {
            self.prox_stream.read_vint()?;
            self.prox_pending -= 1;
        }
        Ok(())
    }

    /// All positions of the current document, in ascending order.
    pub fn positions(&mut self) -> Result<Vec<u32>> {
        let mut positions = Vec::with_capacity(self.prox_pending as usize);
        while self.prox_pending > 0 {
            positions.push(self.next_position()?);
        }
        Ok(positions)
    }
}

impl TermPositions for SegmentTermPositions {
    fn next(&mut self) -> Result<bool> {
        loop {
            self.skip_pending_positions()?;
            if self.read >= self.doc_freq {
                return Ok(false);
            }

            let code = self.freq_stream.read_vint()?;
            self.doc += code >> 1;
            self.freq = if code & 1 != 0 {
                1
            } else {
                self.freq_stream.read_vint()?
            };
            self.read += 1;
            self.prox_pending = self.freq;
            self.position = 0;

            let deleted = self
                .deleted
                .as_ref()
                .is_some_and(|bits| bits.get(self.doc as usize));
            if !deleted {
                return Ok(true);
            }
        }
    }

    fn doc(&self) -> u32 {
        self.doc
    }

    fn freq(&self) -> u32 {
        self.freq
    }

    fn next_position(&mut self) -> Result<u32> {
        if self.prox_pending == 0 {
            return Err(StratumError::invalid_operation(format!(
                "no positions left for doc {}",
                self.doc
            )));
        }
        self.prox_pending -= 1;
        self.position += self.prox_stream.read_vint()?;
        Ok(self.position)
    }
}
