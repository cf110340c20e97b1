//! Priority queue that merges the term dictionaries of several segments.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::error::Result;
use crate::index::term::Term;
use crate::index::term_infos::SegmentTermEnum;

/// A segment's dictionary cursor inside a [`SegmentMergeQueue`].
#[derive(Debug)]
pub struct SegmentMergeInfo {
    /// First document id of the segment in the merged id space.
    pub base: u32,
    /// Position of the segment among the merged segments.
    pub index: usize,
    pub term_enum: SegmentTermEnum,
    term: Term,
}

impl SegmentMergeInfo {
    /// Wrap `term_enum`, advancing it onto its first term if it is not
    /// positioned yet. Returns `None` when the cursor has no terms left.
    pub fn new(base: u32, index: usize, mut term_enum: SegmentTermEnum) -> Result<Option<Self>> {
        if term_enum.term().is_none() && !term_enum.next()? {
            return Ok(None);
        }
        let term = match term_enum.term() {
            Some(term) => term.clone(),
            None => return Ok(None),
        };
        Ok(Some(SegmentMergeInfo {
            base,
            index,
            term_enum,
            term,
        }))
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    /// Move to the next term. Returns `false` once exhausted.
    pub fn advance(&mut self) -> Result<bool> {
        if !self.term_enum.next()? {
            return Ok(false);
        }
        if let Some(term) = self.term_enum.term() {
            self.term = term.clone();
        }
        Ok(true)
    }
}

impl PartialEq for SegmentMergeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.term == other.term && self.index == other.index
    }
}

impl Eq for SegmentMergeInfo {}

impl PartialOrd for SegmentMergeInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SegmentMergeInfo {
    // Reversed so the max-heap pops the smallest (term, index) first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .term
            .cmp(&self.term)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Min-queue of segment cursors ordered by (current term, segment index).
#[derive(Debug, Default)]
pub struct SegmentMergeQueue {
    heap: BinaryHeap<SegmentMergeInfo>,
}

impl SegmentMergeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, info: SegmentMergeInfo) {
        self.heap.push(info);
    }

    pub fn peek_term(&self) -> Option<&Term> {
        self.heap.peek().map(SegmentMergeInfo::term)
    }

    /// Remove every cursor positioned on the smallest term, in segment order.
    pub fn pop_matching(&mut self) -> Option<(Term, Vec<SegmentMergeInfo>)> {
        let term = self.peek_term()?.clone();
        let mut matching = Vec::new();
        while self.peek_term() == Some(&term) {
            if let Some(info) = self.heap.pop() {
                matching.push(info);
            }
        }
        Some((term, matching))
    }

    /// Advance the cursors returned by [`pop_matching`](Self::pop_matching)
    /// and queue the ones that still have terms.
    pub fn advance_and_requeue(&mut self, matching: Vec<SegmentMergeInfo>) -> Result<()> {
        for mut info in matching {
            if info.advance()? {
                self.push(info);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
