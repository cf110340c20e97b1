//! Segment selection for the index writer's merges.
//!
//! Segments form a stack; every merge folds a suffix `min..len` into one new
//! segment pushed on top. The policy only decides `min`.

/// Doc count and residency of one segment, newest last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSummary {
    pub doc_count: u32,
    /// Whether the segment lives in the writer's in-memory buffer store.
    pub buffered: bool,
}

/// Logarithmic merge policy: `merge_factor` segments of one size level are
/// folded into one segment of the next level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogMergePolicy {
    pub merge_factor: u32,
    pub max_merge_docs: u32,
}

impl Default for LogMergePolicy {
    fn default() -> Self {
        LogMergePolicy {
            merge_factor: 10,
            max_merge_docs: i32::MAX as u32,
        }
    }
}

impl LogMergePolicy {
    pub fn new(merge_factor: u32, max_merge_docs: u32) -> Self {
        LogMergePolicy {
            merge_factor,
            max_merge_docs,
        }
    }

    /// Size levels checked after each added document: `merge_factor`,
    /// `merge_factor^2`, ... up to `max_merge_docs`.
    pub fn targets(&self) -> impl Iterator<Item = u64> + use<> {
        let factor = self.merge_factor as u64;
        let max = self.max_merge_docs as u64;
        std::iter::successors(Some(factor), move |&t| t.checked_mul(factor))
            .take_while(move |&t| t <= max)
    }

    /// Start of the newest run of segments smaller than `target` whose doc
    /// counts add up to at least `target`, if any.
    pub fn select_level_merge(&self, segments: &[SegmentSummary], target: u64) -> Option<usize> {
        let mut min = segments.len();
        let mut merge_docs = 0u64;
        while min > 0 {
            let doc_count = segments[min - 1].doc_count as u64;
            if doc_count >= target {
                break;
            }
            merge_docs += doc_count;
            min -= 1;
        }
        (merge_docs >= target).then_some(min)
    }

    /// Start of the suffix to merge when flushing buffered segments.
    ///
    /// All buffered segments at the top of the stack are merged. The durable
    /// segment right below them joins the merge when the combined count stays
    /// within `merge_factor`.
    pub fn select_flush(&self, segments: &[SegmentSummary]) -> Option<usize> {
        let top_buffered = segments.last().is_some_and(|s| s.buffered);
        let buffered_docs: u64 = segments
            .iter()
            .rev()
            .take_while(|s| s.buffered)
            .map(|s| s.doc_count as u64)
            .sum();
        let buffered = segments.iter().rev().take_while(|s| s.buffered).count();

        let mut min = segments.len() - buffered;
        if top_buffered
            && min > 0
            && buffered_docs + segments[min - 1].doc_count as u64 <= self.merge_factor as u64
        {
            min -= 1;
        }
        (min < segments.len()).then_some(min)
    }

    /// Start of the next suffix merged by an optimize pass.
    pub fn select_optimize(&self, segment_count: usize) -> usize {
        segment_count.saturating_sub(self.merge_factor as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn durable(doc_count: u32) -> SegmentSummary {
        SegmentSummary {
            doc_count,
            buffered: false,
        }
    }

    fn buffered(doc_count: u32) -> SegmentSummary {
        SegmentSummary {
            doc_count,
            buffered: true,
        }
    }

    #[test]
    fn test_targets() {
        let policy = LogMergePolicy::new(10, 5000);
        assert_eq!(policy.targets().collect::<Vec<_>>(), vec![10, 100, 1000]);

        let policy = LogMergePolicy::new(10, u32::MAX);
        assert_eq!(policy.targets().count(), 9);
    }

    #[test]
    fn test_level_merge() {
        let policy = LogMergePolicy::default();

        let nine = vec![buffered(1); 9];
        assert_eq!(policy.select_level_merge(&nine, 10), None);

        let ten = vec![buffered(1); 10];
        assert_eq!(policy.select_level_merge(&ten, 10), Some(0));

        let mut stack = vec![durable(10)];
        stack.extend(vec![buffered(1); 10]);
        assert_eq!(policy.select_level_merge(&stack, 10), Some(1));
        assert_eq!(policy.select_level_merge(&[durable(10), durable(10)], 100), None);

        let mut full = vec![durable(10); 10];
        assert_eq!(policy.select_level_merge(&full, 10), None);
        assert_eq!(policy.select_level_merge(&full, 100), Some(0));
        full.insert(0, durable(100));
        assert_eq!(policy.select_level_merge(&full, 100), Some(1));
    }

    #[test]
    fn test_flush() {
        let policy = LogMergePolicy::default();

        assert_eq!(policy.select_flush(&[]), None);
        assert_eq!(policy.select_flush(&[durable(10)]), None);
        assert_eq!(policy.select_flush(&[buffered(1), buffered(1)]), Some(0));

        // 5 buffered docs on top of a full durable segment stay separate
        let mut stack = vec![durable(10), durable(10)];
        stack.extend(vec![buffered(1); 5]);
        assert_eq!(policy.select_flush(&stack), Some(2));

        // a small durable segment is folded in
        let mut stack = vec![durable(10), durable(3)];
        stack.extend(vec![buffered(1); 5]);
        assert_eq!(policy.select_flush(&stack), Some(1));
    }

    #[test]
    fn test_optimize() {
        let policy = LogMergePolicy::default();
        assert_eq!(policy.select_optimize(3), 0);
        assert_eq!(policy.select_optimize(25), 15);
    }
}
