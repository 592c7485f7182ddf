/// LiveBuffer Range Calculator
///
/// Turns a newly visible index window into the slice of rows that must be
/// requested. The slice always covers every unfetched slot in the window and
/// is then widened, one slot at a time alternating before/after, so a single
/// request also brings in rows that are likely to scroll into view next.

use crate::buffer::Buffer;
use serde::{Deserialize, Serialize};

/// Inclusive `[start, end]` window of slot indices the renderer needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleRange {
    pub start: usize,
    pub end: usize,
}

impl VisibleRange {
    pub fn new(start: usize, end: usize) -> Self {
        VisibleRange { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// Clamp to a buffer of `count` slots, keeping the window size when it
    /// has to slide back. None for an empty buffer.
    pub fn clamp_to(&self, count: usize) -> Option<VisibleRange> {
        if count == 0 {
            return None;
        }
        let last = count - 1;
        let size = self.len().min(count);
        let end = self.end.min(last);
        let start = self.start.min(end + 1 - size);
        Some(VisibleRange { start, end })
    }
}

/// A request slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRange {
    pub offset: usize,
    pub limit: usize,
}

pub struct RangeCalculator;

impl RangeCalculator {
    /// Compute the `(offset, limit)` to fetch for the visible window
    /// `[start, end]`, or None when every slot in it is populated.
    ///
    /// Widening stops when the limit reaches `max(ideal_request_size, window
    /// size)`, when both neighbors of the slice are populated, or when the
    /// side whose turn it is has reached the edge of the buffer.
    pub fn plan(
        buffer: &Buffer,
        ideal_request_size: usize,
        start: usize,
        end: usize,
    ) -> Option<FetchRange> {
        Self::plan_with(buffer.len(), |i| buffer.is_unfetched(i), ideal_request_size, start, end)
    }

    /// Plan against `count` slots that are all unfetched, as after a reset.
    pub fn plan_unfetched(
        count: usize,
        ideal_request_size: usize,
        start: usize,
        end: usize,
    ) -> Option<FetchRange> {
        Self::plan_with(count, |i| i < count, ideal_request_size, start, end)
    }

    fn plan_with<F>(
        len: usize,
        is_unfetched: F,
        ideal_request_size: usize,
        start: usize,
        end: usize,
    ) -> Option<FetchRange>
    where
        F: Fn(usize) -> bool,
    {
        if len == 0 || start > end {
            return None;
        }
        let end = end.min(len - 1);
        if start > end {
            return None;
        }

        let first = (start..=end).find(|&i| is_unfetched(i))?;
        let last = (first..=end).rev().find(|&i| is_unfetched(i))?;

        let mut offset = first;
        let mut limit = last - first + 1;
        let target = ideal_request_size.max(end - start + 1);

        let mut before_turn = true;
        while limit < target {
            let before_open = offset > 0 && is_unfetched(offset - 1);
            let after_open = is_unfetched(offset + limit);
            if !before_open && !after_open {
                break;
            }

            if before_turn {
                if offset == 0 {
                    break;
                }
                offset -= 1;
            } else if offset + limit >= len {
                break;
            }
            limit += 1;
            before_turn = !before_turn;
        }

        log::trace!(
            "planned fetch offset={} limit={} for window [{}, {}]",
            offset,
            limit,
            start,
            end
        );
        Some(FetchRange { offset, limit })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageHint;
    use crate::row::Row;
    use proptest::prelude::*;

    fn buffer_with(count: usize, populated: &[usize]) -> Buffer {
        let mut buffer = Buffer::with_count(count, StorageHint::FastUpdates);
        for &index in populated {
            buffer.fill(index, vec![Row::new(index as u64 + 1, index as f64 + 1.0)]);
        }
        buffer
    }

    #[test]
    fn test_fully_populated_window_needs_nothing() {
        let buffer = buffer_with(6, &[0, 1, 2, 3]);
        assert_eq!(RangeCalculator::plan(&buffer, 4, 0, 3), None);
    }

    #[test]
    fn test_initial_window_at_top() {
        let buffer = buffer_with(14, &[]);
        assert_eq!(
            RangeCalculator::plan(&buffer, 4, 0, 1),
            Some(FetchRange { offset: 0, limit: 2 })
        );
    }

    #[test]
    fn test_range_coalescing_absorbs_neighbors() {
        // Rows 1-6 and 10-13 loaded out of 14
        let buffer = buffer_with(14, &[0, 1, 2, 3, 4, 5, 9, 10, 11, 12]);
        assert_eq!(
            RangeCalculator::plan(&buffer, 4, 8, 11),
            Some(FetchRange { offset: 6, limit: 4 })
        );
    }

    #[test]
    fn test_widening_alternates_in_middle() {
        let buffer = buffer_with(100, &[]);
        assert_eq!(
            RangeCalculator::plan(&buffer, 10, 50, 51),
            Some(FetchRange { offset: 46, limit: 10 })
        );
    }

    #[test]
    fn test_large_window_exceeds_request_size() {
        let buffer = buffer_with(100, &[]);
        assert_eq!(
            RangeCalculator::plan(&buffer, 4, 10, 29),
            Some(FetchRange { offset: 10, limit: 20 })
        );
    }

    #[test]
    fn test_stops_between_populated_neighbors() {
        let buffer = buffer_with(10, &[3, 6]);
        assert_eq!(
            RangeCalculator::plan(&buffer, 8, 4, 5),
            Some(FetchRange { offset: 4, limit: 2 })
        );
    }

    #[test]
    fn test_window_clamped_to_buffer_end() {
        let buffer = buffer_with(5, &[]);
        let plan = RangeCalculator::plan(&buffer, 10, 3, 40).unwrap();
        assert!(plan.offset + plan.limit <= 5);
        assert!(plan.offset <= 3);
        assert_eq!(RangeCalculator::plan(&buffer, 10, 7, 9), None);
    }

    #[test]
    fn test_plan_unfetched_matches_empty_buffer() {
        let buffer = buffer_with(100, &[]);
        for (start, end) in [(0, 1), (50, 51), (95, 99), (10, 29)] {
            assert_eq!(
                RangeCalculator::plan_unfetched(100, 10, start, end),
                RangeCalculator::plan(&buffer, 10, start, end)
            );
        }
        assert_eq!(RangeCalculator::plan_unfetched(0, 10, 0, 5), None);
    }

    #[test]
    fn test_visible_range_clamp_keeps_size() {
        assert_eq!(
            VisibleRange::new(90, 99).clamp_to(50),
            Some(VisibleRange::new(40, 49))
        );
        assert_eq!(
            VisibleRange::new(0, 99).clamp_to(5),
            Some(VisibleRange::new(0, 4))
        );
        assert_eq!(VisibleRange::new(0, 9).clamp_to(0), None);
    }

    proptest! {
        #[test]
        fn prop_plan_stays_in_bounds_and_covers_window(
            count in 1usize..80,
            populated in proptest::collection::vec(any::<bool>(), 80),
            start in 0usize..80,
            span in 0usize..20,
            ideal in 1usize..30,
        ) {
            let indices: Vec<usize> = (0..count).filter(|&i| populated[i]).collect();
            let buffer = buffer_with(count, &indices);
            let end = start + span;
            let window_has_gap = (start..=end.min(count - 1)).any(|i| buffer.is_unfetched(i));

            match RangeCalculator::plan(&buffer, ideal, start, end) {
                None => prop_assert!(!window_has_gap),
                Some(plan) => {
                    prop_assert!(window_has_gap);
                    prop_assert!(plan.limit > 0);
                    prop_assert!(plan.offset + plan.limit <= count);
                    for i in start..=end.min(count - 1) {
                        if buffer.is_unfetched(i) {
                            prop_assert!(i >= plan.offset && i < plan.offset + plan.limit);
                        }
                    }
                }
            }
        }
    }
}
