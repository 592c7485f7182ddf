/// LiveBuffer Row Index Resolver
///
/// Locates a row inside a sparse buffer with the view's comparator. Large
/// parts of a buffer are unfetched, so a position often cannot be proven
/// without fetching; every answer therefore carries a certainty flag.
///
/// A position is certain when the slot before it is populated (or is the
/// start of the buffer) and the slot at it is populated (or is the end of
/// the buffer). The row's own slot is ignored in both scans, so an updated
/// row can be located while its old version is still in the buffer.
///
/// # Examples
///
/// ```
/// use livebuffer::{Buffer, Row, RowComparator, RowIndexResolver, StorageHint};
///
/// let mut buffer = Buffer::with_count(3, StorageHint::FastReads);
/// buffer.fill(0, vec![Row::new(1, 1.0), Row::new(3, 3.0)]);
///
/// let at = RowIndexResolver::locate_insertion_point(&buffer, &RowComparator::by_order(), &Row::new(2, 2.0));
/// assert_eq!(at.index, 1);
/// assert!(at.is_certain);
/// ```

use crate::buffer::{Buffer, Slot};
use crate::row::Row;
use crate::sort::RowComparator;
use std::cmp::Ordering;

/// A computed slot index plus whether it is provably correct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLocation {
    pub index: usize,
    pub is_certain: bool,
}

impl RowLocation {
    pub fn certain(index: usize) -> Self {
        RowLocation {
            index,
            is_certain: true,
        }
    }

    pub fn uncertain(index: usize) -> Self {
        RowLocation {
            index,
            is_certain: false,
        }
    }
}

pub struct RowIndexResolver;

impl RowIndexResolver {
    /// Where `row` would be inserted: before the first populated slot that
    /// sorts after it, or at the end of the buffer.
    ///
    /// At the end of the buffer the position is certain only when the last
    /// slot is populated; a trailing unfetched slot might hold a row that
    /// sorts after this one.
    pub fn locate_insertion_point(buffer: &Buffer, comparator: &RowComparator, row: &Row) -> RowLocation {
        // Whether the nearest preceding slot (own slot excluded) is known
        let mut previous_known = true;

        for (index, slot) in buffer.iter().enumerate() {
            match slot {
                Slot::Row(other) if other.id == row.id => continue,
                Slot::Row(other) => {
                    if comparator.compare(row, other) == Ordering::Less {
                        log::trace!(
                            "row {} goes before row {} at {} (certain={})",
                            row.id,
                            other.id,
                            index,
                            previous_known
                        );
                        return RowLocation {
                            index,
                            is_certain: previous_known,
                        };
                    }
                    previous_known = true;
                }
                Slot::Unfetched => previous_known = false,
            }
        }

        RowLocation {
            index: buffer.len(),
            is_certain: previous_known,
        }
    }

    /// The slot holding `row`. A populated slot with the same id is certain.
    /// Otherwise the row is presumed to sit behind the unfetched slot just
    /// before its insertion point, which is returned as an uncertain estimate.
    ///
    /// Returns None when no unfetched slot could be hiding the row, meaning
    /// it is provably not in the buffer.
    pub fn locate_existing(buffer: &Buffer, comparator: &RowComparator, row: &Row) -> Option<RowLocation> {
        if let Some(index) = buffer.position_of(row.id) {
            return Some(RowLocation::certain(index));
        }

        let point = Self::locate_insertion_point(buffer, comparator, row);
        if point.is_certain {
            return None;
        }
        // An uncertain point always follows an unfetched slot
        Some(RowLocation::uncertain(point.index - 1))
    }
}
