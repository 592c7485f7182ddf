/// LiveBuffer Mutation Reconciler
///
/// Applies "created", "updated", "deleted" and "moved" events to a buffer,
/// whether they come from the local user or from a collaborator. Each event
/// is a pure state transition: it never fails and never touches the network.
///
/// The buffer's length is the view's count. A member row that is created
/// always adds a slot, even when its position is uncertain and only an
/// unfetched placeholder can be inserted; a member row that is deleted
/// always removes one.
///
/// Rows in the buffer are replaced by key, never mutated behind a shared
/// reference. Replacements carry the previous row's annotation block over so
/// loading, drag and metadata state survive an update.

use crate::buffer::Buffer;
use crate::membership::ViewContext;
use crate::resolver::{RowIndexResolver, RowLocation};
use crate::row::Row;

/// How an event changed a row's membership of the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipChange {
    /// Not a member before, member now.
    Entered,
    /// Member before, not a member now.
    Left,
    /// Member before and after.
    Stayed,
    /// Member neither before nor after.
    Outside,
}

/// Result of reconciling one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    pub membership: MembershipChange,
    /// Where the row now lives, None when it left or never entered.
    pub location: Option<RowLocation>,
}

impl Reconciliation {
    fn outside() -> Self {
        Reconciliation {
            membership: MembershipChange::Outside,
            location: None,
        }
    }
}

pub struct MutationReconciler;

impl MutationReconciler {
    /// A row was created. Non-members are discarded. Members are inserted
    /// as a populated row when the position is certain, as an unfetched slot
    /// otherwise; either way the count grows by one.
    pub fn row_created(buffer: &mut Buffer, view: &ViewContext, row: Row) -> Reconciliation {
        let mut row = row;
        view.annotate(&mut row);
        if !view.is_visible(&row, None) {
            return Reconciliation::outside();
        }

        // Already present, e.g. the echo of our own create
        if let Some((_, existing)) = buffer.find_row(row.id) {
            let existing = existing.clone();
            return Self::row_updated(buffer, view, &existing, row);
        }

        let location = Self::insert(buffer, view, row);
        Reconciliation {
            membership: MembershipChange::Entered,
            location: Some(location),
        }
    }

    /// A row changed from `old` to `new`. Membership is evaluated for both
    /// states before anything is touched.
    pub fn row_updated(buffer: &mut Buffer, view: &ViewContext, old: &Row, new: Row) -> Reconciliation {
        let was_member = view.is_visible(old, None);
        let is_member = view.is_visible(&new, None);

        match (was_member, is_member) {
            (true, true) => Self::reposition(buffer, view, old, new),
            (true, false) => {
                let removed = Self::remove(buffer, view, old);
                if removed.is_none() {
                    log::warn!("row {} left the view but had no slot to remove", old.id);
                }
                Reconciliation {
                    membership: MembershipChange::Left,
                    location: None,
                }
            }
            (false, true) => {
                let mut reconciled = Self::row_created(buffer, view, new);
                reconciled.membership = MembershipChange::Entered;
                reconciled
            }
            (false, false) => Reconciliation::outside(),
        }
    }

    /// A member row was deleted. The slot found for it is removed even if it
    /// is only an estimate; a wrong estimate is corrected by the next fetch
    /// of that region.
    pub fn row_deleted(buffer: &mut Buffer, view: &ViewContext, row: &Row) -> Reconciliation {
        if !view.is_visible(row, None) {
            return Reconciliation::outside();
        }
        if Self::remove(buffer, view, row).is_none() {
            log::warn!("deleted row {} is a member but has no slot", row.id);
        }
        Reconciliation {
            membership: MembershipChange::Left,
            location: None,
        }
    }

    /// A row was moved to a new `order`. Membership can't change, only the
    /// position, so this is an update of the order value.
    pub fn row_moved(buffer: &mut Buffer, view: &ViewContext, old: &Row, new: Row) -> Reconciliation {
        Self::row_updated(buffer, view, old, new)
    }

    /// Member before and after. With both positions certain the row is
    /// replaced in place and moved; otherwise the old slot is removed and
    /// the row re-inserted so it never sits at a stale position.
    fn reposition(buffer: &mut Buffer, view: &ViewContext, old: &Row, new: Row) -> Reconciliation {
        let comparator = view.comparator();
        let mut new = new;

        let Some(old_location) = RowIndexResolver::locate_existing(buffer, comparator, old) else {
            log::warn!("updated row {} is a member but has no slot", old.id);
            return Reconciliation {
                membership: MembershipChange::Stayed,
                location: None,
            };
        };

        if let Some(existing) = buffer.row(old_location.index).filter(|r| r.id == new.id) {
            new.meta = existing.meta.clone();
        }
        view.annotate(&mut new);

        let new_location = RowIndexResolver::locate_insertion_point(buffer, comparator, &new);
        if old_location.is_certain && new_location.is_certain {
            let from = old_location.index;
            let to = if new_location.index > from {
                new_location.index - 1
            } else {
                new_location.index
            };
            buffer.replace_row(from, new);
            if to != from {
                buffer.move_slot(from, to);
            }
            return Reconciliation {
                membership: MembershipChange::Stayed,
                location: Some(RowLocation::certain(to)),
            };
        }

        buffer.remove(old_location.index);
        let location = Self::insert(buffer, view, new);
        Reconciliation {
            membership: MembershipChange::Stayed,
            location: Some(location),
        }
    }

    fn insert(buffer: &mut Buffer, view: &ViewContext, row: Row) -> RowLocation {
        let location = RowIndexResolver::locate_insertion_point(buffer, view.comparator(), &row);
        if location.is_certain {
            buffer.insert_row(location.index, row);
        } else {
            log::debug!(
                "row {} position uncertain, reserving unfetched slot at {}",
                row.id,
                location.index
            );
            buffer.insert_unfetched(location.index);
        }
        location
    }

    fn remove(buffer: &mut Buffer, view: &ViewContext, row: &Row) -> Option<RowLocation> {
        let location = RowIndexResolver::locate_existing(buffer, view.comparator(), row)?;
        buffer.remove(location.index);
        Some(location)
    }
}
