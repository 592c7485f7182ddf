/// LiveBuffer Drag Reorder
///
/// State machine for manually reordering one row:
///
/// ```text
/// idle -> dragging -> committing -> idle
///                  \-> (revert)  -> idle
/// ```
///
/// While dragging, the row is spliced around the buffer locally with no
/// server involvement. On stop the final successor is compared with the one
/// recorded at start; only a changed successor is committed. A failed commit
/// and a cancellation both put the row back before its original successor.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::row::RowId;

/// What follows a row in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Successor {
    Row(RowId),
    /// The row is last.
    End,
    /// An unfetched slot follows, so the successor is not known.
    Unknown,
}

impl Successor {
    fn at(buffer: &Buffer, index: usize) -> Successor {
        match buffer.get(index + 1) {
            None => Successor::End,
            Some(slot) => slot.id().map(Successor::Row).unwrap_or(Successor::Unknown),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging {
        row: RowId,
        original_successor: Successor,
        original_index: usize,
    },
    Committing {
        row: RowId,
        original_successor: Successor,
        original_index: usize,
    },
}

/// Outcome of `stop_drag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragDecision {
    /// Dropped where it started; nothing to send.
    Unchanged,
    /// Send a move of `row` before `before` (None = to the end).
    Commit { row: RowId, before: Option<RowId> },
    /// Dropped next to an unfetched slot; the move was undone locally.
    Reverted,
}

#[derive(Debug, Clone)]
pub struct DragReorderController {
    state: DragState,
}

impl Default for DragReorderController {
    fn default() -> Self {
        Self::new()
    }
}

impl DragReorderController {
    pub fn new() -> Self {
        DragReorderController {
            state: DragState::Idle,
        }
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn dragged_row(&self) -> Option<RowId> {
        match self.state {
            DragState::Idle => None,
            DragState::Dragging { row, .. } | DragState::Committing { row, .. } => Some(row),
        }
    }

    /// Record the row's current successor and mark it dragging.
    pub fn start_drag(&mut self, buffer: &mut Buffer, row: RowId) -> Result<()> {
        if let Some(active) = self.dragged_row() {
            return Err(Error::DragInProgress(active));
        }
        let index = buffer.position_of(row).ok_or(Error::RowNotFound(row))?;
        let original_successor = Successor::at(buffer, index);
        buffer.update_row(index, |r| r.meta.dragging = true);
        self.state = DragState::Dragging {
            row,
            original_successor,
            original_index: index,
        };
        log::debug!("drag started for row {} at {}", row, index);
        Ok(())
    }

    /// Splice the dragged row to `target` (remove-then-insert semantics).
    pub fn force_move_row_to(&mut self, buffer: &mut Buffer, target: usize) -> Result<()> {
        let row = self.dragging_row()?;
        let from = buffer.position_of(row).ok_or(Error::RowNotFound(row))?;
        buffer.move_slot(from, target);
        Ok(())
    }

    /// Splice the dragged row directly before `before`, or to the end.
    pub fn force_move_row_before(&mut self, buffer: &mut Buffer, before: Option<RowId>) -> Result<()> {
        let row = self.dragging_row()?;
        Self::place_before(buffer, row, before)
    }

    /// End the drag and decide whether a server move is needed.
    pub fn stop_drag(&mut self, buffer: &mut Buffer) -> Result<DragDecision> {
        let DragState::Dragging {
            row,
            original_successor,
            original_index,
        } = self.state
        else {
            return Err(Error::DragNotActive);
        };

        let index = buffer.position_of(row).ok_or(Error::RowNotFound(row))?;
        buffer.update_row(index, |r| r.meta.dragging = false);
        let successor = Successor::at(buffer, index);

        if successor == original_successor {
            self.state = DragState::Idle;
            return Ok(DragDecision::Unchanged);
        }

        let before = match successor {
            Successor::Row(id) => Some(id),
            Successor::End => None,
            Successor::Unknown => {
                log::debug!("row {} dropped next to an unfetched slot, reverting", row);
                self.state = DragState::Idle;
                Self::restore(buffer, row, original_successor, original_index);
                return Ok(DragDecision::Reverted);
            }
        };

        self.state = DragState::Committing {
            row,
            original_successor,
            original_index,
        };
        Ok(DragDecision::Commit { row, before })
    }

    /// The server accepted the move.
    pub fn commit_succeeded(&mut self) {
        if matches!(self.state, DragState::Committing { .. }) {
            self.state = DragState::Idle;
        }
    }

    /// The server rejected the move: put the row back.
    pub fn commit_failed(&mut self, buffer: &mut Buffer) {
        if let DragState::Committing {
            row,
            original_successor,
            original_index,
        } = self.state
        {
            log::debug!("move of row {} failed, rolling back", row);
            Self::restore(buffer, row, original_successor, original_index);
            self.state = DragState::Idle;
        }
    }

    /// Abort the drag without contacting the server.
    pub fn cancel(&mut self, buffer: &mut Buffer) -> Result<()> {
        let DragState::Dragging {
            row,
            original_successor,
            original_index,
        } = self.state
        else {
            return Err(Error::DragNotActive);
        };
        if let Some(index) = buffer.position_of(row) {
            buffer.update_row(index, |r| r.meta.dragging = false);
        }
        Self::restore(buffer, row, original_successor, original_index);
        self.state = DragState::Idle;
        Ok(())
    }

    fn dragging_row(&self) -> Result<RowId> {
        match self.state {
            DragState::Dragging { row, .. } => Ok(row),
            _ => Err(Error::DragNotActive),
        }
    }

    fn place_before(buffer: &mut Buffer, row: RowId, before: Option<RowId>) -> Result<()> {
        let from = buffer.position_of(row).ok_or(Error::RowNotFound(row))?;
        let target = match before {
            Some(id) => {
                let at = buffer.position_of(id).ok_or(Error::RowNotFound(id))?;
                if at > from {
                    at - 1
                } else {
                    at
                }
            }
            None => buffer.len().saturating_sub(1),
        };
        buffer.move_slot(from, target);
        Ok(())
    }

    /// Put `row` back before its original successor. When that successor is
    /// unknown or gone, fall back to the original index.
    fn restore(buffer: &mut Buffer, row: RowId, successor: Successor, index: usize) {
        let restored = match successor {
            Successor::Row(id) => Self::place_before(buffer, row, Some(id)).is_ok(),
            Successor::End => Self::place_before(buffer, row, None).is_ok(),
            Successor::Unknown => false,
        };
        if !restored {
            if let Some(from) = buffer.position_of(row) {
                buffer.move_slot(from, index);
            }
        }
    }
}
