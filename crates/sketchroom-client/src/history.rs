//! Bounded local snapshot history for client-side undo/redo.

use std::collections::VecDeque;

use sketchroom_core::Snapshot;

/// Maximum retained snapshots; committing past this evicts the oldest.
pub const HISTORY_CAPACITY: usize = 50;

/// Outcome of an undo/redo step, to be applied to the canvas surface.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryStep {
    /// Display this snapshot.
    Restore(Snapshot),
    /// Stepped back past the oldest entry: show a blank canvas.
    Blank,
    /// Nothing to do.
    Noop,
}

/// A ring of full-canvas snapshots with a pointer selecting the currently
/// displayed state. `pointer == None` means the blank pre-history canvas.
#[derive(Debug, Default)]
pub struct LocalHistory {
    entries: VecDeque<Snapshot>,
    pointer: Option<usize>,
}

impl LocalHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if an undo step would change the displayed state.
    pub fn can_undo(&self) -> bool {
        self.pointer.is_some()
    }

    /// True if a redo step would change the displayed state.
    pub fn can_redo(&self) -> bool {
        match self.pointer {
            Some(p) => p + 1 < self.entries.len(),
            None => !self.entries.is_empty(),
        }
    }

    /// Commit a fresh snapshot at the current position. Entries beyond the
    /// pointer (undone states) are truncated first; overflow evicts the
    /// oldest entry and shifts the pointer.
    pub fn commit(&mut self, snapshot: Snapshot) {
        match self.pointer {
            Some(p) => self.entries.truncate(p + 1),
            None => self.entries.clear(),
        }
        self.entries.push_back(snapshot);
        if self.entries.len() > HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.pointer = Some(self.entries.len() - 1);
    }

    /// Step back one state.
    pub fn undo(&mut self) -> HistoryStep {
        match self.pointer {
            Some(0) => {
                self.pointer = None;
                HistoryStep::Blank
            }
            Some(p) => {
                self.pointer = Some(p - 1);
                HistoryStep::Restore(self.entries[p - 1].clone())
            }
            None => HistoryStep::Noop,
        }
    }

    /// Step forward one state.
    pub fn redo(&mut self) -> HistoryStep {
        let next = match self.pointer {
            Some(p) if p + 1 < self.entries.len() => p + 1,
            None if !self.entries.is_empty() => 0,
            _ => return HistoryStep::Noop,
        };
        self.pointer = Some(next);
        HistoryStep::Restore(self.entries[next].clone())
    }

    /// Forget everything (canvas cleared or re-synced from the server).
    pub fn reset(&mut self) {
        self.entries.clear();
        self.pointer = None;
    }
}
