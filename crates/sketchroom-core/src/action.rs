//! The authoritative action model.
//!
//! An [`Action`] is the immutable record of a drawing operation as seen by
//! the room authority. The hub builds one when a stroke opens and commits it
//! to the room's history when the stroke completes; afterwards it only moves
//! between the history and undone stacks, never edited in place.

use serde::{Deserialize, Serialize};

use crate::color::Rgb;
use crate::participant::ParticipantId;
use crate::snapshot::Snapshot;

/// Globally unique, monotonically ordered action identifier.
///
/// Allocated by the hub from a process-wide sequence; room state does not
/// outlive the process, so process scope is sufficient.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ActionId(pub u64);

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// The two undoable action kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    DrawStart,
    DrawEnd,
}

/// Drawing tool selected for a stroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
}

/// Stroke appearance parameters, carried by `draw_start` and `draw`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrokeParams {
    pub color: Rgb,
    pub brush_size: f64,
    pub opacity: f64,
    pub tool: Tool,
}

impl Default for StrokeParams {
    fn default() -> Self {
        Self {
            color: Rgb::BLACK,
            brush_size: 5.0,
            opacity: 1.0,
            tool: Tool::Brush,
        }
    }
}

/// One entry in a room's action history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_id: ActionId,
    pub kind: ActionKind,
    pub user_id: ParticipantId,
    /// Milliseconds since the Unix epoch, assigned by the hub.
    pub created_at: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<StrokeParams>,
    /// Canvas state immediately before the stroke began. Only `DrawStart`
    /// actions carry one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_at_start: Option<Snapshot>,
}

impl Action {
    pub fn draw_start(
        action_id: ActionId,
        user_id: ParticipantId,
        created_at: u64,
        stroke: StrokeParams,
        snapshot_at_start: Option<Snapshot>,
    ) -> Self {
        Self {
            action_id,
            kind: ActionKind::DrawStart,
            user_id,
            created_at,
            stroke: Some(stroke),
            snapshot_at_start,
        }
    }

    pub fn draw_end(action_id: ActionId, user_id: ParticipantId, created_at: u64) -> Self {
        Self {
            action_id,
            kind: ActionKind::DrawEnd,
            user_id,
            created_at,
            stroke: None,
            snapshot_at_start: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_ids_order_by_sequence() {
        assert!(ActionId(1) < ActionId(2));
        assert!(ActionId(41) < ActionId(400));
    }

    #[test]
    fn draw_end_carries_no_snapshot() {
        let a = Action::draw_end(ActionId(7), ParticipantId::random(), 0);
        assert_eq!(a.kind, ActionKind::DrawEnd);
        assert!(a.snapshot_at_start.is_none());
        assert!(a.stroke.is_none());
    }

    #[test]
    fn tool_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&Tool::Eraser).unwrap(), "\"eraser\"");
    }
}
