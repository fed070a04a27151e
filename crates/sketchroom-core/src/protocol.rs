//! Wire protocol between client and server.
//!
//! Messages are JSON objects with a `"type"` discriminator and camelCase
//! payload fields, e.g.
//! ```json
//! { "type": "join", "roomId": "r1", "userId": "...", "username": "ada", "color": "#ff0080" }
//! { "type": "draw", "roomId": "r1", "userId": "...", "x": 10.0, "y": 4.5,
//!   "color": "#000000", "brushSize": 5.0, "opacity": 1.0, "tool": "brush" }
//! ```
//! The same envelope travels in both directions over a persistent
//! bidirectional channel; framing and connection upgrade are the
//! transport's concern.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::action::{ActionId, StrokeParams};
use crate::participant::{ParticipantId, ParticipantInfo};
use crate::snapshot::Snapshot;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Messages sent from a client to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Join a room, creating it if absent.
    #[serde(rename_all = "camelCase")]
    Join {
        room_id: String,
        user_id: ParticipantId,
        username: String,
        color: crate::color::Rgb,
    },
    /// Begin a stroke. Carries the sender's pre-stroke canvas snapshot so
    /// the server can restore state on undo.
    #[serde(rename_all = "camelCase")]
    DrawStart {
        room_id: String,
        user_id: ParticipantId,
        x: f64,
        y: f64,
        #[serde(flatten)]
        stroke: StrokeParams,
        #[serde(skip_serializing_if = "Option::is_none")]
        snapshot: Option<Snapshot>,
    },
    /// One incremental stroke point. Relayed, never recorded.
    #[serde(rename_all = "camelCase")]
    Draw {
        room_id: String,
        user_id: ParticipantId,
        x: f64,
        y: f64,
        #[serde(flatten)]
        stroke: StrokeParams,
    },
    /// Finish the current stroke.
    #[serde(rename_all = "camelCase")]
    DrawEnd {
        room_id: String,
        user_id: ParticipantId,
    },
    /// Cursor position update for remote-cursor display. Pure relay.
    #[serde(rename_all = "camelCase")]
    CursorMove {
        room_id: String,
        user_id: ParticipantId,
        username: String,
        x: f64,
        y: f64,
        color: crate::color::Rgb,
    },
    /// Wipe the shared canvas and both history stacks.
    #[serde(rename_all = "camelCase")]
    ClearCanvas {
        room_id: String,
        user_id: ParticipantId,
    },
    /// Revert the most recent action in the room (any author).
    #[serde(rename_all = "camelCase")]
    Undo {
        room_id: String,
        user_id: ParticipantId,
    },
    /// Re-apply the most recently undone action.
    #[serde(rename_all = "camelCase")]
    Redo {
        room_id: String,
        user_id: ParticipantId,
    },
    /// Latency probe; answered directly with `pong`.
    Ping { timestamp: u64 },
    /// Explicit departure. Equivalent to closing the connection.
    #[serde(rename_all = "camelCase")]
    Leave {
        room_id: String,
        user_id: ParticipantId,
    },
}

impl ClientMessage {
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Messages sent from the server to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Full room state, sent once to the joining connection.
    #[serde(rename_all = "camelCase")]
    InitialState {
        room_id: String,
        participants: Vec<ParticipantInfo>,
        #[serde(skip_serializing_if = "Option::is_none")]
        canvas_snapshot: Option<Snapshot>,
        history_count: usize,
    },
    /// Another participant joined; carries the refreshed roster.
    #[serde(rename_all = "camelCase")]
    ParticipantJoined {
        user_id: ParticipantId,
        username: String,
        color: crate::color::Rgb,
        participants: Vec<ParticipantInfo>,
    },
    /// A participant left; carries the refreshed roster.
    #[serde(rename_all = "camelCase")]
    ParticipantLeft {
        user_id: ParticipantId,
        participants: Vec<ParticipantInfo>,
    },
    /// Relay of a peer's stroke start (without the pre-stroke snapshot).
    #[serde(rename_all = "camelCase")]
    DrawStart {
        user_id: ParticipantId,
        x: f64,
        y: f64,
        #[serde(flatten)]
        stroke: StrokeParams,
    },
    /// Relay of one peer stroke point.
    #[serde(rename_all = "camelCase")]
    Draw {
        user_id: ParticipantId,
        x: f64,
        y: f64,
        #[serde(flatten)]
        stroke: StrokeParams,
    },
    /// Relay of a peer cursor position.
    #[serde(rename_all = "camelCase")]
    CursorMove {
        user_id: ParticipantId,
        username: String,
        x: f64,
        y: f64,
        color: crate::color::Rgb,
    },
    /// The shared canvas was wiped.
    CanvasCleared,
    /// A recorded action was undone.
    #[serde(rename_all = "camelCase")]
    Undo {
        user_id: ParticipantId,
        action_id: ActionId,
    },
    /// An undone action was re-applied.
    #[serde(rename_all = "camelCase")]
    Redo {
        user_id: ParticipantId,
        action_id: ActionId,
    },
    /// New authoritative history length; drives undo/redo button state.
    #[serde(rename_all = "camelCase")]
    HistoryCountChanged { count: usize },
    /// Reply to `ping`, echoing the client timestamp.
    #[serde(rename_all = "camelCase")]
    Pong {
        timestamp: u64,
        client_timestamp: u64,
    },
}

impl ServerMessage {
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::Rgb;

    #[test]
    fn join_wire_format() {
        let msg = ClientMessage::Join {
            room_id: "r1".into(),
            user_id: ParticipantId::random(),
            username: "ada".into(),
            color: Rgb::new(255, 0, 128),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"join\""));
        assert!(json.contains("\"roomId\":\"r1\""));
        assert!(json.contains("\"color\":\"#ff0080\""));
        assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn draw_flattens_stroke_params() {
        let msg = ClientMessage::Draw {
            room_id: "r1".into(),
            user_id: ParticipantId::random(),
            x: 1.5,
            y: -2.0,
            stroke: StrokeParams::default(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"brushSize\":5.0"));
        assert!(json.contains("\"tool\":\"brush\""));
        assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);
    }

    #[test]
    fn history_count_changed_wire_format() {
        let json = serde_json::to_string(&ServerMessage::HistoryCountChanged { count: 3 }).unwrap();
        assert_eq!(json, r#"{"type":"history_count_changed","count":3}"#);
    }

    #[test]
    fn initial_state_omits_absent_snapshot() {
        let msg = ServerMessage::InitialState {
            room_id: "r1".into(),
            participants: vec![],
            canvas_snapshot: None,
            history_count: 0,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("canvasSnapshot"));
        assert!(json.contains("\"historyCount\":0"));
    }

    #[test]
    fn malformed_message_is_an_error() {
        assert!(ClientMessage::from_json("{\"type\":\"warp\"}").is_err());
        assert!(ClientMessage::from_json("not json").is_err());
        // Missing required fields.
        assert!(ClientMessage::from_json("{\"type\":\"join\",\"roomId\":\"r1\"}").is_err());
    }
}
