//! Read-only HTTP surface for pre-flight room checks.
//!
//! Not part of the synchronization core: these endpoints let a client ask
//! whether a room exists (and how big it is) before opening the WebSocket.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use sketchroom_core::{ParticipantInfo, Snapshot};

use crate::hub::Hub;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomOverview {
    pub room_id: String,
    pub participant_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas_snapshot: Option<Snapshot>,
    pub history_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinReply {
    pub room_id: String,
    pub participants: Vec<ParticipantInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canvas_snapshot: Option<Snapshot>,
    pub history_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

/// `GET /api/room/{roomId}` — room overview, 404 if absent.
pub async fn room_info(
    Path(room_id): Path<String>,
    State(hub): State<Arc<Hub>>,
) -> impl IntoResponse {
    match hub.registry().get(&room_id) {
        Some(room) => Json(RoomOverview {
            room_id,
            participant_count: room.participants.len(),
            canvas_snapshot: room.canvas_snapshot.clone(),
            history_count: room.history_count(),
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorReply { error: "Room not found".into() }),
        )
            .into_response(),
    }
}

/// `POST /api/room/{roomId}/join` — create the room if needed and return its
/// current state. Does not register a connection; the participant only
/// becomes a room member once it joins over the WebSocket.
pub async fn room_join(
    Path(room_id): Path<String>,
    State(hub): State<Arc<Hub>>,
) -> impl IntoResponse {
    let mut room = hub.registry().get_or_create(&room_id);
    room.touch();
    Json(JoinReply {
        room_id: room_id.clone(),
        participants: room.roster(),
        canvas_snapshot: room.canvas_snapshot.clone(),
        history_count: room.history_count(),
    })
}
