//! Synchronization hub: the single authority between inbound client
//! messages and room state.
//!
//! One hub serves every room; routing is keyed by the `roomId` carried in
//! each message. Each inbound message performs at most one room mutation and
//! its fan-out under a single room entry guard, so all messages touching one
//! room are applied strictly in arrival order while distinct rooms proceed
//! in parallel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use sketchroom_core::{
    Action, ActionId, ClientMessage, ParticipantId, ParticipantInfo, ServerMessage,
};

use crate::registry::{OutboundSink, Participant, RoomRegistry};

/// Shared hub state: the room registry plus the action id sequence.
pub struct Hub {
    registry: RoomRegistry,
    next_action_id: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            registry: RoomRegistry::new(),
            next_action_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &RoomRegistry {
        &self.registry
    }

    fn alloc_action_id(&self) -> ActionId {
        ActionId(self.next_action_id.fetch_add(1, Ordering::Relaxed))
    }

    fn now_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Process one inbound message from the connection that owns `sink`.
    ///
    /// Failures never propagate: a message referencing an unknown room is
    /// dropped with a log line, and an empty undo/redo stack produces no
    /// broadcast at all.
    pub fn handle_message(&self, sink: &OutboundSink, msg: ClientMessage) {
        match msg {
            ClientMessage::Join { room_id, user_id, username, color } => {
                self.handle_join(sink, room_id, user_id, username, color);
            }
            ClientMessage::DrawStart { room_id, user_id, x, y, stroke, snapshot } => {
                let Some(mut room) = self.registry.get_mut(&room_id) else {
                    return Self::unknown_room(&room_id, "draw_start");
                };
                room.begin_stroke(Action::draw_start(
                    self.alloc_action_id(),
                    user_id,
                    Self::now_ms(),
                    stroke,
                    snapshot,
                ));
                Self::mark_seen(&mut room, user_id);
                // Peers apply the stroke directly; the canonical action
                // (and its snapshot) lives only here, for later undo.
                room.broadcast(
                    Some(user_id),
                    &ServerMessage::DrawStart { user_id, x, y, stroke },
                );
            }
            ClientMessage::Draw { room_id, user_id, x, y, stroke } => {
                let Some(mut room) = self.registry.get_mut(&room_id) else {
                    return Self::unknown_room(&room_id, "draw");
                };
                Self::mark_seen(&mut room, user_id);
                room.broadcast(Some(user_id), &ServerMessage::Draw { user_id, x, y, stroke });
            }
            ClientMessage::DrawEnd { room_id, user_id } => {
                let Some(mut room) = self.registry.get_mut(&room_id) else {
                    return Self::unknown_room(&room_id, "draw_end");
                };
                Self::mark_seen(&mut room, user_id);
                let Some(count) = room.commit_stroke(user_id) else {
                    debug!("dropping draw_end without matching draw_start in room {room_id}");
                    return;
                };
                // Everyone, sender included, so undo/redo controls refresh.
                room.broadcast(None, &ServerMessage::HistoryCountChanged { count });
            }
            ClientMessage::CursorMove { room_id, user_id, username, x, y, color } => {
                let Some(mut room) = self.registry.get_mut(&room_id) else {
                    return Self::unknown_room(&room_id, "cursor_move");
                };
                Self::mark_seen(&mut room, user_id);
                room.broadcast(
                    Some(user_id),
                    &ServerMessage::CursorMove { user_id, username, x, y, color },
                );
            }
            ClientMessage::ClearCanvas { room_id, user_id } => {
                let Some(mut room) = self.registry.get_mut(&room_id) else {
                    return Self::unknown_room(&room_id, "clear_canvas");
                };
                room.clear();
                Self::mark_seen(&mut room, user_id);
                room.broadcast(Some(user_id), &ServerMessage::CanvasCleared);
                room.broadcast(None, &ServerMessage::HistoryCountChanged { count: 0 });
            }
            ClientMessage::Undo { room_id, user_id } => {
                let Some(mut room) = self.registry.get_mut(&room_id) else {
                    return Self::unknown_room(&room_id, "undo");
                };
                Self::mark_seen(&mut room, user_id);
                // Empty stack: stale request, the requester's own button
                // state already reflects it. No broadcast.
                let Some(action_id) = room.undo().map(|a| a.action_id) else {
                    return;
                };
                room.broadcast(Some(user_id), &ServerMessage::Undo { user_id, action_id });
                let count = room.history_count();
                room.broadcast(None, &ServerMessage::HistoryCountChanged { count });
            }
            ClientMessage::Redo { room_id, user_id } => {
                let Some(mut room) = self.registry.get_mut(&room_id) else {
                    return Self::unknown_room(&room_id, "redo");
                };
                Self::mark_seen(&mut room, user_id);
                let Some(action_id) = room.redo().map(|a| a.action_id) else {
                    return;
                };
                room.broadcast(Some(user_id), &ServerMessage::Redo { user_id, action_id });
                let count = room.history_count();
                room.broadcast(None, &ServerMessage::HistoryCountChanged { count });
            }
            ClientMessage::Ping { timestamp } => {
                let pong = ServerMessage::Pong {
                    timestamp: Self::now_ms(),
                    client_timestamp: timestamp,
                };
                if sink.send(pong).is_err() {
                    debug!("pong to closing connection dropped");
                }
            }
            ClientMessage::Leave { room_id, user_id } => {
                self.remove_participant(&room_id, user_id);
            }
        }
    }

    fn handle_join(
        &self,
        sink: &OutboundSink,
        room_id: String,
        user_id: ParticipantId,
        username: String,
        color: sketchroom_core::Rgb,
    ) {
        let mut room = self.registry.get_or_create(&room_id);
        let info = ParticipantInfo { user_id, username: username.clone(), color };
        room.join(Participant::new(info, sink.clone()));
        info!("participant {user_id} joined room {room_id}");

        let initial = ServerMessage::InitialState {
            room_id,
            participants: room.roster(),
            canvas_snapshot: room.canvas_snapshot.clone(),
            history_count: room.history_count(),
        };
        if sink.send(initial).is_err() {
            debug!("initial_state to closing connection dropped");
        }

        room.broadcast(
            Some(user_id),
            &ServerMessage::ParticipantJoined {
                user_id,
                username,
                color,
                participants: room.roster(),
            },
        );
    }

    /// Shared by explicit `leave` and connection close.
    pub fn remove_participant(&self, room_id: &str, user_id: ParticipantId) {
        let Some(mut room) = self.registry.get_mut(room_id) else {
            return Self::unknown_room(room_id, "leave");
        };
        if room.leave(user_id).is_none() {
            return;
        }
        info!("participant {user_id} left room {room_id}");
        room.broadcast(
            Some(user_id),
            &ServerMessage::ParticipantLeft {
                user_id,
                participants: room.roster(),
            },
        );
    }

    fn mark_seen(room: &mut crate::registry::Room, user_id: ParticipantId) {
        if let Some(participant) = room.participants.get_mut(&user_id) {
            participant.last_seen = Instant::now();
        }
    }

    fn unknown_room(room_id: &str, kind: &str) {
        debug!("dropping {kind} for unknown room {room_id}");
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<Hub>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Serve one WebSocket connection until it closes.
///
/// A writer task drains this connection's outbound queue onto the socket;
/// the reader loop parses and dispatches inbound messages. A dropped
/// connection is an implicit leave.
async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (sink, mut outbound) = tokio::sync::mpsc::unbounded_channel::<ServerMessage>();

    let writer = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(err) => {
                    warn!("failed to encode outbound message: {err}");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // The room/participant this connection registered via `join`, for
    // implicit leave on disconnect.
    let mut session: Option<(String, ParticipantId)> = None;

    while let Some(result) = ws_rx.next().await {
        let msg = match result {
            Ok(msg) => msg,
            Err(err) => {
                debug!("websocket error: {err}");
                break;
            }
        };
        match msg {
            Message::Text(text) => match ClientMessage::from_json(&text) {
                Ok(client_msg) => {
                    track_session(&hub, &mut session, &client_msg);
                    hub.handle_message(&sink, client_msg);
                }
                Err(err) => {
                    warn!("dropping malformed message: {err}");
                }
            },
            Message::Close(_) => break,
            // Transport-level ping/pong and binary frames are not part of
            // the protocol.
            _ => {}
        }
    }

    if let Some((room_id, user_id)) = session {
        hub.remove_participant(&room_id, user_id);
    }
    drop(sink);
    let _ = writer.await;
}

/// Update a connection's tracked membership from an inbound message.
///
/// Tracking ends only on a `leave` addressing the joined room: a `leave`
/// naming some other room is a no-op on room state, so dropping the
/// tracking for it would skip the implicit-leave cleanup on disconnect
/// and strand the participant (blocking reclamation) forever.
fn track_session(
    hub: &Hub,
    session: &mut Option<(String, ParticipantId)>,
    msg: &ClientMessage,
) {
    match msg {
        ClientMessage::Join { room_id, user_id, .. } => {
            // Joining a second room supersedes the first.
            if let Some((old_room, old_user)) = session.take() {
                hub.remove_participant(&old_room, old_user);
            }
            *session = Some((room_id.clone(), *user_id));
        }
        ClientMessage::Leave { room_id, .. } => {
            if session.as_ref().is_some_and(|(joined, _)| joined == room_id) {
                *session = None;
            }
        }
        _ => {}
    }
}
