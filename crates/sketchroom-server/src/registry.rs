//! Room registry: the authoritative state container.
//!
//! One [`Room`] per live collaboration session, stored in a `DashMap`. Every
//! mutation of a room happens while holding that room's map entry, which is
//! the per-room serialization point: two connections touching the same room
//! are ordered by the entry lock, while different rooms proceed in parallel.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::one::{Ref, RefMut};
use tokio::sync::mpsc;
use tracing::debug;

use sketchroom_core::{Action, ActionKind, ParticipantId, ParticipantInfo, ServerMessage, Snapshot};

/// Best-effort outbound handle to one participant's connection.
pub type OutboundSink = mpsc::UnboundedSender<ServerMessage>;

/// A participant registered in a room, owned exclusively by that room.
pub struct Participant {
    pub info: ParticipantInfo,
    pub sink: OutboundSink,
    /// Refreshed on every room-addressed message from this participant.
    /// `ping` carries no room or user id and leaves it untouched; liveness
    /// of the connection itself is the socket's concern.
    pub last_seen: Instant,
    /// Stroke opened by `draw_start` and not yet sealed by `draw_end`.
    /// Committed to the room history as a single action on `draw_end`, so
    /// the history length equals the number of completed strokes.
    pub pending_stroke: Option<Action>,
}

impl Participant {
    pub fn new(info: ParticipantInfo, sink: OutboundSink) -> Self {
        Self {
            info,
            sink,
            last_seen: Instant::now(),
            pending_stroke: None,
        }
    }
}

/// Authoritative per-room state.
pub struct Room {
    pub participants: HashMap<ParticipantId, Participant>,
    /// Applied actions, oldest first. Disjoint from `undone_actions`.
    pub action_history: Vec<Action>,
    /// Undone actions, LIFO; tail is the next redo candidate.
    pub undone_actions: Vec<Action>,
    /// Last known canvas image, for late joiners.
    pub canvas_snapshot: Option<Snapshot>,
    pub last_activity: Instant,
}

impl Room {
    fn new() -> Self {
        Self {
            participants: HashMap::new(),
            action_history: Vec::new(),
            undone_actions: Vec::new(),
            canvas_snapshot: None,
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Insert a participant, replacing any previous registration under the
    /// same id (a reconnect supersedes the stale connection).
    pub fn join(&mut self, participant: Participant) {
        self.participants.insert(participant.info.user_id, participant);
        self.touch();
    }

    /// Remove a participant. The room itself stays behind for the idle
    /// sweep; a brief empty period tolerates reconnects.
    pub fn leave(&mut self, user_id: ParticipantId) -> Option<Participant> {
        let gone = self.participants.remove(&user_id);
        if gone.is_some() {
            self.touch();
        }
        gone
    }

    /// Append an action to the history. Any new action invalidates the redo
    /// stack. A `DrawStart` snapshot becomes the room's current canvas image.
    pub fn record_action(&mut self, action: Action) {
        if action.kind == ActionKind::DrawStart {
            if let Some(snapshot) = &action.snapshot_at_start {
                self.canvas_snapshot = Some(snapshot.clone());
            }
        }
        self.action_history.push(action);
        self.undone_actions.clear();
        self.touch();
    }

    /// Stage a participant's opening stroke action. Starting a stroke counts
    /// as an intervening action: any redo candidates become stale now, not
    /// at commit time.
    pub fn begin_stroke(&mut self, action: Action) {
        self.undone_actions.clear();
        if let Some(participant) = self.participants.get_mut(&action.user_id) {
            participant.pending_stroke = Some(action);
        }
        self.touch();
    }

    /// Seal the participant's open stroke into the history. Returns the new
    /// history length, or `None` for an unmatched `draw_end`.
    pub fn commit_stroke(&mut self, user_id: ParticipantId) -> Option<usize> {
        let action = self.participants.get_mut(&user_id)?.pending_stroke.take()?;
        self.record_action(action);
        Some(self.action_history.len())
    }

    /// Move the most recent action onto the undone stack.
    pub fn undo(&mut self) -> Option<&Action> {
        let action = self.action_history.pop()?;
        self.undone_actions.push(action);
        self.touch();
        self.undone_actions.last()
    }

    /// Move the most recently undone action back into the history.
    pub fn redo(&mut self) -> Option<&Action> {
        let action = self.undone_actions.pop()?;
        self.action_history.push(action);
        self.touch();
        self.action_history.last()
    }

    /// Empty both stacks and drop the canvas image.
    pub fn clear(&mut self) {
        self.action_history.clear();
        self.undone_actions.clear();
        self.canvas_snapshot = None;
        self.touch();
    }

    pub fn roster(&self) -> Vec<ParticipantInfo> {
        self.participants.values().map(|p| p.info.clone()).collect()
    }

    pub fn history_count(&self) -> usize {
        self.action_history.len()
    }

    /// Best-effort fan-out to every participant except `exclude`. A send
    /// failure means that connection is closing; it is skipped, never
    /// retried, and removal happens only via the leave/disconnect path.
    pub fn broadcast(&self, exclude: Option<ParticipantId>, msg: &ServerMessage) {
        for (user_id, participant) in &self.participants {
            if Some(*user_id) == exclude {
                continue;
            }
            if participant.sink.send(msg.clone()).is_err() {
                debug!("dropping broadcast to unreachable participant {user_id}");
            }
        }
    }
}

/// Owns all live rooms. Rooms are created lazily on first join and destroyed
/// only by [`RoomRegistry::reap_idle`].
pub struct RoomRegistry {
    rooms: DashMap<String, Room>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self { rooms: DashMap::new() }
    }

    /// Idempotent lookup-or-create. The returned guard holds the room's
    /// entry lock; all mutation and fan-out for one inbound message happens
    /// under a single guard.
    pub fn get_or_create(&self, room_id: &str) -> RefMut<'_, String, Room> {
        self.rooms.entry(room_id.to_string()).or_insert_with(Room::new)
    }

    pub fn get(&self, room_id: &str) -> Option<Ref<'_, String, Room>> {
        self.rooms.get(room_id)
    }

    pub fn get_mut(&self, room_id: &str) -> Option<RefMut<'_, String, Room>> {
        self.rooms.get_mut(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Destroy rooms that are empty and have been idle at least `max_idle`.
    /// Rooms with participants are never reclaimed. Returns the number of
    /// rooms destroyed.
    pub fn reap_idle(&self, max_idle: Duration) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|room_id, room| {
            let reap = room.participants.is_empty() && room.last_activity.elapsed() >= max_idle;
            if reap {
                debug!("reaping idle room {room_id}");
            }
            !reap
        });
        before - self.rooms.len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sketchroom_core::{ActionId, Rgb, StrokeParams};

    fn participant(room: &mut Room) -> ParticipantId {
        let user_id = ParticipantId::random();
        let (tx, _rx) = mpsc::unbounded_channel();
        room.join(Participant::new(
            ParticipantInfo {
                user_id,
                username: "tester".into(),
                color: Rgb::BLACK,
            },
            tx,
        ));
        user_id
    }

    fn stroke(room: &mut Room, seq: &mut u64, user: ParticipantId) {
        *seq += 1;
        room.begin_stroke(Action::draw_start(
            ActionId(*seq),
            user,
            0,
            StrokeParams::default(),
            Some(Snapshot::new(vec![*seq as u8])),
        ));
        assert!(room.commit_stroke(user).is_some());
    }

    #[test]
    fn history_counts_completed_strokes() {
        let registry = RoomRegistry::new();
        let mut room = registry.get_or_create("r1");
        let user = participant(&mut room);
        let mut seq = 0;
        for _ in 0..3 {
            stroke(&mut room, &mut seq, user);
        }
        assert_eq!(room.history_count(), 3);
    }

    #[test]
    fn unmatched_draw_end_records_nothing() {
        let registry = RoomRegistry::new();
        let mut room = registry.get_or_create("r1");
        let user = participant(&mut room);
        assert!(room.commit_stroke(user).is_none());
        assert_eq!(room.history_count(), 0);
    }

    #[test]
    fn undo_then_redo_restores_history_exactly() {
        let registry = RoomRegistry::new();
        let mut room = registry.get_or_create("r1");
        let user = participant(&mut room);
        let mut seq = 0;
        stroke(&mut room, &mut seq, user);
        stroke(&mut room, &mut seq, user);

        let before = room.action_history.clone();
        let undone = room.undo().unwrap().action_id;
        assert_eq!(undone, ActionId(2));
        assert_eq!(room.history_count(), 1);
        assert_eq!(room.undone_actions.len(), 1);

        let redone = room.redo().unwrap().action_id;
        assert_eq!(redone, ActionId(2));
        assert_eq!(room.action_history, before);
        assert!(room.undone_actions.is_empty());
    }

    #[test]
    fn new_action_invalidates_redo() {
        let registry = RoomRegistry::new();
        let mut room = registry.get_or_create("r1");
        let user = participant(&mut room);
        let mut seq = 0;
        stroke(&mut room, &mut seq, user);
        assert!(room.undo().is_some());
        stroke(&mut room, &mut seq, user);
        assert!(room.undone_actions.is_empty());
        assert!(room.redo().is_none());
    }

    #[test]
    fn undo_redo_on_empty_stacks_are_noops() {
        let registry = RoomRegistry::new();
        let mut room = registry.get_or_create("r1");
        assert!(room.undo().is_none());
        assert!(room.redo().is_none());
    }

    #[test]
    fn clear_empties_everything() {
        let registry = RoomRegistry::new();
        let mut room = registry.get_or_create("r1");
        let user = participant(&mut room);
        let mut seq = 0;
        stroke(&mut room, &mut seq, user);
        stroke(&mut room, &mut seq, user);
        assert!(room.undo().is_some());
        assert!(room.canvas_snapshot.is_some());

        room.clear();
        assert!(room.action_history.is_empty());
        assert!(room.undone_actions.is_empty());
        assert!(room.canvas_snapshot.is_none());
    }

    #[test]
    fn committed_stroke_snapshot_becomes_room_canvas() {
        let registry = RoomRegistry::new();
        let mut room = registry.get_or_create("r1");
        let user = participant(&mut room);
        room.begin_stroke(Action::draw_start(
            ActionId(1),
            user,
            0,
            StrokeParams::default(),
            Some(Snapshot::new(vec![9, 9])),
        ));
        assert!(room.canvas_snapshot.is_none());
        room.commit_stroke(user);
        assert_eq!(room.canvas_snapshot, Some(Snapshot::new(vec![9, 9])));
    }

    #[test]
    fn reap_destroys_only_empty_idle_rooms() {
        let registry = RoomRegistry::new();
        {
            let mut occupied = registry.get_or_create("occupied");
            participant(&mut occupied);
        }
        registry.get_or_create("abandoned");
        assert_eq!(registry.room_count(), 2);

        // Zero threshold: every empty room counts as idle.
        let reaped = registry.reap_idle(Duration::ZERO);
        assert_eq!(reaped, 1);
        assert!(registry.get("abandoned").is_none());
        assert!(registry.get("occupied").is_some());
    }

    #[test]
    fn occupied_room_survives_any_idle_time() {
        let registry = RoomRegistry::new();
        {
            let mut room = registry.get_or_create("r1");
            participant(&mut room);
        }
        assert_eq!(registry.reap_idle(Duration::ZERO), 0);
        assert_eq!(registry.room_count(), 1);
    }

    #[test]
    fn leave_keeps_room_for_grace_window() {
        let registry = RoomRegistry::new();
        let user = {
            let mut room = registry.get_or_create("r1");
            participant(&mut room)
        };
        {
            let mut room = registry.get_mut("r1").unwrap();
            assert!(room.leave(user).is_some());
            assert!(room.participants.is_empty());
        }
        // Still present until the sweep runs.
        assert!(registry.get("r1").is_some());
    }
}
