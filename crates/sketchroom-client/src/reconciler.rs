//! The client-side mirror of the room authority.
//!
//! Local strokes render immediately and are queued for relay; remote events
//! are applied verbatim to the surface. Undo/redo reconciliation uses the
//! bounded snapshot ring in [`crate::history`].

use std::collections::HashSet;

use sketchroom_core::{
    ActionId, ClientMessage, ParticipantId, ParticipantInfo, Rgb, ServerMessage, StrokeParams,
};

use crate::history::{HistoryStep, LocalHistory};
use crate::surface::CanvasSurface;

/// Room-level happenings the application may want to surface (rosters,
/// button state, remote cursors).
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Joined {
        participants: Vec<ParticipantInfo>,
        history_count: usize,
    },
    ParticipantsChanged(Vec<ParticipantInfo>),
    HistoryCountChanged(usize),
    RemoteCursor {
        user_id: ParticipantId,
        username: String,
        x: f64,
        y: f64,
        color: Rgb,
    },
}

/// Per-canvas drawing state machine plus remote reconciliation.
///
/// Single-writer: all methods are called from the owning client's event
/// path, so no interior locking is needed.
pub struct Reconciler<S> {
    surface: S,
    history: LocalHistory,
    room_id: String,
    identity: ParticipantInfo,
    stroke: StrokeParams,
    drawing: bool,
    online: bool,
    participants: Vec<ParticipantInfo>,
    /// Authoritative history length from the last `history_count_changed`.
    history_count: usize,
    /// Action ids from remote undo broadcasts not yet redone. Guards
    /// exactly-once application of each undo/redo event.
    undone_remote: HashSet<ActionId>,
    outgoing: Vec<ClientMessage>,
}

impl<S: CanvasSurface> Reconciler<S> {
    pub fn new(surface: S, room_id: impl Into<String>, identity: ParticipantInfo) -> Self {
        Self {
            surface,
            history: LocalHistory::new(),
            room_id: room_id.into(),
            identity,
            stroke: StrokeParams::default(),
            drawing: false,
            online: false,
            participants: Vec::new(),
            history_count: 0,
            undone_remote: HashSet::new(),
            outgoing: Vec::new(),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn participants(&self) -> &[ParticipantInfo] {
        &self.participants
    }

    pub fn history_count(&self) -> usize {
        self.history_count
    }

    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Stroke appearance for subsequent local strokes.
    pub fn set_stroke(&mut self, stroke: StrokeParams) {
        self.stroke = stroke;
    }

    pub fn stroke(&self) -> StrokeParams {
        self.stroke
    }

    /// Whether outbound messages are being relayed. While offline, local
    /// drawing keeps working but nothing is queued, so nothing can be
    /// mistaken for having synchronized.
    pub fn set_online(&mut self, online: bool) {
        self.online = online;
    }

    /// Queue the room join. Call once per (re)connection.
    pub fn queue_join(&mut self) {
        let msg = ClientMessage::Join {
            room_id: self.room_id.clone(),
            user_id: self.identity.user_id,
            username: self.identity.username.clone(),
            color: self.identity.color,
        };
        self.outgoing.push(msg);
    }

    /// Drain queued outbound messages for the session to send.
    pub fn take_outgoing(&mut self) -> Vec<ClientMessage> {
        std::mem::take(&mut self.outgoing)
    }

    // --- Local input ---

    /// Pointer-down: capture the pre-stroke snapshot and open a stroke.
    pub fn pointer_down(&mut self, x: f64, y: f64) {
        if self.drawing {
            return;
        }
        self.drawing = true;
        let snapshot = self.surface.snapshot();
        self.surface.begin_stroke(x, y, &self.stroke);
        if self.online {
            self.outgoing.push(ClientMessage::DrawStart {
                room_id: self.room_id.clone(),
                user_id: self.identity.user_id,
                x,
                y,
                stroke: self.stroke,
                snapshot: Some(snapshot),
            });
        }
    }

    /// Pointer-move while drawing: render optimistically and relay.
    pub fn pointer_move(&mut self, x: f64, y: f64) {
        if !self.drawing {
            return;
        }
        self.surface.stroke_to(x, y, &self.stroke);
        if self.online {
            self.outgoing.push(ClientMessage::Draw {
                room_id: self.room_id.clone(),
                user_id: self.identity.user_id,
                x,
                y,
                stroke: self.stroke,
            });
        }
    }

    /// Pointer-up/leave: seal the stroke into local history.
    pub fn pointer_up(&mut self) {
        if !self.drawing {
            return;
        }
        self.drawing = false;
        self.surface.end_stroke();
        self.history.commit(self.surface.snapshot());
        if self.online {
            self.outgoing.push(ClientMessage::DrawEnd {
                room_id: self.room_id.clone(),
                user_id: self.identity.user_id,
            });
        }
    }

    /// Cursor position for peers' cursor overlays.
    pub fn cursor_move(&mut self, x: f64, y: f64) {
        if self.online {
            self.outgoing.push(ClientMessage::CursorMove {
                room_id: self.room_id.clone(),
                user_id: self.identity.user_id,
                username: self.identity.username.clone(),
                x,
                y,
                color: self.identity.color,
            });
        }
    }

    /// Local undo: step the ring back and ask the server to revert the
    /// room's most recent action.
    pub fn undo(&mut self) {
        self.apply_step_back();
        if self.online {
            self.outgoing.push(ClientMessage::Undo {
                room_id: self.room_id.clone(),
                user_id: self.identity.user_id,
            });
        }
    }

    /// Local redo, mirrored to the server.
    pub fn redo(&mut self) {
        self.apply_step_forward();
        if self.online {
            self.outgoing.push(ClientMessage::Redo {
                room_id: self.room_id.clone(),
                user_id: self.identity.user_id,
            });
        }
    }

    /// Wipe the canvas for everyone.
    pub fn clear(&mut self) {
        self.surface.clear();
        self.history.reset();
        if self.online {
            self.outgoing.push(ClientMessage::ClearCanvas {
                room_id: self.room_id.clone(),
                user_id: self.identity.user_id,
            });
        }
    }

    // --- Remote events ---

    /// Apply one server message. Returns an event when the application
    /// should update something beyond the canvas.
    pub fn apply(&mut self, msg: ServerMessage) -> Option<RoomEvent> {
        match msg {
            ServerMessage::InitialState {
                participants,
                canvas_snapshot,
                history_count,
                ..
            } => {
                match &canvas_snapshot {
                    Some(snapshot) => self.surface.restore(snapshot),
                    None => self.surface.clear(),
                }
                self.history.reset();
                self.undone_remote.clear();
                self.participants = participants.clone();
                self.history_count = history_count;
                Some(RoomEvent::Joined { participants, history_count })
            }
            ServerMessage::ParticipantJoined { participants, .. }
            | ServerMessage::ParticipantLeft { participants, .. } => {
                self.participants = participants.clone();
                Some(RoomEvent::ParticipantsChanged(participants))
            }
            ServerMessage::DrawStart { x, y, stroke, .. } => {
                self.surface.begin_stroke(x, y, &stroke);
                None
            }
            ServerMessage::Draw { x, y, stroke, .. } => {
                self.surface.stroke_to(x, y, &stroke);
                None
            }
            ServerMessage::CursorMove { user_id, username, x, y, color } => {
                Some(RoomEvent::RemoteCursor { user_id, username, x, y, color })
            }
            ServerMessage::CanvasCleared => {
                self.surface.clear();
                self.history.reset();
                self.undone_remote.clear();
                None
            }
            ServerMessage::Undo { action_id, .. } => {
                self.apply_remote_undo(action_id);
                None
            }
            ServerMessage::Redo { action_id, .. } => {
                self.apply_remote_redo(action_id);
                None
            }
            ServerMessage::HistoryCountChanged { count } => {
                self.history_count = count;
                Some(RoomEvent::HistoryCountChanged(count))
            }
            // Latency accounting happens in the session.
            ServerMessage::Pong { .. } => None,
        }
    }

    /// A peer undid the room's most recent action: take one positional step
    /// back, once per action id.
    ///
    /// Positional reconciliation is approximate: the local ring tracks this
    /// participant's committed strokes, not the authoritative room history,
    /// so under interleaved multi-user editing the restored frame may lag
    /// the server's notion of "one action back."
    fn apply_remote_undo(&mut self, action_id: ActionId) {
        if !self.undone_remote.insert(action_id) {
            log::debug!("ignoring duplicate undo for action {action_id}");
            return;
        }
        self.apply_step_back();
    }

    fn apply_remote_redo(&mut self, action_id: ActionId) {
        if !self.undone_remote.remove(&action_id) {
            log::debug!("ignoring redo for unseen action {action_id}");
            return;
        }
        self.apply_step_forward();
    }

    fn apply_step_back(&mut self) {
        match self.history.undo() {
            HistoryStep::Restore(snapshot) => self.surface.restore(&snapshot),
            HistoryStep::Blank => self.surface.clear(),
            HistoryStep::Noop => {}
        }
    }

    fn apply_step_forward(&mut self) {
        match self.history.redo() {
            HistoryStep::Restore(snapshot) => self.surface.restore(&snapshot),
            HistoryStep::Blank => self.surface.clear(),
            HistoryStep::Noop => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sketchroom_core::Snapshot;

    /// Records surface calls; snapshots encode a call counter so each
    /// committed state is distinguishable.
    #[derive(Default)]
    struct RecordingSurface {
        ops: Vec<String>,
        strokes: u32,
    }

    impl CanvasSurface for RecordingSurface {
        fn begin_stroke(&mut self, x: f64, y: f64, _params: &StrokeParams) {
            self.strokes += 1;
            self.ops.push(format!("begin({x},{y})"));
        }

        fn stroke_to(&mut self, x: f64, y: f64, _params: &StrokeParams) {
            self.ops.push(format!("to({x},{y})"));
        }

        fn end_stroke(&mut self) {
            self.ops.push("end".into());
        }

        fn clear(&mut self) {
            self.ops.push("clear".into());
        }

        fn snapshot(&self) -> Snapshot {
            Snapshot::new(vec![self.strokes as u8])
        }

        fn restore(&mut self, snapshot: &Snapshot) {
            self.ops.push(format!("restore({})", snapshot.as_bytes()[0]));
        }
    }

    fn identity() -> ParticipantInfo {
        ParticipantInfo {
            user_id: ParticipantId::random(),
            username: "ada".into(),
            color: Rgb::BLACK,
        }
    }

    fn online_reconciler() -> Reconciler<RecordingSurface> {
        let mut r = Reconciler::new(RecordingSurface::default(), "r1", identity());
        r.set_online(true);
        r
    }

    fn draw_one(r: &mut Reconciler<RecordingSurface>) {
        r.pointer_down(0.0, 0.0);
        r.pointer_move(1.0, 1.0);
        r.pointer_up();
    }

    #[test]
    fn stroke_renders_and_relays_in_order() {
        let mut r = online_reconciler();
        draw_one(&mut r);

        assert_eq!(r.surface().ops, vec!["begin(0,0)", "to(1,1)", "end"]);
        let out = r.take_outgoing();
        assert!(matches!(out[0], ClientMessage::DrawStart { snapshot: Some(_), .. }));
        assert!(matches!(out[1], ClientMessage::Draw { .. }));
        assert!(matches!(out[2], ClientMessage::DrawEnd { .. }));
        assert_eq!(out.len(), 3);
        assert!(r.can_undo());
    }

    #[test]
    fn draw_start_carries_pre_stroke_snapshot() {
        let mut r = online_reconciler();
        draw_one(&mut r);
        r.take_outgoing();
        // Second stroke: pre-stroke snapshot is the state after stroke one.
        draw_one(&mut r);
        let out = r.take_outgoing();
        match &out[0] {
            ClientMessage::DrawStart { snapshot: Some(s), .. } => {
                assert_eq!(s.as_bytes(), &[1]);
            }
            other => panic!("expected draw_start, got {other:?}"),
        }
    }

    #[test]
    fn moves_outside_a_stroke_do_nothing() {
        let mut r = online_reconciler();
        r.pointer_move(5.0, 5.0);
        r.pointer_up();
        assert!(r.surface().ops.is_empty());
        assert!(r.take_outgoing().is_empty());
    }

    #[test]
    fn offline_strokes_render_but_are_not_relayed() {
        let mut r = online_reconciler();
        r.set_online(false);
        draw_one(&mut r);
        assert_eq!(r.surface().ops, vec!["begin(0,0)", "to(1,1)", "end"]);
        assert!(r.take_outgoing().is_empty());
        // Local undo still works against the offline commit.
        assert!(r.can_undo());
    }

    #[test]
    fn local_undo_restores_and_requests_server_undo() {
        let mut r = online_reconciler();
        draw_one(&mut r);
        draw_one(&mut r);
        r.take_outgoing();

        r.undo();
        assert_eq!(r.surface().ops.last().unwrap(), "restore(1)");
        let out = r.take_outgoing();
        assert!(matches!(out[0], ClientMessage::Undo { .. }));

        r.undo();
        assert_eq!(r.surface().ops.last().unwrap(), "clear");
    }

    #[test]
    fn remote_strokes_do_not_touch_local_history() {
        let mut r = online_reconciler();
        draw_one(&mut r);
        let local_len = r.history.len();

        r.apply(ServerMessage::DrawStart {
            user_id: ParticipantId::random(),
            x: 3.0,
            y: 4.0,
            stroke: StrokeParams::default(),
        });
        r.apply(ServerMessage::Draw {
            user_id: ParticipantId::random(),
            x: 5.0,
            y: 6.0,
            stroke: StrokeParams::default(),
        });
        assert_eq!(r.history.len(), local_len);
        assert_eq!(r.surface().ops.last().unwrap(), "to(5,6)");
    }

    #[test]
    fn remote_undo_applies_exactly_once_per_action() {
        let mut r = online_reconciler();
        draw_one(&mut r);
        draw_one(&mut r);

        let peer = ParticipantId::random();
        r.apply(ServerMessage::Undo { user_id: peer, action_id: ActionId(7) });
        assert_eq!(r.surface().ops.last().unwrap(), "restore(1)");

        // Replay of the same broadcast is ignored.
        let ops_before = r.surface().ops.len();
        r.apply(ServerMessage::Undo { user_id: peer, action_id: ActionId(7) });
        assert_eq!(r.surface().ops.len(), ops_before);

        // Redo of that action steps forward again; a second redo is ignored.
        r.apply(ServerMessage::Redo { user_id: peer, action_id: ActionId(7) });
        assert_eq!(r.surface().ops.last().unwrap(), "restore(2)");
        let ops_before = r.surface().ops.len();
        r.apply(ServerMessage::Redo { user_id: peer, action_id: ActionId(7) });
        assert_eq!(r.surface().ops.len(), ops_before);
    }

    #[test]
    fn redo_for_unseen_action_is_ignored() {
        let mut r = online_reconciler();
        draw_one(&mut r);
        let ops_before = r.surface().ops.len();
        r.apply(ServerMessage::Redo {
            user_id: ParticipantId::random(),
            action_id: ActionId(99),
        });
        assert_eq!(r.surface().ops.len(), ops_before);
    }

    #[test]
    fn canvas_cleared_blanks_surface_and_history() {
        let mut r = online_reconciler();
        draw_one(&mut r);
        r.apply(ServerMessage::CanvasCleared);
        assert_eq!(r.surface().ops.last().unwrap(), "clear");
        assert!(!r.can_undo());
        assert!(!r.can_redo());
    }

    #[test]
    fn initial_state_restores_snapshot_and_roster() {
        let mut r = online_reconciler();
        let roster = vec![identity()];
        let event = r.apply(ServerMessage::InitialState {
            room_id: "r1".into(),
            participants: roster.clone(),
            canvas_snapshot: Some(Snapshot::new(vec![42])),
            history_count: 3,
        });
        assert_eq!(r.surface().ops.last().unwrap(), "restore(42)");
        assert_eq!(r.history_count(), 3);
        assert_eq!(
            event,
            Some(RoomEvent::Joined { participants: roster, history_count: 3 })
        );
    }

    #[test]
    fn history_count_event_drives_button_state() {
        let mut r = online_reconciler();
        let event = r.apply(ServerMessage::HistoryCountChanged { count: 5 });
        assert_eq!(event, Some(RoomEvent::HistoryCountChanged(5)));
        assert_eq!(r.history_count(), 5);
    }

    #[test]
    fn join_message_carries_identity() {
        let mut r = online_reconciler();
        r.queue_join();
        match &r.take_outgoing()[0] {
            ClientMessage::Join { room_id, username, .. } => {
                assert_eq!(room_id, "r1");
                assert_eq!(username, "ada");
            }
            other => panic!("expected join, got {other:?}"),
        }
    }
}
