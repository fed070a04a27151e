//! SketchRoom Core Library
//!
//! Shared data model and wire protocol for the SketchRoom collaborative
//! drawing system. Used by both the server (room authority) and the client
//! (reconciler); contains no I/O.

pub mod action;
pub mod color;
pub mod participant;
pub mod protocol;
pub mod snapshot;

pub use action::{Action, ActionId, ActionKind, StrokeParams, Tool};
pub use color::{ParseColorError, Rgb};
pub use participant::{ParticipantId, ParticipantInfo};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use snapshot::Snapshot;
