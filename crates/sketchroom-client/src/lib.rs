//! SketchRoom Client Library
//!
//! The participant-side half of the room synchronization engine: renders
//! local strokes optimistically, relays them to the server, applies remote
//! events verbatim, and reconciles local undo/redo history against
//! server-driven undo/redo broadcasts.
//!
//! Rendering itself is a capability the caller provides through
//! [`CanvasSurface`]; this crate never touches pixels.

pub mod channel;
pub mod history;
pub mod reconciler;
pub mod session;
pub mod surface;

pub use channel::{ChannelError, ChannelEvent, MessageChannel, NativeChannel};
pub use history::{HistoryStep, LocalHistory};
pub use reconciler::{Reconciler, RoomEvent};
pub use session::{ConnectionStatus, Session, SessionEvent};
pub use surface::CanvasSurface;
