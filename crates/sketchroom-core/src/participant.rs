//! Participant identity shared between server and client.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::color::Rgb;

/// Stable identity of one participant connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Public participant descriptor, as sent in `initial_state` and in the
/// refreshed lists carried by join/leave broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub user_id: ParticipantId,
    pub username: String,
    pub color: Rgb,
}
