use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::ids::ParticipantId;

/// Whether a participant votes or only watches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Player,
    #[serde(alias = "spec")]
    Spectator,
}

/// One identity seated in a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote: Option<Card>,
    #[serde(default)]
    pub role: Role,
}

impl Participant {
    pub fn new(id: ParticipantId, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: name.into(),
            vote: None,
            role,
        }
    }

    pub fn player(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ParticipantId::from_raw(id), name, Role::Player)
    }

    pub fn spectator(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ParticipantId::from_raw(id), name, Role::Spectator)
    }

    pub fn is_player(&self) -> bool {
        self.role == Role::Player
    }

    pub fn has_voted(&self) -> bool {
        self.vote.is_some()
    }
}
