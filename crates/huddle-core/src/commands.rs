use crate::ids::ParticipantId;
use crate::participant::Participant;

/// A mutating request against one session, already decoded from the wire.
///
/// The card is kept as the raw integer the client sent so that validation
/// happens inside the transition and rejects like any other rule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Join { participant: Participant },
    ChooseCard { participant_id: ParticipantId, card: i64 },
    Reveal,
    Reset,
    Leave { participant_id: ParticipantId },
}

impl Command {
    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::ChooseCard { .. } => "vote",
            Self::Reveal => "reveal",
            Self::Reset => "reset",
            Self::Leave { .. } => "leave",
        }
    }

    /// Only joins may bring a session into existence.
    pub fn creates_session(&self) -> bool {
        matches!(self, Self::Join { .. })
    }

    pub fn participant_id(&self) -> Option<&ParticipantId> {
        match self {
            Self::Join { participant } => Some(&participant.id),
            Self::ChooseCard { participant_id, .. } | Self::Leave { participant_id } => {
                Some(participant_id)
            }
            Self::Reveal | Self::Reset => None,
        }
    }
}
