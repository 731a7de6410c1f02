use serde::{Deserialize, Serialize};

use crate::ids::SessionId;
use crate::participant::Participant;

/// State-change notifications fanned out to every client attached to a
/// session. Emitted only by successful transitions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    #[serde(rename = "joinedSession")]
    JoinedSession {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        participants: Vec<Participant>,
        /// Lets each client tell its own join apart from someone else's.
        #[serde(rename = "newParticipant")]
        new_participant: Participant,
    },

    #[serde(rename = "cardChosen")]
    CardChosen {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        participants: Vec<Participant>,
    },

    /// Votes already travel on each participant, so reveal carries nothing.
    #[serde(rename = "cardsReveal")]
    CardsReveal {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },

    #[serde(rename = "gameReset")]
    GameReset {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        participants: Vec<Participant>,
    },

    #[serde(rename = "userLeft")]
    UserLeft {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        participants: Vec<Participant>,
        #[serde(rename = "leftParticipant")]
        left_participant: Participant,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::JoinedSession { session_id, .. }
            | Self::CardChosen { session_id, .. }
            | Self::CardsReveal { session_id }
            | Self::GameReset { session_id, .. }
            | Self::UserLeft { session_id, .. } => session_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::JoinedSession { .. } => "joinedSession",
            Self::CardChosen { .. } => "cardChosen",
            Self::CardsReveal { .. } => "cardsReveal",
            Self::GameReset { .. } => "gameReset",
            Self::UserLeft { .. } => "userLeft",
        }
    }

    /// Payload without the envelope fields (`type`, `sessionId`).
    pub fn payload(&self) -> serde_json::Value {
        match self {
            Self::JoinedSession {
                participants,
                new_participant,
                ..
            } => serde_json::json!({
                "participants": participants,
                "newParticipant": new_participant,
            }),
            Self::CardChosen { participants, .. } | Self::GameReset { participants, .. } => {
                serde_json::json!({ "participants": participants })
            }
            Self::CardsReveal { .. } => serde_json::json!({}),
            Self::UserLeft {
                participants,
                left_participant,
                ..
            } => serde_json::json!({
                "participants": participants,
                "leftParticipant": left_participant,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_session_id_and_type() {
        let sid = SessionId::from_raw("s1");
        let evt = SessionEvent::CardsReveal {
            session_id: sid.clone(),
        };
        assert_eq!(evt.session_id(), &sid);
        assert_eq!(evt.event_type(), "cardsReveal");
    }

    #[test]
    fn joined_payload_names_new_participant() {
        let p = Participant::player("u1", "Ana");
        let evt = SessionEvent::JoinedSession {
            session_id: SessionId::from_raw("s1"),
            participants: vec![p.clone()],
            new_participant: p,
        };
        let payload = evt.payload();
        assert_eq!(payload["newParticipant"]["id"], "u1");
        assert_eq!(payload["participants"].as_array().unwrap().len(), 1);
        assert!(payload.get("sessionId").is_none());
    }

    #[test]
    fn reveal_payload_is_empty_object() {
        let evt = SessionEvent::CardsReveal {
            session_id: SessionId::from_raw("s1"),
        };
        assert_eq!(evt.payload(), serde_json::json!({}));
    }

    #[test]
    fn serialized_tag_matches_event_type() {
        let evt = SessionEvent::UserLeft {
            session_id: SessionId::from_raw("s1"),
            participants: vec![],
            left_participant: Participant::player("u2", "Bo"),
        };
        let json = serde_json::to_value(&evt).unwrap();
        assert_eq!(json["type"], evt.event_type());
        assert_eq!(json["sessionId"], "s1");
        assert_eq!(json["leftParticipant"]["name"], "Bo");
    }
}
