//! Translation between the JSON clients speak and the core types.
//!
//! Inbound params are normalized to snake_case (including the legacy `user`
//! and `userId` keys) before handlers read them. Outbound session events are
//! wrapped in a `{ type, sessionId, timestamp, data }` envelope.

use huddle_core::{Participant, ParticipantId, Role, SessionEvent};
use serde::{Deserialize, Serialize};

/// Client keys mapped to the names handlers read. `user` and `userId` are
/// the legacy names older clients still send.
const PARAM_ALIASES: &[(&str, &str)] = &[
    ("sessionId", "session_id"),
    ("participantId", "participant_id"),
    ("user", "participant"),
    ("userId", "participant_id"),
];

/// Rewrite aliased keys to their canonical name. If the canonical key is
/// already present it wins and the alias is dropped.
pub fn normalize_params(params: &serde_json::Value) -> serde_json::Value {
    let Some(obj) = params.as_object() else {
        return params.clone();
    };
    let mut result = obj.clone();
    for &(alias, canonical) in PARAM_ALIASES {
        if !result.contains_key(canonical) {
            if let Some(val) = result.remove(alias) {
                result.insert(canonical.to_string(), val);
            }
        } else {
            result.remove(alias);
        }
    }
    serde_json::Value::Object(result)
}

/// Participant as sent in a `joinSession` request. Any vote the client
/// attaches is ignored; joiners always start without one. A missing id is
/// read as empty and rejected by the session; a missing name is just empty.
#[derive(Debug, Deserialize)]
pub struct ParticipantParams {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Role,
}

impl ParticipantParams {
    pub fn into_participant(self) -> Participant {
        Participant::new(ParticipantId::from_raw(self.id), self.name, self.role)
    }
}

/// Outbound broadcast envelope.
#[derive(Debug, Serialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub timestamp: String,
    pub data: serde_json::Value,
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn session_event_to_wire(event: &SessionEvent) -> WireEvent {
    WireEvent {
        event_type: event.event_type(),
        session_id: event.session_id().to_string(),
        timestamp: now_rfc3339(),
        data: event.payload(),
    }
}

/// Serialize a session event into the text frame sent to clients.
pub fn serialize_event(event: &SessionEvent) -> Option<String> {
    serde_json::to_string(&session_event_to_wire(event)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_core::SessionId;
    use serde_json::json;

    #[test]
    fn normalize_camel_to_snake() {
        let n = normalize_params(&json!({"sessionId": "s1", "participantId": "u1", "card": 5}));
        assert_eq!(n["session_id"], "s1");
        assert_eq!(n["participant_id"], "u1");
        assert_eq!(n["card"], 5);
        assert!(n.get("sessionId").is_none());
        assert!(n.get("participantId").is_none());
    }

    #[test]
    fn normalize_legacy_keys() {
        let n = normalize_params(&json!({
            "sessionId": "s1",
            "user": {"id": "u1", "name": "Ana"},
            "userId": "u1"
        }));
        assert_eq!(n["participant"]["id"], "u1");
        assert_eq!(n["participant_id"], "u1");
        assert!(n.get("user").is_none());
        assert!(n.get("userId").is_none());
    }

    #[test]
    fn normalize_canonical_key_wins() {
        let n = normalize_params(&json!({"sessionId": "camel", "session_id": "snake"}));
        assert_eq!(n["session_id"], "snake");
        assert!(n.get("sessionId").is_none());

        let n = normalize_params(&json!({"userId": "legacy", "participantId": "new"}));
        assert_eq!(n["participant_id"], "new");
    }

    #[test]
    fn normalize_handles_non_object() {
        assert_eq!(normalize_params(&json!("string")), json!("string"));
        assert_eq!(normalize_params(&json!(null)), json!(null));
    }

    #[test]
    fn participant_params_default_to_player_and_drop_vote() {
        let params: ParticipantParams =
            serde_json::from_value(json!({"id": "u1", "name": "Ana", "card": 8, "vote": 8}))
                .unwrap();
        let p = params.into_participant();
        assert_eq!(p.role, Role::Player);
        assert!(p.vote.is_none());
    }

    #[test]
    fn participant_params_accept_spec_alias() {
        let params: ParticipantParams =
            serde_json::from_value(json!({"id": "u1", "name": "Ana", "role": "spec"})).unwrap();
        assert_eq!(params.role, Role::Spectator);
    }

    #[test]
    fn participant_params_default_missing_id_and_name() {
        let params: ParticipantParams = serde_json::from_value(json!({"name": "Ana"})).unwrap();
        assert!(params.into_participant().id.is_empty());

        let params: ParticipantParams = serde_json::from_value(json!({"id": "u1"})).unwrap();
        let participant = params.into_participant();
        assert_eq!(participant.id.as_str(), "u1");
        assert_eq!(participant.name, "");
        assert!(participant.is_player());
    }

    #[test]
    fn wire_event_has_envelope_structure() {
        let event = SessionEvent::JoinedSession {
            session_id: SessionId::from_raw("s1"),
            participants: vec![Participant::player("u1", "Ana")],
            new_participant: Participant::player("u1", "Ana"),
        };
        let json = serde_json::to_value(session_event_to_wire(&event)).unwrap();

        assert_eq!(json["type"], "joinedSession");
        assert_eq!(json["sessionId"], "s1");
        assert!(json["timestamp"].is_string());
        assert_eq!(json["data"]["participants"][0]["id"], "u1");
        assert_eq!(json["data"]["newParticipant"]["name"], "Ana");
        assert!(json.get("session_id").is_none());
    }

    #[test]
    fn reveal_payload_is_empty_object() {
        let event = SessionEvent::CardsReveal {
            session_id: SessionId::from_raw("s1"),
        };
        let json = serde_json::to_value(session_event_to_wire(&event)).unwrap();
        assert_eq!(json["type"], "cardsReveal");
        assert_eq!(json["data"], json!({}));
    }

    #[test]
    fn timestamp_is_rfc3339() {
        let event = SessionEvent::GameReset {
            session_id: SessionId::from_raw("s1"),
            participants: vec![],
        };
        let wire = session_event_to_wire(&event);
        assert!(chrono::DateTime::parse_from_rfc3339(&wire.timestamp).is_ok());
    }

    #[test]
    fn serialize_event_produces_text_frame() {
        let event = SessionEvent::UserLeft {
            session_id: SessionId::from_raw("s1"),
            participants: vec![],
            left_participant: Participant::spectator("u2", "Bo"),
        };
        let frame = serialize_event(&event).unwrap();
        assert!(frame.contains("\"type\":\"userLeft\""));
        assert!(frame.contains("\"leftParticipant\""));
    }
}
