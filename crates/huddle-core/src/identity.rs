//! Client-side identity bootstrap.
//!
//! A browser mints one identity, keeps it across reloads and presents it on
//! every join. Nothing on the server's join path generates or validates it.

use serde::{Deserialize, Serialize};

use crate::ids::ParticipantId;
use crate::participant::{Participant, Role};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    #[error("display name must not be empty")]
    EmptyName,
}

/// A stable `{id, name}` pair owned by one client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: ParticipantId,
    pub name: String,
}

impl Identity {
    /// Mint a fresh identity for a display name.
    pub fn generate(name: &str) -> Result<Self, IdentityError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(IdentityError::EmptyName);
        }
        Ok(Self {
            id: ParticipantId::new(),
            name: name.to_string(),
        })
    }

    pub fn into_participant(self, role: Role) -> Participant {
        Participant::new(self.id, self.name, role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_trims_name() {
        let identity = Identity::generate("  Ana  ").unwrap();
        assert_eq!(identity.name, "Ana");
        assert!(!identity.id.is_empty());
    }

    #[test]
    fn generate_rejects_blank_name() {
        assert_eq!(Identity::generate("   "), Err(IdentityError::EmptyName));
    }

    #[test]
    fn each_generation_is_distinct() {
        let a = Identity::generate("Ana").unwrap();
        let b = Identity::generate("Ana").unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn survives_a_reload() {
        let identity = Identity::generate("Ana").unwrap();
        let stored = serde_json::to_string(&identity).unwrap();
        let restored: Identity = serde_json::from_str(&stored).unwrap();
        assert_eq!(restored, identity);
    }

    #[test]
    fn into_participant_has_no_vote() {
        let p = Identity::generate("Ana")
            .unwrap()
            .into_participant(Role::Spectator);
        assert_eq!(p.role, Role::Spectator);
        assert!(p.vote.is_none());
    }
}
