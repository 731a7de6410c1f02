pub mod cards;
pub mod commands;
pub mod consensus;
pub mod errors;
pub mod events;
pub mod identity;
pub mod ids;
pub mod participant;
pub mod session;

pub use cards::{Card, ALLOWED_CARDS};
pub use commands::Command;
pub use consensus::{consensus, Consensus};
pub use errors::Rejection;
pub use events::SessionEvent;
pub use identity::{Identity, IdentityError};
pub use ids::{ParticipantId, SessionId};
pub use participant::{Participant, Role};
pub use session::{Phase, Session, SessionSnapshot, Transition};
