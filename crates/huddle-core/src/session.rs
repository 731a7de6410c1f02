//! Per-session state machine.
//!
//! A session cycles between [`Phase::Voting`] and [`Phase::Revealed`] for as
//! long as anyone is seated. Every transition either mutates the session and
//! returns the [`SessionEvent`] to broadcast, or returns a [`Rejection`] and
//! leaves the session exactly as it was.
//!
//! Callers must serialize transitions per session; the type itself holds no
//! lock.

use serde::{Deserialize, Serialize};

use crate::cards::Card;
use crate::commands::Command;
use crate::consensus::{self, Consensus};
use crate::errors::Rejection;
use crate::events::SessionEvent;
use crate::ids::{ParticipantId, SessionId};
use crate::participant::{Participant, Role};

/// Round phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Voting,
    Revealed,
}

/// Outcome of applying one command.
pub type Transition = Result<SessionEvent, Rejection>;

#[derive(Clone, Debug)]
pub struct Session {
    id: SessionId,
    /// Seat order is join order; rejoins keep their seat.
    participants: Vec<Participant>,
    phase: Phase,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            participants: Vec::new(),
            phase: Phase::Voting,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, id: &ParticipantId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id == id)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Reveal needs at least one player vote on the table.
    pub fn can_reveal(&self) -> bool {
        consensus::player_votes(&self.participants).next().is_some()
    }

    /// Consensus over the current votes, regardless of phase.
    pub fn consensus(&self) -> Option<Consensus> {
        consensus::consensus(&self.participants)
    }

    pub fn apply(&mut self, command: Command) -> Transition {
        match command {
            Command::Join { participant } => self.join(participant),
            Command::ChooseCard {
                participant_id,
                card,
            } => self.vote(&participant_id, card),
            Command::Reveal => self.reveal(),
            Command::Reset => Ok(self.reset()),
            Command::Leave { participant_id } => self.leave(&participant_id),
        }
    }

    /// Seat a participant, or refresh the seat it already holds.
    ///
    /// A rejoin overwrites name and role in place and keeps the vote, unless
    /// the new role is spectator.
    pub fn join(&mut self, participant: Participant) -> Transition {
        if participant.id.is_empty() {
            return Err(Rejection::MissingParticipantId);
        }

        let joined = match self.position(&participant.id) {
            Some(idx) => {
                let seat = &mut self.participants[idx];
                seat.name = participant.name;
                seat.role = participant.role;
                if seat.role == Role::Spectator {
                    seat.vote = None;
                }
                seat.clone()
            }
            None => {
                let seat = Participant {
                    vote: None,
                    ..participant
                };
                self.participants.push(seat.clone());
                seat
            }
        };

        Ok(SessionEvent::JoinedSession {
            session_id: self.id.clone(),
            participants: self.participants.clone(),
            new_participant: joined,
        })
    }

    /// Record a player's card. Last write wins while voting.
    pub fn vote(&mut self, participant_id: &ParticipantId, card: i64) -> Transition {
        let card = Card::try_from(card)?;
        if self.phase == Phase::Revealed {
            return Err(Rejection::RoundRevealed);
        }
        let seat = self
            .participants
            .iter_mut()
            .find(|p| &p.id == participant_id)
            .filter(|p| p.is_player())
            .ok_or(Rejection::UnauthorizedVote)?;
        seat.vote = Some(card);

        Ok(SessionEvent::CardChosen {
            session_id: self.id.clone(),
            participants: self.participants.clone(),
        })
    }

    /// Show every vote. Votes themselves are untouched.
    pub fn reveal(&mut self) -> Transition {
        if self.phase == Phase::Revealed {
            return Err(Rejection::AlreadyRevealed);
        }
        if !self.can_reveal() {
            return Err(Rejection::RevealWithNoVotes);
        }
        self.phase = Phase::Revealed;

        Ok(SessionEvent::CardsReveal {
            session_id: self.id.clone(),
        })
    }

    /// Clear every vote and start a new round. Never rejected.
    pub fn reset(&mut self) -> SessionEvent {
        for p in &mut self.participants {
            p.vote = None;
        }
        self.phase = Phase::Voting;

        SessionEvent::GameReset {
            session_id: self.id.clone(),
            participants: self.participants.clone(),
        }
    }

    /// Unseat a participant. A second leave for the same id is rejected so
    /// that it produces no broadcast.
    pub fn leave(&mut self, participant_id: &ParticipantId) -> Transition {
        let idx = self
            .position(participant_id)
            .ok_or(Rejection::UnknownParticipant)?;
        let left = self.participants.remove(idx);

        Ok(SessionEvent::UserLeft {
            session_id: self.id.clone(),
            participants: self.participants.clone(),
            left_participant: left,
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            phase: self.phase,
            participants: self.participants.clone(),
            consensus: match self.phase {
                Phase::Revealed => self.consensus(),
                Phase::Voting => None,
            },
        }
    }

    fn position(&self, id: &ParticipantId) -> Option<usize> {
        self.participants.iter().position(|p| &p.id == id)
    }
}

/// Read-only view of a session for lookups and listings.
///
/// Consensus is only exposed once cards are revealed so that an existence
/// check can't leak votes mid-round.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub phase: Phase,
    pub participants: Vec<Participant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consensus: Option<Consensus>,
}
