/// Why a command left a session untouched.
///
/// Rejections are never broadcast. The session keeps its previous state and
/// only the requesting client learns the reason through its acknowledgement.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("participant id must not be empty")]
    MissingParticipantId,
    #[error("card {0} is not in the allowed sequence")]
    InvalidVoteValue(i64),
    #[error("only joined players may vote")]
    UnauthorizedVote,
    #[error("votes are locked until the round is reset")]
    RoundRevealed,
    #[error("no player has voted yet")]
    RevealWithNoVotes,
    #[error("cards are already revealed")]
    AlreadyRevealed,
    #[error("participant is not in the session")]
    UnknownParticipant,
    #[error("session not found")]
    SessionNotFound,
}

impl Rejection {
    /// Stable snake_case label for logs, metrics and acknowledgements.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingParticipantId => "missing_participant_id",
            Self::InvalidVoteValue(_) => "invalid_vote_value",
            Self::UnauthorizedVote => "unauthorized_vote",
            Self::RoundRevealed => "round_revealed",
            Self::RevealWithNoVotes => "reveal_with_no_votes",
            Self::AlreadyRevealed => "already_revealed",
            Self::UnknownParticipant => "unknown_participant",
            Self::SessionNotFound => "session_not_found",
        }
    }
}
