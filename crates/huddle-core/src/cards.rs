use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::Rejection;

/// The fixed sequence of values a player may vote.
pub const ALLOWED_CARDS: [u8; 9] = [1, 2, 3, 5, 8, 13, 21, 34, 55];

/// A vote value guaranteed to be a member of [`ALLOWED_CARDS`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Card(u8);

impl Card {
    pub fn value(self) -> u8 {
        self.0
    }

    /// Every allowed card in ascending order.
    pub fn all() -> impl Iterator<Item = Card> {
        ALLOWED_CARDS.iter().map(|&v| Card(v))
    }
}

impl TryFrom<i64> for Card {
    type Error = Rejection;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        ALLOWED_CARDS
            .iter()
            .find(|&&allowed| i64::from(allowed) == value)
            .map(|&v| Card(v))
            .ok_or(Rejection::InvalidVoteValue(value))
    }
}

impl From<Card> for i64 {
    fn from(card: Card) -> Self {
        i64::from(card.0)
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
