//! Vote aggregation shared by the server snapshot and any client.
//!
//! Only players with a vote count. Spectators and unvoted players are skipped
//! regardless of where they sit in the participant list.

use serde::Serialize;

use crate::cards::Card;
use crate::participant::Participant;

/// Aggregate of the votes currently on the table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Consensus {
    pub mean: f64,
    pub nearest_allowed: Card,
    pub vote_count: usize,
}

/// Compute the consensus for a participant snapshot.
///
/// Returns `None` when no player has voted, which callers render as a
/// neutral placeholder.
pub fn consensus(participants: &[Participant]) -> Option<Consensus> {
    let votes: Vec<Card> = player_votes(participants).collect();
    let mean = mean(&votes);
    let nearest_allowed = nearest_allowed(mean)?;
    Some(Consensus {
        mean,
        nearest_allowed,
        vote_count: votes.len(),
    })
}

/// Votes cast by players, in seat order.
pub fn player_votes(participants: &[Participant]) -> impl Iterator<Item = Card> + '_ {
    participants
        .iter()
        .filter(|p| p.is_player())
        .filter_map(|p| p.vote)
}

/// Arithmetic mean of the votes. NaN for an empty set.
pub fn mean(votes: &[Card]) -> f64 {
    if votes.is_empty() {
        return f64::NAN;
    }
    let sum: u32 = votes.iter().map(|c| u32::from(c.value())).sum();
    f64::from(sum) / votes.len() as f64
}

/// The allowed card closest to `mean`; on a tie the smaller card wins.
pub fn nearest_allowed(mean: f64) -> Option<Card> {
    if !mean.is_finite() {
        return None;
    }
    let mut best: Option<(Card, f64)> = None;
    for card in Card::all() {
        let distance = (f64::from(card.value()) - mean).abs();
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((card, distance)),
        }
    }
    best.map(|(card, _)| card)
}
