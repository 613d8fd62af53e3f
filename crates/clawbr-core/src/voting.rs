//! Crowd-vote resolution
//!
//! Three ordered rules decide a completed debate:
//! 1. jury full: `jury_size` qualifying votes with a strict leader
//! 2. window expired with a leader
//! 3. window expired tied: sudden death, the next tie-breaking vote wins
//!
//! Zero votes at expiry closes voting without a winner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::debate::{Side, VotingStatus};
use crate::rules::Rules;

/// Qualifying vote counts per side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub challenger: u32,
    pub opponent: u32,
}

impl VoteTally {
    pub fn new(challenger: u32, opponent: u32) -> Self {
        Self {
            challenger,
            opponent,
        }
    }

    pub fn total(&self) -> u32 {
        self.challenger + self.opponent
    }

    /// Side with strictly more votes
    pub fn leader(&self) -> Option<Side> {
        use std::cmp::Ordering;
        match self.challenger.cmp(&self.opponent) {
            Ordering::Greater => Some(Side::Challenger),
            Ordering::Less => Some(Side::Opponent),
            Ordering::Equal => None,
        }
    }

    pub fn add(&mut self, side: Side) {
        match side {
            Side::Challenger => self.challenger += 1,
            Side::Opponent => self.opponent += 1,
        }
    }
}

/// Outcome of one resolution pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteDecision {
    /// Keep collecting votes
    Undecided,
    Winner(Side),
    /// Tied at expiry; resolve on the first tie-breaking vote
    SuddenDeath,
    /// Expired with no votes at all
    NoVotes,
}

/// A vote qualifies when its trimmed content is long enough
pub fn qualifies(content: &str, rules: &Rules) -> bool {
    content.trim().chars().count() >= rules.min_vote_chars
}

/// Decide a debate from its tally. Pure: same inputs, same decision.
pub fn resolve(
    tally: VoteTally,
    status: VotingStatus,
    now: DateTime<Utc>,
    voting_ends_at: DateTime<Utc>,
    rules: &Rules,
) -> VoteDecision {
    match status {
        VotingStatus::Closed => return VoteDecision::Undecided,
        VotingStatus::SuddenDeath => {
            return tally
                .leader()
                .map(VoteDecision::Winner)
                .unwrap_or(VoteDecision::Undecided)
        }
        VotingStatus::Pending | VotingStatus::Open => {}
    }

    let leader = tally.leader();
    if tally.total() >= rules.jury_size {
        if let Some(side) = leader {
            return VoteDecision::Winner(side);
        }
    }

    if now < voting_ends_at {
        return VoteDecision::Undecided;
    }

    match leader {
        Some(side) => VoteDecision::Winner(side),
        None if tally.total() == 0 => VoteDecision::NoVotes,
        None => VoteDecision::SuddenDeath,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let completed = Utc::now();
        (completed, completed + Duration::hours(48))
    }

    #[test]
    fn test_jury_not_full_stays_open() {
        let rules = Rules::default();
        let (now, ends) = window();
        let decision = resolve(VoteTally::new(6, 3), VotingStatus::Open, now, ends, &rules);
        assert_eq!(decision, VoteDecision::Undecided);
    }

    #[test]
    fn test_full_jury_decides_immediately() {
        let rules = Rules::default();
        let (now, ends) = window();
        let decision = resolve(VoteTally::new(6, 5), VotingStatus::Open, now, ends, &rules);
        assert_eq!(decision, VoteDecision::Winner(Side::Challenger));
    }

    #[test]
    fn test_expiry_with_lead() {
        let rules = Rules::default();
        let (_, ends) = window();
        let decision = resolve(VoteTally::new(1, 2), VotingStatus::Open, ends, ends, &rules);
        assert_eq!(decision, VoteDecision::Winner(Side::Opponent));
    }

    #[test]
    fn test_expiry_tied_enters_sudden_death() {
        let rules = Rules::default();
        let (_, ends) = window();
        let later = ends + Duration::minutes(1);
        assert_eq!(
            resolve(VoteTally::new(2, 2), VotingStatus::Open, later, ends, &rules),
            VoteDecision::SuddenDeath
        );
        assert_eq!(
            resolve(VoteTally::new(2, 2), VotingStatus::SuddenDeath, later, ends, &rules),
            VoteDecision::Undecided
        );
        assert_eq!(
            resolve(VoteTally::new(3, 2), VotingStatus::SuddenDeath, later, ends, &rules),
            VoteDecision::Winner(Side::Challenger)
        );
    }

    #[test]
    fn test_expiry_without_votes() {
        let rules = Rules::default();
        let (_, ends) = window();
        assert_eq!(
            resolve(VoteTally::default(), VotingStatus::Pending, ends, ends, &rules),
            VoteDecision::NoVotes
        );
    }

    #[test]
    fn test_even_jury_tie_waits_for_expiry() {
        let rules = Rules {
            jury_size: 10,
            ..Rules::default()
        };
        let (now, ends) = window();
        assert_eq!(
            resolve(VoteTally::new(5, 5), VotingStatus::Open, now, ends, &rules),
            VoteDecision::Undecided
        );
    }

    #[test]
    fn test_closed_never_decides() {
        let rules = Rules::default();
        let (_, ends) = window();
        assert_eq!(
            resolve(VoteTally::new(9, 2), VotingStatus::Closed, ends, ends, &rules),
            VoteDecision::Undecided
        );
    }

    #[test]
    fn test_qualifying_length() {
        let rules = Rules {
            min_vote_chars: 10,
            ..Rules::default()
        };
        assert!(!qualifies("   short   ", &rules));
        assert!(qualifies("long enough vote", &rules));
    }
}
