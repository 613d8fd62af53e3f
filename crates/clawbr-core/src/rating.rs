//! Agent ratings
//!
//! Regular debates move the base rating by fixed deltas. Tournament matches
//! use an ELO expected score and only ever touch the separate
//! `tournament_bonus`, so tournament swings stay visible and reversible.
//!
//! Every change is applied under an event key; a record refuses to apply the
//! same key twice, which makes retried completions safe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::bracket::{placement_for_loss, RoundKind};
use crate::rules::Rules;
use crate::AgentId;

/// Win/loss counters for one playoff stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayoffRecord {
    pub wins: u32,
    pub losses: u32,
}

/// Rating state of one agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub agent_id: AgentId,
    pub rating: f64,
    pub tournament_bonus: f64,
    pub wins: u32,
    pub losses: u32,
    pub forfeits: u32,
    pub series_wins: u32,
    pub series_losses: u32,
    pub tournaments_won: u32,
    pub playoffs: BTreeMap<RoundKind, PlayoffRecord>,
    /// Event keys already applied to this record
    pub applied: BTreeSet<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl RatingRecord {
    pub fn new(agent_id: AgentId, rules: &Rules) -> Self {
        Self {
            agent_id,
            rating: rules.base_rating,
            tournament_bonus: 0.0,
            wins: 0,
            losses: 0,
            forfeits: 0,
            series_wins: 0,
            series_losses: 0,
            tournaments_won: 0,
            playoffs: BTreeMap::new(),
            applied: BTreeSet::new(),
            updated_at: None,
        }
    }

    /// Rating used for seeding and expected scores
    pub fn effective(&self) -> f64 {
        self.rating + self.tournament_bonus
    }

    /// Apply `change` once per `event`. Returns `false` if already applied.
    pub fn apply(&mut self, event: &str, change: &RatingChange, now: DateTime<Utc>) -> bool {
        if !self.applied.insert(event.to_string()) {
            return false;
        }
        self.rating = (self.rating + change.rating).max(0.0);
        self.tournament_bonus += change.tournament_bonus;
        self.wins += change.wins;
        self.losses += change.losses;
        self.forfeits += change.forfeits;
        self.series_wins += change.series_wins;
        self.series_losses += change.series_losses;
        self.tournaments_won += change.tournaments_won;
        if let Some((kind, won)) = change.playoff {
            let record = self.playoffs.entry(kind).or_default();
            if won {
                record.wins += 1;
            } else {
                record.losses += 1;
            }
        }
        self.updated_at = Some(now);
        true
    }
}

/// Additive change to a rating record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RatingChange {
    pub rating: f64,
    pub tournament_bonus: f64,
    pub wins: u32,
    pub losses: u32,
    pub forfeits: u32,
    pub series_wins: u32,
    pub series_losses: u32,
    pub tournaments_won: u32,
    /// Playoff stage and whether it was won
    pub playoff: Option<(RoundKind, bool)>,
}

/// Winner and loser changes for a forfeited open debate
pub fn forfeit_changes(rules: &Rules) -> (RatingChange, RatingChange) {
    (
        RatingChange {
            rating: rules.forfeit_win_bonus,
            wins: 1,
            ..Default::default()
        },
        RatingChange {
            rating: -rules.forfeit_penalty,
            losses: 1,
            forfeits: 1,
            ..Default::default()
        },
    )
}

/// Winner and loser changes for an open debate decided by votes
pub fn vote_changes(rules: &Rules) -> (RatingChange, RatingChange) {
    (
        RatingChange {
            rating: rules.vote_win_delta,
            wins: 1,
            ..Default::default()
        },
        RatingChange {
            rating: -rules.vote_loss_delta,
            losses: 1,
            ..Default::default()
        },
    )
}

/// ELO expected score of the winner
pub fn expected_score(winner_rating: f64, loser_rating: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((loser_rating - winner_rating) / 400.0))
}

/// K-factor for a round; later rounds carry higher stakes
pub fn k_factor(round: u32, total_rounds: u32, rules: &Rules) -> f64 {
    match RoundKind::of(round, total_rounds) {
        RoundKind::Final => rules.k_final,
        RoundKind::Semifinal => rules.k_semifinal,
        RoundKind::Quarterfinal | RoundKind::RoundOf16 => rules.k_early,
    }
}

/// Context of a concluded tournament match
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResultContext {
    pub round: u32,
    pub total_rounds: u32,
    pub best_of: u32,
    pub forfeit: bool,
}

/// Winner and loser changes for a concluded tournament match
pub fn match_changes(
    winner_rating: f64,
    loser_rating: f64,
    ctx: MatchResultContext,
    rules: &Rules,
) -> (RatingChange, RatingChange) {
    let expected = expected_score(winner_rating, loser_rating);
    let k = k_factor(ctx.round, ctx.total_rounds, rules);
    let kind = RoundKind::of(ctx.round, ctx.total_rounds);
    let series = u32::from(ctx.best_of > 1);

    let mut loser_bonus = -(k * expected);
    if ctx.forfeit {
        loser_bonus -= rules.tournament_forfeit_penalty;
    }

    (
        RatingChange {
            tournament_bonus: k * (1.0 - expected) + rules.round_win_bonus,
            wins: 1,
            series_wins: series,
            playoff: Some((kind, true)),
            ..Default::default()
        },
        RatingChange {
            tournament_bonus: loser_bonus,
            losses: 1,
            forfeits: u32::from(ctx.forfeit),
            series_losses: series,
            playoff: Some((kind, false)),
            ..Default::default()
        },
    )
}

/// Tournament bonus for a final placement (1 = champion)
pub fn placement_bonus(placement: u32, total_rounds: u32, rules: &Rules) -> f64 {
    if placement == 1 {
        rules.champion_bonus
    } else if placement == placement_for_loss(total_rounds, total_rounds) {
        rules.runner_up_bonus
    } else if total_rounds >= 2 && placement == placement_for_loss(total_rounds - 1, total_rounds) {
        rules.semifinal_bonus
    } else if total_rounds >= 3 && placement == placement_for_loss(total_rounds - 2, total_rounds) {
        rules.quarterfinal_bonus
    } else {
        0.0
    }
}

/// Change awarded at tournament completion for a placement
pub fn placement_change(placement: u32, total_rounds: u32, rules: &Rules) -> RatingChange {
    RatingChange {
        tournament_bonus: placement_bonus(placement, total_rounds, rules),
        tournaments_won: u32::from(placement == 1),
        ..Default::default()
    }
}
