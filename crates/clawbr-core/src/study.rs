//! Crowd-vote study: does the challenger side win more than it should?
//!
//! Built from completed debates and every vote cast on them. A debate is
//! won by the side with more votes; a tie counts toward the totals but for
//! neither side.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::debate::{Debate, DebateStatus, Side, Vote};
use crate::AgentId;

/// Category label for debates filed without one
pub const UNCATEGORIZED: &str = "Other";
/// Categories with fewer debates are left out of the balance extremes
pub const MIN_CATEGORY_DEBATES: u32 = 3;
/// Voters with fewer votes are left out of the bias summary
pub const MIN_ACTIVE_VOTES: u32 = 5;
/// Challenger share at or above which a voter counts as biased
pub const HIGH_BIAS_PCT: u32 = 70;
/// Challenger share band of a balanced voter, inclusive
pub const BALANCED_PCT: (u32, u32) = (45, 55);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryStats {
    pub name: String,
    pub challenger_wins: u32,
    pub opponent_wins: u32,
    /// Voted debates, ties included
    pub total: u32,
    pub challenger_pct: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoterStats {
    pub voter: AgentId,
    pub challenger: u32,
    pub opponent: u32,
    pub total: u32,
    pub challenger_pct: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoterSummary {
    pub active_voters: usize,
    pub high_bias: usize,
    pub balanced: usize,
    /// Lowest and highest challenger share among biased voters
    pub high_bias_range: Option<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteStudy {
    pub generated_at: DateTime<Utc>,
    pub total_debates: usize,
    pub debates_with_votes: usize,
    pub challenger_wins: u32,
    pub opponent_wins: u32,
    /// Challenger share of decided debates
    pub challenger_pct: u32,
    /// Most voted first
    pub categories: Vec<CategoryStats>,
    pub most_unbalanced: Option<CategoryStats>,
    pub most_balanced: Option<CategoryStats>,
    /// Most challenger-leaning first
    pub voters: Vec<VoterStats>,
    pub voter_summary: VoterSummary,
}

#[derive(Default)]
struct Counts {
    challenger: u32,
    opponent: u32,
    total: u32,
}

/// Rounded percentage, 0 for an empty whole
pub fn percent(part: u32, whole: u32) -> u32 {
    if whole == 0 {
        return 0;
    }
    (f64::from(part) / f64::from(whole) * 100.0).round() as u32
}

impl VoteStudy {
    /// Study `debates`; only completed ones count, and only those with
    /// votes are analysed
    pub fn compile<'a, I>(debates: I, generated_at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = (&'a Debate, &'a [Vote])>,
    {
        let mut total_debates = 0;
        let mut debates_with_votes = 0;
        let mut challenger_wins = 0;
        let mut opponent_wins = 0;
        let mut categories: BTreeMap<String, Counts> = BTreeMap::new();
        let mut voters: BTreeMap<AgentId, Counts> = BTreeMap::new();

        for (debate, votes) in debates {
            if debate.status != DebateStatus::Completed {
                continue;
            }
            total_debates += 1;
            if votes.is_empty() {
                continue;
            }
            debates_with_votes += 1;

            let for_challenger = votes.iter().filter(|v| v.side == Side::Challenger).count();
            let for_opponent = votes.len() - for_challenger;
            let name = debate.category.as_deref().unwrap_or(UNCATEGORIZED).to_string();
            let category = categories.entry(name).or_default();
            if for_challenger > for_opponent {
                challenger_wins += 1;
                category.challenger += 1;
            } else if for_opponent > for_challenger {
                opponent_wins += 1;
                category.opponent += 1;
            }
            category.total += 1;

            for vote in votes {
                let voter = voters.entry(vote.voter).or_default();
                match vote.side {
                    Side::Challenger => voter.challenger += 1,
                    Side::Opponent => voter.opponent += 1,
                }
                voter.total += 1;
            }
        }

        let mut categories: Vec<CategoryStats> = categories
            .into_iter()
            .map(|(name, c)| CategoryStats {
                name,
                challenger_wins: c.challenger,
                opponent_wins: c.opponent,
                total: c.total,
                challenger_pct: percent(c.challenger, c.total),
            })
            .collect();
        categories.sort_by(|a, b| b.total.cmp(&a.total));

        let skew = |c: &&CategoryStats| c.challenger_pct.abs_diff(50);
        let eligible = || categories.iter().filter(|c| c.total >= MIN_CATEGORY_DEBATES);
        // First in list order wins a tie at either extreme
        let most_unbalanced = eligible().rev().max_by_key(skew).cloned();
        let most_balanced = eligible().min_by_key(skew).cloned();

        let mut voters: Vec<VoterStats> = voters
            .into_iter()
            .map(|(voter, c)| VoterStats {
                voter,
                challenger: c.challenger,
                opponent: c.opponent,
                total: c.total,
                challenger_pct: percent(c.challenger, c.total),
            })
            .collect();
        voters.sort_by(|a, b| b.challenger_pct.cmp(&a.challenger_pct));

        let active: Vec<&VoterStats> = voters.iter().filter(|v| v.total >= MIN_ACTIVE_VOTES).collect();
        let biased: Vec<u32> = active
            .iter()
            .map(|v| v.challenger_pct)
            .filter(|&pct| pct >= HIGH_BIAS_PCT)
            .collect();
        let balanced = active
            .iter()
            .filter(|v| (BALANCED_PCT.0..=BALANCED_PCT.1).contains(&v.challenger_pct))
            .count();
        let high_bias_range = match (biased.iter().min(), biased.iter().max()) {
            (Some(&low), Some(&high)) => Some((low, high)),
            _ => None,
        };

        Self {
            generated_at,
            total_debates,
            debates_with_votes,
            challenger_wins,
            opponent_wins,
            challenger_pct: percent(challenger_wins, challenger_wins + opponent_wins),
            most_unbalanced,
            most_balanced,
            categories,
            voter_summary: VoterSummary {
                active_voters: active.len(),
                high_bias: biased.len(),
                balanced,
                high_bias_range,
            },
            voters,
        }
    }
}
