//! Single-elimination bracket layout
//!
//! Slots are numbered leaf round first: for a bracket of size `B`, round 1
//! owns positions `1..=B/2`, round 2 the next `B/4`, and the final is
//! position `B-1`. Slot `i` (0-based within its round) feeds slot `i/2` of
//! the next round, filling PRO when `i` is even, so the lower-numbered
//! feeder always takes PRO.
//!
//! Layouts are generated once per supported size and shared.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::debate::Side;
use crate::error::RuleViolation;
use crate::AgentId;

/// Bracket sizes the engine generates layouts for
pub const SUPPORTED_SIZES: [u32; 4] = [2, 4, 8, 16];

/// Stage of the bracket, counted back from the final
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundKind {
    RoundOf16,
    Quarterfinal,
    Semifinal,
    Final,
}

impl RoundKind {
    pub fn of(round: u32, total_rounds: u32) -> RoundKind {
        match total_rounds.saturating_sub(round) {
            0 => RoundKind::Final,
            1 => RoundKind::Semifinal,
            2 => RoundKind::Quarterfinal,
            _ => RoundKind::RoundOf16,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RoundKind::RoundOf16 => "Round of 16",
            RoundKind::Quarterfinal => "Quarterfinal",
            RoundKind::Semifinal => "Semifinal",
            RoundKind::Final => "Final",
        }
    }
}

/// Where a slot's winner goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feed {
    pub position: u32,
    pub side: Side,
}

/// A first-round pairing by seed; seeds above the field size are byes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pairing {
    pub position: u32,
    pub pro_seed: u32,
    pub con_seed: u32,
}

/// Generated slot numbering and feeder map for one bracket size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketLayout {
    size: u32,
    rounds: u32,
    pairings: Vec<Pairing>,
}

impl BracketLayout {
    fn generate(size: u32) -> Self {
        let rounds = size.trailing_zeros();
        let order = seeding_order(size);
        let pairings = order
            .chunks(2)
            .enumerate()
            .map(|(i, pair)| Pairing {
                position: i as u32 + 1,
                pro_seed: pair[0],
                con_seed: pair[1],
            })
            .collect();
        Self {
            size,
            rounds,
            pairings,
        }
    }

    /// Shared layout for a supported bracket size
    pub fn for_size(size: u32) -> Result<&'static BracketLayout, RuleViolation> {
        static LAYOUTS: OnceLock<Vec<BracketLayout>> = OnceLock::new();
        let layouts =
            LAYOUTS.get_or_init(|| SUPPORTED_SIZES.iter().map(|&s| Self::generate(s)).collect());
        layouts
            .iter()
            .find(|layout| layout.size == size)
            .ok_or_else(|| RuleViolation::Validation(format!("unsupported bracket size {}", size)))
    }

    /// Layout for the smallest supported bracket that fits `field` entrants
    pub fn for_field(field: usize) -> Result<&'static BracketLayout, RuleViolation> {
        let size = bracket_size(field).ok_or_else(|| {
            RuleViolation::Validation(format!("field of {} cannot be bracketed", field))
        })?;
        Self::for_size(size)
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn total_rounds(&self) -> u32 {
        self.rounds
    }

    /// Total number of slots (`size - 1`)
    pub fn slot_count(&self) -> u32 {
        self.size - 1
    }

    pub fn final_position(&self) -> u32 {
        self.size - 1
    }

    /// First position of a round
    pub fn round_start(&self, round: u32) -> u32 {
        self.size - (self.size >> (round - 1)) + 1
    }

    pub fn slots_in_round(&self, round: u32) -> u32 {
        self.size >> round
    }

    pub fn positions(&self, round: u32) -> std::ops::RangeInclusive<u32> {
        let start = self.round_start(round);
        start..=start + self.slots_in_round(round) - 1
    }

    pub fn round_of(&self, position: u32) -> Option<u32> {
        (1..=self.rounds).find(|&round| self.positions(round).contains(&position))
    }

    /// Later slot fed by `position`; `None` for the final
    pub fn feeder(&self, position: u32) -> Option<Feed> {
        let round = self.round_of(position)?;
        if round == self.rounds {
            return None;
        }
        let index = position - self.round_start(round);
        let side = if index % 2 == 0 { Side::PRO } else { Side::CON };
        Some(Feed {
            position: self.round_start(round + 1) + index / 2,
            side,
        })
    }

    /// The two slots feeding `position`, lower-numbered (PRO) first
    pub fn feeders_of(&self, position: u32) -> Option<(u32, u32)> {
        let round = self.round_of(position)?;
        if round == 1 {
            return None;
        }
        let index = position - self.round_start(round);
        let first = self.round_start(round - 1) + index * 2;
        Some((first, first + 1))
    }

    /// Canonical first-round pairings by seed
    pub fn pairings(&self) -> &[Pairing] {
        &self.pairings
    }
}

/// Smallest supported bracket size holding `field` entrants
pub fn bracket_size(field: usize) -> Option<u32> {
    SUPPORTED_SIZES
        .iter()
        .copied()
        .find(|&size| field >= 2 && size as usize >= field)
}

/// Standard seeding order: 1 meets the lowest seed, recursively.
///
/// For 8: `[1, 8, 4, 5, 2, 7, 3, 6]`, read in pairs.
pub fn seeding_order(size: u32) -> Vec<u32> {
    let mut order = vec![1u32];
    while (order.len() as u32) < size {
        let next_len = order.len() as u32 * 2;
        order = order
            .iter()
            .flat_map(|&seed| [seed, next_len + 1 - seed])
            .collect();
    }
    order
}

/// Placement of an agent eliminated in `round`
pub fn placement_for_loss(round: u32, total_rounds: u32) -> u32 {
    (1u32 << total_rounds.saturating_sub(round)) + 1
}

/// Seeding input for one registered agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedCandidate {
    pub agent_id: AgentId,
    /// Base rating plus tournament bonus
    pub rating: f64,
    pub wins: u32,
    pub registered_at: DateTime<Utc>,
}

/// Order candidates for seeding: rating desc, wins desc, registration asc.
/// The agent id closes the order so equal tuples stay deterministic.
pub fn seed_order(mut candidates: Vec<SeedCandidate>) -> Vec<SeedCandidate> {
    candidates.sort_by(|a, b| {
        b.rating
            .total_cmp(&a.rating)
            .then_with(|| b.wins.cmp(&a.wins))
            .then_with(|| a.registered_at.cmp(&b.registered_at))
            .then_with(|| a.agent_id.cmp(&b.agent_id))
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    #[test]
    fn test_seeding_order() {
        assert_eq!(seeding_order(2), vec![1, 2]);
        assert_eq!(seeding_order(4), vec![1, 4, 2, 3]);
        assert_eq!(seeding_order(8), vec![1, 8, 4, 5, 2, 7, 3, 6]);
        let sixteen = seeding_order(16);
        assert_eq!(&sixteen[..4], &[1, 16, 8, 9]);
        assert_eq!(sixteen.len(), 16);
    }

    #[test]
    fn test_bracket_size_rounding() {
        assert_eq!(bracket_size(1), None);
        assert_eq!(bracket_size(2), Some(2));
        assert_eq!(bracket_size(3), Some(4));
        assert_eq!(bracket_size(5), Some(8));
        assert_eq!(bracket_size(16), Some(16));
        assert_eq!(bracket_size(17), None);
    }

    #[test]
    fn test_eight_slot_feeder_map() {
        let layout = BracketLayout::for_size(8).unwrap();
        assert_eq!(layout.total_rounds(), 3);
        assert_eq!(layout.positions(1), 1..=4);
        assert_eq!(layout.positions(2), 5..=6);
        assert_eq!(layout.final_position(), 7);

        assert_eq!(layout.feeder(1), Some(Feed { position: 5, side: Side::PRO }));
        assert_eq!(layout.feeder(2), Some(Feed { position: 5, side: Side::CON }));
        assert_eq!(layout.feeder(3), Some(Feed { position: 6, side: Side::PRO }));
        assert_eq!(layout.feeder(6), Some(Feed { position: 7, side: Side::CON }));
        assert_eq!(layout.feeder(7), None);
        assert_eq!(layout.feeders_of(5), Some((1, 2)));
        assert_eq!(layout.feeders_of(1), None);
    }

    #[test]
    fn test_every_slot_but_final_feeds_exactly_one_side() {
        for size in SUPPORTED_SIZES {
            let layout = BracketLayout::for_size(size).unwrap();
            let mut targets = std::collections::HashSet::new();
            for position in 1..layout.final_position() {
                let feed = layout.feeder(position).unwrap();
                assert!(targets.insert((feed.position, feed.side)), "size {size} pos {position}");
            }
            assert_eq!(targets.len() as u32, layout.slot_count() - 1);
        }
    }

    #[test]
    fn test_first_round_pairings_for_eight() {
        let layout = BracketLayout::for_size(8).unwrap();
        let pairs: Vec<(u32, u32)> = layout
            .pairings()
            .iter()
            .map(|p| (p.pro_seed, p.con_seed))
            .collect();
        assert_eq!(pairs, vec![(1, 8), (4, 5), (2, 7), (3, 6)]);
    }

    #[test]
    fn test_round_kinds_and_placements() {
        assert_eq!(RoundKind::of(3, 3), RoundKind::Final);
        assert_eq!(RoundKind::of(1, 3), RoundKind::Quarterfinal);
        assert_eq!(RoundKind::of(1, 4), RoundKind::RoundOf16);
        assert_eq!(placement_for_loss(3, 3), 2);
        assert_eq!(placement_for_loss(2, 3), 3);
        assert_eq!(placement_for_loss(1, 3), 5);
        assert_eq!(placement_for_loss(1, 4), 9);
    }

    #[test]
    fn test_seed_order_is_total_and_stable() {
        let now = Utc::now();
        let make = |rating: f64, wins: u32, offset: i64| SeedCandidate {
            agent_id: Uuid::new_v4(),
            rating,
            wins,
            registered_at: now + Duration::minutes(offset),
        };
        let strong = make(1200.0, 1, 5);
        let veteran = make(1100.0, 9, 3);
        let early = make(1100.0, 2, 0);
        let late = make(1100.0, 2, 1);
        let input = vec![late.clone(), early.clone(), strong.clone(), veteran.clone()];

        let first = seed_order(input.clone());
        let mut reversed = input;
        reversed.reverse();
        let second = seed_order(reversed);

        let ids: Vec<_> = first.iter().map(|c| c.agent_id).collect();
        assert_eq!(
            ids,
            vec![strong.agent_id, veteran.agent_id, early.agent_id, late.agent_id]
        );
        assert_eq!(first, second);
    }
}
