//! Tournament, participant and bracket-slot entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bracket::{bracket_size, BracketLayout};
use crate::debate::Side;
use crate::error::RuleViolation;
use crate::rating::RatingChange;
use crate::{AgentId, DebateId, TournamentId};

/// Largest field the bracket generator supports
pub const MAX_FIELD: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Registration,
    Seeding,
    Active,
    Completed,
    Cancelled,
}

/// Debate format for one round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSettings {
    pub max_posts: u32,
    /// Odd number of games in a series
    pub best_of: u32,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            max_posts: 3,
            best_of: 1,
        }
    }
}

impl RoundSettings {
    pub fn validate(&self) -> Result<(), RuleViolation> {
        if self.max_posts == 0 {
            return Err(RuleViolation::Validation("max posts must be at least 1".into()));
        }
        if self.best_of == 0 || self.best_of % 2 == 0 {
            return Err(RuleViolation::Validation(format!(
                "best-of must be odd, got {}",
                self.best_of
            )));
        }
        Ok(())
    }
}

/// An agent's place in the registration list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub agent_id: AgentId,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: TournamentId,
    pub name: String,
    pub topic: String,
    pub category: Option<String>,
    pub status: TournamentStatus,
    /// Declared field size
    pub size: u32,
    /// Registration list; authoritative for capacity and seeding
    pub entrants: Vec<Registration>,
    pub bracket_size: Option<u32>,
    pub current_round: u32,
    pub total_rounds: u32,
    /// Per-round format, indexed from round 1; the last entry repeats
    pub rounds: Vec<RoundSettings>,
    pub created_by: AgentId,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub champion: Option<AgentId>,
}

impl Tournament {
    pub fn new(
        name: &str,
        topic: &str,
        category: Option<String>,
        size: u32,
        rounds: Vec<RoundSettings>,
        created_by: AgentId,
        now: DateTime<Utc>,
    ) -> Result<Self, RuleViolation> {
        if name.trim().is_empty() || topic.trim().is_empty() {
            return Err(RuleViolation::Validation("name and topic are required".into()));
        }
        if !(2..=MAX_FIELD).contains(&size) {
            return Err(RuleViolation::Validation(format!(
                "field size must be between 2 and {}, got {}",
                MAX_FIELD, size
            )));
        }
        for settings in &rounds {
            settings.validate()?;
        }
        Ok(Self {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            topic: topic.trim().to_string(),
            category,
            status: TournamentStatus::Registration,
            size,
            entrants: Vec::new(),
            bracket_size: None,
            current_round: 0,
            total_rounds: 0,
            rounds,
            created_by,
            created_at: now,
            started_at: None,
            completed_at: None,
            champion: None,
        })
    }

    pub fn registered(&self) -> usize {
        self.entrants.len()
    }

    pub fn is_registered(&self, agent: AgentId) -> bool {
        self.entrants.iter().any(|e| e.agent_id == agent)
    }

    fn require(&self, status: TournamentStatus) -> Result<(), RuleViolation> {
        if self.status != status {
            return Err(RuleViolation::InvalidState(format!(
                "tournament {} is {:?}, not {:?}",
                self.id, self.status, status
            )));
        }
        Ok(())
    }

    /// Add an entrant while registration is open
    pub fn register(&mut self, agent: AgentId, now: DateTime<Utc>) -> Result<Registration, RuleViolation> {
        self.require(TournamentStatus::Registration)?;
        if self.is_registered(agent) {
            return Err(RuleViolation::Conflict(format!("agent {} already registered", agent)));
        }
        if self.registered() >= self.size as usize {
            return Err(RuleViolation::CapacityExceeded(format!(
                "tournament {} is full ({} entrants)",
                self.id, self.size
            )));
        }
        let registration = Registration {
            agent_id: agent,
            registered_at: now,
        };
        self.entrants.push(registration);
        Ok(registration)
    }

    /// Remove an entrant while registration is open
    pub fn withdraw(&mut self, agent: AgentId) -> Result<(), RuleViolation> {
        self.require(TournamentStatus::Registration)?;
        let before = self.entrants.len();
        self.entrants.retain(|e| e.agent_id != agent);
        if self.entrants.len() == before {
            return Err(RuleViolation::NotFound(format!("agent {} is not registered", agent)));
        }
        Ok(())
    }

    /// Close registration. A normal start needs the full declared field,
    /// a forced one at least two entrants.
    pub fn begin_seeding(&mut self, force: bool) -> Result<(), RuleViolation> {
        self.require(TournamentStatus::Registration)?;
        let field = self.registered();
        if field < 2 {
            return Err(RuleViolation::InvalidState(format!(
                "need at least 2 entrants, have {}",
                field
            )));
        }
        if !force && field < self.size as usize {
            return Err(RuleViolation::InvalidState(format!(
                "need {} entrants, have {}",
                self.size, field
            )));
        }
        let size = bracket_size(field)
            .ok_or_else(|| RuleViolation::Validation(format!("field of {} cannot be bracketed", field)))?;
        self.bracket_size = Some(size);
        self.status = TournamentStatus::Seeding;
        Ok(())
    }

    /// Seeding done and the bracket exists; play begins
    pub fn activate(&mut self, layout: &BracketLayout, now: DateTime<Utc>) -> Result<(), RuleViolation> {
        self.require(TournamentStatus::Seeding)?;
        self.bracket_size = Some(layout.size());
        self.total_rounds = layout.total_rounds();
        self.current_round = 1;
        self.status = TournamentStatus::Active;
        self.started_at = Some(now);
        Ok(())
    }

    /// Crown the champion. Returns `false` if already completed for them.
    pub fn finish(&mut self, champion: AgentId, now: DateTime<Utc>) -> Result<bool, RuleViolation> {
        if self.status == TournamentStatus::Completed && self.champion == Some(champion) {
            return Ok(false);
        }
        self.require(TournamentStatus::Active)?;
        self.status = TournamentStatus::Completed;
        self.champion = Some(champion);
        self.current_round = self.total_rounds;
        self.completed_at = Some(now);
        Ok(true)
    }

    pub fn cancel(&mut self) -> Result<(), RuleViolation> {
        match self.status {
            TournamentStatus::Completed | TournamentStatus::Cancelled => Err(RuleViolation::InvalidState(
                format!("tournament {} is already {:?}", self.id, self.status),
            )),
            _ => {
                self.status = TournamentStatus::Cancelled;
                Ok(())
            }
        }
    }

    pub fn round_settings(&self, round: u32) -> RoundSettings {
        let index = round.saturating_sub(1) as usize;
        self.rounds
            .get(index)
            .or(self.rounds.last())
            .copied()
            .unwrap_or_default()
    }

    pub fn is_final_round(&self, round: u32) -> bool {
        round == self.total_rounds
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentParticipant {
    pub tournament_id: TournamentId,
    pub agent_id: AgentId,
    pub registered_at: DateTime<Utc>,
    pub seed: Option<u32>,
    pub rating_snapshot: Option<f64>,
    pub elimination_round: Option<u32>,
    pub final_placement: Option<u32>,
}

impl TournamentParticipant {
    pub fn new(tournament_id: TournamentId, agent_id: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            tournament_id,
            agent_id,
            registered_at: now,
            seed: None,
            rating_snapshot: None,
            elimination_round: None,
            final_placement: None,
        }
    }

    /// Record the champion's placement
    pub fn crown(&mut self) -> bool {
        if self.final_placement == Some(1) {
            return false;
        }
        self.final_placement = Some(1);
        true
    }

    /// Record elimination once; later calls are no-ops
    pub fn eliminate(&mut self, round: u32, placement: u32) -> bool {
        if self.elimination_round.is_some() {
            return false;
        }
        self.elimination_round = Some(round);
        self.final_placement = Some(placement);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Waiting for one or both feeders
    Pending,
    /// Both sides known, no debate yet
    Ready,
    Active,
    Bye,
    Completed,
}

/// One decided game of a series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game: u32,
    pub debate_id: DebateId,
    pub winner: AgentId,
    pub forfeit: bool,
}

/// Durable marker for a match decision whose effects are still being applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub winner: AgentId,
    pub loser: AgentId,
    pub forfeit: bool,
    /// Rating changes fixed before the first write so retries reuse them
    pub rating_plan: Option<(RatingChange, RatingChange)>,
    pub rated: bool,
    pub eliminated: bool,
    pub advanced: bool,
}

/// Outcome of writing an agent into a slot side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    Filled,
    /// The write completed the slot
    BecameReady,
    /// The same agent was already there
    AlreadyFilled,
}

/// A bracket slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentMatch {
    pub tournament_id: TournamentId,
    pub position: u32,
    pub round: u32,
    /// PRO for the current game
    pub pro: Option<AgentId>,
    /// CON for the current game
    pub con: Option<AgentId>,
    pub winner: Option<AgentId>,
    pub status: MatchStatus,
    pub best_of: u32,
    pub max_posts: u32,
    pub current_game: u32,
    /// PRO of game 1; fixed series identity
    pub original_pro: Option<AgentId>,
    /// CON of game 1; fixed series identity
    pub original_con: Option<AgentId>,
    pub original_pro_wins: u32,
    pub original_con_wins: u32,
    pub higher_seed: Option<AgentId>,
    pub debate_id: Option<DebateId>,
    pub games: Vec<GameRecord>,
    pub completion: Option<CompletionMarker>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl TournamentMatch {
    pub fn new(tournament_id: TournamentId, position: u32, round: u32, settings: RoundSettings) -> Self {
        Self {
            tournament_id,
            position,
            round,
            pro: None,
            con: None,
            winner: None,
            status: MatchStatus::Pending,
            best_of: settings.best_of,
            max_posts: settings.max_posts,
            current_game: 0,
            original_pro: None,
            original_con: None,
            original_pro_wins: 0,
            original_con_wins: 0,
            higher_seed: None,
            debate_id: None,
            games: Vec::new(),
            completion: None,
            decided_at: None,
        }
    }

    pub fn side(&self, side: Side) -> Option<AgentId> {
        match side {
            Side::Challenger => self.pro,
            Side::Opponent => self.con,
        }
    }

    pub fn is_decided(&self) -> bool {
        matches!(self.status, MatchStatus::Completed | MatchStatus::Bye)
    }

    /// Write a feeder winner into one side of this slot
    pub fn fill(&mut self, side: Side, agent: AgentId) -> Result<FillOutcome, RuleViolation> {
        match self.side(side) {
            Some(existing) if existing == agent => return Ok(FillOutcome::AlreadyFilled),
            Some(existing) => {
                return Err(RuleViolation::Conflict(format!(
                    "slot {} {} already holds {}",
                    self.position,
                    side.stance(),
                    existing
                )))
            }
            None => {}
        }
        if self.status != MatchStatus::Pending {
            return Err(RuleViolation::InvalidState(format!(
                "slot {} is {:?}",
                self.position, self.status
            )));
        }
        match side {
            Side::Challenger => self.pro = Some(agent),
            Side::Opponent => self.con = Some(agent),
        }
        if self.pro.is_some() && self.con.is_some() {
            self.status = MatchStatus::Ready;
            return Ok(FillOutcome::BecameReady);
        }
        Ok(FillOutcome::Filled)
    }

    /// Auto-advance the sole agent of a first-round slot
    pub fn mark_bye(&mut self, agent: AgentId, now: DateTime<Utc>) {
        self.pro = Some(agent);
        self.con = None;
        self.winner = Some(agent);
        self.status = MatchStatus::Bye;
        self.decided_at = Some(now);
    }

    /// Fix the series orientation after the coin flip and open game 1
    pub fn start(
        &mut self,
        pro: AgentId,
        con: AgentId,
        higher_seed: AgentId,
        debate_id: DebateId,
    ) -> Result<(), RuleViolation> {
        if self.status != MatchStatus::Ready {
            return Err(RuleViolation::InvalidState(format!(
                "slot {} is {:?}, not ready",
                self.position, self.status
            )));
        }
        let mut expected = [self.pro, self.con];
        let mut given = [Some(pro), Some(con)];
        expected.sort();
        given.sort();
        if expected != given {
            return Err(RuleViolation::Validation("sides do not match the slot".into()));
        }
        self.pro = Some(pro);
        self.con = Some(con);
        self.original_pro = Some(pro);
        self.original_con = Some(con);
        self.higher_seed = Some(higher_seed);
        self.current_game = 1;
        self.debate_id = Some(debate_id);
        self.status = MatchStatus::Active;
        Ok(())
    }

    /// The other participant of the series
    pub fn opponent_of(&self, agent: AgentId) -> Option<AgentId> {
        let (a, b) = (self.original_pro.or(self.pro), self.original_con.or(self.con));
        if a == Some(agent) {
            b
        } else if b == Some(agent) {
            a
        } else {
            None
        }
    }

    /// Close the match with `winner` and open the completion marker
    pub fn decide(&mut self, winner: AgentId, forfeit: bool, now: DateTime<Utc>) -> Result<AgentId, RuleViolation> {
        if !matches!(self.status, MatchStatus::Active | MatchStatus::Ready) {
            return Err(RuleViolation::InvalidState(format!(
                "slot {} is {:?}",
                self.position, self.status
            )));
        }
        let loser = self
            .opponent_of(winner)
            .ok_or_else(|| RuleViolation::Validation("winner is not in this match".into()))?;
        self.winner = Some(winner);
        self.status = MatchStatus::Completed;
        self.decided_at = Some(now);
        self.completion = Some(CompletionMarker {
            winner,
            loser,
            forfeit,
            rating_plan: None,
            rated: false,
            eliminated: false,
            advanced: false,
        });
        Ok(loser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> TournamentMatch {
        TournamentMatch::new(Uuid::new_v4(), 5, 2, RoundSettings::default())
    }

    #[test]
    fn test_fill_becomes_ready_only_when_complete() {
        let mut m = slot();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(m.fill(Side::PRO, a).unwrap(), FillOutcome::Filled);
        assert_eq!(m.status, MatchStatus::Pending);
        assert_eq!(m.fill(Side::PRO, a).unwrap(), FillOutcome::AlreadyFilled);
        assert_eq!(m.fill(Side::CON, b).unwrap(), FillOutcome::BecameReady);
        assert_eq!(m.status, MatchStatus::Ready);
    }

    #[test]
    fn test_fill_rejects_second_winner_for_same_side() {
        let mut m = slot();
        m.fill(Side::PRO, Uuid::new_v4()).unwrap();
        let err = m.fill(Side::PRO, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, RuleViolation::Conflict(_)));
    }

    #[test]
    fn test_start_then_decide() {
        let mut m = slot();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        m.fill(Side::PRO, a).unwrap();
        m.fill(Side::CON, b).unwrap();
        m.start(b, a, a, Uuid::new_v4()).unwrap();
        assert_eq!(m.original_pro, Some(b));
        assert_eq!(m.status, MatchStatus::Active);

        let loser = m.decide(a, false, Utc::now()).unwrap();
        assert_eq!(loser, b);
        assert_eq!(m.status, MatchStatus::Completed);
        assert!(m.completion.is_some());
        assert!(m.decide(a, false, Utc::now()).is_err());
    }

    #[test]
    fn test_round_settings_fallback() {
        let t = Tournament::new(
            "Spring Cup",
            "AI should be open source",
            None,
            8,
            vec![RoundSettings { max_posts: 2, best_of: 1 }, RoundSettings { max_posts: 4, best_of: 3 }],
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(t.round_settings(1).max_posts, 2);
        assert_eq!(t.round_settings(3).best_of, 3);
    }

    fn cup(size: u32) -> Tournament {
        Tournament::new("Cup", "Topic", None, size, vec![], Uuid::new_v4(), Utc::now()).unwrap()
    }

    #[test]
    fn test_registration_capacity_and_duplicates() {
        let mut t = cup(2);
        let a = Uuid::new_v4();
        t.register(a, Utc::now()).unwrap();
        assert!(matches!(t.register(a, Utc::now()), Err(RuleViolation::Conflict(_))));
        t.register(Uuid::new_v4(), Utc::now()).unwrap();
        assert!(matches!(
            t.register(Uuid::new_v4(), Utc::now()),
            Err(RuleViolation::CapacityExceeded(_))
        ));
        t.withdraw(a).unwrap();
        assert!(matches!(t.withdraw(a), Err(RuleViolation::NotFound(_))));
        assert_eq!(t.registered(), 1);
    }

    #[test]
    fn test_start_requires_full_field_unless_forced() {
        let mut t = cup(8);
        for _ in 0..5 {
            t.register(Uuid::new_v4(), Utc::now()).unwrap();
        }
        assert!(matches!(t.begin_seeding(false), Err(RuleViolation::InvalidState(_))));
        t.begin_seeding(true).unwrap();
        assert_eq!(t.status, TournamentStatus::Seeding);
        assert_eq!(t.bracket_size, Some(8));
        assert!(t.register(Uuid::new_v4(), Utc::now()).is_err());

        let layout = BracketLayout::for_size(8).unwrap();
        t.activate(layout, Utc::now()).unwrap();
        assert_eq!((t.current_round, t.total_rounds), (1, 3));

        let champ = Uuid::new_v4();
        assert!(t.finish(champ, Utc::now()).unwrap());
        assert!(!t.finish(champ, Utc::now()).unwrap());
        assert!(t.cancel().is_err());
    }

    #[test]
    fn test_forced_start_needs_two() {
        let mut t = cup(4);
        t.register(Uuid::new_v4(), Utc::now()).unwrap();
        assert!(t.begin_seeding(true).is_err());
    }

    #[test]
    fn test_even_best_of_rejected() {
        let bad = RoundSettings { max_posts: 3, best_of: 2 };
        assert!(bad.validate().is_err());
    }
}
