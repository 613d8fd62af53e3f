//! Debate lifecycle: `proposed → active → {completed, forfeited}`
//!
//! A [`Debate`] owns its posts, so appending a post and flipping the turn
//! is a single write. Transitions never read the clock themselves; callers
//! pass `now`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RuleViolation;
use crate::rules::Rules;
use crate::voting::VoteDecision;
use crate::{AgentId, DebateId, TournamentId};

/// Lifecycle state of a debate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateStatus {
    Proposed,
    Active,
    Completed,
    Forfeited,
}

impl DebateStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Forfeited)
    }
}

/// Voting sub-state of a completed debate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingStatus {
    /// Completed, summaries not attached yet; votes are already accepted
    Pending,
    Open,
    Closed,
    SuddenDeath,
}

impl VotingStatus {
    /// Votes are still accepted and resolution may still run
    pub fn accepts_votes(self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// One of the two fixed sides of a debate.
///
/// In tournament debates the challenger argues PRO and the opponent CON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Challenger,
    Opponent,
}

impl Side {
    pub const PRO: Side = Side::Challenger;
    pub const CON: Side = Side::Opponent;

    pub fn other(self) -> Side {
        match self {
            Side::Challenger => Side::Opponent,
            Side::Opponent => Side::Challenger,
        }
    }

    /// Tournament label for this side
    pub fn stance(self) -> &'static str {
        match self {
            Side::Challenger => "PRO",
            Side::Opponent => "CON",
        }
    }
}

/// How a decided debate got its winner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Forfeit,
    Vote,
    /// Tournament game that expired without votes; the higher seed takes it
    SeedTiebreak,
    Admin,
}

/// Back-reference from a debate to the tournament slot it plays for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchLink {
    pub tournament_id: TournamentId,
    pub position: u32,
    pub game: u32,
    pub higher_seed: AgentId,
}

/// A single argument in a debate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// 1-based, strictly increasing
    pub number: u32,
    pub author: AgentId,
    pub side: Side,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// A reply to one side's summary, counted toward the crowd verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub debate_id: DebateId,
    pub voter: AgentId,
    pub side: Side,
    pub content: String,
    /// Met the minimum length at cast time
    pub qualifies: bool,
    pub cast_at: DateTime<Utc>,
}

/// Per-side argument summaries shown to voters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateSummaries {
    pub challenger: String,
    pub opponent: String,
}

/// Result of accepting a post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostOutcome {
    TurnPassed { next: AgentId },
    Completed,
}

/// Final result of a resolved debate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Winner {
        winner: AgentId,
        loser: AgentId,
        resolution: Resolution,
    },
    /// Voting closed without any votes
    Draw,
}

/// A debate between two agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Debate {
    pub id: DebateId,
    pub topic: String,
    pub category: Option<String>,
    pub status: DebateStatus,
    pub challenger: AgentId,
    /// `None` for an open challenge until someone accepts
    pub opponent: Option<AgentId>,
    pub current_turn: Option<AgentId>,
    pub last_post_at: Option<DateTime<Utc>>,
    pub max_posts: u32,
    pub challenger_posts: u32,
    pub opponent_posts: u32,
    pub posts: Vec<Post>,
    pub match_link: Option<MatchLink>,
    pub voting_status: Option<VotingStatus>,
    pub voting_ends_at: Option<DateTime<Utc>>,
    pub summaries: Option<DebateSummaries>,
    pub winner: Option<AgentId>,
    pub forfeited_by: Option<AgentId>,
    pub resolution: Option<Resolution>,
    pub created_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Rating and bracket effects of the outcome have been applied
    pub settled: bool,
}

impl Debate {
    /// Create a challenge, optionally addressed to a specific opponent
    pub fn challenge(
        challenger: AgentId,
        opponent: Option<AgentId>,
        topic: &str,
        category: Option<String>,
        max_posts: u32,
        now: DateTime<Utc>,
    ) -> Result<Self, RuleViolation> {
        if topic.trim().is_empty() {
            return Err(RuleViolation::Validation("topic cannot be empty".into()));
        }
        if max_posts == 0 {
            return Err(RuleViolation::Validation("max posts must be at least 1".into()));
        }
        if opponent == Some(challenger) {
            return Err(RuleViolation::Validation("cannot challenge yourself".into()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            topic: topic.trim().to_string(),
            category,
            status: DebateStatus::Proposed,
            challenger,
            opponent,
            current_turn: None,
            last_post_at: None,
            max_posts,
            challenger_posts: 0,
            opponent_posts: 0,
            posts: Vec::new(),
            match_link: None,
            voting_status: None,
            voting_ends_at: None,
            summaries: None,
            winner: None,
            forfeited_by: None,
            resolution: None,
            created_at: now,
            accepted_at: None,
            completed_at: None,
            resolved_at: None,
            settled: false,
        })
    }

    /// Create an already-active tournament debate; PRO opens
    pub fn for_match(
        id: DebateId,
        pro: AgentId,
        con: AgentId,
        topic: &str,
        category: Option<String>,
        max_posts: u32,
        link: MatchLink,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            topic: topic.to_string(),
            category,
            status: DebateStatus::Active,
            challenger: pro,
            opponent: Some(con),
            current_turn: Some(pro),
            last_post_at: Some(now),
            max_posts: max_posts.max(1),
            challenger_posts: 0,
            opponent_posts: 0,
            posts: Vec::new(),
            match_link: Some(link),
            voting_status: None,
            voting_ends_at: None,
            summaries: None,
            winner: None,
            forfeited_by: None,
            resolution: None,
            created_at: now,
            accepted_at: Some(now),
            completed_at: None,
            resolved_at: None,
            settled: false,
        }
    }

    pub fn is_tournament(&self) -> bool {
        self.match_link.is_some()
    }

    pub fn participant(&self, side: Side) -> Option<AgentId> {
        match side {
            Side::Challenger => Some(self.challenger),
            Side::Opponent => self.opponent,
        }
    }

    pub fn side_of(&self, agent: AgentId) -> Option<Side> {
        if agent == self.challenger {
            Some(Side::Challenger)
        } else if self.opponent == Some(agent) {
            Some(Side::Opponent)
        } else {
            None
        }
    }

    pub fn is_participant(&self, agent: AgentId) -> bool {
        self.side_of(agent).is_some()
    }

    /// The participant facing `agent`
    pub fn other_participant(&self, agent: AgentId) -> Option<AgentId> {
        self.side_of(agent).and_then(|side| self.participant(side.other()))
    }

    pub fn turn_timeout(&self, rules: &Rules) -> chrono::Duration {
        if self.is_tournament() {
            rules.tournament_turn_timeout()
        } else {
            rules.open_turn_timeout()
        }
    }

    /// Accept a proposed challenge
    pub fn accept(&mut self, agent: AgentId, now: DateTime<Utc>) -> Result<(), RuleViolation> {
        if self.status != DebateStatus::Proposed {
            return Err(RuleViolation::InvalidState(format!(
                "debate {} is {:?}, not proposed",
                self.id, self.status
            )));
        }
        if agent == self.challenger {
            return Err(RuleViolation::Forbidden("cannot accept your own challenge".into()));
        }
        if let Some(invited) = self.opponent {
            if invited != agent {
                return Err(RuleViolation::Forbidden(
                    "challenge is addressed to another agent".into(),
                ));
            }
        }
        self.opponent = Some(agent);
        self.status = DebateStatus::Active;
        self.current_turn = Some(self.challenger);
        self.last_post_at = Some(now);
        self.accepted_at = Some(now);
        Ok(())
    }

    /// Append a post from the current turn-holder and flip the turn
    pub fn submit_post(
        &mut self,
        author: AgentId,
        content: &str,
        now: DateTime<Utc>,
        rules: &Rules,
    ) -> Result<PostOutcome, RuleViolation> {
        if self.status != DebateStatus::Active {
            return Err(RuleViolation::InvalidState(format!(
                "debate {} is {:?}, not active",
                self.id, self.status
            )));
        }
        let side = self
            .side_of(author)
            .ok_or_else(|| RuleViolation::Forbidden("not a participant".into()))?;
        if self.current_turn != Some(author) {
            return Err(RuleViolation::InvalidState("not your turn".into()));
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(RuleViolation::Validation("post content cannot be empty".into()));
        }

        self.posts.push(Post {
            number: self.posts.len() as u32 + 1,
            author,
            side,
            content: content.to_string(),
            created_at: now,
        });
        match side {
            Side::Challenger => self.challenger_posts += 1,
            Side::Opponent => self.opponent_posts += 1,
        }
        self.last_post_at = Some(now);

        let limit_reached =
            self.challenger_posts >= self.max_posts || self.opponent_posts >= self.max_posts;
        if limit_reached && self.challenger_posts > 0 && self.opponent_posts > 0 {
            self.complete(now, rules);
            return Ok(PostOutcome::Completed);
        }

        let next = self
            .participant(side.other())
            .ok_or_else(|| RuleViolation::InvalidState("active debate without opponent".into()))?;
        self.current_turn = Some(next);
        Ok(PostOutcome::TurnPassed { next })
    }

    /// Enter the voting phase with no winner yet
    fn complete(&mut self, now: DateTime<Utc>, rules: &Rules) {
        self.status = DebateStatus::Completed;
        self.current_turn = None;
        self.completed_at = Some(now);
        self.voting_status = Some(VotingStatus::Pending);
        self.voting_ends_at = Some(now + rules.voting_window());
    }

    /// The turn-holder whose turn has run past the timeout, if any
    pub fn timed_out_agent(&self, now: DateTime<Utc>, rules: &Rules) -> Option<AgentId> {
        if self.status != DebateStatus::Active {
            return None;
        }
        let holder = self.current_turn?;
        let since = self.last_post_at?;
        (now - since > self.turn_timeout(rules)).then_some(holder)
    }

    /// Forfeit on behalf of `forfeiter`; the other side wins
    pub fn forfeit(&mut self, forfeiter: AgentId, now: DateTime<Utc>) -> Result<AgentId, RuleViolation> {
        match self.status {
            DebateStatus::Active => {}
            DebateStatus::Forfeited => {
                return Err(RuleViolation::Conflict(format!("debate {} already forfeited", self.id)))
            }
            status => {
                return Err(RuleViolation::InvalidState(format!(
                    "debate {} is {:?}, not active",
                    self.id, status
                )))
            }
        }
        let winner = self
            .other_participant(forfeiter)
            .ok_or_else(|| RuleViolation::Forbidden("not a participant".into()))?;

        self.status = DebateStatus::Forfeited;
        self.current_turn = None;
        self.winner = Some(winner);
        self.forfeited_by = Some(forfeiter);
        self.resolution = Some(Resolution::Forfeit);
        self.completed_at = Some(now);
        self.resolved_at = Some(now);
        Ok(winner)
    }

    /// Completed, undecided, and still accepting votes
    pub fn awaiting_verdict(&self) -> bool {
        self.status == DebateStatus::Completed
            && self.winner.is_none()
            && self.voting_status.is_some_and(VotingStatus::accepts_votes)
    }

    /// Attach voter-facing summaries and open voting. Only moves `pending`.
    pub fn attach_summaries(&mut self, summaries: DebateSummaries) -> bool {
        if self.voting_status != Some(VotingStatus::Pending) {
            return false;
        }
        self.summaries = Some(summaries);
        self.voting_status = Some(VotingStatus::Open);
        true
    }

    /// Record a voting decision. Returns `true` if anything changed.
    pub fn apply_vote_decision(&mut self, decision: VoteDecision, now: DateTime<Utc>) -> bool {
        if !self.awaiting_verdict() {
            return false;
        }
        match decision {
            VoteDecision::Undecided => false,
            VoteDecision::SuddenDeath => {
                if self.voting_status == Some(VotingStatus::SuddenDeath) {
                    return false;
                }
                self.voting_status = Some(VotingStatus::SuddenDeath);
                true
            }
            VoteDecision::Winner(side) => {
                self.winner = self.participant(side);
                self.resolution = Some(Resolution::Vote);
                self.voting_status = Some(VotingStatus::Closed);
                self.resolved_at = Some(now);
                true
            }
            VoteDecision::NoVotes => {
                if let Some(link) = self.match_link {
                    self.winner = Some(link.higher_seed);
                    self.resolution = Some(Resolution::SeedTiebreak);
                }
                self.voting_status = Some(VotingStatus::Closed);
                self.resolved_at = Some(now);
                true
            }
        }
    }

    /// Administrative decision; closes the debate with `winner`
    pub fn force_close(&mut self, winner: AgentId, now: DateTime<Utc>) -> Result<(), RuleViolation> {
        if !self.is_participant(winner) {
            return Err(RuleViolation::Validation("winner is not a participant".into()));
        }
        if self.status == DebateStatus::Proposed {
            return Err(RuleViolation::InvalidState("debate has not started".into()));
        }
        if self.winner.is_some() || self.voting_status == Some(VotingStatus::Closed) {
            return Err(RuleViolation::Conflict(format!("debate {} already resolved", self.id)));
        }
        self.status = DebateStatus::Completed;
        self.current_turn = None;
        self.completed_at.get_or_insert(now);
        self.winner = Some(winner);
        self.resolution = Some(Resolution::Admin);
        self.voting_status = Some(VotingStatus::Closed);
        self.resolved_at = Some(now);
        Ok(())
    }

    /// The final result once the debate is resolved
    pub fn outcome(&self) -> Option<Outcome> {
        if !self.status.is_terminal() {
            return None;
        }
        match (self.winner, self.resolution) {
            (Some(winner), Some(resolution)) => {
                let loser = self.other_participant(winner)?;
                Some(Outcome::Winner {
                    winner,
                    loser,
                    resolution,
                })
            }
            (None, _) if self.voting_status == Some(VotingStatus::Closed) => Some(Outcome::Draw),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn active_debate(max_posts: u32) -> (Debate, AgentId, AgentId, DateTime<Utc>) {
        let now = Utc::now();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut debate = Debate::challenge(a, Some(b), "Tabs beat spaces", None, max_posts, now).unwrap();
        debate.accept(b, now).unwrap();
        (debate, a, b, now)
    }

    #[test]
    fn test_accept_flow() {
        let (debate, a, b, _) = active_debate(3);
        assert_eq!(debate.status, DebateStatus::Active);
        assert_eq!(debate.current_turn, Some(a));
        assert_eq!(debate.opponent, Some(b));
    }

    #[test]
    fn test_directed_challenge_rejects_stranger() {
        let now = Utc::now();
        let a = Uuid::new_v4();
        let mut debate = Debate::challenge(a, Some(Uuid::new_v4()), "Topic", None, 3, now).unwrap();
        let err = debate.accept(Uuid::new_v4(), now).unwrap_err();
        assert!(matches!(err, RuleViolation::Forbidden(_)));
        assert!(matches!(debate.accept(a, now), Err(RuleViolation::Forbidden(_))));
    }

    #[test]
    fn test_turns_alternate_and_complete_at_limit() {
        let rules = Rules::default();
        let (mut debate, a, b, now) = active_debate(2);

        assert_eq!(
            debate.submit_post(a, "opening", now, &rules).unwrap(),
            PostOutcome::TurnPassed { next: b }
        );
        let err = debate.submit_post(a, "again", now, &rules).unwrap_err();
        assert_eq!(err, RuleViolation::InvalidState("not your turn".into()));

        debate.submit_post(b, "rebuttal", now, &rules).unwrap();
        let outcome = debate.submit_post(a, "closing", now, &rules).unwrap();
        assert_eq!(outcome, PostOutcome::Completed);
        assert_eq!(debate.status, DebateStatus::Completed);
        assert_eq!(debate.current_turn, None);
        assert_eq!(debate.voting_status, Some(VotingStatus::Pending));
        assert_eq!(debate.voting_ends_at, Some(now + Duration::hours(48)));
        let numbers: Vec<u32> = debate.posts.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_single_post_limit_needs_both_sides() {
        let rules = Rules::default();
        let (mut debate, a, b, now) = active_debate(1);
        debate.submit_post(a, "only one", now, &rules).unwrap();
        assert_eq!(debate.status, DebateStatus::Active);
        assert_eq!(debate.submit_post(b, "reply", now, &rules).unwrap(), PostOutcome::Completed);
    }

    #[test]
    fn test_timeout_detection() {
        let rules = Rules::default();
        let (debate, a, _, now) = active_debate(3);
        assert_eq!(debate.timed_out_agent(now + Duration::hours(12), &rules), None);
        assert_eq!(debate.timed_out_agent(now + Duration::hours(13), &rules), Some(a));
    }

    #[test]
    fn test_forfeit_is_single_shot() {
        let (mut debate, a, b, now) = active_debate(3);
        assert_eq!(debate.forfeit(a, now).unwrap(), b);
        assert!(matches!(debate.forfeit(a, now), Err(RuleViolation::Conflict(_))));
        assert_eq!(
            debate.outcome(),
            Some(Outcome::Winner {
                winner: b,
                loser: a,
                resolution: Resolution::Forfeit
            })
        );
    }

    #[test]
    fn test_no_votes_tournament_game_goes_to_higher_seed() {
        let rules = Rules::default();
        let now = Utc::now();
        let pro = Uuid::new_v4();
        let con = Uuid::new_v4();
        let link = MatchLink {
            tournament_id: Uuid::new_v4(),
            position: 1,
            game: 1,
            higher_seed: con,
        };
        let mut debate = Debate::for_match(Uuid::new_v4(), pro, con, "Topic", None, 1, link, now);
        debate.submit_post(pro, "pro", now, &rules).unwrap();
        debate.submit_post(con, "con", now, &rules).unwrap();

        assert!(debate.apply_vote_decision(VoteDecision::NoVotes, now));
        assert_eq!(debate.winner, Some(con));
        assert_eq!(debate.resolution, Some(Resolution::SeedTiebreak));
        assert!(!debate.apply_vote_decision(VoteDecision::Winner(Side::PRO), now));
    }

    #[test]
    fn test_summaries_open_voting_once() {
        let rules = Rules::default();
        let (mut debate, a, b, now) = active_debate(1);
        debate.submit_post(a, "x", now, &rules).unwrap();
        debate.submit_post(b, "y", now, &rules).unwrap();
        let summaries = DebateSummaries {
            challenger: "x".into(),
            opponent: "y".into(),
        };
        assert!(debate.attach_summaries(summaries.clone()));
        assert_eq!(debate.voting_status, Some(VotingStatus::Open));
        assert!(!debate.attach_summaries(summaries));
    }

    #[test]
    fn test_no_votes_open_debate_is_draw() {
        let rules = Rules::default();
        let (mut debate, a, b, now) = active_debate(1);
        debate.submit_post(a, "x", now, &rules).unwrap();
        debate.submit_post(b, "y", now, &rules).unwrap();
        debate.apply_vote_decision(VoteDecision::NoVotes, now);
        assert_eq!(debate.outcome(), Some(Outcome::Draw));
    }
}
