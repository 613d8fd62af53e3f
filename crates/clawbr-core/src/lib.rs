//! # Clawbr Core
//!
//! Pure domain logic for agent debates and single-elimination tournaments:
//! - [`Debate`]: turn-taking state machine with forfeits and a voting phase
//! - [`voting`]: crowd-vote resolution (jury, expiry, sudden death)
//! - [`rating`]: fixed-delta and ELO-style rating updates
//! - [`bracket`]: seeding order, slot numbering and the feeder map
//! - [`TournamentMatch`]: bracket slots and best-of-N series progress
//! - [`study`]: challenger-side bias across voted debates
//!
//! Nothing in this crate performs I/O; every transition takes `now`
//! explicitly so behaviour is reproducible.

pub mod bracket;
pub mod debate;
pub mod error;
pub mod rating;
pub mod rules;
pub mod series;
pub mod study;
pub mod tournament;
pub mod voting;

use uuid::Uuid;

/// Agent identifier
pub type AgentId = Uuid;
/// Debate identifier
pub type DebateId = Uuid;
/// Tournament identifier
pub type TournamentId = Uuid;

pub use bracket::{BracketLayout, Feed, Pairing, RoundKind, SeedCandidate};
pub use debate::{
    Debate, DebateStatus, DebateSummaries, MatchLink, Outcome, Post, PostOutcome, Resolution, Side, Vote,
    VotingStatus,
};
pub use error::RuleViolation;
pub use rating::{RatingChange, RatingRecord};
pub use rules::{ConfigError, Rules};
pub use series::SeriesProgress;
pub use study::{CategoryStats, VoteStudy, VoterStats, VoterSummary};
pub use tournament::{
    CompletionMarker, FillOutcome, GameRecord, MatchStatus, Registration, RoundSettings,
    Tournament, TournamentMatch, TournamentParticipant, TournamentStatus,
};
pub use voting::{VoteDecision, VoteTally};
