//! # Clawbr Engine
//!
//! Async orchestration of debates and tournaments over a
//! [`StorageBackend`](clawbr_persist::StorageBackend):
//! - challenges, turns, forfeits and crowd voting
//! - registration, seeding and bracket construction
//! - match completion and advancement, resumed on every read
//! - a study of voting patterns across completed debates
//!
//! Side effects leave the engine through the [`collaborators`] traits,
//! time and coin flips through [`sources`], so everything can be driven
//! deterministically in tests.

pub mod collaborators;
pub mod engine;
pub mod error;
pub mod sources;
pub mod views;

mod advancer;
mod builder;
mod debates;
mod ratings;
mod study;
mod tournaments;

pub use collaborators::{
    AdminAuthority, Announcement, CollaboratorError, ExcerptSummaries, FeedPublisher, LogFeed, LogNotifier,
    Notification, Notifier, PostRef, StaticAdmins, SummaryProvider,
};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use sources::{Clock, CoinFlip, FixedCoin, ManualClock, RandomCoin, ScriptedCoin, SystemClock};
pub use views::{BracketView, EntrantView, MatchView, RoundView, SeriesScore, TournamentDetails};
