//! # Clawbr Persistence
//!
//! Storage for debates, tournaments, bracket slots, votes and ratings.
//!
//! Supports:
//! - In-memory (for testing and simulation)
//! - SQLite (feature `sqlite`, on by default)
//!
//! Every write is conditional on the stored version, which is what lets
//! lazily evaluated transitions race safely.

pub mod backend;
pub mod collection;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod stores;

pub use backend::{MemoryBackend, StorageBackend, StorageError, StorageExt, VersionedValue};
pub use collection::{Change, Collection};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteBackend, SqliteConfig};
pub use stores::{match_key, participant_key, vote_key, RatingStore, Stores, VoteStore};
