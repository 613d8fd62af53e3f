//! Entity stores used by the engine

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use clawbr_core::{
    AgentId, Debate, DebateId, RatingChange, RatingRecord, Rules, Tournament, TournamentId,
    TournamentMatch, TournamentParticipant, Vote, VoteTally,
};

use crate::backend::{StorageBackend, StorageError};
use crate::collection::{Change, Collection};

/// Key of a bracket slot; zero-padded so slots list in position order
pub fn match_key(tournament_id: TournamentId, position: u32) -> String {
    format!("{}:{:02}", tournament_id, position)
}

pub fn participant_key(tournament_id: TournamentId, agent_id: AgentId) -> String {
    format!("{}:{}", tournament_id, agent_id)
}

pub fn vote_key(debate_id: DebateId, voter: AgentId) -> String {
    format!("{}:{}", debate_id, voter)
}

/// Rating records, one per agent, updated only through keyed events
#[derive(Debug, Clone)]
pub struct RatingStore {
    records: Collection<RatingRecord>,
    rules: Arc<Rules>,
}

impl RatingStore {
    pub fn new(backend: Arc<dyn StorageBackend>, rules: Arc<Rules>) -> Self {
        Self {
            records: Collection::new(backend, "rating:"),
            rules,
        }
    }

    /// Stored record, or a fresh one at the base rating
    pub async fn get_or_default(&self, agent_id: AgentId) -> Result<RatingRecord, StorageError> {
        Ok(self
            .records
            .get(&agent_id.to_string())
            .await?
            .unwrap_or_else(|| RatingRecord::new(agent_id, &self.rules)))
    }

    /// Apply `change` under `event` at most once. Returns whether it applied.
    pub async fn apply(
        &self,
        agent_id: AgentId,
        event: &str,
        change: &RatingChange,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let rules = self.rules.clone();
        let applied = self
            .records
            .upsert(
                &agent_id.to_string(),
                || RatingRecord::new(agent_id, &rules),
                |record| -> Result<Change<bool>, StorageError> {
                    if record.apply(event, change, now) {
                        Ok(Change::Write(true))
                    } else {
                        Ok(Change::Keep(false))
                    }
                },
            )
            .await?;
        if !applied {
            debug!(agent_id = %agent_id, event, "Rating event already applied");
        }
        Ok(applied)
    }

    /// Records by effective rating, highest first
    pub async fn leaderboard(&self, limit: usize) -> Result<Vec<RatingRecord>, StorageError> {
        let mut records = self.records.list("").await?;
        records.sort_by(|a, b| {
            b.effective()
                .total_cmp(&a.effective())
                .then_with(|| b.wins.cmp(&a.wins))
                .then_with(|| a.agent_id.cmp(&b.agent_id))
        });
        records.truncate(limit);
        Ok(records)
    }
}

/// Votes keyed by debate and voter; one vote per voter per debate
#[derive(Debug, Clone)]
pub struct VoteStore {
    votes: Collection<Vote>,
}

impl VoteStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            votes: Collection::new(backend, "vote:"),
        }
    }

    /// Store a vote; `AlreadyExists` if this voter already voted
    pub async fn cast(&self, vote: &Vote) -> Result<(), StorageError> {
        self.votes.insert(&vote_key(vote.debate_id, vote.voter), vote).await
    }

    pub async fn for_debate(&self, debate_id: DebateId) -> Result<Vec<Vote>, StorageError> {
        self.votes.list(&format!("{}:", debate_id)).await
    }

    /// Qualifying votes per side
    pub async fn tally(&self, debate_id: DebateId) -> Result<VoteTally, StorageError> {
        let mut tally = VoteTally::default();
        for vote in self.for_debate(debate_id).await? {
            if vote.qualifies {
                tally.add(vote.side);
            }
        }
        Ok(tally)
    }

    /// Drop every vote of a deleted debate
    pub async fn purge(&self, debate_id: DebateId) -> Result<usize, StorageError> {
        let votes = self.for_debate(debate_id).await?;
        for vote in &votes {
            self.votes.delete(&vote_key(vote.debate_id, vote.voter)).await?;
        }
        Ok(votes.len())
    }
}

/// All stores over one backend
#[derive(Debug, Clone)]
pub struct Stores {
    pub backend: Arc<dyn StorageBackend>,
    pub debates: Collection<Debate>,
    pub tournaments: Collection<Tournament>,
    pub matches: Collection<TournamentMatch>,
    pub participants: Collection<TournamentParticipant>,
    pub ratings: RatingStore,
    pub votes: VoteStore,
}

impl Stores {
    pub fn new(backend: Arc<dyn StorageBackend>, rules: Arc<Rules>) -> Self {
        Self {
            debates: Collection::new(backend.clone(), "debate:"),
            tournaments: Collection::new(backend.clone(), "tournament:"),
            matches: Collection::new(backend.clone(), "match:"),
            participants: Collection::new(backend.clone(), "participant:"),
            ratings: RatingStore::new(backend.clone(), rules),
            votes: VoteStore::new(backend.clone()),
            backend,
        }
    }

    /// Every slot of a tournament, in position order
    pub async fn bracket(&self, tournament_id: TournamentId) -> Result<Vec<TournamentMatch>, StorageError> {
        self.matches.list(&format!("{}:", tournament_id)).await
    }

    /// Every participant of a tournament
    pub async fn roster(&self, tournament_id: TournamentId) -> Result<Vec<TournamentParticipant>, StorageError> {
        self.participants.list(&format!("{}:", tournament_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use clawbr_core::Side;
    use uuid::Uuid;

    fn stores() -> Stores {
        Stores::new(Arc::new(MemoryBackend::new()), Arc::new(Rules::default()))
    }

    #[tokio::test]
    async fn test_rating_events_apply_once() {
        let stores = stores();
        let agent = Uuid::new_v4();
        let change = RatingChange {
            rating: 15.0,
            wins: 1,
            ..Default::default()
        };
        let now = Utc::now();

        assert!(stores.ratings.apply(agent, "debate:1:win", &change, now).await.unwrap());
        assert!(!stores.ratings.apply(agent, "debate:1:win", &change, now).await.unwrap());

        let record = stores.ratings.get_or_default(agent).await.unwrap();
        assert_eq!(record.rating, 1015.0);
        assert_eq!(record.wins, 1);
    }

    #[tokio::test]
    async fn test_leaderboard_orders_by_effective_rating() {
        let stores = stores();
        let now = Utc::now();
        let low = Uuid::new_v4();
        let high = Uuid::new_v4();
        let boosted = RatingChange {
            tournament_bonus: 40.0,
            ..Default::default()
        };
        stores.ratings.apply(low, "e1", &RatingChange::default(), now).await.unwrap();
        stores.ratings.apply(high, "e2", &boosted, now).await.unwrap();

        let board = stores.ratings.leaderboard(10).await.unwrap();
        let ids: Vec<_> = board.iter().map(|r| r.agent_id).collect();
        assert_eq!(ids, vec![high, low]);
        assert_eq!(stores.ratings.leaderboard(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_vote_tally_counts_only_qualifying() {
        let stores = stores();
        let debate = Uuid::new_v4();
        let long = "x".repeat(120);
        for (side, content) in [(Side::Challenger, long.as_str()), (Side::Opponent, "meh")] {
            let vote = Vote {
                debate_id: debate,
                voter: Uuid::new_v4(),
                side,
                content: content.to_string(),
                qualifies: content.len() >= 100,
                cast_at: Utc::now(),
            };
            stores.votes.cast(&vote).await.unwrap();
        }
        assert_eq!(stores.votes.tally(debate).await.unwrap(), VoteTally::new(1, 0));
        assert_eq!(stores.votes.for_debate(debate).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_vote_rejected() {
        let stores = stores();
        let vote = Vote {
            debate_id: Uuid::new_v4(),
            voter: Uuid::new_v4(),
            side: Side::Opponent,
            content: "y".repeat(100),
            qualifies: true,
            cast_at: Utc::now(),
        };
        stores.votes.cast(&vote).await.unwrap();
        assert!(matches!(
            stores.votes.cast(&vote).await,
            Err(StorageError::AlreadyExists(_))
        ));
        assert_eq!(stores.votes.purge(vote.debate_id).await.unwrap(), 1);
    }

    #[test]
    fn test_match_keys_sort_by_position() {
        let t = Uuid::new_v4();
        assert!(match_key(t, 2) < match_key(t, 10));
    }
}
