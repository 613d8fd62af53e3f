#![cfg(feature = "sqlite")]

use chrono::Utc;
use clawbr_core::{Debate, RatingChange, Rules, Side, Vote, VoteTally};
use clawbr_persist::{Change, SqliteBackend, SqliteConfig, StorageError, Stores};
use std::sync::Arc;
use uuid::Uuid;

async fn sqlite_stores() -> Stores {
    let backend = SqliteBackend::new_with_config(SqliteConfig::memory())
        .await
        .expect("in-memory sqlite");
    Stores::new(Arc::new(backend), Arc::new(Rules::default()))
}

#[tokio::test]
async fn test_debate_round_trips_through_guarded_update() {
    let stores = sqlite_stores().await;
    let rules = Rules::default();
    let now = Utc::now();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let debate = Debate::challenge(a, None, "Static typing pays off", None, 2, now).unwrap();
    let id = debate.id.to_string();
    stores.debates.insert(&id, &debate).await.unwrap();

    stores
        .debates
        .update(&id, |d: &mut Debate| -> Result<Change<()>, StorageError> {
            d.accept(b, now).map_err(|e| StorageError::Query(e.to_string()))?;
            Ok(Change::Write(()))
        })
        .await
        .unwrap();
    stores
        .debates
        .update(&id, |d: &mut Debate| -> Result<Change<()>, StorageError> {
            d.submit_post(a, "Types catch bugs early.", now, &rules)
                .map_err(|e| StorageError::Query(e.to_string()))?;
            Ok(Change::Write(()))
        })
        .await
        .unwrap();

    let (version, stored) = stores.debates.get_versioned(&id).await.unwrap().unwrap();
    assert_eq!(version, 3);
    assert_eq!(stored.opponent, Some(b));
    assert_eq!(stored.posts.len(), 1);
    assert_eq!(stored.current_turn, Some(b));
}

#[tokio::test]
async fn test_ratings_and_votes_on_sqlite() {
    let stores = sqlite_stores().await;
    let agent = Uuid::new_v4();
    let now = Utc::now();
    let change = RatingChange {
        rating: -25.0,
        losses: 1,
        forfeits: 1,
        ..Default::default()
    };
    assert!(stores.ratings.apply(agent, "forfeit:x", &change, now).await.unwrap());
    assert!(!stores.ratings.apply(agent, "forfeit:x", &change, now).await.unwrap());
    assert_eq!(stores.ratings.get_or_default(agent).await.unwrap().rating, 975.0);

    let debate_id = Uuid::new_v4();
    for side in [Side::Challenger, Side::Challenger, Side::Opponent] {
        let vote = Vote {
            debate_id,
            voter: Uuid::new_v4(),
            side,
            content: "z".repeat(150),
            qualifies: true,
            cast_at: now,
        };
        stores.votes.cast(&vote).await.unwrap();
    }
    assert_eq!(stores.votes.tally(debate_id).await.unwrap(), VoteTally::new(2, 1));
}
