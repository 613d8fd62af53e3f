//! Open debate lifecycle: challenge, turns, timeouts and crowd voting

use std::sync::Arc;

use chrono::Duration;
use clawbr_core::{AgentId, DebateStatus, Resolution, Rules, Side, VotingStatus};
use clawbr_engine::{Engine, EngineError, ManualClock};
use clawbr_persist::MemoryBackend;
use uuid::Uuid;

const LONG_VOTE: &str = "Clear structure and a direct rebuttal of every point raised; \
                         the closing argument tied the evidence back to the motion.";

fn setup() -> (Engine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let engine = Engine::new(Arc::new(MemoryBackend::new()), Rules::default()).with_clock(clock.clone());
    (engine, clock)
}

/// Challenge, accept and post until voting begins
async fn finished_debate(engine: &Engine, a: AgentId, b: AgentId) -> Uuid {
    let debate = engine
        .create_challenge(a, Some(b), "Static typing pays for itself", None, Some(2))
        .await
        .unwrap();
    engine.accept_challenge(debate.id, b).await.unwrap();
    for (author, text) in [(a, "Opening."), (b, "Rebuttal."), (a, "Closing.")] {
        engine.submit_post(debate.id, author, text).await.unwrap();
    }
    debate.id
}

#[tokio::test]
async fn test_silent_opponent_forfeits_after_timeout() {
    let (engine, clock) = setup();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let debate = engine
        .create_challenge(a, Some(b), "Tabs beat spaces", None, None)
        .await
        .unwrap();
    engine.accept_challenge(debate.id, b).await.unwrap();
    let posted = engine.submit_post(debate.id, a, "Tabs let readers choose.").await.unwrap();
    let deadline = posted.last_post_at.unwrap() + Rules::default().open_turn_timeout();

    // The turn is still open at exactly the timeout
    clock.set(deadline);
    let debate = engine.read_debate(debate.id).await.unwrap();
    assert_eq!(debate.status, DebateStatus::Active);

    clock.advance(Duration::seconds(1));
    let debate = engine.read_debate(debate.id).await.unwrap();

    assert_eq!(debate.status, DebateStatus::Forfeited);
    assert_eq!(debate.winner, Some(a));
    assert_eq!(debate.resolution, Some(Resolution::Forfeit));
    let winner = engine.rating(a).await.unwrap();
    let loser = engine.rating(b).await.unwrap();
    assert_eq!(winner.wins, 1);
    assert_eq!(winner.rating, 1025.0);
    assert_eq!(loser.losses, 1);
    assert_eq!(loser.forfeits, 1);
    assert_eq!(loser.rating, 975.0);

    // A late post cannot revive the debate
    let err = engine.submit_post(debate.id, b, "Sorry, was away.").await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn test_concurrent_reads_settle_once() {
    let (engine, clock) = setup();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let debate = engine.create_challenge(a, Some(b), "Vim or Emacs", None, None).await.unwrap();
    engine.accept_challenge(debate.id, b).await.unwrap();
    clock.advance(Duration::hours(13));

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let engine = engine.clone();
            let id = debate.id;
            tokio::spawn(async move { engine.read_debate(id).await })
        })
        .collect();
    for result in futures::future::join_all(readers).await {
        let debate = result.unwrap().unwrap();
        assert_eq!(debate.winner, Some(b));
    }

    assert_eq!(engine.rating(b).await.unwrap().wins, 1);
    assert_eq!(engine.rating(a).await.unwrap().forfeits, 1);
}

#[tokio::test]
async fn test_jury_must_fill_before_early_decision() {
    let (engine, _) = setup();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let id = finished_debate(&engine, a, b).await;

    let debate = engine.read_debate(id).await.unwrap();
    assert_eq!(debate.status, DebateStatus::Completed);
    assert_eq!(debate.voting_status, Some(VotingStatus::Open));
    assert!(debate.summaries.is_some());

    for side in [Side::Challenger; 6].into_iter().chain([Side::Opponent; 3]) {
        engine.cast_vote(id, Uuid::new_v4(), side, LONG_VOTE).await.unwrap();
    }
    let debate = engine.read_debate(id).await.unwrap();
    assert!(debate.winner.is_none(), "6-3 with nine votes stays open");

    // Short votes are stored but do not count toward the jury
    engine.cast_vote(id, Uuid::new_v4(), Side::Opponent, "meh").await.unwrap();
    assert!(engine.read_debate(id).await.unwrap().winner.is_none());

    engine.cast_vote(id, Uuid::new_v4(), Side::Opponent, LONG_VOTE).await.unwrap();
    let debate = engine.cast_vote(id, Uuid::new_v4(), Side::Opponent, LONG_VOTE).await.unwrap();
    assert_eq!(debate.winner, Some(a), "6-5 at eleven votes");
    assert_eq!(debate.resolution, Some(Resolution::Vote));
    assert_eq!(debate.voting_status, Some(VotingStatus::Closed));

    assert_eq!(engine.rating(a).await.unwrap().rating, 1015.0);
    assert_eq!(engine.rating(b).await.unwrap().rating, 985.0);

    let late = engine.cast_vote(id, Uuid::new_v4(), Side::Opponent, LONG_VOTE).await.unwrap_err();
    assert!(matches!(late, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn test_tied_expiry_goes_to_sudden_death() {
    let (engine, clock) = setup();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let id = finished_debate(&engine, a, b).await;
    engine.cast_vote(id, Uuid::new_v4(), Side::Challenger, LONG_VOTE).await.unwrap();
    engine.cast_vote(id, Uuid::new_v4(), Side::Opponent, LONG_VOTE).await.unwrap();

    clock.advance(Duration::hours(49));
    let debate = engine.read_debate(id).await.unwrap();
    assert_eq!(debate.voting_status, Some(VotingStatus::SuddenDeath));
    assert!(debate.winner.is_none());

    let debate = engine.cast_vote(id, Uuid::new_v4(), Side::Opponent, LONG_VOTE).await.unwrap();
    assert_eq!(debate.winner, Some(b));
}

#[tokio::test]
async fn test_expiry_without_votes_is_a_draw() {
    let (engine, clock) = setup();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let id = finished_debate(&engine, a, b).await;

    clock.advance(Duration::hours(49));
    let debate = engine.read_debate(id).await.unwrap();
    assert_eq!(debate.voting_status, Some(VotingStatus::Closed));
    assert!(debate.winner.is_none());
    assert!(debate.settled);
    assert_eq!(engine.rating(a).await.unwrap().wins, 0);
    assert_eq!(engine.rating(b).await.unwrap().losses, 0);
}

#[tokio::test]
async fn test_voting_rules() {
    let (engine, _) = setup();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let id = finished_debate(&engine, a, b).await;

    let own = engine.cast_vote(id, a, Side::Challenger, LONG_VOTE).await.unwrap_err();
    assert!(matches!(own, EngineError::Forbidden(_)));

    let empty = engine.cast_vote(id, Uuid::new_v4(), Side::Challenger, "   ").await.unwrap_err();
    assert!(matches!(empty, EngineError::Validation(_)));

    let voter = Uuid::new_v4();
    engine.cast_vote(id, voter, Side::Challenger, LONG_VOTE).await.unwrap();
    let twice = engine.cast_vote(id, voter, Side::Opponent, LONG_VOTE).await.unwrap_err();
    assert!(matches!(twice, EngineError::Conflict(_)));
}

#[tokio::test]
async fn test_conceding_settles_immediately() {
    let (engine, _) = setup();
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
    let debate = engine.create_challenge(a, None, "Monorepos scale", None, None).await.unwrap();
    engine.accept_challenge(debate.id, b).await.unwrap();

    let debate = engine.forfeit(debate.id, a).await.unwrap();
    assert_eq!(debate.winner, Some(b));
    assert!(debate.settled);
    let again = engine.forfeit(debate.id, a).await.unwrap_err();
    assert!(matches!(again, EngineError::Conflict(_)));
    assert_eq!(engine.rating(b).await.unwrap().wins, 1);
}
