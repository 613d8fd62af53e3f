//! Voting-pattern study over every stored debate

use tracing::info;

use clawbr_core::{DebateStatus, VoteStudy};

use crate::engine::Engine;
use crate::error::EngineResult;

impl Engine {
    /// Challenger win rates by category and per-voter side preference
    /// across completed debates
    pub async fn vote_study(&self) -> EngineResult<VoteStudy> {
        let debates = self.stores.debates.list("").await?;
        let mut entries = Vec::with_capacity(debates.len());
        for debate in debates {
            let votes = if debate.status == DebateStatus::Completed {
                self.stores.votes.for_debate(debate.id).await?
            } else {
                Vec::new()
            };
            entries.push((debate, votes));
        }

        let study = VoteStudy::compile(entries.iter().map(|(d, v)| (d, v.as_slice())), self.now());
        info!(
            debates = study.total_debates,
            with_votes = study.debates_with_votes,
            challenger_pct = study.challenger_pct,
            "Vote study compiled"
        );
        Ok(study)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::ManualClock;
    use clawbr_core::{Rules, Side};
    use clawbr_persist::MemoryBackend;
    use std::sync::Arc;
    use uuid::Uuid;

    const BALLOT: &str = "Sharper rebuttals throughout and a closing that tied every point back to the \
                          motion without dodging the hardest objection.";

    #[tokio::test]
    async fn test_study_reads_votes_of_completed_debates() {
        let engine = Engine::new(Arc::new(MemoryBackend::new()), Rules::default())
            .with_clock(Arc::new(ManualClock::default()));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let regular = Uuid::new_v4();

        for category in ["ethics", "ethics", "science"] {
            let debate = engine
                .create_challenge(a, Some(b), "Open weights", Some(category.to_string()), Some(1))
                .await
                .unwrap();
            engine.accept_challenge(debate.id, b).await.unwrap();
            engine.submit_post(debate.id, a, "Opening.").await.unwrap();
            engine.submit_post(debate.id, b, "Reply.").await.unwrap();
            engine.cast_vote(debate.id, regular, Side::Challenger, BALLOT).await.unwrap();
            engine.cast_vote(debate.id, Uuid::new_v4(), Side::Challenger, "short").await.unwrap();
        }
        // Still being argued; not part of the study
        let open = engine.create_challenge(a, None, "Pending", None, None).await.unwrap();

        let study = engine.vote_study().await.unwrap();
        assert_eq!(study.total_debates, 3);
        assert_eq!(study.debates_with_votes, 3);
        assert_eq!(study.challenger_wins, 3);
        assert_eq!(study.categories[0].name, "ethics");
        assert_eq!(study.categories[0].total, 2);
        assert!(study.most_balanced.is_none());

        let regular_stats = study.voters.iter().find(|v| v.voter == regular).unwrap();
        assert_eq!(regular_stats.total, 3);
        assert_eq!(regular_stats.challenger_pct, 100);
        assert_eq!(study.voter_summary.active_voters, 0);
        assert!(study.voters.iter().all(|v| v.voter != open.challenger));
    }
}
