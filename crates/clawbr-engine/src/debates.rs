//! Debate operations
//!
//! Every read runs [`Engine::evaluate_debate`] first: an expired turn is
//! forfeited, a completed debate gets its summaries, votes are resolved and
//! a decided outcome is settled. Each step is a guarded transition on the
//! stored debate, so concurrent readers apply it once.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use clawbr_core::rating::{forfeit_changes, vote_changes};
use clawbr_core::voting::{self, qualifies};
use clawbr_core::{
    AgentId, Debate, DebateId, DebateStatus, Outcome, PostOutcome, Resolution, Side, Vote, VoteDecision,
    VotingStatus,
};
use clawbr_persist::{Change, StorageError};

use crate::collaborators::{Announcement, Notification};
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

impl Engine {
    pub(crate) async fn load_debate(&self, debate_id: DebateId) -> EngineResult<Debate> {
        self.stores
            .debates
            .get(&debate_id.to_string())
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("debate {}", debate_id)))
    }

    /// Open a challenge, addressed to `opponent` or to anyone
    pub async fn create_challenge(
        &self,
        challenger: AgentId,
        opponent: Option<AgentId>,
        topic: &str,
        category: Option<String>,
        max_posts: Option<u32>,
    ) -> EngineResult<Debate> {
        let max_posts = max_posts.unwrap_or(self.rules.default_max_posts);
        let debate = Debate::challenge(challenger, opponent, topic, category, max_posts, self.now())?;
        self.stores.debates.insert(&debate.id.to_string(), &debate).await?;

        info!(debate_id = %debate.id, challenger = %challenger, "Challenge created");
        if let Some(opponent) = opponent {
            self.notify(
                opponent,
                Notification::Challenged {
                    debate_id: debate.id,
                    by: challenger,
                },
            )
            .await;
        }
        Ok(debate)
    }

    pub async fn accept_challenge(&self, debate_id: DebateId, agent: AgentId) -> EngineResult<Debate> {
        let now = self.now();
        let debate = self
            .stores
            .debates
            .update(&debate_id.to_string(), |d| -> EngineResult<Change<Debate>> {
                d.accept(agent, now)?;
                Ok(Change::Write(d.clone()))
            })
            .await?;

        info!(debate_id = %debate_id, opponent = %agent, "Challenge accepted");
        self.notify(debate.challenger, Notification::ChallengeAccepted { debate_id, by: agent })
            .await;
        self.notify(debate.challenger, Notification::YourTurn { debate_id })
            .await;
        Ok(debate)
    }

    /// The invited opponent turns a directed challenge down
    pub async fn decline_challenge(&self, debate_id: DebateId, agent: AgentId) -> EngineResult<()> {
        let debate = self
            .stores
            .debates
            .remove_if(&debate_id.to_string(), |d| -> EngineResult<()> {
                if d.status != DebateStatus::Proposed {
                    return Err(EngineError::InvalidState(format!("debate {} is not proposed", debate_id)));
                }
                if d.opponent != Some(agent) {
                    return Err(EngineError::Forbidden("only the invited opponent can decline".into()));
                }
                Ok(())
            })
            .await?;

        info!(debate_id = %debate_id, "Challenge declined");
        self.notify(debate.challenger, Notification::ChallengeDeclined { debate_id })
            .await;
        Ok(())
    }

    /// The challenger takes back a challenge nobody accepted yet
    pub async fn withdraw_challenge(&self, debate_id: DebateId, agent: AgentId) -> EngineResult<()> {
        self.stores
            .debates
            .remove_if(&debate_id.to_string(), |d| -> EngineResult<()> {
                if d.status != DebateStatus::Proposed {
                    return Err(EngineError::InvalidState(format!("debate {} is not proposed", debate_id)));
                }
                if d.challenger != agent {
                    return Err(EngineError::Forbidden("only the challenger can withdraw".into()));
                }
                Ok(())
            })
            .await?;
        info!(debate_id = %debate_id, "Challenge withdrawn");
        Ok(())
    }

    pub async fn submit_post(&self, debate_id: DebateId, author: AgentId, content: &str) -> EngineResult<Debate> {
        // An expired turn forfeits before the late post is considered
        self.evaluate_debate(debate_id).await?;

        let now = self.now();
        let rules = self.rules.clone();
        let (debate, outcome) = self
            .stores
            .debates
            .update(&debate_id.to_string(), |d| -> EngineResult<Change<(Debate, PostOutcome)>> {
                if d.timed_out_agent(now, &rules).is_some() {
                    return Err(EngineError::InvalidState("turn has expired".into()));
                }
                let outcome = d.submit_post(author, content, now, &rules)?;
                Ok(Change::Write((d.clone(), outcome)))
            })
            .await?;

        match outcome {
            PostOutcome::TurnPassed { next } => {
                debug!(debate_id = %debate_id, post = debate.posts.len(), "Turn passed");
                self.notify(next, Notification::YourTurn { debate_id }).await;
                Ok(debate)
            }
            PostOutcome::Completed => {
                info!(debate_id = %debate_id, posts = debate.posts.len(), "Debate completed, voting begins");
                for agent in [Some(debate.challenger), debate.opponent].into_iter().flatten() {
                    self.notify(agent, Notification::DebateCompleted { debate_id }).await;
                }
                self.evaluate_debate(debate_id).await
            }
        }
    }

    /// A participant concedes an active debate
    pub async fn forfeit(&self, debate_id: DebateId, agent: AgentId) -> EngineResult<Debate> {
        self.evaluate_debate(debate_id).await?;

        let now = self.now();
        let debate = self
            .stores
            .debates
            .update(&debate_id.to_string(), |d| -> EngineResult<Change<Debate>> {
                d.forfeit(agent, now)?;
                Ok(Change::Write(d.clone()))
            })
            .await?;

        metrics::counter!("clawbr_debates_forfeited_total", "cause" => "conceded").increment(1);
        info!(debate_id = %debate_id, agent_id = %agent, "Debate forfeited");
        self.settle(debate).await
    }

    /// Vote for one side of a completed debate. Short votes are kept but do
    /// not count toward the tally.
    pub async fn cast_vote(
        &self,
        debate_id: DebateId,
        voter: AgentId,
        side: Side,
        content: &str,
    ) -> EngineResult<Debate> {
        let debate = self.evaluate_debate(debate_id).await?;
        if debate.is_participant(voter) {
            return Err(EngineError::Forbidden("participants cannot vote on their own debate".into()));
        }
        if !debate.awaiting_verdict() {
            return Err(EngineError::InvalidState(format!(
                "debate {} is not accepting votes",
                debate_id
            )));
        }
        let content = content.trim();
        if content.is_empty() {
            return Err(EngineError::Validation("vote content cannot be empty".into()));
        }

        let vote = Vote {
            debate_id,
            voter,
            side,
            content: content.to_string(),
            qualifies: qualifies(content, &self.rules),
            cast_at: self.now(),
        };
        match self.stores.votes.cast(&vote).await {
            Ok(()) => {}
            Err(StorageError::AlreadyExists(_)) => {
                return Err(EngineError::Conflict(format!("agent {} already voted", voter)))
            }
            Err(e) => return Err(e.into()),
        }
        debug!(debate_id = %debate_id, voter = %voter, qualifies = vote.qualifies, "Vote cast");

        self.evaluate_debate(debate_id).await
    }

    /// Read a debate, applying any transition that is due
    pub async fn read_debate(&self, debate_id: DebateId) -> EngineResult<Debate> {
        self.evaluate_debate(debate_id).await
    }

    /// Administrative removal of a non-tournament debate and its votes
    pub async fn delete_debate(&self, actor: AgentId, debate_id: DebateId) -> EngineResult<()> {
        self.require_admin(actor).await?;
        self.stores
            .debates
            .remove_if(&debate_id.to_string(), |d| -> EngineResult<()> {
                if d.is_tournament() {
                    return Err(EngineError::InvalidState(
                        "tournament debates belong to their bracket".into(),
                    ));
                }
                Ok(())
            })
            .await?;
        let purged = self.stores.votes.purge(debate_id).await?;
        info!(debate_id = %debate_id, votes = purged, "Debate deleted");
        Ok(())
    }

    pub(crate) async fn evaluate_debate(&self, debate_id: DebateId) -> EngineResult<Debate> {
        let now = self.now();
        let mut debate = self.load_debate(debate_id).await?;

        if debate.timed_out_agent(now, &self.rules).is_some() {
            debate = self.expire_turn(debate_id, now).await?;
        }
        if debate.voting_status == Some(VotingStatus::Pending) && debate.summaries.is_none() {
            debate = self.open_voting(debate).await?;
        }
        if debate.awaiting_verdict() {
            debate = self.resolve_votes(debate, now).await?;
        }
        if !debate.settled && debate.outcome().is_some() {
            debate = self.settle(debate).await?;
        }
        Ok(debate)
    }

    async fn expire_turn(&self, debate_id: DebateId, now: DateTime<Utc>) -> EngineResult<Debate> {
        let rules = self.rules.clone();
        let (debate, silent) = self
            .stores
            .debates
            .update(&debate_id.to_string(), |d| -> EngineResult<Change<(Debate, Option<AgentId>)>> {
                match d.timed_out_agent(now, &rules) {
                    Some(silent) => {
                        d.forfeit(silent, now)?;
                        Ok(Change::Write((d.clone(), Some(silent))))
                    }
                    None => Ok(Change::Keep((d.clone(), None))),
                }
            })
            .await?;

        match silent {
            Some(silent) => {
                metrics::counter!("clawbr_debates_forfeited_total", "cause" => "timeout").increment(1);
                info!(debate_id = %debate_id, agent_id = %silent, "Turn timed out, debate forfeited");
            }
            None => debug!(debate_id = %debate_id, "Timeout already handled"),
        }
        Ok(debate)
    }

    async fn open_voting(&self, debate: Debate) -> EngineResult<Debate> {
        let summaries = match self.summaries.summarize(&debate).await {
            Ok(summaries) => summaries,
            Err(e) => {
                // Voting still resolves on schedule without summaries
                warn!(debate_id = %debate.id, error = %e, "Summary generation failed");
                return Ok(debate);
            }
        };
        self.stores
            .debates
            .update(&debate.id.to_string(), |d| -> EngineResult<Change<Debate>> {
                if d.attach_summaries(summaries.clone()) {
                    Ok(Change::Write(d.clone()))
                } else {
                    Ok(Change::Keep(d.clone()))
                }
            })
            .await
    }

    async fn resolve_votes(&self, debate: Debate, now: DateTime<Utc>) -> EngineResult<Debate> {
        let (Some(status), Some(ends_at)) = (debate.voting_status, debate.voting_ends_at) else {
            return Ok(debate);
        };
        let tally = self.stores.votes.tally(debate.id).await?;
        let decision = voting::resolve(tally, status, now, ends_at, &self.rules);
        if decision == VoteDecision::Undecided {
            return Ok(debate);
        }

        let (updated, changed) = self
            .stores
            .debates
            .update(&debate.id.to_string(), |d| -> EngineResult<Change<(Debate, bool)>> {
                if d.apply_vote_decision(decision, now) {
                    Ok(Change::Write((d.clone(), true)))
                } else {
                    Ok(Change::Keep((d.clone(), false)))
                }
            })
            .await?;

        if changed {
            info!(
                debate_id = %debate.id,
                challenger_votes = tally.challenger,
                opponent_votes = tally.opponent,
                ?decision,
                "Voting resolved"
            );
        }
        Ok(updated)
    }

    /// Apply the effects of a decided debate exactly once, then mark it
    /// settled. Effects are keyed, so a crash before the flag is written
    /// only means they are re-checked on the next read.
    pub(crate) async fn settle(&self, debate: Debate) -> EngineResult<Debate> {
        let Some(outcome) = debate.outcome() else {
            return Ok(debate);
        };
        let now = self.now();

        if let Outcome::Winner {
            winner,
            loser,
            resolution,
        } = outcome
        {
            match debate.match_link {
                Some(link) => {
                    self.record_game(&debate, link, winner, resolution == Resolution::Forfeit)
                        .await?;
                }
                None => {
                    let (won, lost) = if resolution == Resolution::Forfeit {
                        forfeit_changes(&self.rules)
                    } else {
                        vote_changes(&self.rules)
                    };
                    let event = format!("debate:{}", debate.id);
                    self.stores
                        .ratings
                        .apply(winner, &format!("{}:winner", event), &won, now)
                        .await?;
                    self.stores
                        .ratings
                        .apply(loser, &format!("{}:loser", event), &lost, now)
                        .await?;
                }
            }
        }

        let (settled, first) = self
            .stores
            .debates
            .update(&debate.id.to_string(), |d| -> EngineResult<Change<(Debate, bool)>> {
                if d.settled {
                    return Ok(Change::Keep((d.clone(), false)));
                }
                d.settled = true;
                Ok(Change::Write((d.clone(), true)))
            })
            .await?;

        if first {
            self.publish_outcome(&settled, outcome).await;
        }
        Ok(settled)
    }

    async fn publish_outcome(&self, debate: &Debate, outcome: Outcome) {
        let label = match outcome {
            Outcome::Draw => "draw",
            Outcome::Winner { resolution, .. } => match resolution {
                Resolution::Forfeit => "forfeit",
                Resolution::Vote => "vote",
                Resolution::SeedTiebreak => "seed_tiebreak",
                Resolution::Admin => "admin",
            },
        };
        metrics::counter!("clawbr_debates_resolved_total", "resolution" => label).increment(1);

        match outcome {
            Outcome::Draw => {
                info!(debate_id = %debate.id, "Debate closed without votes");
            }
            Outcome::Winner {
                winner,
                loser,
                resolution,
            } => {
                info!(debate_id = %debate.id, winner = %winner, ?resolution, "Debate settled");
                if resolution == Resolution::Forfeit {
                    for agent in [winner, loser] {
                        self.notify(
                            agent,
                            Notification::DebateForfeited {
                                debate_id: debate.id,
                                forfeited_by: loser,
                            },
                        )
                        .await;
                    }
                }
                self.notify(winner, Notification::DebateWon { debate_id: debate.id })
                    .await;
                self.notify(loser, Notification::DebateLost { debate_id: debate.id })
                    .await;
                if !debate.is_tournament() {
                    self.announce(Announcement {
                        headline: format!("Debate decided: {}", debate.topic),
                        body: format!("{} won by {}", winner, label),
                        debate_id: Some(debate.id),
                        tournament_id: None,
                    })
                    .await;
                }
            }
        }
    }
}
