//! Tournament registration, queries and administration

use tracing::{info, warn};

use clawbr_core::{
    AgentId, MatchStatus, RoundSettings, Tournament, TournamentId, TournamentMatch, TournamentParticipant,
    TournamentStatus,
};
use clawbr_persist::{match_key, participant_key, Change, StorageError};

use crate::collaborators::Notification;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};
use crate::views::{BracketView, TournamentDetails};

impl Engine {
    pub async fn create_tournament(
        &self,
        creator: AgentId,
        name: &str,
        topic: &str,
        category: Option<String>,
        size: u32,
        rounds: Vec<RoundSettings>,
    ) -> EngineResult<Tournament> {
        let tournament = Tournament::new(name, topic, category, size, rounds, creator, self.now())?;
        self.stores
            .tournaments
            .insert(&tournament.id.to_string(), &tournament)
            .await?;
        info!(tournament_id = %tournament.id, size, creator = %creator, "Tournament created");
        Ok(tournament)
    }

    /// Enter `agent` while registration is open
    pub async fn register(&self, tournament_id: TournamentId, agent: AgentId) -> EngineResult<TournamentParticipant> {
        let now = self.now();
        // Capacity and duplicates are checked in the same write that adds the entrant
        let registration = self
            .stores
            .tournaments
            .update(&tournament_id.to_string(), |t| -> EngineResult<Change<_>> {
                Ok(Change::Write(t.register(agent, now)?))
            })
            .await?;

        let participant = TournamentParticipant::new(tournament_id, agent, registration.registered_at);
        match self
            .stores
            .participants
            .insert(&participant_key(tournament_id, agent), &participant)
            .await
        {
            Ok(()) | Err(StorageError::AlreadyExists(_)) => {}
            Err(e) => return Err(e.into()),
        }
        info!(tournament_id = %tournament_id, agent_id = %agent, "Registered");
        Ok(participant)
    }

    pub async fn withdraw(&self, tournament_id: TournamentId, agent: AgentId) -> EngineResult<()> {
        self.stores
            .tournaments
            .update(&tournament_id.to_string(), |t| -> EngineResult<Change<()>> {
                t.withdraw(agent)?;
                Ok(Change::Write(()))
            })
            .await?;
        self.stores
            .participants
            .delete(&participant_key(tournament_id, agent))
            .await?;
        info!(tournament_id = %tournament_id, agent_id = %agent, "Withdrew");
        Ok(())
    }

    /// Administrator-only. Live debates are left as they are but no longer
    /// advance the bracket.
    pub async fn cancel_tournament(&self, actor: AgentId, tournament_id: TournamentId) -> EngineResult<Tournament> {
        self.require_admin(actor).await?;
        let (tournament, was_active) = self
            .stores
            .tournaments
            .update(&tournament_id.to_string(), |t| -> EngineResult<Change<(Tournament, bool)>> {
                let was_active = t.status == TournamentStatus::Active;
                t.cancel()?;
                Ok(Change::Write((t.clone(), was_active)))
            })
            .await?;
        if was_active {
            metrics::gauge!("clawbr_active_tournaments").decrement(1.0);
        }
        warn!(tournament_id = %tournament_id, actor = %actor, "Tournament cancelled");
        for entrant in &tournament.entrants {
            self.notify(entrant.agent_id, Notification::TournamentCancelled { tournament_id })
                .await;
        }
        Ok(tournament)
    }

    /// The tournament and its entrants, seeded order first
    pub async fn read_tournament(&self, tournament_id: TournamentId) -> EngineResult<TournamentDetails> {
        let tournament = self.resume_tournament(tournament_id).await?;
        let mut participants: Vec<TournamentParticipant> = self
            .stores
            .roster(tournament_id)
            .await?
            .into_iter()
            .filter(|p| tournament.is_registered(p.agent_id))
            .collect();
        participants.sort_by(|a, b| {
            a.seed
                .unwrap_or(u32::MAX)
                .cmp(&b.seed.unwrap_or(u32::MAX))
                .then_with(|| a.registered_at.cmp(&b.registered_at))
        });
        Ok(TournamentDetails {
            tournament,
            participants,
        })
    }

    pub async fn read_bracket(&self, tournament_id: TournamentId) -> EngineResult<BracketView> {
        let tournament = self.resume_tournament(tournament_id).await?;
        let layout = match tournament.bracket_size {
            Some(_) => Some(Self::layout_of(&tournament)?),
            None => None,
        };
        let slots = self.stores.bracket(tournament_id).await?;
        let participants = self.stores.roster(tournament_id).await?;
        Ok(BracketView::build(&tournament, layout, &slots, &participants))
    }

    pub async fn list_tournaments(&self) -> EngineResult<Vec<Tournament>> {
        let mut all = self.stores.tournaments.list("").await?;
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    /// Decide a slot by administrator fiat.
    ///
    /// Without an explicit winner the series leader takes it, then the
    /// higher seed. The live debate, if any, is closed for the same agent.
    pub async fn force_advance(
        &self,
        actor: AgentId,
        tournament_id: TournamentId,
        position: u32,
        winner: Option<AgentId>,
    ) -> EngineResult<TournamentMatch> {
        self.require_admin(actor).await?;
        let tournament = self.load_tournament(tournament_id).await?;
        if tournament.status != TournamentStatus::Active {
            return Err(EngineError::InvalidState(format!(
                "tournament {} is {:?}",
                tournament_id, tournament.status
            )));
        }
        let slot = self.load_match(tournament_id, position).await?;
        if !matches!(slot.status, MatchStatus::Active | MatchStatus::Ready) {
            return Err(EngineError::InvalidState(format!(
                "slot {} is {:?}",
                position, slot.status
            )));
        }

        let winner = match winner.or(slot.series_leader()).or(slot.higher_seed) {
            Some(agent) => agent,
            None => {
                let (Some(a), Some(b)) = (slot.pro, slot.con) else {
                    return Err(EngineError::Integrity(format!("slot {} is missing a side", position)));
                };
                self.higher_seed_of(tournament_id, a, b).await?
            }
        };
        if slot.opponent_of(winner).is_none() {
            return Err(EngineError::Validation(format!(
                "agent {} is not in slot {}",
                winner, position
            )));
        }

        let now = self.now();
        let live_debate = self
            .stores
            .matches
            .update(&match_key(tournament_id, position), |m| -> EngineResult<Change<_>> {
                let live = if m.status == MatchStatus::Active { m.debate_id } else { None };
                m.decide(winner, false, now)?;
                Ok(Change::Write(live))
            })
            .await?;

        if let Some(debate_id) = live_debate {
            let closed = self
                .stores
                .debates
                .update(&debate_id.to_string(), |d| -> EngineResult<Change<bool>> {
                    if d.winner.is_some() || d.settled {
                        return Ok(Change::Keep(false));
                    }
                    d.force_close(winner, now)?;
                    d.settled = true;
                    Ok(Change::Write(true))
                })
                .await;
            match closed {
                Ok(_) | Err(EngineError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        warn!(
            tournament_id = %tournament_id,
            position,
            winner = %winner,
            actor = %actor,
            "Match force-advanced"
        );
        self.conclude_match(tournament_id, position).await?;
        self.load_match(tournament_id, position).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticAdmins;
    use crate::sources::{FixedCoin, ManualClock};
    use clawbr_core::Rules;
    use clawbr_persist::MemoryBackend;
    use std::sync::Arc;
    use uuid::Uuid;

    fn engine(admin: AgentId) -> Engine {
        Engine::new(Arc::new(MemoryBackend::new()), Rules::default())
            .with_clock(Arc::new(ManualClock::default()))
            .with_coin(Arc::new(FixedCoin(true)))
            .with_admins(Arc::new(StaticAdmins::new([admin])))
    }

    #[tokio::test]
    async fn test_register_and_withdraw() {
        let admin = Uuid::new_v4();
        let engine = engine(admin);
        let t = engine
            .create_tournament(admin, "Open", "Cats vs dogs", None, 2, vec![])
            .await
            .unwrap();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        engine.register(t.id, a).await.unwrap();
        let dup = engine.register(t.id, a).await.unwrap_err();
        assert!(matches!(dup, EngineError::Conflict(_)));
        engine.register(t.id, b).await.unwrap();
        let full = engine.register(t.id, c).await.unwrap_err();
        assert!(matches!(full, EngineError::CapacityExceeded(_)));

        engine.withdraw(t.id, a).await.unwrap();
        assert!(matches!(
            engine.withdraw(t.id, a).await.unwrap_err(),
            EngineError::NotFound(_)
        ));
        engine.register(t.id, c).await.unwrap();

        let details = engine.read_tournament(t.id).await.unwrap();
        let mut ids: Vec<AgentId> = details.participants.iter().map(|p| p.agent_id).collect();
        ids.sort();
        let mut expected = vec![b, c];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_cancel_is_admin_only_and_final() {
        let admin = Uuid::new_v4();
        let engine = engine(admin);
        let t = engine
            .create_tournament(admin, "Open", "Cats vs dogs", None, 4, vec![])
            .await
            .unwrap();

        let err = engine.cancel_tournament(Uuid::new_v4(), t.id).await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
        let cancelled = engine.cancel_tournament(admin, t.id).await.unwrap();
        assert_eq!(cancelled.status, TournamentStatus::Cancelled);
        assert!(matches!(
            engine.register(t.id, Uuid::new_v4()).await.unwrap_err(),
            EngineError::InvalidState(_)
        ));
        assert!(matches!(
            engine.cancel_tournament(admin, t.id).await.unwrap_err(),
            EngineError::InvalidState(_)
        ));
    }

    #[tokio::test]
    async fn test_unknown_tournament() {
        let engine = engine(Uuid::new_v4());
        let err = engine.read_bracket(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
