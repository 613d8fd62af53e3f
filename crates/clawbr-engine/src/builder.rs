//! Seeding and bracket construction

use tracing::{debug, info};

use clawbr_core::bracket::seed_order;
use clawbr_core::{
    AgentId, BracketLayout, MatchStatus, SeedCandidate, Side, Tournament, TournamentId, TournamentMatch,
    TournamentParticipant, TournamentStatus,
};
use clawbr_persist::{match_key, participant_key, Change, StorageError};

use crate::collaborators::Notification;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

impl Engine {
    /// Close registration, seed the field and open round 1.
    ///
    /// A normal start needs a full field and is open to the creator or an
    /// administrator; `force` starts with any field of at least two and is
    /// administrator-only. Re-running the call on a tournament stuck in
    /// seeding completes the interrupted build.
    pub async fn start_tournament(&self, actor: AgentId, tournament_id: TournamentId, force: bool) -> EngineResult<Tournament> {
        let tournament = self.load_tournament(tournament_id).await?;
        if force {
            self.require_admin(actor).await?;
        } else if tournament.created_by != actor && !self.admins.is_admin(actor).await {
            return Err(EngineError::Forbidden(format!(
                "only the creator or an administrator may start tournament {}",
                tournament_id
            )));
        }

        let tournament = self
            .stores
            .tournaments
            .update(&tournament_id.to_string(), |t| -> EngineResult<Change<Tournament>> {
                match t.status {
                    TournamentStatus::Registration => {
                        t.begin_seeding(force)?;
                        Ok(Change::Write(t.clone()))
                    }
                    TournamentStatus::Seeding => Ok(Change::Keep(t.clone())),
                    status => Err(EngineError::InvalidState(format!(
                        "tournament {} is {:?}",
                        t.id, status
                    ))),
                }
            })
            .await?;
        let layout = Self::layout_of(&tournament)?;
        info!(
            tournament_id = %tournament_id,
            field = tournament.registered(),
            bracket_size = layout.size(),
            forced = force,
            "Seeding tournament"
        );

        let seeded = self.seed_field(&tournament).await?;
        self.build_slots(&tournament, layout).await?;
        self.pair_first_round(&tournament, layout, &seeded).await?;

        let now = self.now();
        let activated = self
            .stores
            .tournaments
            .update(&tournament_id.to_string(), |t| -> EngineResult<Change<bool>> {
                if t.status == TournamentStatus::Active {
                    return Ok(Change::Keep(false));
                }
                t.activate(layout, now)?;
                Ok(Change::Write(true))
            })
            .await?;
        if activated {
            metrics::gauge!("clawbr_active_tournaments").increment(1.0);
        }

        // Every bye is placed before the first debate exists
        let tournament = self.load_tournament(tournament_id).await?;
        for position in 1..=layout.slot_count() {
            self.start_match(&tournament, position).await?;
        }

        if activated {
            info!(
                tournament_id = %tournament_id,
                rounds = tournament.total_rounds,
                "Tournament started"
            );
            for participant in &seeded {
                if let Some(seed) = participant.seed {
                    self.notify(
                        participant.agent_id,
                        Notification::TournamentStarted { tournament_id, seed },
                    )
                    .await;
                }
            }
        }
        self.load_tournament(tournament_id).await
    }

    /// Assign seeds by effective rating, wins, then registration time
    async fn seed_field(&self, tournament: &Tournament) -> EngineResult<Vec<TournamentParticipant>> {
        let mut candidates = Vec::with_capacity(tournament.entrants.len());
        for entrant in &tournament.entrants {
            let record = self.stores.ratings.get_or_default(entrant.agent_id).await?;
            candidates.push(SeedCandidate {
                agent_id: entrant.agent_id,
                rating: record.effective(),
                wins: record.wins,
                registered_at: entrant.registered_at,
            });
        }

        let mut seeded = Vec::with_capacity(candidates.len());
        for (index, candidate) in seed_order(candidates).into_iter().enumerate() {
            let seed = index as u32 + 1;
            let tournament_id = tournament.id;
            let participant = self
                .stores
                .participants
                .upsert(
                    &participant_key(tournament_id, candidate.agent_id),
                    || TournamentParticipant::new(tournament_id, candidate.agent_id, candidate.registered_at),
                    |p| -> EngineResult<Change<TournamentParticipant>> {
                        if p.seed.is_some() {
                            return Ok(Change::Keep(p.clone()));
                        }
                        p.seed = Some(seed);
                        p.rating_snapshot = Some(candidate.rating);
                        Ok(Change::Write(p.clone()))
                    },
                )
                .await?;
            debug!(agent_id = %participant.agent_id, seed = ?participant.seed, "Seed assigned");
            seeded.push(participant);
        }
        Ok(seeded)
    }

    async fn build_slots(&self, tournament: &Tournament, layout: &BracketLayout) -> EngineResult<()> {
        for round in 1..=layout.total_rounds() {
            let settings = tournament.round_settings(round);
            for position in layout.positions(round) {
                let slot = TournamentMatch::new(tournament.id, position, round, settings);
                match self
                    .stores
                    .matches
                    .insert(&match_key(tournament.id, position), &slot)
                    .await
                {
                    Ok(()) | Err(StorageError::AlreadyExists(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    /// Place round-1 entrants. A slot with one entrant is a bye; byes move
    /// into round 2 only after every round-1 slot is filled or marked.
    async fn pair_first_round(
        &self,
        tournament: &Tournament,
        layout: &BracketLayout,
        seeded: &[TournamentParticipant],
    ) -> EngineResult<()> {
        let by_seed = |seed: u32| {
            seeded
                .iter()
                .find(|p| p.seed == Some(seed))
                .map(|p| p.agent_id)
        };
        let now = self.now();
        let mut byes = Vec::new();

        for pairing in layout.pairings() {
            let key = match_key(tournament.id, pairing.position);
            match (by_seed(pairing.pro_seed), by_seed(pairing.con_seed)) {
                (Some(pro), Some(con)) => {
                    self.stores
                        .matches
                        .update(&key, |m| -> EngineResult<Change<()>> {
                            if m.status != MatchStatus::Pending {
                                return Ok(Change::Keep(()));
                            }
                            m.fill(Side::PRO, pro)?;
                            m.fill(Side::CON, con)?;
                            Ok(Change::Write(()))
                        })
                        .await?;
                }
                (Some(agent), None) | (None, Some(agent)) => {
                    self.stores
                        .matches
                        .update(&key, |m| -> EngineResult<Change<()>> {
                            if m.status != MatchStatus::Pending {
                                return Ok(Change::Keep(()));
                            }
                            m.mark_bye(agent, now);
                            Ok(Change::Write(()))
                        })
                        .await?;
                    debug!(tournament_id = %tournament.id, position = pairing.position, agent_id = %agent, "Bye");
                    byes.push((pairing.position, agent));
                }
                (None, None) => {
                    return Err(EngineError::Integrity(format!(
                        "round-1 slot {} has no entrants",
                        pairing.position
                    )))
                }
            }
        }

        for (position, agent) in byes {
            self.place_winner(tournament.id, layout, position, agent).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::StaticAdmins;
    use crate::sources::{FixedCoin, ManualClock};
    use clawbr_core::{RoundSettings, Rules};
    use clawbr_persist::MemoryBackend;
    use std::sync::Arc;
    use uuid::Uuid;

    fn engine(admin: AgentId) -> Engine {
        Engine::new(Arc::new(MemoryBackend::new()), Rules::default())
            .with_clock(Arc::new(ManualClock::default()))
            .with_coin(Arc::new(FixedCoin(true)))
            .with_admins(Arc::new(StaticAdmins::new([admin])))
    }

    async fn cup(engine: &Engine, creator: AgentId, size: u32, field: usize) -> (Tournament, Vec<AgentId>) {
        let t = engine
            .create_tournament(creator, "Cup", "Tabs or spaces", None, size, vec![RoundSettings::default()])
            .await
            .unwrap();
        let mut agents = Vec::new();
        for _ in 0..field {
            let agent = Uuid::new_v4();
            engine.register(t.id, agent).await.unwrap();
            agents.push(agent);
        }
        (t, agents)
    }

    #[tokio::test]
    async fn test_only_creator_or_admin_starts() {
        let admin = Uuid::new_v4();
        let creator = Uuid::new_v4();
        let engine = engine(admin);
        let (t, agents) = cup(&engine, creator, 4, 4).await;

        let err = engine.start_tournament(agents[0], t.id, false).await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));
        let err = engine.start_tournament(creator, t.id, true).await.unwrap_err();
        assert!(matches!(err, EngineError::Forbidden(_)));

        let started = engine.start_tournament(creator, t.id, false).await.unwrap();
        assert_eq!(started.status, TournamentStatus::Active);
        assert_eq!(started.bracket_size, Some(4));
        assert_eq!(started.total_rounds, 2);

        let err = engine.start_tournament(creator, t.id, false).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_seeds_are_unique_and_dense() {
        let admin = Uuid::new_v4();
        let engine = engine(admin);
        let (t, _) = cup(&engine, admin, 8, 6).await;
        engine.start_tournament(admin, t.id, true).await.unwrap();

        let mut seeds: Vec<u32> = engine
            .stores
            .roster(t.id)
            .await
            .unwrap()
            .into_iter()
            .filter_map(|p| p.seed)
            .collect();
        seeds.sort();
        assert_eq!(seeds, vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_interrupted_seeding_resumes() {
        let admin = Uuid::new_v4();
        let engine = engine(admin);
        let (t, _) = cup(&engine, admin, 4, 4).await;
        engine
            .stores
            .tournaments
            .update(&t.id.to_string(), |t| -> EngineResult<Change<()>> {
                t.begin_seeding(false)?;
                Ok(Change::Write(()))
            })
            .await
            .unwrap();

        let started = engine.start_tournament(admin, t.id, false).await.unwrap();
        assert_eq!(started.status, TournamentStatus::Active);
        let live = engine
            .stores
            .bracket(t.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.status == MatchStatus::Active)
            .count();
        assert_eq!(live, 2);
    }

    #[tokio::test]
    async fn test_byes_are_marked_before_round_two_fills() {
        let admin = Uuid::new_v4();
        let engine = engine(admin);
        let (t, _) = cup(&engine, admin, 16, 9).await;
        let tournament = engine
            .stores
            .tournaments
            .update(&t.id.to_string(), |t| -> EngineResult<Change<Tournament>> {
                t.begin_seeding(true)?;
                Ok(Change::Write(t.clone()))
            })
            .await
            .unwrap();
        let layout = Engine::layout_of(&tournament).unwrap();

        let seeded = engine.seed_field(&tournament).await.unwrap();
        engine.build_slots(&tournament, layout).await.unwrap();
        engine.pair_first_round(&tournament, layout, &seeded).await.unwrap();

        let slots = engine.stores.bracket(t.id).await.unwrap();
        let byes: Vec<u32> = slots
            .iter()
            .filter(|m| m.status == MatchStatus::Bye)
            .map(|m| m.position)
            .collect();
        assert_eq!(byes, vec![1, 3, 4, 5, 6, 7, 8]);
        let ready: Vec<u32> = slots
            .iter()
            .filter(|m| m.status == MatchStatus::Ready)
            .map(|m| m.position)
            .collect();
        assert_eq!(ready, vec![2, 10, 11, 12]);
        assert_eq!(slots[8].status, MatchStatus::Pending);
        assert!(slots[8].pro.is_some() && slots[8].con.is_none());
        assert_eq!(engine.stores.debates.count("").await.unwrap(), 0);
    }
}
