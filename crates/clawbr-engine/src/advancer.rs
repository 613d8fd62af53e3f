//! Bracket advancement
//!
//! A decided match carries a durable [`CompletionMarker`] written in the
//! same guarded update that closes it. [`Engine::conclude_match`] then runs
//! rate, eliminate and advance (or finish), flagging each step on the
//! marker, and clears it. Every step is idempotent on its own, so a crash
//! anywhere is repaired by the next read of the tournament.
//!
//! [`CompletionMarker`]: clawbr_core::CompletionMarker

use tracing::{debug, info, warn};
use uuid::Uuid;

use clawbr_core::bracket::placement_for_loss;
use clawbr_core::rating::{match_changes, placement_change, MatchResultContext};
use clawbr_core::{
    AgentId, BracketLayout, CompletionMarker, Debate, FillOutcome, MatchLink, MatchStatus, RuleViolation,
    SeriesProgress, Side, Tournament, TournamentId, TournamentMatch, TournamentStatus,
};
use clawbr_persist::{match_key, participant_key, Change, StorageError};

use crate::collaborators::{Announcement, Notification};
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult};

impl Engine {
    pub(crate) async fn load_tournament(&self, tournament_id: TournamentId) -> EngineResult<Tournament> {
        self.stores
            .tournaments
            .get(&tournament_id.to_string())
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("tournament {}", tournament_id)))
    }

    pub(crate) async fn load_match(&self, tournament_id: TournamentId, position: u32) -> EngineResult<TournamentMatch> {
        self.stores
            .matches
            .get(&match_key(tournament_id, position))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("slot {} of tournament {}", position, tournament_id)))
    }

    pub(crate) fn layout_of(tournament: &Tournament) -> EngineResult<&'static BracketLayout> {
        let size = tournament
            .bracket_size
            .ok_or_else(|| EngineError::InvalidState(format!("tournament {} has no bracket", tournament.id)))?;
        Ok(BracketLayout::for_size(size)?)
    }

    /// The better-seeded of two entrants
    pub(crate) async fn higher_seed_of(
        &self,
        tournament_id: TournamentId,
        a: AgentId,
        b: AgentId,
    ) -> EngineResult<AgentId> {
        let seed = |agent: AgentId| async move {
            let participant = self
                .stores
                .participants
                .get(&participant_key(tournament_id, agent))
                .await?;
            Ok::<u32, EngineError>(participant.and_then(|p| p.seed).unwrap_or(u32::MAX))
        };
        Ok(if seed(a).await? <= seed(b).await? { a } else { b })
    }

    /// Count a finished tournament game. Returns whether this call recorded it.
    pub(crate) async fn record_game(
        &self,
        debate: &Debate,
        link: MatchLink,
        winner: AgentId,
        forfeit: bool,
    ) -> EngineResult<bool> {
        let tournament = self.load_tournament(link.tournament_id).await?;
        if tournament.status != TournamentStatus::Active {
            info!(
                tournament_id = %tournament.id,
                status = ?tournament.status,
                "Tournament not active, game result not advanced"
            );
            return Ok(false);
        }

        let now = self.now();
        let next_debate_id = Uuid::new_v4();
        let debate_id = debate.id;
        let progress = self
            .stores
            .matches
            .update(&match_key(link.tournament_id, link.position), |m| -> EngineResult<Change<SeriesProgress>> {
                let counted = m.games.iter().any(|g| g.debate_id == debate_id);
                if !counted && (m.status != MatchStatus::Active || m.debate_id != Some(debate_id)) {
                    // Slot was decided some other way, e.g. force-advanced
                    return Ok(Change::Keep(SeriesProgress::AlreadyRecorded));
                }
                match m.record_game(debate_id, winner, forfeit, next_debate_id, now)? {
                    SeriesProgress::AlreadyRecorded => Ok(Change::Keep(SeriesProgress::AlreadyRecorded)),
                    progress => Ok(Change::Write(progress)),
                }
            })
            .await?;

        match progress {
            SeriesProgress::AlreadyRecorded => {
                debug!(debate_id = %debate_id, position = link.position, "Game already counted");
                Ok(false)
            }
            SeriesProgress::NextGame { game, .. } => {
                info!(
                    tournament_id = %link.tournament_id,
                    position = link.position,
                    game,
                    "Series continues"
                );
                let slot = self.load_match(link.tournament_id, link.position).await?;
                self.ensure_live_debate(&tournament, &slot).await?;
                Ok(true)
            }
            SeriesProgress::Decided { winner, loser, forfeit } => {
                info!(
                    tournament_id = %link.tournament_id,
                    position = link.position,
                    winner = %winner,
                    loser = %loser,
                    forfeit,
                    "Match decided"
                );
                self.conclude_match(link.tournament_id, link.position).await?;
                Ok(true)
            }
        }
    }

    /// Make sure the live game of an active slot has its debate
    pub(crate) async fn ensure_live_debate(&self, tournament: &Tournament, slot: &TournamentMatch) -> EngineResult<()> {
        if slot.status != MatchStatus::Active {
            return Ok(());
        }
        let (Some(debate_id), Some(pro), Some(con), Some(higher_seed)) =
            (slot.debate_id, slot.pro, slot.con, slot.higher_seed)
        else {
            return Err(EngineError::Integrity(format!(
                "active slot {} is missing its sides",
                slot.position
            )));
        };
        if self.stores.debates.get(&debate_id.to_string()).await?.is_some() {
            return Ok(());
        }

        let link = MatchLink {
            tournament_id: tournament.id,
            position: slot.position,
            game: slot.current_game,
            higher_seed,
        };
        let debate = Debate::for_match(
            debate_id,
            pro,
            con,
            &tournament.topic,
            tournament.category.clone(),
            slot.max_posts,
            link,
            self.now(),
        );
        match self.stores.debates.insert(&debate_id.to_string(), &debate).await {
            Ok(()) => {}
            Err(StorageError::AlreadyExists(_)) => return Ok(()),
            Err(e) => return Err(e.into()),
        }

        info!(
            tournament_id = %tournament.id,
            position = slot.position,
            game = slot.current_game,
            debate_id = %debate_id,
            "Match debate created"
        );
        for (agent, side) in [(pro, Side::PRO), (con, Side::CON)] {
            self.notify(
                agent,
                Notification::MatchStarted {
                    tournament_id: tournament.id,
                    position: slot.position,
                    game: slot.current_game,
                    debate_id,
                    side,
                },
            )
            .await;
        }
        self.notify(pro, Notification::YourTurn { debate_id }).await;
        Ok(())
    }

    /// Flip for sides and open game 1 of a ready slot. No-op otherwise.
    pub(crate) async fn start_match(&self, tournament: &Tournament, position: u32) -> EngineResult<()> {
        if tournament.status != TournamentStatus::Active {
            return Ok(());
        }
        let slot = self.load_match(tournament.id, position).await?;
        if slot.status != MatchStatus::Ready {
            return Ok(());
        }
        let (Some(a), Some(b)) = (slot.pro, slot.con) else {
            return Err(EngineError::Integrity(format!("ready slot {} is missing a side", position)));
        };

        let higher = self.higher_seed_of(tournament.id, a, b).await?;
        let lower = if higher == a { b } else { a };
        // Flip outside the guarded update so a retry cannot re-flip
        let higher_on_pro = self.coin.flip();
        let (pro, con) = if higher_on_pro { (higher, lower) } else { (lower, higher) };
        let debate_id = Uuid::new_v4();

        let started = self
            .stores
            .matches
            .update(&match_key(tournament.id, position), |m| -> EngineResult<Change<bool>> {
                if m.status != MatchStatus::Ready {
                    return Ok(Change::Keep(false));
                }
                m.start(pro, con, higher, debate_id)?;
                Ok(Change::Write(true))
            })
            .await?;
        if !started {
            debug!(tournament_id = %tournament.id, position, "Slot already started");
            return Ok(());
        }

        info!(
            tournament_id = %tournament.id,
            position,
            pro = %pro,
            con = %con,
            higher_on_pro,
            "Sides assigned"
        );
        let slot = self.load_match(tournament.id, position).await?;
        self.ensure_live_debate(tournament, &slot).await
    }

    /// Write `winner` into the slot fed by `position`
    pub(crate) async fn place_winner(
        &self,
        tournament_id: TournamentId,
        layout: &BracketLayout,
        position: u32,
        winner: AgentId,
    ) -> EngineResult<Option<FillOutcome>> {
        let Some(feed) = layout.feeder(position) else {
            return Ok(None);
        };
        let outcome = self
            .stores
            .matches
            .update(&match_key(tournament_id, feed.position), |m| -> EngineResult<Change<FillOutcome>> {
                match m.fill(feed.side, winner) {
                    Ok(FillOutcome::AlreadyFilled) => Ok(Change::Keep(FillOutcome::AlreadyFilled)),
                    Ok(outcome) => Ok(Change::Write(outcome)),
                    Err(RuleViolation::Conflict(msg)) => Err(EngineError::Integrity(msg)),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        debug!(
            tournament_id = %tournament_id,
            from = position,
            to = feed.position,
            side = feed.side.stance(),
            ?outcome,
            "Winner placed"
        );
        Ok(Some(outcome))
    }

    async fn mark_step<F>(&self, tournament_id: TournamentId, position: u32, step: F) -> EngineResult<()>
    where
        F: Fn(&mut CompletionMarker) + Send + Sync,
    {
        self.stores
            .matches
            .update(&match_key(tournament_id, position), |m| -> EngineResult<Change<()>> {
                match m.completion.as_mut() {
                    Some(marker) => {
                        step(marker);
                        Ok(Change::Write(()))
                    }
                    None => Ok(Change::Keep(())),
                }
            })
            .await
    }

    /// Run the completion steps of a decided slot
    pub(crate) async fn conclude_match(&self, tournament_id: TournamentId, position: u32) -> EngineResult<()> {
        let tournament = self.load_tournament(tournament_id).await?;
        if !matches!(tournament.status, TournamentStatus::Active | TournamentStatus::Completed) {
            info!(
                tournament_id = %tournament_id,
                status = ?tournament.status,
                "Tournament not active, match not advanced"
            );
            return Ok(());
        }
        let layout = Self::layout_of(&tournament)?;
        let slot = self.load_match(tournament_id, position).await?;
        let Some(marker) = slot.completion.clone() else {
            return Ok(());
        };
        let now = self.now();

        if !marker.rated {
            let plan = match marker.rating_plan.clone() {
                Some(plan) => plan,
                None => {
                    let winner_rating = self.stores.ratings.get_or_default(marker.winner).await?.effective();
                    let loser_rating = self.stores.ratings.get_or_default(marker.loser).await?.effective();
                    let ctx = MatchResultContext {
                        round: slot.round,
                        total_rounds: tournament.total_rounds,
                        best_of: slot.best_of,
                        forfeit: marker.forfeit,
                    };
                    let fresh = match_changes(winner_rating, loser_rating, ctx, &self.rules);
                    // First plan written wins, so every retry applies the same numbers
                    let frozen = self
                        .stores
                        .matches
                        .update(&match_key(tournament_id, position), |m| -> EngineResult<Change<_>> {
                            let Some(marker) = m.completion.as_mut() else {
                                return Ok(Change::Keep(None));
                            };
                            if let Some(plan) = &marker.rating_plan {
                                return Ok(Change::Keep(Some(plan.clone())));
                            }
                            marker.rating_plan = Some(fresh.clone());
                            Ok(Change::Write(Some(fresh.clone())))
                        })
                        .await?;
                    match frozen {
                        Some(plan) => plan,
                        None => return Ok(()),
                    }
                }
            };
            let event = format!("match:{}:{}", tournament_id, position);
            self.stores
                .ratings
                .apply(marker.winner, &format!("{}:winner", event), &plan.0, now)
                .await?;
            self.stores
                .ratings
                .apply(marker.loser, &format!("{}:loser", event), &plan.1, now)
                .await?;
            self.mark_step(tournament_id, position, |m| m.rated = true).await?;
        }

        if !marker.eliminated {
            let placement = placement_for_loss(slot.round, tournament.total_rounds);
            let round = slot.round;
            let eliminated = self
                .stores
                .participants
                .update(&participant_key(tournament_id, marker.loser), |p| -> EngineResult<Change<bool>> {
                    if p.eliminate(round, placement) {
                        Ok(Change::Write(true))
                    } else {
                        Ok(Change::Keep(false))
                    }
                })
                .await?;
            if eliminated {
                info!(
                    tournament_id = %tournament_id,
                    agent_id = %marker.loser,
                    round,
                    placement,
                    "Eliminated"
                );
                self.notify(
                    marker.loser,
                    Notification::Eliminated {
                        tournament_id,
                        round,
                        placement,
                    },
                )
                .await;
            }
            self.mark_step(tournament_id, position, |m| m.eliminated = true).await?;
        }

        if !marker.advanced {
            if position == layout.final_position() {
                self.finish_tournament(tournament_id, marker.winner).await?;
            } else {
                self.place_winner(tournament_id, layout, position, marker.winner)
                    .await?;
            }
            self.mark_step(tournament_id, position, |m| m.advanced = true).await?;
        }

        let cleared = self
            .stores
            .matches
            .update(&match_key(tournament_id, position), |m| -> EngineResult<Change<bool>> {
                if m.completion.take().is_some() {
                    Ok(Change::Write(true))
                } else {
                    Ok(Change::Keep(false))
                }
            })
            .await?;
        if cleared {
            metrics::counter!("clawbr_matches_completed_total").increment(1);
            debug!(tournament_id = %tournament_id, position, "Match completion finished");
        }

        let tournament = self.load_tournament(tournament_id).await?;
        if tournament.status == TournamentStatus::Active {
            if let Some(feed) = layout.feeder(position) {
                self.start_match(&tournament, feed.position).await?;
            }
            self.refresh_round(tournament_id).await?;
        }
        Ok(())
    }

    /// Crown the champion and hand out placement bonuses
    pub(crate) async fn finish_tournament(&self, tournament_id: TournamentId, champion: AgentId) -> EngineResult<()> {
        let now = self.now();
        let first = self
            .stores
            .tournaments
            .update(&tournament_id.to_string(), |t| -> EngineResult<Change<bool>> {
                if t.finish(champion, now)? {
                    Ok(Change::Write(true))
                } else {
                    Ok(Change::Keep(false))
                }
            })
            .await?;
        self.stores
            .participants
            .update(&participant_key(tournament_id, champion), |p| -> EngineResult<Change<()>> {
                if p.crown() {
                    Ok(Change::Write(()))
                } else {
                    Ok(Change::Keep(()))
                }
            })
            .await?;

        let tournament = self.load_tournament(tournament_id).await?;
        let roster = self.stores.roster(tournament_id).await?;
        let event = format!("tournament:{}:placement", tournament_id);
        for participant in &roster {
            let Some(placement) = participant.final_placement else {
                continue;
            };
            let change = placement_change(placement, tournament.total_rounds, &self.rules);
            if change.tournament_bonus != 0.0 || change.tournaments_won > 0 {
                self.stores
                    .ratings
                    .apply(participant.agent_id, &event, &change, now)
                    .await?;
            }
        }

        if first {
            metrics::gauge!("clawbr_active_tournaments").decrement(1.0);
            info!(tournament_id = %tournament_id, champion = %champion, "Tournament completed");
            self.announce(Announcement {
                headline: format!("{} champion crowned", tournament.name),
                body: format!("{} won {} on \"{}\"", champion, tournament.name, tournament.topic),
                debate_id: None,
                tournament_id: Some(tournament_id),
            })
            .await;
            for participant in &roster {
                self.notify(
                    participant.agent_id,
                    Notification::TournamentCompleted {
                        tournament_id,
                        placement: participant.final_placement,
                    },
                )
                .await;
            }
        }
        Ok(())
    }

    /// Current round = lowest round with an undecided slot
    pub(crate) async fn refresh_round(&self, tournament_id: TournamentId) -> EngineResult<()> {
        let slots = self.stores.bracket(tournament_id).await?;
        let Some(round) = slots.iter().filter(|m| !m.is_decided()).map(|m| m.round).min() else {
            return Ok(());
        };
        self.stores
            .tournaments
            .update(&tournament_id.to_string(), |t| -> EngineResult<Change<()>> {
                if t.status != TournamentStatus::Active || t.current_round == round {
                    return Ok(Change::Keep(()));
                }
                t.current_round = round;
                Ok(Change::Write(()))
            })
            .await
    }

    /// Finish interrupted completions, start ready slots and evaluate every
    /// live debate of the tournament
    pub(crate) async fn resume_tournament(&self, tournament_id: TournamentId) -> EngineResult<Tournament> {
        let tournament = self.load_tournament(tournament_id).await?;
        if !matches!(tournament.status, TournamentStatus::Active | TournamentStatus::Completed) {
            return Ok(tournament);
        }

        for slot in self.stores.bracket(tournament_id).await? {
            if slot.completion.is_some() {
                warn!(tournament_id = %tournament_id, position = slot.position, "Resuming interrupted match completion");
                self.conclude_match(tournament_id, slot.position).await?;
            }
        }

        let tournament = self.load_tournament(tournament_id).await?;
        if tournament.status == TournamentStatus::Active {
            for slot in self.stores.bracket(tournament_id).await? {
                match slot.status {
                    MatchStatus::Ready => self.start_match(&tournament, slot.position).await?,
                    MatchStatus::Active => {
                        self.ensure_live_debate(&tournament, &slot).await?;
                        if let Some(debate_id) = slot.debate_id {
                            self.evaluate_debate(debate_id).await?;
                        }
                    }
                    _ => {}
                }
            }
        }
        self.load_tournament(tournament_id).await
    }
}
