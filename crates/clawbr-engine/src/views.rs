//! Read models returned by tournament queries

use serde::Serialize;
use std::collections::HashMap;

use clawbr_core::{
    AgentId, BracketLayout, DebateId, MatchStatus, RoundKind, Tournament, TournamentId, TournamentMatch,
    TournamentParticipant, TournamentStatus,
};

/// A tournament with its entrants, seeded order first
#[derive(Debug, Clone, Serialize)]
pub struct TournamentDetails {
    pub tournament: Tournament,
    pub participants: Vec<TournamentParticipant>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EntrantView {
    pub agent_id: AgentId,
    pub seed: Option<u32>,
}

/// Series score by original side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeriesScore {
    pub original_pro: AgentId,
    pub original_con: AgentId,
    pub original_pro_wins: u32,
    pub original_con_wins: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchView {
    pub position: u32,
    pub status: MatchStatus,
    pub pro: Option<EntrantView>,
    pub con: Option<EntrantView>,
    pub winner: Option<AgentId>,
    pub best_of: u32,
    pub current_game: u32,
    pub series: Option<SeriesScore>,
    pub debate_id: Option<DebateId>,
    /// Slot this match's winner moves on to
    pub feeds: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundView {
    pub round: u32,
    pub kind: RoundKind,
    pub matches: Vec<MatchView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BracketView {
    pub tournament_id: TournamentId,
    pub status: TournamentStatus,
    pub current_round: u32,
    pub total_rounds: u32,
    pub champion: Option<AgentId>,
    pub rounds: Vec<RoundView>,
}

impl BracketView {
    pub(crate) fn build(
        tournament: &Tournament,
        layout: Option<&BracketLayout>,
        slots: &[TournamentMatch],
        participants: &[TournamentParticipant],
    ) -> Self {
        let seeds: HashMap<AgentId, Option<u32>> =
            participants.iter().map(|p| (p.agent_id, p.seed)).collect();
        let entrant = |agent: Option<AgentId>| {
            agent.map(|agent_id| EntrantView {
                agent_id,
                seed: seeds.get(&agent_id).copied().flatten(),
            })
        };

        let mut rounds: Vec<RoundView> = Vec::new();
        for slot in slots {
            let view = MatchView {
                position: slot.position,
                status: slot.status,
                pro: entrant(slot.pro),
                con: entrant(slot.con),
                winner: slot.winner,
                best_of: slot.best_of,
                current_game: slot.current_game,
                series: match (slot.original_pro, slot.original_con) {
                    (Some(original_pro), Some(original_con)) => Some(SeriesScore {
                        original_pro,
                        original_con,
                        original_pro_wins: slot.original_pro_wins,
                        original_con_wins: slot.original_con_wins,
                    }),
                    _ => None,
                },
                debate_id: slot.debate_id,
                feeds: layout.and_then(|l| l.feeder(slot.position)).map(|f| f.position),
            };
            match rounds.iter_mut().find(|r| r.round == slot.round) {
                Some(round) => round.matches.push(view),
                None => rounds.push(RoundView {
                    round: slot.round,
                    kind: RoundKind::of(slot.round, tournament.total_rounds),
                    matches: vec![view],
                }),
            }
        }
        rounds.sort_by_key(|r| r.round);

        Self {
            tournament_id: tournament.id,
            status: tournament.status,
            current_round: tournament.current_round,
            total_rounds: tournament.total_rounds,
            champion: tournament.champion,
            rounds,
        }
    }
}
