//! Best-of-N series progress
//!
//! Wins are counted against the original sides fixed at game 1. Odd games
//! keep the original orientation, even games swap PRO and CON. A forfeit in
//! any game ends the series for that game's winner.

use chrono::{DateTime, Utc};

use crate::error::RuleViolation;
use crate::tournament::{GameRecord, MatchStatus, TournamentMatch};
use crate::{AgentId, DebateId};

/// What the series needs after a game
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesProgress {
    /// The game was already counted
    AlreadyRecorded,
    NextGame {
        game: u32,
        pro: AgentId,
        con: AgentId,
        debate_id: DebateId,
    },
    Decided {
        winner: AgentId,
        loser: AgentId,
        forfeit: bool,
    },
}

impl TournamentMatch {
    /// Game wins required to take the series
    pub fn wins_needed(&self) -> u32 {
        self.best_of.div_ceil(2)
    }

    /// PRO and CON for a game of this series
    pub fn orientation(&self, game: u32) -> Option<(AgentId, AgentId)> {
        let (pro, con) = (self.original_pro?, self.original_con?);
        if game % 2 == 1 {
            Some((pro, con))
        } else {
            Some((con, pro))
        }
    }

    pub fn series_wins(&self, agent: AgentId) -> u32 {
        if self.original_pro == Some(agent) {
            self.original_pro_wins
        } else if self.original_con == Some(agent) {
            self.original_con_wins
        } else {
            0
        }
    }

    /// Original side currently ahead in the series
    pub fn series_leader(&self) -> Option<AgentId> {
        use std::cmp::Ordering;
        match self.original_pro_wins.cmp(&self.original_con_wins) {
            Ordering::Greater => self.original_pro,
            Ordering::Less => self.original_con,
            Ordering::Equal => None,
        }
    }

    /// Count a finished game and decide whether the series goes on.
    ///
    /// `next_debate_id` is used only when another game is needed.
    pub fn record_game(
        &mut self,
        debate_id: DebateId,
        winner: AgentId,
        forfeit: bool,
        next_debate_id: DebateId,
        now: DateTime<Utc>,
    ) -> Result<SeriesProgress, RuleViolation> {
        if self.games.iter().any(|g| g.debate_id == debate_id) {
            return Ok(SeriesProgress::AlreadyRecorded);
        }
        if self.status != MatchStatus::Active || self.debate_id != Some(debate_id) {
            return Err(RuleViolation::InvalidState(format!(
                "debate {} is not the live game of slot {}",
                debate_id, self.position
            )));
        }

        if self.original_pro == Some(winner) {
            self.original_pro_wins += 1;
        } else if self.original_con == Some(winner) {
            self.original_con_wins += 1;
        } else {
            return Err(RuleViolation::Validation("winner is not in this series".into()));
        }
        self.games.push(GameRecord {
            game: self.current_game,
            debate_id,
            winner,
            forfeit,
        });

        if forfeit || self.series_wins(winner) >= self.wins_needed() {
            let loser = self.decide(winner, forfeit, now)?;
            return Ok(SeriesProgress::Decided {
                winner,
                loser,
                forfeit,
            });
        }

        self.current_game += 1;
        let (pro, con) = self
            .orientation(self.current_game)
            .ok_or_else(|| RuleViolation::InvalidState("series has no original sides".into()))?;
        self.pro = Some(pro);
        self.con = Some(con);
        self.debate_id = Some(next_debate_id);
        Ok(SeriesProgress::NextGame {
            game: self.current_game,
            pro,
            con,
            debate_id: next_debate_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debate::Side;
    use crate::tournament::RoundSettings;
    use uuid::Uuid;

    fn series(best_of: u32) -> (TournamentMatch, AgentId, AgentId) {
        let mut m = TournamentMatch::new(
            Uuid::new_v4(),
            7,
            3,
            RoundSettings {
                max_posts: 3,
                best_of,
            },
        );
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        m.fill(Side::PRO, a).unwrap();
        m.fill(Side::CON, b).unwrap();
        m.start(a, b, a, Uuid::new_v4()).unwrap();
        (m, a, b)
    }

    fn play(m: &mut TournamentMatch, winner: AgentId) -> SeriesProgress {
        let live = m.debate_id.unwrap();
        m.record_game(live, winner, false, Uuid::new_v4(), Utc::now()).unwrap()
    }

    #[test]
    fn test_bo3_decider_counts_original_side() {
        let (mut m, a, b) = series(3);
        assert!(matches!(play(&mut m, a), SeriesProgress::NextGame { game: 2, .. }));
        // Game 2 flips orientation
        assert_eq!((m.pro, m.con), (Some(b), Some(a)));
        assert!(matches!(play(&mut m, b), SeriesProgress::NextGame { game: 3, .. }));
        assert_eq!((m.pro, m.con), (Some(a), Some(b)));

        // b wins game 3 from the CON seat and takes the series
        let progress = play(&mut m, b);
        assert_eq!(
            progress,
            SeriesProgress::Decided {
                winner: b,
                loser: a,
                forfeit: false
            }
        );
        assert_eq!(m.winner, Some(b));
        assert_eq!(m.original_con_wins, 2);
    }

    #[test]
    fn test_series_never_ends_early() {
        let (mut m, a, _) = series(5);
        for game in 1..3 {
            assert!(
                matches!(play(&mut m, a), SeriesProgress::NextGame { .. }),
                "game {game}"
            );
        }
        assert!(matches!(play(&mut m, a), SeriesProgress::Decided { .. }));
        assert_eq!(m.games.len(), 3);
    }

    #[test]
    fn test_forfeit_ends_series() {
        let (mut m, a, b) = series(3);
        let live = m.debate_id.unwrap();
        let progress = m.record_game(live, b, true, Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(
            progress,
            SeriesProgress::Decided {
                winner: b,
                loser: a,
                forfeit: true
            }
        );
        assert_eq!(m.completion.as_ref().map(|c| c.forfeit), Some(true));
    }

    #[test]
    fn test_duplicate_game_is_noop() {
        let (mut m, a, _) = series(3);
        let live = m.debate_id.unwrap();
        play(&mut m, a);
        let again = m.record_game(live, a, false, Uuid::new_v4(), Utc::now()).unwrap();
        assert_eq!(again, SeriesProgress::AlreadyRecorded);
        assert_eq!(m.original_pro_wins, 1);
    }
}
