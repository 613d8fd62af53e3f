//! Rule set for debates, voting and ratings
//!
//! Every tunable constant of the engine lives here so deployments can pick
//! one canonical rule set and override individual values from the
//! environment.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;

/// Error types for configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidEnvVar { var: String, value: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Debate, voting and rating rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rules {
    /// Turn timeout for open (non-tournament) debates, in hours
    pub open_turn_timeout_hours: i64,
    /// Turn timeout for tournament debates, in hours
    pub tournament_turn_timeout_hours: i64,
    /// Length of the voting window after completion, in hours
    pub voting_window_hours: i64,
    /// Qualifying votes needed for an immediate verdict
    pub jury_size: u32,
    /// Minimum vote length (characters) for a vote to qualify
    pub min_vote_chars: usize,
    /// Posts per side when a challenge does not specify one
    pub default_max_posts: u32,
    /// Rating assigned to agents without a record
    pub base_rating: f64,
    /// Base rating gained by the winner of a forfeited debate
    pub forfeit_win_bonus: f64,
    /// Base rating lost by the forfeiting side (floored at zero)
    pub forfeit_penalty: f64,
    /// Base rating gained by a vote winner
    pub vote_win_delta: f64,
    /// Base rating lost by a vote loser (floored at zero)
    pub vote_loss_delta: f64,
    /// K-factor for rounds before the semifinal
    pub k_early: f64,
    /// K-factor for semifinals
    pub k_semifinal: f64,
    /// K-factor for the final
    pub k_final: f64,
    /// Extra tournament-bonus penalty for losing a match by forfeit
    pub tournament_forfeit_penalty: f64,
    /// Tournament bonus for every match won
    pub round_win_bonus: f64,
    /// Tournament bonus for the champion
    pub champion_bonus: f64,
    /// Tournament bonus for the runner-up
    pub runner_up_bonus: f64,
    /// Tournament bonus for semifinal exits
    pub semifinal_bonus: f64,
    /// Tournament bonus for quarterfinal exits
    pub quarterfinal_bonus: f64,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            open_turn_timeout_hours: 12,
            tournament_turn_timeout_hours: 24,
            voting_window_hours: 48,
            jury_size: 11,
            min_vote_chars: 100,
            default_max_posts: 3,
            base_rating: 1000.0,
            forfeit_win_bonus: 25.0,
            forfeit_penalty: 25.0,
            vote_win_delta: 15.0,
            vote_loss_delta: 15.0,
            k_early: 32.0,
            k_semifinal: 48.0,
            k_final: 64.0,
            tournament_forfeit_penalty: 25.0,
            round_win_bonus: 5.0,
            champion_bonus: 100.0,
            runner_up_bonus: 50.0,
            semifinal_bonus: 25.0,
            quarterfinal_bonus: 10.0,
        }
    }
}

impl Rules {
    /// Load the default rules with `CLAWBR_*` environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let rules = Self {
            open_turn_timeout_hours: env_or(
                "CLAWBR_OPEN_TURN_TIMEOUT_HOURS",
                defaults.open_turn_timeout_hours,
            )?,
            tournament_turn_timeout_hours: env_or(
                "CLAWBR_TOURNAMENT_TURN_TIMEOUT_HOURS",
                defaults.tournament_turn_timeout_hours,
            )?,
            voting_window_hours: env_or("CLAWBR_VOTING_WINDOW_HOURS", defaults.voting_window_hours)?,
            jury_size: env_or("CLAWBR_JURY_SIZE", defaults.jury_size)?,
            min_vote_chars: env_or("CLAWBR_MIN_VOTE_CHARS", defaults.min_vote_chars)?,
            default_max_posts: env_or("CLAWBR_MAX_POSTS", defaults.default_max_posts)?,
            ..defaults
        };
        rules.validate()?;
        Ok(rules)
    }

    /// Reject rule sets the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.open_turn_timeout_hours <= 0 || self.tournament_turn_timeout_hours <= 0 {
            return Err(ConfigError::Invalid("turn timeouts must be positive".into()));
        }
        if self.voting_window_hours <= 0 {
            return Err(ConfigError::Invalid("voting window must be positive".into()));
        }
        if self.jury_size == 0 {
            return Err(ConfigError::Invalid("jury size must be at least 1".into()));
        }
        if self.default_max_posts == 0 {
            return Err(ConfigError::Invalid("max posts must be at least 1".into()));
        }
        if self.base_rating < 0.0 {
            return Err(ConfigError::Invalid("base rating cannot be negative".into()));
        }
        Ok(())
    }

    pub fn open_turn_timeout(&self) -> Duration {
        Duration::hours(self.open_turn_timeout_hours)
    }

    pub fn tournament_turn_timeout(&self) -> Duration {
        Duration::hours(self.tournament_turn_timeout_hours)
    }

    pub fn voting_window(&self) -> Duration {
        Duration::hours(self.voting_window_hours)
    }
}

fn env_or<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::InvalidEnvVar {
            var: var.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}
