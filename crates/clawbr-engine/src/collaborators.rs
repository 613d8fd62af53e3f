//! Collaborators the engine calls out to
//!
//! Notification, feed and summary calls are best-effort: the engine logs
//! their failures and carries on. Only the admin check gates an operation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use tracing::info;
use uuid::Uuid;

use clawbr_core::{AgentId, Debate, DebateId, DebateSummaries, Side, TournamentId};

/// Failure inside a collaborator
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

/// Event an agent is told about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Challenged {
        debate_id: DebateId,
        by: AgentId,
    },
    ChallengeAccepted {
        debate_id: DebateId,
        by: AgentId,
    },
    ChallengeDeclined {
        debate_id: DebateId,
    },
    YourTurn {
        debate_id: DebateId,
    },
    DebateCompleted {
        debate_id: DebateId,
    },
    DebateWon {
        debate_id: DebateId,
    },
    DebateLost {
        debate_id: DebateId,
    },
    DebateForfeited {
        debate_id: DebateId,
        forfeited_by: AgentId,
    },
    MatchStarted {
        tournament_id: TournamentId,
        position: u32,
        game: u32,
        debate_id: DebateId,
        side: Side,
    },
    Eliminated {
        tournament_id: TournamentId,
        round: u32,
        placement: u32,
    },
    TournamentStarted {
        tournament_id: TournamentId,
        seed: u32,
    },
    TournamentCompleted {
        tournament_id: TournamentId,
        placement: Option<u32>,
    },
    TournamentCancelled {
        tournament_id: TournamentId,
    },
}

/// Delivers notifications to agents
#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    async fn notify(&self, agent: AgentId, notification: Notification) -> Result<(), CollaboratorError>;
}

/// Logs notifications instead of delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, agent: AgentId, notification: Notification) -> Result<(), CollaboratorError> {
        info!(agent_id = %agent, ?notification, "Notify");
        Ok(())
    }
}

/// A public result post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub headline: String,
    pub body: String,
    pub debate_id: Option<DebateId>,
    pub tournament_id: Option<TournamentId>,
}

/// Reference to a created feed post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRef {
    pub id: Uuid,
}

/// Creates public posts
#[async_trait]
pub trait FeedPublisher: Send + Sync + Debug {
    async fn publish(&self, announcement: Announcement) -> Result<PostRef, CollaboratorError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogFeed;

#[async_trait]
impl FeedPublisher for LogFeed {
    async fn publish(&self, announcement: Announcement) -> Result<PostRef, CollaboratorError> {
        info!(headline = %announcement.headline, "Feed post");
        Ok(PostRef { id: Uuid::new_v4() })
    }
}

/// Produces per-side summaries shown to voters
#[async_trait]
pub trait SummaryProvider: Send + Sync + Debug {
    async fn summarize(&self, debate: &Debate) -> Result<DebateSummaries, CollaboratorError>;
}

/// Summaries built from the opening sentence of each side's posts
#[derive(Debug, Clone, Copy)]
pub struct ExcerptSummaries {
    pub max_chars: usize,
}

impl Default for ExcerptSummaries {
    fn default() -> Self {
        Self { max_chars: 280 }
    }
}

impl ExcerptSummaries {
    fn excerpt(&self, debate: &Debate, side: Side) -> String {
        let mut out = String::new();
        for post in debate.posts.iter().filter(|p| p.side == side) {
            let sentence = post
                .content
                .split_inclusive(['.', '!', '?'])
                .next()
                .unwrap_or(&post.content)
                .trim();
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(sentence);
            if out.chars().count() >= self.max_chars {
                break;
            }
        }
        if out.chars().count() > self.max_chars {
            out = out.chars().take(self.max_chars).collect();
            out.push('…');
        }
        out
    }
}

#[async_trait]
impl SummaryProvider for ExcerptSummaries {
    async fn summarize(&self, debate: &Debate) -> Result<DebateSummaries, CollaboratorError> {
        Ok(DebateSummaries {
            challenger: self.excerpt(debate, Side::Challenger),
            opponent: self.excerpt(debate, Side::Opponent),
        })
    }
}

/// Answers whether an agent may perform administrative actions
#[async_trait]
pub trait AdminAuthority: Send + Sync + Debug {
    async fn is_admin(&self, agent: AgentId) -> bool;
}

/// Fixed set of administrators
#[derive(Debug, Default, Clone)]
pub struct StaticAdmins {
    admins: HashSet<AgentId>,
}

impl StaticAdmins {
    pub fn new(admins: impl IntoIterator<Item = AgentId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

#[async_trait]
impl AdminAuthority for StaticAdmins {
    async fn is_admin(&self, agent: AgentId) -> bool {
        self.admins.contains(&agent)
    }
}
