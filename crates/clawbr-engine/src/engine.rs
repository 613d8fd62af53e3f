//! Engine handle and collaborator wiring

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

use clawbr_core::{AgentId, Rules};
use clawbr_persist::{StorageBackend, Stores};

use crate::collaborators::{
    AdminAuthority, Announcement, ExcerptSummaries, FeedPublisher, LogFeed, LogNotifier, Notification,
    Notifier, StaticAdmins, SummaryProvider,
};
use crate::error::{EngineError, EngineResult};
use crate::sources::{Clock, CoinFlip, RandomCoin, SystemClock};

/// The debate and tournament engine.
///
/// Cheap to clone; every clone shares the same stores and collaborators.
/// There is no background task: timeouts, voting and bracket advancement
/// are evaluated whenever an operation touches the affected entity.
#[derive(Debug, Clone)]
pub struct Engine {
    pub(crate) stores: Stores,
    pub(crate) rules: Arc<Rules>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) coin: Arc<dyn CoinFlip>,
    pub(crate) notifier: Arc<dyn Notifier>,
    pub(crate) feed: Arc<dyn FeedPublisher>,
    pub(crate) summaries: Arc<dyn SummaryProvider>,
    pub(crate) admins: Arc<dyn AdminAuthority>,
}

impl Engine {
    /// Engine over `backend` with default collaborators
    pub fn new(backend: Arc<dyn StorageBackend>, rules: Rules) -> Self {
        let rules = Arc::new(rules);
        Self {
            stores: Stores::new(backend, rules.clone()),
            rules,
            clock: Arc::new(SystemClock),
            coin: Arc::new(RandomCoin::new()),
            notifier: Arc::new(LogNotifier),
            feed: Arc::new(LogFeed),
            summaries: Arc::new(ExcerptSummaries::default()),
            admins: Arc::new(StaticAdmins::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_coin(mut self, coin: Arc<dyn CoinFlip>) -> Self {
        self.coin = coin;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_feed(mut self, feed: Arc<dyn FeedPublisher>) -> Self {
        self.feed = feed;
        self
    }

    pub fn with_summaries(mut self, summaries: Arc<dyn SummaryProvider>) -> Self {
        self.summaries = summaries;
        self
    }

    pub fn with_admins(mut self, admins: Arc<dyn AdminAuthority>) -> Self {
        self.admins = admins;
        self
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) async fn require_admin(&self, actor: AgentId) -> EngineResult<()> {
        if self.admins.is_admin(actor).await {
            Ok(())
        } else {
            Err(EngineError::Forbidden(format!("agent {} is not an administrator", actor)))
        }
    }

    /// Fire-and-forget notification
    pub(crate) async fn notify(&self, agent: AgentId, notification: Notification) {
        if let Err(e) = self.notifier.notify(agent, notification).await {
            warn!(agent_id = %agent, error = %e, "Notification failed");
        }
    }

    /// Best-effort public post
    pub(crate) async fn announce(&self, announcement: Announcement) {
        let headline = announcement.headline.clone();
        if let Err(e) = self.feed.publish(announcement).await {
            warn!(%headline, error = %e, "Feed post failed");
        }
    }
}
