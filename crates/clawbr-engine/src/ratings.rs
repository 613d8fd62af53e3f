//! Rating queries

use clawbr_core::{AgentId, RatingRecord};

use crate::engine::Engine;
use crate::error::EngineResult;

impl Engine {
    /// Current record for `agent`; unknown agents sit at the base rating
    pub async fn rating(&self, agent: AgentId) -> EngineResult<RatingRecord> {
        Ok(self.stores.ratings.get_or_default(agent).await?)
    }

    pub async fn leaderboard(&self, limit: usize) -> EngineResult<Vec<RatingRecord>> {
        Ok(self.stores.ratings.leaderboard(limit).await?)
    }
}
