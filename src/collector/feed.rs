use crate::browser::PageDriver;
use crate::error::{AppError, Result};
use crate::orchestrator::strategy::ExecutionStrategy;
use crate::scripts;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Serialized state of the timeline at the start of a round.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub html: String,
    pub height: u64,
    #[serde(default)]
    pub containers: usize,
    #[serde(default)]
    pub logged_out: bool,
}

#[derive(Debug, Deserialize)]
struct ScrollReport {
    height: u64,
}

/// What the collector needs from a scrolling timeline.
#[async_trait]
pub trait FeedPage: Send + Sync {
    /// Expands collapsed posts, then serializes the rendered timeline.
    async fn snapshot(&self) -> Result<FeedSnapshot>;

    /// Scrolls to the bottom, waits for new content or the settle delay, and
    /// returns the document height afterwards.
    async fn scroll_and_settle(&self) -> Result<u64>;
}

/// A [`FeedPage`] backed by the bundled page routines, run through one
/// execution strategy.
pub struct ScriptedFeed<'a> {
    page: &'a dyn PageDriver,
    strategy: &'a dyn ExecutionStrategy,
    settle: Duration,
}

impl<'a> ScriptedFeed<'a> {
    pub fn new(page: &'a dyn PageDriver, strategy: &'a dyn ExecutionStrategy, settle: Duration) -> Self {
        Self {
            page,
            strategy,
            settle,
        }
    }
}

#[async_trait]
impl FeedPage for ScriptedFeed<'_> {
    async fn snapshot(&self) -> Result<FeedSnapshot> {
        let value = self.strategy.run(self.page, &scripts::snapshot()).await?;
        serde_json::from_value(value)
            .map_err(|e| AppError::Evaluation(format!("Unexpected snapshot shape: {}", e)))
    }

    async fn scroll_and_settle(&self) -> Result<u64> {
        let value = self.strategy.run(self.page, &scripts::scroll(self.settle)).await?;
        let report: ScrollReport = serde_json::from_value(value)
            .map_err(|e| AppError::Evaluation(format!("Unexpected scroll report: {}", e)))?;
        Ok(report.height)
    }
}
