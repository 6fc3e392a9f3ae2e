pub mod retry;
pub mod strategy;

use crate::browser::{Authenticator, PageDriver, SessionState};
use crate::collector::{RunAccumulator, ScriptedFeed, ScrollCollector};
use crate::config::Config;
use crate::error::{AppError, ExtractionFailure, Result};
use crate::extraction::{ExtractOptions, PostExtractor};
use crate::models::{date_key, HarvestOutput, StrategyKind, Target};
use chrono::Utc;
use retry::{Backoff, RetryPolicy};
use std::time::Duration;
use strategy::ExecutionStrategy;
use tracing::{debug, info, warn};

/// Retry budgets and delays for one run.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_attempts: u32,
    pub strategy_attempts: u32,
    pub retry_delay: Duration,
    pub attempt_delay: Duration,
    pub settle: Duration,
    pub stability_threshold: u32,
    pub step_retries: u32,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.orchestrator.max_attempts.max(1),
            strategy_attempts: config.orchestrator.strategy_attempts.max(1),
            retry_delay: Duration::from_millis(config.orchestrator.retry_delay_ms),
            attempt_delay: Duration::from_millis(config.orchestrator.attempt_delay_ms),
            settle: config.settle_timeout(),
            stability_threshold: config.collector.stability_threshold,
            step_retries: config.collector.step_retries,
        }
    }
}

/// Drives the collector inside the live page, escalating through the
/// strategy ladder and recovering from navigation and session loss.
pub struct Orchestrator<'a> {
    page: &'a dyn PageDriver,
    authenticator: &'a dyn Authenticator,
    target: Target,
    extractor: PostExtractor,
    ladder: Vec<Box<dyn ExecutionStrategy>>,
    settings: OrchestratorSettings,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        page: &'a dyn PageDriver,
        authenticator: &'a dyn Authenticator,
        target: Target,
        extractor: PostExtractor,
        ladder: Vec<Box<dyn ExecutionStrategy>>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            page,
            authenticator,
            target,
            extractor,
            ladder,
            settings,
        }
    }

    pub fn from_config(
        page: &'a dyn PageDriver,
        authenticator: &'a dyn Authenticator,
        config: &Config,
    ) -> Result<Self> {
        let target = config.target()?;
        let extractor = PostExtractor::new(ExtractOptions::from_config(
            &config.collector,
            target.origin.clone(),
        ))?;
        Ok(Self::new(
            page,
            authenticator,
            target,
            extractor,
            strategy::ladder(config.script_timeout()),
            OrchestratorSettings::from_config(config),
        ))
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Transient failures back off from the retry delay up to the attempt delay.
    fn strategy_retry(&self) -> RetryPolicy {
        let ceiling = self.settings.attempt_delay.max(self.settings.retry_delay);
        RetryPolicy::transient(
            self.settings.strategy_attempts,
            Backoff::exponential(self.settings.retry_delay, ceiling),
        )
    }

    fn step_retry(&self) -> RetryPolicy {
        RetryPolicy::timeouts(
            self.settings.step_retries + 1,
            Backoff::constant(self.settings.retry_delay),
        )
    }

    /// Runs until one strategy completes with posts, or every strategy on
    /// every attempt has failed.
    pub async fn execute(&self) -> std::result::Result<HarvestOutput, ExtractionFailure> {
        let mut accumulator = RunAccumulator::new();
        let mut last_error = AppError::EmptyResult;
        let max_attempts = self.settings.max_attempts;

        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, target = %self.target.url(), "Starting extraction attempt");

            for strategy in &self.ladder {
                let kind = strategy.kind();
                match self.run_strategy(strategy.as_ref(), &mut accumulator).await {
                    Ok(()) => {
                        info!(attempt, strategy = %kind, posts = accumulator.len(), "Extraction succeeded");
                        return Ok(self.finish(accumulator, kind));
                    }
                    Err(e) => {
                        warn!(attempt, strategy = %kind, error = %e, "Strategy failed, escalating");
                        last_error = e;
                    }
                }
            }

            if attempt < max_attempts {
                self.recover_between_attempts().await;
                tokio::time::sleep(self.settings.attempt_delay).await;
            }
        }

        warn!(
            attempts = max_attempts,
            partial_posts = accumulator.len(),
            error = %last_error,
            "All extraction attempts failed"
        );
        Err(ExtractionFailure {
            attempts: max_attempts,
            last_error,
            partial: accumulator.into_partial(),
        })
    }

    /// One strategy with its in-place retry budget. Transient errors retry the
    /// same strategy; anything else is returned so the caller escalates.
    async fn run_strategy(
        &self,
        strategy: &dyn ExecutionStrategy,
        accumulator: &mut RunAccumulator,
    ) -> Result<()> {
        let policy = self.strategy_retry();
        let mut try_number = 1;
        loop {
            let error = match self.try_strategy(strategy, accumulator).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            match policy.next_delay(try_number, &error) {
                Some(delay) => {
                    warn!(
                        strategy = %strategy.kind(),
                        try_number,
                        max_tries = policy.max_attempts,
                        error = %error,
                        "Transient failure, retrying strategy"
                    );
                    tokio::time::sleep(delay).await;
                    try_number += 1;
                }
                None => return Err(error),
            }
        }
    }

    async fn try_strategy(
        &self,
        strategy: &dyn ExecutionStrategy,
        accumulator: &mut RunAccumulator,
    ) -> Result<()> {
        self.prepare_page().await?;

        debug!(strategy = %strategy.kind(), "Running collector");
        let feed = ScriptedFeed::new(self.page, strategy, self.settings.settle);
        let collector = ScrollCollector::new(
            &self.extractor,
            self.settings.stability_threshold,
            self.step_retry(),
        );
        collector.run(&feed, accumulator).await?;

        if accumulator.is_empty() {
            return Err(AppError::EmptyResult);
        }
        Ok(())
    }

    /// Puts the page back on the target view with a live session.
    async fn prepare_page(&self) -> Result<()> {
        let url = self.page.current_url().await?;
        if !self.target.matches(&url) {
            warn!(url, "Page is not on the target view, going back");
            self.page.go_back().await?;
            let url = self.page.current_url().await?;
            if !self.target.matches(&url) {
                info!(url, target = %self.target.url(), "Navigating to target view");
                self.page.navigate(&self.target.url()).await?;
            }
        }

        if self.page.session_state().await? == SessionState::LoggedOut {
            self.recover_session().await?;
        }

        let url = self.page.current_url().await?;
        if !self.target.matches(&url) {
            return Err(AppError::UnexpectedView(url));
        }
        Ok(())
    }

    async fn recover_session(&self) -> Result<()> {
        warn!("Session lost, re-authenticating");
        self.authenticator.authenticate(self.page).await?;
        self.page.navigate(&self.target.url()).await?;
        info!("Session restored");
        Ok(())
    }

    async fn recover_between_attempts(&self) {
        if let Err(e) = self.page.reload().await {
            warn!(error = %e, "Reload between attempts failed");
        }
        match self.page.session_state().await {
            Ok(SessionState::LoggedOut) => {
                if let Err(e) = self.recover_session().await {
                    warn!(error = %e, "Session recovery between attempts failed");
                }
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Session probe between attempts failed"),
        }
    }

    fn finish(&self, accumulator: RunAccumulator, strategy: StrategyKind) -> HarvestOutput {
        let (posts, warnings) = accumulator.into_parts();
        HarvestOutput {
            subject: self.target.handle.clone(),
            view_kind: self.target.view,
            date_str: date_key(self.target.view, &posts, Utc::now()),
            total_posts: posts.len(),
            posts,
            warnings,
            strategy,
        }
    }
}
