use super::accumulator::RunAccumulator;
use super::feed::FeedPage;
use crate::error::{AppError, Result};
use crate::extraction::PostExtractor;
use crate::orchestrator::retry::RetryPolicy;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Collecting,
    /// The page stopped growing for this many consecutive rounds.
    Stable { unchanged_rounds: u32 },
    Done,
}

impl CollectorState {
    pub fn advance(self, height_before: u64, height_after: u64, threshold: u32) -> Self {
        if self == CollectorState::Done {
            return self;
        }
        if height_after != height_before {
            return CollectorState::Collecting;
        }
        let unchanged_rounds = match self {
            CollectorState::Stable { unchanged_rounds } => unchanged_rounds + 1,
            _ => 1,
        };
        if unchanged_rounds >= threshold {
            CollectorState::Done
        } else {
            CollectorState::Stable { unchanged_rounds }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorReport {
    pub rounds: u32,
    pub new_posts: usize,
}

/// Scroll, extract, merge, until the page height stops changing.
pub struct ScrollCollector<'a> {
    extractor: &'a PostExtractor,
    stability_threshold: u32,
    step_retry: RetryPolicy,
}

impl<'a> ScrollCollector<'a> {
    pub fn new(extractor: &'a PostExtractor, stability_threshold: u32, step_retry: RetryPolicy) -> Self {
        Self {
            extractor,
            stability_threshold: stability_threshold.max(1),
            step_retry,
        }
    }

    /// Runs rounds until [`CollectorState::Done`]. There is no round cap.
    ///
    /// A logged-out page ends the run with [`AppError::SessionLost`]; posts
    /// merged before that stay in `accumulator`.
    pub async fn run<F>(&self, feed: &F, accumulator: &mut RunAccumulator) -> Result<CollectorReport>
    where
        F: FeedPage + ?Sized,
    {
        let mut state = CollectorState::Collecting;
        let mut report = CollectorReport::default();

        while state != CollectorState::Done {
            report.rounds += 1;

            let snapshot = self.step_retry.run("snapshot", move || feed.snapshot()).await?;
            if snapshot.logged_out {
                return Err(AppError::SessionLost(
                    "timeline shows the logged-out indicator".into(),
                ));
            }

            let batch = self.extractor.extract_document(&snapshot.html);
            let containers = batch.containers;
            let added = accumulator.absorb(batch);
            report.new_posts += added;

            let height = self
                .step_retry
                .run("scroll", move || feed.scroll_and_settle())
                .await?;
            state = state.advance(snapshot.height, height, self.stability_threshold);

            debug!(
                round = report.rounds,
                containers,
                added,
                total = accumulator.len(),
                height_before = snapshot.height,
                height_after = height,
                ?state,
                "Collector round finished"
            );
        }

        info!(
            rounds = report.rounds,
            new_posts = report.new_posts,
            total = accumulator.len(),
            "Timeline stable, collection done"
        );
        Ok(report)
    }
}
