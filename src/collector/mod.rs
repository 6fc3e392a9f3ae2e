pub mod accumulator;
pub mod feed;
pub mod scroll;

pub use accumulator::{PostAccumulator, RunAccumulator};
pub use feed::{FeedPage, FeedSnapshot, ScriptedFeed};
pub use scroll::{CollectorReport, CollectorState, ScrollCollector};
