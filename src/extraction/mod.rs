//! Rebuilds post records from a serialized timeline snapshot.

pub mod dom;
mod engine;
mod selectors;

pub use engine::{ExtractOptions, ExtractionBatch, PostExtractor};
