pub mod browser;
pub mod collector;
pub mod config;
pub mod error;
pub mod extraction;
pub mod models;
pub mod orchestrator;
pub mod scripts;
pub mod storage;

pub use error::{AppError, ExtractionFailure, Result};
