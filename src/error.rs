use crate::models::harvest::PartialHarvest;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Execution context destroyed: {0}")]
    ContextDestroyed(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Page left the target view: {0}")]
    UnexpectedView(String),

    #[error("Session lost: {0}")]
    SessionLost(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Script evaluation error: {0}")]
    Evaluation(String),

    #[error("Extraction returned no posts")]
    EmptyResult,

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Extraction error: {0}")]
    Extraction(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl AppError {
    /// Errors worth retrying on the same page without changing approach.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::ContextDestroyed(_)
                | AppError::Timeout(_)
                | AppError::SessionLost(_)
                | AppError::UnexpectedView(_)
        )
    }

    /// Maps a raw browser or protocol message onto the variant the retry
    /// layer understands.
    pub fn classify_browser(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("execution context was destroyed")
            || lower.contains("cannot find context with specified id")
            || lower.contains("inspected target navigated or closed")
        {
            AppError::ContextDestroyed(message)
        } else if lower.contains("timeout") || lower.contains("timed out") {
            AppError::Timeout(message)
        } else {
            AppError::Browser(message)
        }
    }
}

impl From<AppError> for String {
    fn from(error: AppError) -> Self {
        error.to_string()
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Returned once every strategy on every attempt has failed. Whatever was
/// collected before the failure travels with it.
#[derive(Error, Debug)]
#[error("extraction failed after {attempts} attempts: {last_error}")]
pub struct ExtractionFailure {
    pub attempts: u32,
    pub last_error: AppError,
    pub partial: PartialHarvest,
}
