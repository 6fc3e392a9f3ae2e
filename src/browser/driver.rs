use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    LoggedIn,
    LoggedOut,
    Unknown,
}

impl SessionState {
    pub fn parse(value: &str) -> Self {
        match value {
            "logged_in" => SessionState::LoggedIn,
            "logged_out" => SessionState::LoggedOut,
            _ => SessionState::Unknown,
        }
    }
}

/// Outcome of a raw protocol evaluation, before any interpretation.
#[derive(Debug, Clone, Default)]
pub struct RawEvaluation {
    pub value: Option<Value>,
    pub exception: Option<String>,
}

/// Cookie as exported by common browser extensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub secure: Option<bool>,
    #[serde(default)]
    pub http_only: Option<bool>,
}

/// The single page a run drives. Exclusively owned by the orchestrator for
/// the duration of the run.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn current_url(&self) -> Result<String>;

    async fn navigate(&self, url: &str) -> Result<()>;

    async fn go_back(&self) -> Result<()>;

    async fn reload(&self) -> Result<()>;

    /// Evaluates `expression` in the page and awaits the resulting value.
    async fn evaluate(&self, expression: &str) -> Result<Value>;

    /// Evaluates through the raw protocol channel, bypassing page script policy.
    async fn evaluate_raw(&self, expression: &str) -> Result<RawEvaluation>;

    /// Appends `source` as a script element and waits for it to call the
    /// page binding named `channel`. Returns the binding payload.
    async fn inject_script_tag(&self, source: &str, channel: &str, timeout: Duration) -> Result<String>;

    async fn session_state(&self) -> Result<SessionState>;

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()>;
}
