use crate::browser::PageDriver;
use crate::error::{AppError, Result};
use crate::models::StrategyKind;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// One way of getting an expression evaluated inside the page.
#[async_trait]
pub trait ExecutionStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn run(&self, page: &dyn PageDriver, expression: &str) -> Result<Value>;
}

/// The fixed order strategies are tried in on every attempt.
pub fn ladder(script_timeout: Duration) -> Vec<Box<dyn ExecutionStrategy>> {
    vec![
        Box::new(DirectEvaluation),
        Box::new(ScriptTagInjection::new(script_timeout)),
        Box::new(ProtocolEvaluation),
    ]
}

/// In-page exceptions are evaluation failures unless they describe a lost context.
fn script_error(message: String) -> AppError {
    match AppError::classify_browser(message) {
        AppError::Browser(message) => AppError::Evaluation(message),
        other => other,
    }
}

pub struct DirectEvaluation;

#[async_trait]
impl ExecutionStrategy for DirectEvaluation {
    fn kind(&self) -> StrategyKind {
        StrategyKind::DirectEvaluation
    }

    async fn run(&self, page: &dyn PageDriver, expression: &str) -> Result<Value> {
        page.evaluate(expression).await
    }
}

/// Runs the expression from a script element. The script reports back over a
/// per-call page binding rather than a shared global.
pub struct ScriptTagInjection {
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ScriptEnvelope {
    ok: bool,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl ScriptTagInjection {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn channel() -> String {
        format!("__harvester_{}", Uuid::new_v4().simple())
    }

    fn source(expression: &str, channel: &str) -> String {
        let channel = Value::from(channel).to_string();
        format!(
            r#"(async () => {{
  const report = (envelope) => window[{channel}](JSON.stringify(envelope));
  try {{
    const value = await ({expression});
    report({{ ok: true, value }});
  }} catch (error) {{
    report({{ ok: false, error: String((error && error.message) || error) }});
  }}
}})();"#
        )
    }

    fn decode(payload: &str) -> Result<Value> {
        let envelope: ScriptEnvelope = serde_json::from_str(payload).map_err(|e| {
            AppError::Evaluation(format!("Malformed script tag report: {}", e))
        })?;
        if envelope.ok {
            Ok(envelope.value.unwrap_or(Value::Null))
        } else {
            Err(script_error(
                envelope
                    .error
                    .unwrap_or_else(|| "Script tag reported an unknown error".to_string()),
            ))
        }
    }
}

#[async_trait]
impl ExecutionStrategy for ScriptTagInjection {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ScriptTag
    }

    async fn run(&self, page: &dyn PageDriver, expression: &str) -> Result<Value> {
        let channel = Self::channel();
        let source = Self::source(expression, &channel);
        let payload = page.inject_script_tag(&source, &channel, self.timeout).await?;
        Self::decode(&payload)
    }
}

pub struct ProtocolEvaluation;

#[async_trait]
impl ExecutionStrategy for ProtocolEvaluation {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ProtocolEvaluation
    }

    async fn run(&self, page: &dyn PageDriver, expression: &str) -> Result<Value> {
        let raw = page.evaluate_raw(expression).await?;
        if let Some(exception) = raw.exception {
            return Err(script_error(exception));
        }
        raw.value
            .ok_or_else(|| AppError::Evaluation("Protocol execution returned no value".into()))
    }
}
