use crate::error::{AppError, Result};
use crate::models::{ExtractionWarning, HarvestOutput, PartialHarvest, Post, StrategyKind, ViewKind};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Writes finished result sets as one JSON document per subject, view and day.
pub struct ResultStore {
    dir: PathBuf,
}

/// Removes nulls, empty arrays and empty objects, recursively.
pub fn strip_empty(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Array(items) => {
            let items: Vec<Value> = items.into_iter().filter_map(strip_empty).collect();
            (!items.is_empty()).then_some(Value::Array(items))
        }
        Value::Object(fields) => {
            let fields: Map<String, Value> = fields
                .into_iter()
                .filter_map(|(key, value)| strip_empty(value).map(|value| (key, value)))
                .collect();
            (!fields.is_empty()).then_some(Value::Object(fields))
        }
        other => Some(other),
    }
}

pub fn file_name(subject: &str, view: ViewKind, date_str: &str) -> String {
    format!("{}_{}_{}.json", subject, view, date_str)
}

struct Envelope<'a> {
    subject: &'a str,
    view: ViewKind,
    date_str: &'a str,
    strategy: Option<StrategyKind>,
    posts: &'a [Post],
    warnings: &'a [ExtractionWarning],
    error: Option<&'a str>,
}

impl Envelope<'_> {
    fn to_value(&self, now: DateTime<Utc>) -> Result<Value> {
        let posts: Vec<Value> = self
            .posts
            .iter()
            .map(|post| serde_json::to_value(post).map(|value| strip_empty(value).unwrap_or(Value::Null)))
            .collect::<std::result::Result<_, _>>()?;

        let document = json!({
            "scrape_timestamp": now.to_rfc3339_opts(SecondsFormat::Millis, true),
            "code_version": env!("CARGO_PKG_VERSION"),
            "user": self.subject,
            "pageType": self.view,
            "dateStr": self.date_str,
            "strategy": self.strategy,
            "warnings": self.warnings,
            "totalPosts": self.posts.len(),
            "error": self.error,
        });
        // Envelope fields are stripped, the posts array is always present.
        let mut document = strip_empty(document).unwrap_or_else(|| json!({}));
        if let Value::Object(fields) = &mut document {
            fields.insert("posts".to_string(), Value::Array(posts));
        }
        Ok(document)
    }
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .map_err(|e| AppError::Storage(format!("Failed to create output directory: {}", e)))?;
        Ok(Self { dir })
    }

    pub fn path_for(&self, subject: &str, view: ViewKind, date_str: &str) -> PathBuf {
        self.dir.join(file_name(subject, view, date_str))
    }

    pub fn write(&self, output: &HarvestOutput) -> Result<PathBuf> {
        self.write_envelope(
            &Envelope {
                subject: &output.subject,
                view: output.view_kind,
                date_str: &output.date_str,
                strategy: Some(output.strategy),
                posts: &output.posts,
                warnings: &output.warnings,
                error: None,
            },
            Utc::now(),
        )
    }

    /// Persists what a failed run gathered, with the failure in `error`.
    pub fn write_partial(
        &self,
        subject: &str,
        view: ViewKind,
        date_str: &str,
        partial: &PartialHarvest,
        error: &str,
    ) -> Result<PathBuf> {
        self.write_envelope(
            &Envelope {
                subject,
                view,
                date_str,
                strategy: None,
                posts: &partial.posts,
                warnings: &partial.warnings,
                error: Some(error),
            },
            Utc::now(),
        )
    }

    fn write_envelope(&self, envelope: &Envelope<'_>, now: DateTime<Utc>) -> Result<PathBuf> {
        let path = self.path_for(envelope.subject, envelope.view, envelope.date_str);
        if path.exists() {
            debug!(path = %path.display(), "Replacing existing output file");
            fs::remove_file(&path)
                .map_err(|e| AppError::Storage(format!("Failed to remove old output file: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(&envelope.to_value(now)?)
            .map_err(|e| AppError::Storage(format!("Failed to serialize output: {}", e)))?;
        fs::write(&path, json)
            .map_err(|e| AppError::Storage(format!("Failed to write output file: {}", e)))?;

        info!(path = %path.display(), posts = envelope.posts.len(), "Results saved");
        Ok(path)
    }
}
