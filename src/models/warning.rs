use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    MissingField,
    CollapsedContent,
    Cycle,
    DepthExceeded,
    MultipleQuotes,
    QuoteUnresolved,
}

/// Advisory note produced while extracting. Never used for control flow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExtractionWarning {
    pub kind: WarningKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ExtractionWarning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            id: None,
            permalink: None,
            context: None,
        }
    }

    pub fn for_post(mut self, id: Option<&str>, permalink: Option<&str>) -> Self {
        self.id = id.map(str::to_string);
        self.permalink = permalink.map(str::to_string);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        if !context.is_empty() {
            self.context = Some(context);
        }
        self
    }
}

/// Insertion-ordered warning list that drops exact repeats. Every scroll
/// round re-extracts whatever is still on screen, so repeats are the norm.
#[derive(Debug, Clone, Default)]
pub struct WarningLog {
    entries: Vec<ExtractionWarning>,
    seen: HashSet<ExtractionWarning>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, warning: ExtractionWarning) -> bool {
        if self.seen.contains(&warning) {
            return false;
        }
        self.seen.insert(warning.clone());
        self.entries.push(warning);
        true
    }

    pub fn extend(&mut self, warnings: impl IntoIterator<Item = ExtractionWarning>) {
        for warning in warnings {
            self.push(warning);
        }
    }

    pub fn entries(&self) -> &[ExtractionWarning] {
        &self.entries
    }

    pub fn into_vec(self) -> Vec<ExtractionWarning> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_drops_repeats() {
        let mut log = WarningLog::new();
        let cycle = ExtractionWarning::new(WarningKind::Cycle, "Cycle detected")
            .for_post(Some("1"), None);

        assert!(log.push(cycle.clone()));
        assert!(!log.push(cycle));
        assert!(log.push(ExtractionWarning::new(WarningKind::MissingField, "Missing author")));
        assert_eq!(log.entries().len(), 2);
        assert_eq!(log.entries()[0].kind, WarningKind::Cycle);
    }

    #[test]
    fn test_warning_serialization() {
        let warning = ExtractionWarning::new(WarningKind::DepthExceeded, "Max depth")
            .with_context("");
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "depth_exceeded");
        assert!(json.get("context").is_none());
        assert!(json.get("id").is_none());
    }
}
