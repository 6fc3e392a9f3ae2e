use super::post::Post;
use super::warning::ExtractionWarning;
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewKind {
    Likes,
    Replies,
}

impl ViewKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewKind::Likes => "likes",
            ViewKind::Replies => "replies",
        }
    }

    /// Path segment of the listing under the profile URL.
    pub fn path_segment(&self) -> &'static str {
        match self {
            ViewKind::Likes => "likes",
            ViewKind::Replies => "with_replies",
        }
    }
}

impl std::fmt::Display for ViewKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "likes" => Ok(ViewKind::Likes),
            "replies" | "with_replies" => Ok(ViewKind::Replies),
            other => Err(AppError::Configuration(format!(
                "Unknown view kind '{}', expected 'likes' or 'replies'",
                other
            ))),
        }
    }
}

/// The listing a run collects from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub handle: String,
    pub view: ViewKind,
    pub origin: Url,
}

impl Target {
    pub fn new(handle: &str, view: ViewKind, origin: &str) -> Result<Self> {
        let handle = handle.trim().trim_start_matches('@').to_string();
        if handle.is_empty() {
            return Err(AppError::Configuration("Target handle is empty".into()));
        }
        // Handles become URL path segments and file names.
        if !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(AppError::Configuration(format!(
                "Invalid handle '{}', expected letters, digits or '_'",
                handle
            )));
        }
        let origin = Url::parse(origin)
            .map_err(|e| AppError::Configuration(format!("Invalid origin '{}': {}", origin, e)))?;
        Ok(Self { handle, view, origin })
    }

    pub fn url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.origin.as_str().trim_end_matches('/'),
            self.handle,
            self.view.path_segment()
        )
    }

    pub fn home_url(&self) -> String {
        format!("{}/home", self.origin.as_str().trim_end_matches('/'))
    }

    /// True when `current` is the target listing on the target host.
    pub fn matches(&self, current: &str) -> bool {
        let Ok(current) = Url::parse(current) else {
            return false;
        };
        let expected = format!("/{}/{}", self.handle, self.view.path_segment());
        current.host_str() == self.origin.host_str()
            && current
                .path()
                .trim_end_matches('/')
                .eq_ignore_ascii_case(&expected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    DirectEvaluation,
    ScriptTag,
    ProtocolEvaluation,
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StrategyKind::DirectEvaluation => "direct_evaluation",
            StrategyKind::ScriptTag => "script_tag",
            StrategyKind::ProtocolEvaluation => "protocol_evaluation",
        };
        f.write_str(name)
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct HarvestOutput {
    pub subject: String,
    pub view_kind: ViewKind,
    pub date_str: String,
    pub posts: Vec<Post>,
    pub total_posts: usize,
    pub warnings: Vec<ExtractionWarning>,
    pub strategy: StrategyKind,
}

/// Whatever was accumulated when a run gave up.
#[derive(Debug, Clone, Default)]
pub struct PartialHarvest {
    pub posts: Vec<Post>,
    pub warnings: Vec<ExtractionWarning>,
}

impl PartialHarvest {
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Day key of a result set.
///
/// Likes are keyed on the run date, since the newest like can be an old post.
/// Replies use the date of the first post, else the run date.
pub fn date_key(view: ViewKind, posts: &[Post], now: DateTime<Utc>) -> String {
    let run_date = || now.format("%Y-%m-%d").to_string();
    match view {
        ViewKind::Likes => run_date(),
        ViewKind::Replies => posts
            .first()
            .and_then(|post| post.date.as_deref())
            .and_then(|date| date.split('T').next())
            .filter(|day| day.len() == 10)
            .map(str::to_string)
            .unwrap_or_else(run_date),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_target_urls() {
        let target = Target::new("@someone", ViewKind::Replies, "https://x.com").unwrap();
        assert_eq!(target.url(), "https://x.com/someone/with_replies");
        assert_eq!(target.home_url(), "https://x.com/home");
        assert!(target.matches("https://x.com/someone/with_replies/"));
        assert!(target.matches("https://x.com/Someone/with_replies?lang=en"));
        assert!(!target.matches("https://x.com/compose/post"));
        assert!(!target.matches("https://x.com/someone/likes"));
        assert!(!target.matches("not a url"));
    }

    #[test]
    fn test_view_kind_parsing() {
        assert_eq!("likes".parse::<ViewKind>().unwrap(), ViewKind::Likes);
        assert_eq!("with_replies".parse::<ViewKind>().unwrap(), ViewKind::Replies);
        assert!("bookmarks".parse::<ViewKind>().is_err());
        assert!(Target::new("  ", ViewKind::Likes, "https://x.com").is_err());
    }

    #[test]
    fn test_handle_cannot_escape_output_dir() {
        for handle in ["../etc", "a/b", "a\\b", "..", "bob.json"] {
            assert!(
                Target::new(handle, ViewKind::Likes, "https://x.com").is_err(),
                "{handle} was accepted"
            );
        }
        assert_eq!(
            Target::new("@Some_User42", ViewKind::Likes, "https://x.com").unwrap().handle,
            "Some_User42"
        );
    }

    fn dated(date: &str) -> Post {
        Post {
            date: Some(date.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_replies_date_key_uses_first_post() {
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap();
        assert_eq!(date_key(ViewKind::Replies, &[], now), "2024-05-06");

        let posts = [dated("2024-04-01T08:30:00.000Z")];
        assert_eq!(date_key(ViewKind::Replies, &posts, now), "2024-04-01");
    }

    #[test]
    fn test_likes_date_key_is_run_date() {
        let now = Utc.with_ymd_and_hms(2024, 5, 6, 12, 0, 0).unwrap();
        let liked_old = dated("2019-01-02T00:00:00.000Z");
        assert_eq!(date_key(ViewKind::Likes, &[liked_old.clone()], now), "2024-05-06");

        // A new like on top of the list must not move the file key.
        let later = Utc.with_ymd_and_hms(2024, 5, 6, 23, 0, 0).unwrap();
        let posts = [dated("2021-07-08T00:00:00.000Z"), liked_old];
        assert_eq!(date_key(ViewKind::Likes, &posts, later), "2024-05-06");
        assert_eq!(date_key(ViewKind::Likes, &[], now), "2024-05-06");
    }
}
