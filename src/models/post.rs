use super::identity::IdentityKey;
use serde::{Deserialize, Serialize};

/// One extracted post. Absent values are skipped on serialization so the
/// written record never carries `null` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permalink: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retweet: Option<Box<Post>>,
    /// Ancestors, root first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reply_chain: Vec<Post>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replying_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perplexity_context: Option<Box<Post>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll: Option<Poll>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<PostStatus>,
    /// Engagement counters as rendered, e.g. "1.2K".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub likes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retweets: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replies: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub views: Option<String>,
    /// Whole-container text, kept for the fingerprint when `text` is empty.
    #[serde(skip)]
    pub fallback_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    /// No identifier could be read from the permalink.
    Unavailable,
}

impl Post {
    pub fn identity_key(&self) -> IdentityKey {
        let text = match &self.fallback_text {
            Some(fallback) if self.text.is_empty() => fallback,
            _ => &self.text,
        };
        IdentityKey::resolve(self.id.as_deref(), self.permalink.as_deref(), text)
    }

    pub fn is_unavailable(&self) -> bool {
        self.status == Some(PostStatus::Unavailable)
    }
}
