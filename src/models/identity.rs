use std::collections::HashSet;

/// Characters of post text used when neither id nor permalink is known.
pub const FINGERPRINT_CHARS: usize = 30;

/// Deduplication key of a post: id, else permalink, else a text fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdentityKey {
    Id(String),
    Permalink(String),
    Fingerprint(String),
}

impl IdentityKey {
    pub fn resolve(id: Option<&str>, permalink: Option<&str>, text: &str) -> Self {
        match (id, permalink) {
            (Some(id), _) if !id.is_empty() => IdentityKey::Id(id.to_string()),
            (_, Some(link)) if !link.is_empty() => IdentityKey::Permalink(link.to_string()),
            _ => IdentityKey::Fingerprint(text.chars().take(FINGERPRINT_CHARS).collect()),
        }
    }
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityKey::Id(id) => write!(f, "id:{}", id),
            IdentityKey::Permalink(link) => write!(f, "permalink:{}", link),
            IdentityKey::Fingerprint(text) => write!(f, "text:{}", text),
        }
    }
}

/// Keys already seen on the current recursion path.
///
/// Each recursive branch gets its own copy through [`VisitedSet::branch`], so
/// a post visited under one sibling never suppresses it under another.
#[derive(Debug, Clone, Default)]
pub struct VisitedSet {
    keys: HashSet<IdentityKey>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns false when the key was already present.
    pub fn insert(&mut self, key: IdentityKey) -> bool {
        self.keys.insert(key)
    }

    pub fn branch(&self) -> Self {
        self.clone()
    }
}
