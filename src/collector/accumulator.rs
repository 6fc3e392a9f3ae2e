use crate::extraction::ExtractionBatch;
use crate::models::{ExtractionWarning, IdentityKey, PartialHarvest, Post, WarningLog};
use std::collections::HashSet;

/// Insertion-ordered post set keyed by identity. The first post seen under a
/// key is kept; later ones are dropped without field reconciliation.
#[derive(Debug, Clone, Default)]
pub struct PostAccumulator {
    posts: Vec<Post>,
    keys: HashSet<IdentityKey>,
}

impl PostAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, post: Post) -> bool {
        if !self.keys.insert(post.identity_key()) {
            return false;
        }
        self.posts.push(post);
        true
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

/// Everything a run has gathered so far. Survives retries.
#[derive(Debug, Clone, Default)]
pub struct RunAccumulator {
    posts: PostAccumulator,
    warnings: WarningLog,
}

impl RunAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges a batch and returns how many posts were new.
    pub fn absorb(&mut self, batch: ExtractionBatch) -> usize {
        self.warnings.extend(batch.warnings);
        let mut added = 0;
        for post in batch.posts {
            if self.posts.merge(post) {
                added += 1;
            }
        }
        added
    }

    pub fn posts(&self) -> &[Post] {
        self.posts.posts()
    }

    pub fn warnings(&self) -> &[ExtractionWarning] {
        self.warnings.entries()
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Post>, Vec<ExtractionWarning>) {
        (self.posts.posts, self.warnings.into_vec())
    }

    pub fn into_partial(self) -> PartialHarvest {
        let (posts, warnings) = self.into_parts();
        PartialHarvest { posts, warnings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{ExtractOptions, PostExtractor};
    use crate::models::WarningKind;
    use url::Url;

    fn post(id: Option<&str>, text: &str) -> Post {
        Post {
            id: id.map(str::to_string),
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_seen_wins() {
        let mut acc = PostAccumulator::new();
        assert!(acc.merge(post(Some("1"), "first")));
        assert!(!acc.merge(post(Some("1"), "second, more complete")));
        assert!(acc.merge(post(None, "no id")));
        assert!(!acc.merge(post(None, "no id")));

        assert_eq!(acc.len(), 2);
        assert_eq!(acc.posts()[0].text, "first");
        assert_eq!(acc.posts()[1].identity_key(), IdentityKey::Fingerprint("no id".to_string()));
    }

    #[test]
    fn test_textless_unlinked_posts_stay_distinct() {
        let extractor =
            PostExtractor::new(ExtractOptions::new(Url::parse("https://x.com").unwrap())).unwrap();
        let html = r#"<html><body><main>
            <article><span>Carol</span><img src="/media/a.jpg"></article>
            <article><span>Dave</span><div>This post is unavailable.</div></article>
        </main></body></html>"#;

        let batch = extractor.extract_document(html);
        assert_eq!(batch.posts.len(), 2);
        assert!(batch.posts.iter().all(|post| post.text.is_empty()));

        let mut acc = RunAccumulator::new();
        assert_eq!(acc.absorb(batch.clone()), 2);
        assert_eq!(acc.absorb(batch), 0);
        assert_eq!(acc.len(), 2);
    }

    #[test]
    fn test_absorb_counts_new_posts_and_dedups_warnings() {
        let warning = ExtractionWarning::new(WarningKind::Cycle, "Cycle detected");
        let batch = || ExtractionBatch {
            posts: vec![post(Some("1"), "a"), post(Some("2"), "b")],
            warnings: vec![warning.clone()],
            containers: 2,
        };

        let mut acc = RunAccumulator::new();
        assert_eq!(acc.absorb(batch()), 2);
        assert_eq!(acc.absorb(batch()), 0);
        assert_eq!(acc.len(), 2);
        assert_eq!(acc.warnings().len(), 1);

        let partial = acc.into_partial();
        assert_eq!(partial.posts.len(), 2);
        assert_eq!(partial.warnings.len(), 1);
    }
}
