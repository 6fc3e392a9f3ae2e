use super::dom::{self, inner_text};
use super::selectors::Selectors;
use crate::config::CollectorConfig;
use crate::error::{AppError, Result};
use crate::models::{
    ExtractionWarning, IdentityKey, Poll, Post, PostStatus, VisitedSet, WarningKind,
};
use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

/// First path segments that are site navigation, not profiles.
const NAVIGATION_ROUTES: &[&str] = &[
    "home",
    "explore",
    "messages",
    "notifications",
    "search",
    "settings",
    "compose",
    "i",
];

/// Banners rendered above a post that are never the author's name.
const OVERLAY_LABELS: &[&str] = &["You reposted", "Pinned", "Promoted", "Reposted", "Retweeted"];

const CONTEXT_CHARS: usize = 100;

/// Counter values read from the action bar of one post.
#[derive(Debug, Default)]
struct Engagement {
    likes: Option<String>,
    retweets: Option<String>,
    replies: Option<String>,
    views: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Base for relative permalinks and media URLs.
    pub origin: Url,
    pub max_depth: usize,
    pub assistant_pattern: String,
}

impl ExtractOptions {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            max_depth: 5,
            assistant_pattern: "@AskPerplexity".to_string(),
        }
    }

    pub fn from_config(config: &CollectorConfig, origin: Url) -> Self {
        Self {
            origin,
            max_depth: config.max_depth,
            assistant_pattern: config.assistant_pattern.clone(),
        }
    }
}

/// Posts and warnings from one pass over a snapshot.
#[derive(Debug, Clone, Default)]
pub struct ExtractionBatch {
    pub posts: Vec<Post>,
    pub warnings: Vec<ExtractionWarning>,
    pub containers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Root,
    Quote,
    Ancestor,
    Trailing,
}

/// Author context inherited by nested posts whose own link is ambiguous.
#[derive(Debug, Clone, Default)]
struct AuthorHint {
    username: Option<String>,
    author: Option<String>,
}

struct Frame {
    depth: usize,
    visited: VisitedSet,
    hint: AuthorHint,
    role: Role,
}

impl Frame {
    fn root() -> Self {
        Self {
            depth: 0,
            visited: VisitedSet::new(),
            hint: AuthorHint::default(),
            role: Role::Root,
        }
    }

    fn child(&self, role: Role, visited: VisitedSet, hint: &AuthorHint) -> Self {
        Self {
            depth: self.depth + 1,
            visited,
            hint: hint.clone(),
            role,
        }
    }
}

struct Identity {
    id: Option<String>,
    permalink: Option<String>,
    text: String,
    fallback_text: Option<String>,
    key: IdentityKey,
}

pub struct PostExtractor {
    selectors: Selectors,
    origin: Url,
    max_depth: usize,
    assistant: Regex,
    status_id: Regex,
    collapsed: Regex,
    replying_to: Regex,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| AppError::Configuration(format!("Invalid pattern '{}': {}", pattern, e)))
}

impl PostExtractor {
    pub fn new(options: ExtractOptions) -> Result<Self> {
        Ok(Self {
            selectors: Selectors::compile()?,
            origin: options.origin,
            max_depth: options.max_depth,
            assistant: compile(&format!(
                "(?i){}",
                regex::escape(options.assistant_pattern.trim())
            ))?,
            status_id: compile(r"/status/(\d+)")?,
            collapsed: compile(r"(?i)show more|show thread")?,
            replying_to: compile(r"(?i)replying to")?,
        })
    }

    /// Extracts every top-level post container of a serialized timeline.
    ///
    /// Articles nested inside another article are quotes and are reached
    /// through their enclosing post instead.
    pub fn extract_document(&self, html: &str) -> ExtractionBatch {
        let document = Html::parse_document(html);
        let containers: Vec<ElementRef<'_>> = document
            .select(&self.selectors.article)
            .filter(|article| dom::nearest_article(*article).is_none())
            .collect();

        let mut warnings = Vec::new();
        let posts = containers
            .iter()
            .filter_map(|container| self.extract(*container, Frame::root(), &mut warnings))
            .collect();

        ExtractionBatch {
            posts,
            warnings,
            containers: containers.len(),
        }
    }

    fn extract(
        &self,
        container: ElementRef<'_>,
        mut frame: Frame,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> Option<Post> {
        let Identity {
            id,
            permalink,
            text,
            fallback_text,
            key,
        } = self.identify(container);
        let warn = |kind: WarningKind, message: &str| {
            ExtractionWarning::new(kind, message).for_post(id.as_deref(), permalink.as_deref())
        };

        if frame.visited.contains(&key) {
            warnings.push(warn(WarningKind::Cycle, "Cycle detected in thread/quote structure"));
            return None;
        }
        if frame.depth > self.max_depth {
            warnings.push(warn(WarningKind::DepthExceeded, "Max recursion depth exceeded"));
            return None;
        }
        frame.visited.insert(key);

        if dom::select_owned(container, &self.selectors.button)
            .any(|button| self.collapsed.is_match(&inner_text(button)))
        {
            warnings.push(warn(
                WarningKind::CollapsedContent,
                "Collapsed content was not expanded, text may be truncated",
            ));
        }

        let (username, author) = self.resolve_author(container, &frame.hint);
        if username.is_none() || author.is_none() {
            let context = dom::truncate(&inner_text(container), CONTEXT_CHARS);
            if username.is_none() {
                warnings.push(warn(WarningKind::MissingField, "Missing username").with_context(context.clone()));
            }
            if author.is_none() {
                warnings.push(warn(WarningKind::MissingField, "Missing author").with_context(context));
            }
        }
        if permalink.is_none() {
            warnings.push(warn(WarningKind::MissingField, "Missing permalink"));
        }

        let date = dom::select_owned(container, &self.selectors.time)
            .find_map(|time| time.value().attr("datetime"))
            .map(str::to_string);
        let media = self.media(container);
        let poll = self.poll(container);
        let replying_to = self.replying_to(container);
        let engagement = self.engagement(container);

        let hint = AuthorHint {
            username: username.clone(),
            author: author.clone(),
        };
        let retweet = self.resolve_quote(container, &frame, &hint, &warn, warnings);

        let (reply_chain, perplexity_context) = if frame.role == Role::Root {
            (
                self.resolve_ancestors(container, &frame, &hint, warnings),
                self.resolve_trailing(container, &frame, &hint, warnings),
            )
        } else {
            (Vec::new(), None)
        };
        let parent_id = reply_chain.last().and_then(|parent| parent.id.clone());
        let status = id.is_none().then_some(PostStatus::Unavailable);

        Some(Post {
            id,
            parent_id,
            author,
            username,
            text,
            permalink,
            date,
            media,
            retweet,
            reply_chain,
            replying_to,
            perplexity_context,
            poll,
            status,
            likes: engagement.likes,
            retweets: engagement.retweets,
            replies: engagement.replies,
            views: engagement.views,
            fallback_text,
        })
    }

    fn identify(&self, container: ElementRef<'_>) -> Identity {
        let permalink = dom::select_owned(container, &self.selectors.time)
            .next()
            .and_then(dom::parent_element)
            .and_then(|link| link.value().attr("href"))
            .and_then(|href| self.absolute(href));
        let id = permalink
            .as_deref()
            .and_then(|link| self.status_id.captures(link))
            .map(|caps| caps[1].to_string());
        let text = dom::select_owned(container, &self.selectors.tweet_text)
            .next()
            .map(inner_text)
            .unwrap_or_default();

        let fallback_text = text.is_empty().then(|| inner_text(container));
        let key = IdentityKey::resolve(
            id.as_deref(),
            permalink.as_deref(),
            fallback_text.as_deref().unwrap_or(&text),
        );

        Identity {
            id,
            permalink,
            text,
            fallback_text,
            key,
        }
    }

    fn absolute(&self, href: &str) -> Option<String> {
        self.origin.join(href).ok().map(|url| url.to_string())
    }

    fn resolve_author(
        &self,
        container: ElementRef<'_>,
        hint: &AuthorHint,
    ) -> (Option<String>, Option<String>) {
        let candidates: Vec<(String, String)> =
            dom::select_owned(container, &self.selectors.profile_link)
                .filter_map(|anchor| {
                    let handle = anchor.value().attr("href")?.trim_start_matches('/');
                    if handle.is_empty()
                        || handle.contains(['/', '?', '#'])
                        || NAVIGATION_ROUTES.contains(&handle.to_lowercase().as_str())
                    {
                        return None;
                    }
                    let display = anchor
                        .select(&self.selectors.span)
                        .map(inner_text)
                        .filter(|text| !text.is_empty())
                        .last()?;
                    Some((handle.to_string(), display))
                })
                .collect();

        let chosen = hint
            .username
            .as_deref()
            .and_then(|expected| {
                candidates
                    .iter()
                    .find(|(handle, _)| handle.eq_ignore_ascii_case(expected))
            })
            .or_else(|| candidates.first());
        if let Some((handle, display)) = chosen {
            return (Some(handle.clone()), Some(display.clone()));
        }

        let labelled = dom::select_owned(container, &self.selectors.span)
            .map(inner_text)
            .find(|text| !text.is_empty() && !OVERLAY_LABELS.iter().any(|label| text.contains(label)));
        match labelled {
            Some(author) => (hint.username.clone(), Some(author)),
            None => (hint.username.clone(), hint.author.clone()),
        }
    }

    fn media(&self, container: ElementRef<'_>) -> Vec<String> {
        dom::select_owned(container, &self.selectors.media)
            .filter_map(|element| element.value().attr("src"))
            .filter(|src| !src.is_empty() && !src.contains("profile_images"))
            .filter_map(|src| self.absolute(src))
            .collect()
    }

    fn poll(&self, container: ElementRef<'_>) -> Option<Poll> {
        let region = dom::select_owned(container, &self.selectors.poll).find(|region| {
            dom::has_ancestor_within(*region, container, &self.selectors.poll_group)
        })?;
        let options = region
            .select(&self.selectors.poll_option)
            .map(inner_text)
            .filter(|option| !option.is_empty())
            .collect();
        Some(Poll { options })
    }

    fn engagement(&self, container: ElementRef<'_>) -> Engagement {
        let mut engagement = Engagement::default();
        for element in dom::select_owned(container, &self.selectors.counter) {
            let slot = match element.value().attr("data-testid") {
                Some("like" | "unlike") => &mut engagement.likes,
                Some("retweet" | "unretweet") => &mut engagement.retweets,
                Some("reply") => &mut engagement.replies,
                Some("viewCount") => &mut engagement.views,
                _ => continue,
            };
            let value = inner_text(element);
            if !value.is_empty() {
                *slot = Some(value);
            }
        }
        engagement
    }

    fn replying_to(&self, container: ElementRef<'_>) -> Option<String> {
        dom::select_owned(container, &self.selectors.text_block)
            .filter(|element| {
                !self.selectors.tweet_text.matches(element)
                    && !dom::has_ancestor_within(*element, container, &self.selectors.tweet_text)
            })
            .find(|element| self.replying_to.is_match(&dom::own_text(*element)))
            .map(inner_text)
            .filter(|text| !text.is_empty())
    }

    fn resolve_quote<W>(
        &self,
        container: ElementRef<'_>,
        frame: &Frame,
        hint: &AuthorHint,
        warn: &W,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> Option<Box<Post>>
    where
        W: Fn(WarningKind, &str) -> ExtractionWarning,
    {
        let candidates: Vec<ElementRef<'_>> = container
            .select(&self.selectors.article)
            .filter(|article| {
                dom::owned_by(*article, container)
                    && dom::has_ancestor_within(*article, container, &self.selectors.quote_card)
            })
            .collect();

        let Some(first) = candidates.first().copied() else {
            if dom::select_owned(container, &self.selectors.quote_card).next().is_some() {
                warnings.push(warn(
                    WarningKind::QuoteUnresolved,
                    "Quote card visually present but no article found",
                ));
            }
            return None;
        };

        if candidates.len() > 1 {
            warnings.push(
                warn(WarningKind::MultipleQuotes, "Multiple quoted articles found in quote card")
                    .with_context(format!("{} quoted articles", candidates.len())),
            );
        }

        let quoted = self.extract(
            first,
            frame.child(Role::Quote, frame.visited.branch(), hint),
            warnings,
        );
        if quoted.is_none() {
            warnings.push(warn(
                WarningKind::QuoteUnresolved,
                "Quote card present but quoted post extraction failed",
            ));
        }
        quoted.map(Box::new)
    }

    /// Walks upward through the conversation and returns the ancestors root first.
    fn resolve_ancestors(
        &self,
        container: ElementRef<'_>,
        frame: &Frame,
        hint: &AuthorHint,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> Vec<Post> {
        let mut chain = Vec::new();
        let mut visited = frame.visited.branch();
        let mut walked = vec![container];
        let mut current = container;

        while let Some(parent) = self.ancestor_candidate(current, &walked) {
            walked.push(parent);
            let identity = self.identify(parent);
            if visited.contains(&identity.key) {
                warnings.push(
                    ExtractionWarning::new(WarningKind::Cycle, "Ancestor already present in reply chain")
                        .for_post(identity.id.as_deref(), identity.permalink.as_deref()),
                );
                break;
            }

            if let Some(post) = self.extract(
                parent,
                frame.child(Role::Ancestor, visited.branch(), hint),
                warnings,
            ) {
                chain.insert(0, post);
            }
            visited.insert(identity.key);
            current = parent;
        }

        chain
    }

    /// A labelled conversation block above the post, else the nearest
    /// preceding sibling article. Best effort: it follows the rendered layout.
    fn ancestor_candidate<'a>(
        &self,
        current: ElementRef<'a>,
        walked: &[ElementRef<'a>],
    ) -> Option<ElementRef<'a>> {
        let seen = |candidate: &ElementRef<'a>| walked.iter().any(|w| w.id() == candidate.id());

        dom::parent_element(current)
            .and_then(dom::parent_element)
            .and_then(|grandparent| grandparent.select(&self.selectors.conversation_article).next())
            .filter(|candidate| !seen(candidate) && dom::precedes(*candidate, current))
            .or_else(|| {
                current
                    .prev_siblings()
                    .filter_map(ElementRef::wrap)
                    .find(|sibling| sibling.value().name() == "article" && !seen(sibling))
            })
    }

    fn resolve_trailing(
        &self,
        container: ElementRef<'_>,
        frame: &Frame,
        hint: &AuthorHint,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> Option<Box<Post>> {
        let mut last = container;
        for sibling in container.next_siblings().filter_map(ElementRef::wrap) {
            if sibling.value().name() != "article" {
                break;
            }
            last = sibling;
        }
        if last.id() == container.id() {
            return None;
        }

        let text = dom::select_owned(last, &self.selectors.tweet_text)
            .next()
            .map(inner_text)
            .unwrap_or_default();
        if !self.assistant.is_match(&text) {
            return None;
        }

        self.extract(
            last,
            frame.child(Role::Trailing, frame.visited.branch(), hint),
            warnings,
        )
        .map(Box::new)
    }
}
