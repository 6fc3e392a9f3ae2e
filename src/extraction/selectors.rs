use crate::error::{AppError, Result};
use scraper::Selector;

/// CSS selectors for the timeline markup, compiled once per extractor.
pub struct Selectors {
    pub article: Selector,
    pub time: Selector,
    pub tweet_text: Selector,
    pub profile_link: Selector,
    pub span: Selector,
    pub media: Selector,
    pub poll: Selector,
    pub poll_group: Selector,
    pub poll_option: Selector,
    pub quote_card: Selector,
    pub conversation_article: Selector,
    pub button: Selector,
    pub text_block: Selector,
    pub counter: Selector,
}

fn parse(css: &str) -> Result<Selector> {
    Selector::parse(css)
        .map_err(|e| AppError::Extraction(format!("Invalid selector '{}': {:?}", css, e)))
}

impl Selectors {
    pub fn compile() -> Result<Self> {
        Ok(Self {
            article: parse("article")?,
            time: parse("time")?,
            tweet_text: parse(r#"div[data-testid="tweetText"]"#)?,
            profile_link: parse(r#"a[role="link"][href^="/"]"#)?,
            span: parse("span")?,
            media: parse("img, video")?,
            poll: parse(r#"[aria-label*="poll"]"#)?,
            poll_group: parse(r#"[role="group"]"#)?,
            poll_option: parse(r#"div[role="button"]"#)?,
            quote_card: parse(r#"div[data-testid="tweet"]"#)?,
            conversation_article: parse(r#"div[aria-label*="Timeline: Conversation"] article"#)?,
            button: parse(r#"button, [role="button"]"#)?,
            text_block: parse("div, span")?,
            counter: parse("div[data-testid]")?,
        })
    }
}
