#![allow(dead_code)]

use async_trait::async_trait;
use harvester_lib::browser::{PageDriver, RawEvaluation, SessionCookie, SessionRestorer, SessionState};
use harvester_lib::config::AuthConfig;
use harvester_lib::error::{AppError, Result};
use harvester_lib::scripts::{SCROLL_MARKER, SNAPSHOT_MARKER};
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use tempfile::TempDir;

pub const ORIGIN: &str = "https://x.com";
pub const HANDLE: &str = "alice";
pub const CONTEXT_DESTROYED: &str =
    "Execution context was destroyed, most likely because of a navigation.";
pub const CSP_BLOCKED: &str =
    "EvalError: Refused to evaluate a string as JavaScript because 'unsafe-eval' is not allowed";

pub fn target_url() -> String {
    format!("{}/{}/likes", ORIGIN, HANDLE)
}

pub fn article(id: &str, user: &str, body: &str) -> String {
    format!(
        r#"<article><div><a role="link" href="/{user}"><div><span>{user} name</span></div></a><a href="/{user}/status/{id}"><time datetime="2024-03-01T10:00:00.000Z">Mar 1</time></a></div><div data-testid="tweetText"><span>{body}</span></div></article>"#
    )
}

/// A liked-posts timeline where every post sits in its own cell, as rendered.
pub fn timeline(articles: &[String]) -> String {
    let cells: String = articles
        .iter()
        .map(|article| format!(r#"<div data-testid="cellInnerDiv">{}</div>"#, article))
        .collect();
    format!(
        r#"<html><body><main><div aria-label="Timeline: Liked posts">{}</div></main></body></html>"#,
        cells
    )
}

pub fn feed_post(index: usize) -> String {
    article(
        &(1000 + index).to_string(),
        &format!("user{}", index % 5),
        &format!("post number {}", index),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Direct,
    ScriptTag,
    Protocol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routine {
    Snapshot,
    Scroll,
}

impl Routine {
    fn detect(expression: &str) -> Option<Self> {
        if expression.contains(SNAPSHOT_MARKER) {
            Some(Routine::Snapshot)
        } else if expression.contains(SCROLL_MARKER) {
            Some(Routine::Scroll)
        } else {
            None
        }
    }
}

struct Failure {
    channel: Option<Channel>,
    routine: Routine,
    remaining: Option<u32>,
    message: String,
}

/// Timeline that reveals `per_scroll` more posts on every scroll.
#[derive(Debug, Clone, Copy)]
pub struct FeedModel {
    pub total: usize,
    pub initial: usize,
    pub per_scroll: usize,
}

struct State {
    url: String,
    history: Vec<String>,
    logged_in: bool,
    feed: FeedModel,
    revealed: usize,
    snapshots: usize,
    logout_at_snapshot: Option<usize>,
    failures: Vec<Failure>,
    navigations: Vec<String>,
    go_backs: u32,
    reloads: u32,
    cookie_sets: u32,
    calls: Vec<Channel>,
}

pub struct FakePage {
    state: Mutex<State>,
}

const HEIGHT_PER_POST: u64 = 200;

impl FakePage {
    pub fn new(feed: FeedModel) -> Self {
        Self {
            state: Mutex::new(State {
                url: target_url(),
                history: Vec::new(),
                logged_in: true,
                feed,
                revealed: feed.initial.min(feed.total),
                snapshots: 0,
                logout_at_snapshot: None,
                failures: Vec::new(),
                navigations: Vec::new(),
                go_backs: 0,
                reloads: 0,
                cookie_sets: 0,
                calls: Vec::new(),
            }),
        }
    }

    /// 40 posts, 15 more per scroll.
    pub fn forty_posts() -> Self {
        Self::new(FeedModel {
            total: 40,
            initial: 15,
            per_scroll: 15,
        })
    }

    /// Fails `routine` on `channel` (every channel when `None`) `times` times,
    /// or forever when `times` is `None`.
    pub fn fail(&self, channel: Option<Channel>, routine: Routine, times: Option<u32>, message: &str) {
        self.state.lock().unwrap().failures.push(Failure {
            channel,
            routine,
            remaining: times,
            message: message.to_string(),
        });
    }

    /// The session drops when the given snapshot (counting from 1) is taken.
    pub fn log_out_at_snapshot(&self, snapshot: usize) {
        self.state.lock().unwrap().logout_at_snapshot = Some(snapshot);
    }

    /// Places the page on `url` with no history to go back to.
    pub fn start_at(&self, url: &str) {
        let mut state = self.state.lock().unwrap();
        state.url = url.to_string();
        state.history.clear();
    }

    /// Moves to `url` without recording a navigation, as a click would.
    pub fn open(&self, url: &str) {
        let mut state = self.state.lock().unwrap();
        let previous = std::mem::replace(&mut state.url, url.to_string());
        state.history.push(previous);
    }

    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().unwrap().navigations.clone()
    }

    pub fn go_backs(&self) -> u32 {
        self.state.lock().unwrap().go_backs
    }

    pub fn reloads(&self) -> u32 {
        self.state.lock().unwrap().reloads
    }

    pub fn cookie_sets(&self) -> u32 {
        self.state.lock().unwrap().cookie_sets
    }

    pub fn calls(&self, channel: Channel) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| **call == channel)
            .count()
    }

    fn run_routine(&self, channel: Channel, expression: &str) -> std::result::Result<Value, String> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(channel);
        let Some(routine) = Routine::detect(expression) else {
            return Ok(Value::Null);
        };

        let failure = state.failures.iter_mut().find(|failure| {
            failure.routine == routine
                && failure.channel.map_or(true, |c| c == channel)
                && failure.remaining != Some(0)
        });
        if let Some(failure) = failure {
            if let Some(remaining) = failure.remaining.as_mut() {
                *remaining -= 1;
            }
            return Err(failure.message.clone());
        }

        match routine {
            Routine::Snapshot => {
                state.snapshots += 1;
                if state.logout_at_snapshot == Some(state.snapshots) {
                    state.logged_in = false;
                }
                let articles: Vec<String> = (0..state.revealed).map(feed_post).collect();
                Ok(json!({
                    "html": timeline(&articles),
                    "height": state.revealed as u64 * HEIGHT_PER_POST,
                    "containers": articles.len(),
                    "loggedOut": !state.logged_in,
                    "expanded": 0,
                }))
            }
            Routine::Scroll => {
                state.revealed = (state.revealed + state.feed.per_scroll).min(state.feed.total);
                Ok(json!({ "height": state.revealed as u64 * HEIGHT_PER_POST }))
            }
        }
    }

    fn reset_feed(state: &mut State) {
        state.revealed = state.feed.initial.min(state.feed.total);
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn current_url(&self) -> Result<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let previous = std::mem::replace(&mut state.url, url.to_string());
        state.history.push(previous);
        state.navigations.push(url.to_string());
        Self::reset_feed(&mut state);
        Ok(())
    }

    async fn go_back(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.go_backs += 1;
        if let Some(previous) = state.history.pop() {
            state.url = previous;
        }
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.reloads += 1;
        Self::reset_feed(&mut state);
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        self.run_routine(Channel::Direct, expression)
            .map_err(AppError::classify_browser)
    }

    async fn evaluate_raw(&self, expression: &str) -> Result<RawEvaluation> {
        Ok(match self.run_routine(Channel::Protocol, expression) {
            Ok(value) => RawEvaluation {
                value: Some(value),
                exception: None,
            },
            Err(message) => RawEvaluation {
                value: None,
                exception: Some(message),
            },
        })
    }

    async fn inject_script_tag(&self, source: &str, channel: &str, _timeout: Duration) -> Result<String> {
        assert!(source.contains(channel), "script must report on its own channel");
        let envelope = match self.run_routine(Channel::ScriptTag, source) {
            Ok(value) => json!({ "ok": true, "value": value }),
            Err(error) => json!({ "ok": false, "error": error }),
        };
        Ok(envelope.to_string())
    }

    async fn session_state(&self) -> Result<SessionState> {
        Ok(if self.state.lock().unwrap().logged_in {
            SessionState::LoggedIn
        } else {
            SessionState::LoggedOut
        })
    }

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.cookie_sets += 1;
        if cookies.iter().any(|cookie| cookie.name == "auth_token") {
            state.logged_in = true;
        }
        Ok(())
    }
}

/// A session restorer backed by a cookie export in `dir`.
pub fn restorer(dir: &TempDir) -> SessionRestorer {
    let path = dir.path().join("cookies.json");
    std::fs::write(
        &path,
        r#"[{"name": "auth_token", "value": "secret", "domain": ".x.com", "path": "/"}]"#,
    )
    .unwrap();
    let config = AuthConfig {
        cookies_file: Some(path.to_string_lossy().to_string()),
        login_wait_secs: 0,
    };
    SessionRestorer::new(&config, format!("{}/home", ORIGIN)).with_poll_interval(Duration::ZERO)
}
