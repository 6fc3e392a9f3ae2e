use crate::error::{AppError, Result};
use crate::models::{Target, ViewKind};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "harvester.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub browser: BrowserConfig,
    pub target: TargetConfig,
    pub collector: CollectorConfig,
    pub orchestrator: OrchestratorConfig,
    pub auth: AuthConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Persistent Chrome profile. Defaults to a directory under the user data dir.
    pub user_data_dir: Option<String>,
    /// DevTools websocket of an already running browser; skips launching.
    pub ws_url: Option<String>,
    pub user_agent: String,
    pub launch_attempts: u32,
    pub navigation_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub handle: String,
    pub view: ViewKind,
    pub origin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Consecutive no-growth rounds before the loop stops.
    pub stability_threshold: u32,
    pub settle_timeout_ms: u64,
    pub step_retries: u32,
    pub max_depth: usize,
    pub assistant_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_attempts: u32,
    pub strategy_attempts: u32,
    pub retry_delay_ms: u64,
    pub attempt_delay_ms: u64,
    pub script_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// JSON export of session cookies replayed before the run.
    pub cookies_file: Option<String>,
    pub login_wait_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: String,
}

fn env_or<T: FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(fallback)
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Environment wins over the file whenever the variable is set and parses.
fn pick<T: FromStr>(key: &str, file_value: T) -> T {
    env_or(key, file_value)
}

fn pick_opt(key: &str, file_value: Option<String>) -> Option<String> {
    env_opt(key).or(file_value)
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: env_or("HEADLESS", false),
            window_width: env_or("WINDOW_WIDTH", 1280),
            window_height: env_or("WINDOW_HEIGHT", 720),
            user_data_dir: env_opt("CHROME_PROFILE_DIR"),
            ws_url: env_opt("BROWSER_WS_URL"),
            user_agent: std::env::var("BROWSER_USER_AGENT").unwrap_or_else(|_| {
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string()
            }),
            launch_attempts: env_or("LAUNCH_ATTEMPTS", 3),
            navigation_timeout_secs: env_or("NAVIGATION_TIMEOUT_SECS", 10),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            handle: env_opt("HARVEST_HANDLE")
                .or_else(|| env_opt("X_USERNAME"))
                .unwrap_or_default(),
            view: env_or("HARVEST_VIEW", ViewKind::Likes),
            origin: std::env::var("HARVEST_ORIGIN").unwrap_or_else(|_| "https://x.com".to_string()),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            stability_threshold: env_or("STABILITY_THRESHOLD", 15),
            settle_timeout_ms: env_or("SETTLE_TIMEOUT_MS", 3500),
            step_retries: env_or("STEP_RETRIES", 2),
            max_depth: env_or("MAX_DEPTH", 5),
            assistant_pattern: std::env::var("ASSISTANT_PATTERN")
                .unwrap_or_else(|_| "@AskPerplexity".to_string()),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: env_or("MAX_ATTEMPTS", 5),
            strategy_attempts: env_or("STRATEGY_ATTEMPTS", 3),
            retry_delay_ms: env_or("RETRY_DELAY_MS", 2000),
            attempt_delay_ms: env_or("ATTEMPT_DELAY_MS", 5000),
            script_timeout_secs: env_or("SCRIPT_TIMEOUT_SECS", 60),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookies_file: env_opt("SESSION_COOKIES_FILE"),
            login_wait_secs: env_or("LOGIN_WAIT_SECS", 120),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "extracted_data".to_string()),
        }
    }
}

impl Config {
    /// Reads `path` when it exists and layers the environment on top.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using environment and defaults");
            return Ok(Config::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let file_config = toml::from_str::<Config>(&contents).map_err(|e| {
            AppError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        tracing::info!(path = %path.display(), "Loaded config file");
        Ok(Self::merge_env(file_config))
    }

    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.target.handle.trim().trim_start_matches('@').is_empty() {
            errors.push("Target handle is required (--handle or HARVEST_HANDLE)".to_string());
        }
        if !self.target.origin.starts_with("http://") && !self.target.origin.starts_with("https://") {
            errors.push("Invalid origin URL format".to_string());
        }
        if let Some(ws_url) = &self.browser.ws_url {
            if !ws_url.starts_with("ws://") && !ws_url.starts_with("wss://") {
                errors.push("Browser websocket URL must start with ws:// or wss://".to_string());
            }
        }
        if self.browser.window_width == 0 || self.browser.window_height == 0 {
            errors.push("Window size must be greater than 0".to_string());
        }
        if self.browser.launch_attempts == 0 {
            errors.push("Launch attempts must be greater than 0".to_string());
        }
        if self.collector.stability_threshold == 0 {
            errors.push("Stability threshold must be greater than 0".to_string());
        }
        if self.collector.assistant_pattern.trim().is_empty() {
            errors.push("Assistant pattern must not be empty".to_string());
        }
        if self.orchestrator.max_attempts == 0 {
            errors.push("Max attempts must be greater than 0".to_string());
        }
        if self.orchestrator.strategy_attempts == 0 {
            errors.push("Strategy attempts must be greater than 0".to_string());
        }
        if self.orchestrator.script_timeout_secs == 0 {
            errors.push("Script timeout must be greater than 0".to_string());
        }
        if self.output.dir.trim().is_empty() {
            errors.push("Output directory must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn target(&self) -> Result<Target> {
        Target::new(&self.target.handle, self.target.view, &self.target.origin)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.collector.settle_timeout_ms)
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestrator.script_timeout_secs)
    }

    fn merge_env(file: Config) -> Config {
        Config {
            browser: BrowserConfig {
                headless: pick("HEADLESS", file.browser.headless),
                window_width: pick("WINDOW_WIDTH", file.browser.window_width),
                window_height: pick("WINDOW_HEIGHT", file.browser.window_height),
                user_data_dir: pick_opt("CHROME_PROFILE_DIR", file.browser.user_data_dir),
                ws_url: pick_opt("BROWSER_WS_URL", file.browser.ws_url),
                user_agent: pick("BROWSER_USER_AGENT", file.browser.user_agent),
                launch_attempts: pick("LAUNCH_ATTEMPTS", file.browser.launch_attempts),
                navigation_timeout_secs: pick(
                    "NAVIGATION_TIMEOUT_SECS",
                    file.browser.navigation_timeout_secs,
                ),
            },
            target: TargetConfig {
                handle: env_opt("HARVEST_HANDLE")
                    .or_else(|| env_opt("X_USERNAME"))
                    .unwrap_or(file.target.handle),
                view: pick("HARVEST_VIEW", file.target.view),
                origin: pick("HARVEST_ORIGIN", file.target.origin),
            },
            collector: CollectorConfig {
                stability_threshold: pick("STABILITY_THRESHOLD", file.collector.stability_threshold),
                settle_timeout_ms: pick("SETTLE_TIMEOUT_MS", file.collector.settle_timeout_ms),
                step_retries: pick("STEP_RETRIES", file.collector.step_retries),
                max_depth: pick("MAX_DEPTH", file.collector.max_depth),
                assistant_pattern: pick("ASSISTANT_PATTERN", file.collector.assistant_pattern),
            },
            orchestrator: OrchestratorConfig {
                max_attempts: pick("MAX_ATTEMPTS", file.orchestrator.max_attempts),
                strategy_attempts: pick("STRATEGY_ATTEMPTS", file.orchestrator.strategy_attempts),
                retry_delay_ms: pick("RETRY_DELAY_MS", file.orchestrator.retry_delay_ms),
                attempt_delay_ms: pick("ATTEMPT_DELAY_MS", file.orchestrator.attempt_delay_ms),
                script_timeout_secs: pick("SCRIPT_TIMEOUT_SECS", file.orchestrator.script_timeout_secs),
            },
            auth: AuthConfig {
                cookies_file: pick_opt("SESSION_COOKIES_FILE", file.auth.cookies_file),
                login_wait_secs: pick("LOGIN_WAIT_SECS", file.auth.login_wait_secs),
            },
            output: OutputConfig {
                dir: pick("OUTPUT_DIR", file.output.dir),
            },
        }
    }
}
