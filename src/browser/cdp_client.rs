use crate::config::BrowserConfig;
use crate::error::{AppError, Result};
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::handler::Handler;
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lock files older than this are left over from a crashed browser.
const STALE_LOCK_SECS: u64 = 300;

/// Owns the Chrome process or the remote connection a run uses.
pub struct CdpClient {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    /// False when attached to a browser this client did not start.
    owns_browser: bool,
}

impl CdpClient {
    pub fn new() -> Self {
        Self {
            browser: None,
            handler: None,
            owns_browser: false,
        }
    }

    pub async fn launch(&mut self, config: &BrowserConfig) -> Result<Page> {
        let user_data_dir = Self::profile_dir(config)?;
        info!(headless = config.headless, profile = %user_data_dir.display(), "Launching Chrome");
        Self::clear_stale_lock(&user_data_dir);

        let mut builder = LaunchConfig::builder()
            .window_size(config.window_width, config.window_height)
            .user_data_dir(&user_data_dir)
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-background-timer-throttling")
            .arg("--disable-backgrounding-occluded-windows")
            .arg("--disable-renderer-backgrounding")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--exclude-switches=enable-automation")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-agent={}", config.user_agent));
        if !config.headless {
            builder = builder.with_head();
        }
        let launch_config = builder
            .build()
            .map_err(|e| AppError::Browser(format!("Failed to build browser config: {}", e)))?;

        let attempts = config.launch_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match Browser::launch(launch_config.clone()).await {
                Ok((browser, handler)) => {
                    self.handler = Some(Self::spawn_handler(handler));
                    let page = browser
                        .new_page("about:blank")
                        .await
                        .map_err(|e| AppError::Browser(format!("Failed to create new page: {}", e)))?;
                    self.browser = Some(browser);
                    self.owns_browser = true;
                    info!(attempt, "Chrome launched");
                    return Ok(page);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Chrome launch failed");
                    last_error = Some(e.to_string());
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(1000 * attempt as u64)).await;
                        Self::clear_stale_lock(&user_data_dir);
                    }
                }
            }
        }

        Err(AppError::Browser(format!(
            "Failed to launch browser after {} attempts: {}",
            attempts,
            last_error.unwrap_or_else(|| "unknown error".to_string())
        )))
    }

    /// Attaches to a browser started elsewhere and reuses its first tab.
    pub async fn connect_to_existing(&mut self, ws_url: &str) -> Result<Page> {
        info!(ws_url, "Connecting to running browser");
        let (browser, handler) = Browser::connect(ws_url)
            .await
            .map_err(|e| AppError::Browser(format!("Failed to connect to browser: {}", e)))?;
        self.handler = Some(Self::spawn_handler(handler));

        let pages = browser
            .pages()
            .await
            .map_err(|e| AppError::Browser(format!("Failed to get pages: {}", e)))?;
        let page = match pages.into_iter().next() {
            Some(page) => page,
            None => browser
                .new_page("about:blank")
                .await
                .map_err(|e| AppError::Browser(format!("Failed to create new page: {}", e)))?,
        };

        self.browser = Some(browser);
        self.owns_browser = false;
        Ok(page)
    }

    fn spawn_handler(mut handler: Handler) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    let message = e.to_string();
                    // Unknown protocol events fail to deserialize and are harmless.
                    if !message.contains("data did not match any variant") {
                        debug!(error = %message, "Browser handler error");
                    }
                }
            }
        })
    }

    fn profile_dir(config: &BrowserConfig) -> Result<PathBuf> {
        let dir = match &config.user_data_dir {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .ok_or_else(|| AppError::Browser("Could not determine data directory".into()))?
                .join("harvester")
                .join("chrome-profile"),
        };
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .map_err(|e| AppError::Browser(format!("Failed to create profile directory: {}", e)))?;
            info!(path = %dir.display(), "Created persistent profile directory");
        }
        Ok(dir)
    }

    fn clear_stale_lock(profile_dir: &Path) {
        let lock_path = profile_dir.join("SingletonLock");
        let Ok(metadata) = fs::symlink_metadata(&lock_path) else {
            return;
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .map(|elapsed| elapsed.as_secs());
        match age {
            Some(age) if age > STALE_LOCK_SECS => {
                info!(age_secs = age, "Removing stale SingletonLock");
                if let Err(e) = fs::remove_file(&lock_path) {
                    warn!(error = %e, "Failed to remove SingletonLock");
                }
            }
            _ => debug!("SingletonLock present and recent, leaving it"),
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut browser) = self.browser.take().filter(|_| self.owns_browser) {
            info!("Closing browser");
            browser
                .close()
                .await
                .map_err(|e| AppError::Browser(format!("Failed to close browser: {}", e)))?;
            let _ = browser.wait().await;
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        Ok(())
    }
}

impl Default for CdpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}
