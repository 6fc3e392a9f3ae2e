use super::driver::{PageDriver, SessionCookie, SessionState};
use crate::config::AuthConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Re-establishes a logged-in session on the page.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, page: &dyn PageDriver) -> Result<()>;
}

/// Restores a session from exported cookies, then waits for the home
/// timeline to report a logged-in state. With no cookie file it only waits,
/// which leaves time for a manual login in a headed browser.
pub struct SessionRestorer {
    cookies_file: Option<PathBuf>,
    home_url: String,
    wait: Duration,
    poll_interval: Duration,
}

impl SessionRestorer {
    pub fn new(config: &AuthConfig, home_url: impl Into<String>) -> Self {
        Self {
            cookies_file: config.cookies_file.as_ref().map(PathBuf::from),
            home_url: home_url.into(),
            wait: Duration::from_secs(config.login_wait_secs),
            poll_interval: Duration::from_secs(2),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn load_cookies(path: &Path) -> Result<Vec<SessionCookie>> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::Authentication(format!("Failed to read cookies from {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            AppError::Authentication(format!("Invalid cookie file {}: {}", path.display(), e))
        })
    }
}

#[async_trait]
impl Authenticator for SessionRestorer {
    async fn authenticate(&self, page: &dyn PageDriver) -> Result<()> {
        if let Some(path) = &self.cookies_file {
            let cookies = Self::load_cookies(path)?;
            info!(count = cookies.len(), "Restoring session cookies");
            page.set_cookies(&cookies).await?;
        }

        page.navigate(&self.home_url).await?;

        let deadline = Instant::now() + self.wait;
        loop {
            let state = page.session_state().await.unwrap_or_else(|e| {
                debug!(error = %e, "Session probe failed");
                SessionState::Unknown
            });
            if state == SessionState::LoggedIn {
                info!("Session is logged in");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return match state {
                    SessionState::LoggedOut => Err(AppError::Authentication(format!(
                        "still logged out after {}s",
                        self.wait.as_secs()
                    ))),
                    _ => {
                        warn!("Could not confirm session state, continuing");
                        Ok(())
                    }
                };
            }
            debug!(?state, "Waiting for login");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_cookie_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(
            &path,
            r#"[
  {"name": "auth_token", "value": "abc", "domain": ".x.com", "path": "/", "secure": true, "httpOnly": true},
  {"name": "lang", "value": "en"}
]"#,
        )
        .unwrap();

        let cookies = SessionRestorer::load_cookies(&path).unwrap();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].http_only, Some(true));
        assert_eq!(cookies[1].domain, None);
    }

    #[test]
    fn test_bad_cookie_file_is_auth_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            SessionRestorer::load_cookies(&path),
            Err(AppError::Authentication(_))
        ));
        assert!(matches!(
            SessionRestorer::load_cookies(&dir.path().join("missing.json")),
            Err(AppError::Authentication(_))
        ));
    }
}
