use super::driver::{PageDriver, RawEvaluation, SessionCookie, SessionState};
use crate::error::{AppError, Result};
use crate::scripts;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::cdp::browser_protocol::page::SetBypassCspParams;
use chromiumoxide::cdp::js_protocol::runtime::{
    AddBindingParams, EvaluateParams, EventBindingCalled, RemoveBindingParams,
};
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

fn browser_error(e: impl std::fmt::Display) -> AppError {
    AppError::classify_browser(e.to_string())
}

/// [`PageDriver`] over a chromiumoxide page.
#[derive(Clone)]
pub struct ChromePage {
    page: Page,
    navigation_timeout: Duration,
}

impl ChromePage {
    pub fn new(page: Page, navigation_timeout: Duration) -> Self {
        Self {
            page,
            navigation_timeout,
        }
    }

    async fn wait_for_navigation(&self) {
        match tokio::time::timeout(self.navigation_timeout, self.page.wait_for_navigation()).await {
            Ok(Ok(_)) => debug!("Navigation complete"),
            Ok(Err(e)) => debug!(error = %e, "Navigation wait error, continuing"),
            Err(_) => debug!("Navigation wait timed out, continuing"),
        }
    }

    fn evaluate_params(expression: &str, bypass_csp: bool) -> Result<EvaluateParams> {
        let mut builder = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(true)
            .await_promise(true);
        if bypass_csp {
            builder = builder
                .allow_unsafe_eval_blocked_by_csp(true)
                .user_gesture(true);
        }
        builder.build().map_err(AppError::Browser)
    }
}

#[async_trait]
impl PageDriver for ChromePage {
    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await.map_err(browser_error)?.unwrap_or_default())
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        debug!(url, "Navigating");
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(result) => {
                result.map_err(browser_error)?;
            }
            Err(_) => warn!(url, "Navigation did not finish in time, continuing"),
        }
        Ok(())
    }

    async fn go_back(&self) -> Result<()> {
        debug!("Navigating back");
        self.page
            .evaluate_expression(Self::evaluate_params("history.back()", false)?)
            .await
            .map_err(browser_error)?;
        self.wait_for_navigation().await;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        debug!("Reloading page");
        match tokio::time::timeout(self.navigation_timeout, self.page.reload()).await {
            Ok(result) => {
                result.map_err(browser_error)?;
            }
            Err(_) => warn!("Reload did not finish in time, continuing"),
        }
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate_expression(Self::evaluate_params(expression, false)?)
            .await
            .map_err(browser_error)?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn evaluate_raw(&self, expression: &str) -> Result<RawEvaluation> {
        let response = self
            .page
            .execute(Self::evaluate_params(expression, true)?)
            .await
            .map_err(browser_error)?;
        let returns = response.result;

        let exception = returns.exception_details.map(|details| {
            details
                .exception
                .as_ref()
                .and_then(|exception| exception.description.clone())
                .unwrap_or(details.text)
        });
        Ok(RawEvaluation {
            value: returns.result.value,
            exception,
        })
    }

    async fn inject_script_tag(&self, source: &str, channel: &str, timeout: Duration) -> Result<String> {
        let mut events = self
            .page
            .event_listener::<EventBindingCalled>()
            .await
            .map_err(browser_error)?;
        if let Err(e) = self.page.execute(SetBypassCspParams::new(true)).await {
            debug!(error = %e, "Could not bypass content security policy");
        }
        self.page
            .execute(AddBindingParams::new(channel))
            .await
            .map_err(browser_error)?;

        let inject = format!(
            r#"(() => {{
  const element = document.createElement('script');
  element.textContent = {source};
  (document.head || document.documentElement).appendChild(element);
  element.remove();
  return true;
}})()"#,
            source = Value::from(source)
        );
        self.evaluate(&inject).await?;

        let payload = tokio::time::timeout(timeout, async {
            while let Some(event) = events.next().await {
                if event.name == channel {
                    return Some(event.payload.clone());
                }
            }
            None
        })
        .await;

        if let Err(e) = self.page.execute(RemoveBindingParams::new(channel)).await {
            debug!(error = %e, "Failed to remove page binding");
        }

        match payload {
            Ok(Some(payload)) => Ok(payload),
            Ok(None) => Err(AppError::ContextDestroyed(
                "binding event stream closed before the script reported".into(),
            )),
            Err(_) => Err(AppError::Timeout(format!(
                "script tag did not report within {}s",
                timeout.as_secs()
            ))),
        }
    }

    async fn session_state(&self) -> Result<SessionState> {
        let value = self.evaluate(&scripts::session_probe()).await?;
        Ok(value
            .as_str()
            .map(SessionState::parse)
            .unwrap_or(SessionState::Unknown))
    }

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()> {
        let params = cookies
            .iter()
            .map(|cookie| {
                let mut builder = CookieParam::builder()
                    .name(cookie.name.clone())
                    .value(cookie.value.clone());
                if let Some(domain) = &cookie.domain {
                    builder = builder.domain(domain.clone());
                }
                if let Some(path) = &cookie.path {
                    builder = builder.path(path.clone());
                }
                if let Some(secure) = cookie.secure {
                    builder = builder.secure(secure);
                }
                if let Some(http_only) = cookie.http_only {
                    builder = builder.http_only(http_only);
                }
                builder.build().map_err(AppError::Browser)
            })
            .collect::<Result<Vec<_>>>()?;

        self.page.set_cookies(params).await.map_err(browser_error)?;
        Ok(())
    }
}
