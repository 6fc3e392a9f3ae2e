use anyhow::Context;
use clap::Parser;
use harvester_lib::browser::{CdpClient, ChromePage, PageDriver, SessionRestorer};
use harvester_lib::config::{Config, DEFAULT_CONFIG_FILE};
use harvester_lib::models::{date_key, ViewKind};
use harvester_lib::orchestrator::Orchestrator;
use harvester_lib::storage::ResultStore;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Collect liked or replied posts from a profile timeline into a JSON file.
#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Profile handle to collect from, with or without the leading @.
    #[clap(long)]
    handle: Option<String>,
    /// Timeline to collect: likes or replies.
    #[clap(long)]
    view: Option<ViewKind>,
    /// Configuration file.
    #[clap(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Run Chrome without a window.
    #[clap(long)]
    headless: bool,
    /// Directory the result file is written to.
    #[clap(short, long)]
    output_dir: Option<String>,
    /// DevTools websocket URL of an already running browser.
    #[clap(long)]
    ws_url: Option<String>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(handle) = self.handle {
            config.target.handle = handle;
        }
        if let Some(view) = self.view {
            config.target.view = view;
        }
        if self.headless {
            config.browser.headless = true;
        }
        if let Some(dir) = self.output_dir {
            config.output.dir = dir;
        }
        if let Some(ws_url) = self.ws_url {
            config.browser.ws_url = Some(ws_url);
        }
    }
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("harvester=info")),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            let message = format!("{:#}", e);
            error!(error = %message, "Run aborted");
            std::process::exit(1);
        }
    }
}

/// Returns whether the run produced a complete result.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut config = Config::load(&cli.config)?;
    cli.apply(&mut config);
    if let Err(problems) = config.validate() {
        anyhow::bail!("invalid configuration: {}", problems.join("; "));
    }

    let target = config.target()?;
    let store = ResultStore::new(&config.output.dir)?;

    let mut client = CdpClient::new();
    let page = match &config.browser.ws_url {
        Some(ws_url) => client.connect_to_existing(ws_url).await?,
        None => client.launch(&config.browser).await?,
    };
    let page = ChromePage::new(
        page,
        Duration::from_secs(config.browser.navigation_timeout_secs),
    );
    let authenticator = SessionRestorer::new(&config.auth, target.home_url());

    let outcome = harvest(&page, &authenticator, &config, &store).await;

    if let Err(e) = client.close().await {
        warn!(error = %e, "Failed to close browser");
    }
    outcome
}

async fn harvest(
    page: &ChromePage,
    authenticator: &SessionRestorer,
    config: &Config,
    store: &ResultStore,
) -> anyhow::Result<bool> {
    let orchestrator = Orchestrator::from_config(page, authenticator, config)?;
    let target = orchestrator.target().clone();

    info!(url = %target.url(), "Opening target view");
    page.navigate(&target.url())
        .await
        .context("failed to open the target view")?;

    match orchestrator.execute().await {
        Ok(output) => {
            let path = store.write(&output)?;
            println!(
                "{} {} posts for @{} via {} -> {}",
                output.total_posts,
                output.view_kind,
                output.subject,
                output.strategy,
                path.display()
            );
            Ok(true)
        }
        Err(failure) => {
            error!(
                attempts = failure.attempts,
                error = %failure.last_error,
                partial_posts = failure.partial.posts.len(),
                "Extraction failed"
            );
            if !failure.partial.is_empty() {
                let date_str = date_key(target.view, &failure.partial.posts, chrono::Utc::now());
                let path = store.write_partial(
                    &target.handle,
                    target.view,
                    &date_str,
                    &failure.partial,
                    &failure.to_string(),
                )?;
                warn!(path = %path.display(), "Partial results saved");
            }
            Ok(false)
        }
    }
}
