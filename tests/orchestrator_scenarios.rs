mod common;

use common::{Channel, FakePage, Routine, CONTEXT_DESTROYED, CSP_BLOCKED};
use harvester_lib::browser::Authenticator;
use harvester_lib::error::AppError;
use harvester_lib::extraction::{ExtractOptions, PostExtractor};
use harvester_lib::models::{StrategyKind, Target, ViewKind};
use harvester_lib::orchestrator::strategy::ladder;
use harvester_lib::orchestrator::{Orchestrator, OrchestratorSettings};
use std::time::Duration;
use url::Url;

fn settings(max_attempts: u32) -> OrchestratorSettings {
    OrchestratorSettings {
        max_attempts,
        strategy_attempts: 3,
        retry_delay: Duration::ZERO,
        attempt_delay: Duration::ZERO,
        settle: Duration::ZERO,
        stability_threshold: 15,
        step_retries: 2,
    }
}

fn run_date() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

fn orchestrator<'a>(
    page: &'a FakePage,
    authenticator: &'a dyn Authenticator,
    max_attempts: u32,
) -> Orchestrator<'a> {
    let target = Target::new(common::HANDLE, ViewKind::Likes, common::ORIGIN).unwrap();
    let extractor =
        PostExtractor::new(ExtractOptions::new(Url::parse(common::ORIGIN).unwrap())).unwrap();
    Orchestrator::new(
        page,
        authenticator,
        target,
        extractor,
        ladder(Duration::from_secs(1)),
        settings(max_attempts),
    )
}

#[tokio::test]
async fn test_context_destroyed_twice_then_direct_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let auth = common::restorer(&dir);
    let page = FakePage::forty_posts();
    page.fail(Some(Channel::Direct), Routine::Snapshot, Some(2), CONTEXT_DESTROYED);

    let before = run_date();
    let output = orchestrator(&page, &auth, 5).execute().await.unwrap();
    let after = run_date();

    assert_eq!(output.strategy, StrategyKind::DirectEvaluation);
    assert_eq!(output.total_posts, 40);
    assert_eq!(output.posts.len(), 40);
    assert_eq!(output.subject, "alice");
    assert_eq!(output.view_kind, ViewKind::Likes);
    // Likes are keyed on the run day, not on the liked post's date.
    assert!(output.date_str == before || output.date_str == after);
    assert_eq!(page.calls(Channel::ScriptTag), 0);
    assert_eq!(page.calls(Channel::Protocol), 0);
    assert_eq!(page.reloads(), 0);
}

#[tokio::test]
async fn test_logged_out_mid_run_reauthenticates_and_resumes() {
    let dir = tempfile::tempdir().unwrap();
    let auth = common::restorer(&dir);
    let page = FakePage::forty_posts();
    page.log_out_at_snapshot(2);

    let output = orchestrator(&page, &auth, 5).execute().await.unwrap();

    assert_eq!(output.strategy, StrategyKind::DirectEvaluation);
    assert_eq!(output.total_posts, 40);
    assert_eq!(page.cookie_sets(), 1);
    assert_eq!(
        page.navigations(),
        vec!["https://x.com/home".to_string(), common::target_url()]
    );
}

#[tokio::test]
async fn test_blocked_direct_evaluation_escalates_to_script_tag() {
    let dir = tempfile::tempdir().unwrap();
    let auth = common::restorer(&dir);
    let page = FakePage::forty_posts();
    page.fail(Some(Channel::Direct), Routine::Snapshot, None, CSP_BLOCKED);

    let output = orchestrator(&page, &auth, 5).execute().await.unwrap();

    assert_eq!(output.strategy, StrategyKind::ScriptTag);
    assert_eq!(output.total_posts, 40);
    // Not transient, so direct evaluation is tried once.
    assert_eq!(page.calls(Channel::Direct), 1);
    assert!(page.calls(Channel::ScriptTag) > 0);
    assert_eq!(page.calls(Channel::Protocol), 0);
}

#[tokio::test]
async fn test_exhausted_ladder_returns_partial_posts() {
    let dir = tempfile::tempdir().unwrap();
    let auth = common::restorer(&dir);
    let page = FakePage::forty_posts();
    page.fail(None, Routine::Scroll, None, "TypeError: window.scrollTo is not a function");

    let failure = orchestrator(&page, &auth, 2).execute().await.unwrap_err();

    assert_eq!(failure.attempts, 2);
    assert!(matches!(failure.last_error, AppError::Evaluation(_)));
    assert_eq!(failure.partial.posts.len(), 15);
    // Every rung ran once per attempt.
    assert_eq!(page.calls(Channel::Direct), 2 * 2);
    assert_eq!(page.calls(Channel::ScriptTag), 2 * 2);
    assert_eq!(page.calls(Channel::Protocol), 2 * 2);
    assert_eq!(page.reloads(), 1);
    assert!(failure.to_string().contains("after 2 attempts"));
}

#[tokio::test]
async fn test_compose_overlay_triggers_go_back() {
    let dir = tempfile::tempdir().unwrap();
    let auth = common::restorer(&dir);
    let page = FakePage::forty_posts();
    page.open("https://x.com/compose/post");

    let output = orchestrator(&page, &auth, 5).execute().await.unwrap();

    assert_eq!(output.total_posts, 40);
    assert_eq!(page.go_backs(), 1);
    assert!(page.navigations().is_empty());
}

#[tokio::test]
async fn test_unrelated_page_is_navigated_to_target() {
    let dir = tempfile::tempdir().unwrap();
    let auth = common::restorer(&dir);
    let page = FakePage::forty_posts();
    page.start_at("https://x.com/notifications");

    let output = orchestrator(&page, &auth, 5).execute().await.unwrap();

    assert_eq!(output.total_posts, 40);
    assert_eq!(page.go_backs(), 1);
    assert_eq!(page.navigations(), vec![common::target_url()]);
}
