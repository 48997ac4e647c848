//! Workflow gating, metrics bookkeeping and config parsing.

use std::sync::Arc;
use std::time::Duration;

use kodegen_tools_browser_capture::locator::Strategy;
use kodegen_tools_browser_capture::metrics::MetricsStore;
use kodegen_tools_browser_capture::workflow::{Requirements, WorkflowState, WorkflowValidator};
use kodegen_tools_browser_capture::{Config, parse_yaml_config};

// ── Workflow ────────────────────────────────────────────────────────────────

#[test]
fn page_tools_wait_for_navigation() {
    let workflow = WorkflowValidator::new();
    assert_eq!(workflow.state(), WorkflowState::NoBrowser);

    let rejected = workflow.validate("browser_click", &Requirements::PAGE);
    assert!(!rejected.is_valid);
    assert_eq!(
        rejected.suggested_action.as_deref(),
        Some("Call browser_navigate with a URL first")
    );
    assert!(workflow.validate("browser_navigate", &Requirements::NONE).is_valid);

    workflow.browser_ready();
    assert_eq!(workflow.state(), WorkflowState::BrowserReady);
    workflow.page_loaded(Some("https://site.example/".to_string()));
    assert!(workflow.validate("browser_click", &Requirements::PAGE).is_valid);

    workflow.page_lost();
    assert!(!workflow.validate("browser_click", &Requirements::PAGE).is_valid);
    assert_eq!(workflow.snapshot().current_url, None);
}

#[test]
fn only_one_capture_at_a_time() {
    let workflow = Arc::new(WorkflowValidator::new());
    let exclusive = Requirements {
        page: false,
        exclusive: true,
    };

    let claim = workflow.begin_capture();
    assert!(claim.is_some());
    assert!(workflow.begin_capture().is_none());
    assert!(!workflow.validate("browser_capture_media", &exclusive).is_valid);
    assert!(workflow.snapshot().capture_running);

    drop(claim);
    assert!(workflow.validate("browser_capture_media", &exclusive).is_valid);
    assert!(workflow.begin_capture().is_some());
}

#[test]
fn history_is_bounded_but_counts_are_not() {
    let workflow = WorkflowValidator::new();
    for _ in 0..60 {
        workflow.record("browser_locate", true, None);
    }
    workflow.record("browser_click", false, Some("not found".to_string()));

    let snapshot = workflow.snapshot();
    assert_eq!(snapshot.history.len(), 50);
    assert_eq!(snapshot.executed.get("browser_locate"), Some(&60));
    assert_eq!(snapshot.executed.get("browser_click"), None);
    assert_eq!(snapshot.history.last().map(|s| s.success), Some(false));
}

// ── Metrics ─────────────────────────────────────────────────────────────────

#[test]
fn metrics_track_calls_and_locator_strategies() {
    let metrics = MetricsStore::new();
    metrics.record_call("browser_click", Duration::from_millis(30), None);
    metrics.record_call("browser_click", Duration::from_millis(10), Some("Element not found"));
    metrics.record_locate(Some(Strategy::TextMatch));
    metrics.record_locate(Some(Strategy::TextMatch));
    metrics.record_locate(None);

    let snapshot = metrics.snapshot();
    let click = &snapshot.tools["browser_click"];
    assert_eq!(click.calls, 2);
    assert_eq!(click.failures, 1);
    assert_eq!(click.average_ms(), 20);
    assert_eq!(click.last_error.as_deref(), Some("Element not found"));
    assert_eq!(snapshot.locator_strategies.get("text-match"), Some(&2));
    assert_eq!(snapshot.locator_misses, 1);
    assert_eq!(snapshot.captures.sessions, 0);
}

// ── Config ──────────────────────────────────────────────────────────────────

#[test]
fn partial_yaml_keeps_defaults() {
    let config = parse_yaml_config(
        "capture:\n  default_wait_ms: 3000\n  inspect_response_bodies: false\nbrowser:\n  headless: false\n",
    )
    .expect("valid config");

    let defaults = Config::default();
    assert_eq!(config.capture.default_wait_ms, 3000);
    assert!(!config.capture.inspect_response_bodies);
    assert_eq!(config.capture.max_wait_ms, defaults.capture.max_wait_ms);
    assert!(!config.browser.headless);
    assert_eq!(config.timeouts.navigation_ms, defaults.timeouts.navigation_ms);
}

#[test]
fn malformed_yaml_is_an_error() {
    assert!(parse_yaml_config("capture: [not, a, map]").is_err());
    assert!(parse_yaml_config("").is_ok());
}
