//! Browser automation MCP server with resilient element location and media capture
//!
//! Drives one Chromium page through chromiumoxide and exposes it as MCP tools. The two
//! pieces with real behaviour are the [`locator`], which resolves a selector through an
//! ordered chain of fallbacks, and the [`capture`] aggregator, which watches a page through
//! several channels for a fixed window and merges every media URL it finds.

mod browser;
pub mod capture;
pub mod locator;
mod manager;
pub mod metrics;
pub mod page;
mod server;
mod tools;
mod utils;
pub mod workflow;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "KODEGEN_BROWSER_CAPTURE_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Browser security and launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    #[serde(default = "default_headless")]
    pub headless: bool,

    /// Disable web security features (Same-Origin Policy, etc.)
    /// WARNING: Only enable for trusted content
    #[serde(default = "default_disable_security")]
    pub disable_security: bool,

    #[serde(default)]
    pub window: WindowConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    #[serde(default = "default_window_width")]
    pub width: u32,

    #[serde(default = "default_window_height")]
    pub height: u32,
}

/// Media capture session tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Window used when a capture call gives no `wait_ms`
    #[serde(default = "default_wait_ms")]
    pub default_wait_ms: u64,

    /// Requested windows are clamped to this
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// How often the injected hook queue is drained
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Pause after each interaction click
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_max_interactions")]
    pub max_interactions: usize,

    #[serde(default = "default_inspect_response_bodies")]
    pub inspect_response_bodies: bool,

    /// Response bodies are truncated to this many bytes before scanning
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Bound on the closing drain after the window elapsed
    #[serde(default = "default_final_drain_timeout_ms")]
    pub final_drain_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_navigation_ms")]
    pub navigation_ms: u64,

    /// Used for selector waits and post-click navigation
    #[serde(default = "default_interaction_ms")]
    pub interaction_ms: u64,
}

fn default_headless() -> bool {
    true
}

fn default_disable_security() -> bool {
    false
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    720
}

fn default_wait_ms() -> u64 {
    8_000
}

fn default_max_wait_ms() -> u64 {
    60_000
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_settle_ms() -> u64 {
    400
}

fn default_max_interactions() -> usize {
    3
}

fn default_inspect_response_bodies() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_final_drain_timeout_ms() -> u64 {
    1_000
}

fn default_navigation_ms() -> u64 {
    30_000
}

fn default_interaction_ms() -> u64 {
    5_000
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            disable_security: default_disable_security(),
            window: WindowConfig::default(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: default_window_width(),
            height: default_window_height(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            default_wait_ms: default_wait_ms(),
            max_wait_ms: default_max_wait_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            settle_ms: default_settle_ms(),
            max_interactions: default_max_interactions(),
            inspect_response_bodies: default_inspect_response_bodies(),
            max_body_bytes: default_max_body_bytes(),
            final_drain_timeout_ms: default_final_drain_timeout_ms(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            navigation_ms: default_navigation_ms(),
            interaction_ms: default_interaction_ms(),
        }
    }
}

/// Parse a YAML config document; missing keys take their defaults
pub fn parse_yaml_config(contents: &str) -> anyhow::Result<Config> {
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(contents).context("Invalid browser capture config")
}

/// Where the config file is looked up: `$KODEGEN_BROWSER_CAPTURE_CONFIG`, then
/// `<config dir>/kodegen/browser-capture.yaml`
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV)
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("kodegen").join("browser-capture.yaml"))
}

/// Load the config file, falling back to defaults when none exists
pub fn load_yaml_config() -> anyhow::Result<Config> {
    let Some(config_path) = config_path() else {
        debug!("No config directory on this platform, using defaults");
        return Ok(Config::default());
    };

    if config_path.exists() {
        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config = parse_yaml_config(&contents)?;
        info!("Loaded config from {}", config_path.display());
        Ok(config)
    } else {
        debug!("{} not found, using defaults", config_path.display());
        Ok(Config::default())
    }
}

pub use browser::{BrowserError, BrowserResult};
pub use capture::{CaptureAggregator, CaptureReport, CaptureRequest};
pub use locator::{Locator, LocatorError, LocatorResult, Strategy};
pub use manager::{BrowserManager, PageProvider};
pub use metrics::MetricsStore;
pub use server::{BrowserCaptureServer, serve_stdio};
pub use workflow::{Requirements, Validation, WorkflowValidator};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = parse_yaml_config(
            "capture:\n  default_wait_ms: 3000\n  inspect_response_bodies: false\nbrowser:\n  headless: false\n",
        )
        .unwrap();

        assert_eq!(config.capture.default_wait_ms, 3_000);
        assert!(!config.capture.inspect_response_bodies);
        assert_eq!(config.capture.max_interactions, 3);
        assert!(!config.browser.headless);
        assert_eq!(config.browser.window.width, 1280);
        assert_eq!(config.timeouts.navigation_ms, 30_000);
    }

    #[test]
    fn empty_document_is_default_config() {
        let config = parse_yaml_config("  \n").unwrap();
        assert_eq!(config.capture.poll_interval_ms, 250);
        assert!(config.capture.settle_ms < 1_000);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        assert!(parse_yaml_config("capture: [unclosed").is_err());
    }
}
