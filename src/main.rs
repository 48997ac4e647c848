// Browser capture MCP server over stdio
//
// stdout carries the MCP protocol, so all logging goes to stderr.

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(false),
        )
        .init();

    let config = match kodegen_tools_browser_capture::load_yaml_config() {
        Ok(config) => config,
        Err(e) => {
            warn!("Ignoring unusable config ({:#}); using defaults", e);
            kodegen_tools_browser_capture::Config::default()
        }
    };
    info!(
        "Starting browser capture server (headless: {}, default window {}ms)",
        config.browser.headless, config.capture.default_wait_ms
    );

    kodegen_tools_browser_capture::serve_stdio(config).await
}
