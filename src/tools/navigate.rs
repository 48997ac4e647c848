//! Browser navigation tool - loads URLs and waits for page ready

use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{ToolContext, ToolError, ToolOutput, ToolResult};
use crate::TimeoutConfig;
use crate::utils::{validate_navigation_timeout, wait_for_element};
use crate::workflow::Requirements;

pub const NAME: &str = "browser_navigate";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct NavigateArgs {
    /// Absolute http(s) URL to load
    pub url: String,
    /// Navigation timeout in milliseconds (default from config, max 300000)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// CSS selector to wait for after the load completes
    #[serde(default)]
    pub wait_for_selector: Option<String>,
}

#[derive(Debug, Serialize)]
struct NavigateOutput {
    success: bool,
    url: String,
    requested_url: String,
    redirected: bool,
    timeout_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    waited_for: Option<String>,
}

#[derive(Clone)]
pub struct BrowserNavigateTool {
    ctx: ToolContext,
    timeouts: TimeoutConfig,
}

impl BrowserNavigateTool {
    pub fn new(ctx: ToolContext, timeouts: TimeoutConfig) -> Self {
        Self { ctx, timeouts }
    }

    pub async fn call(&self, args: NavigateArgs) -> CallToolResult {
        self.ctx.run(NAME, self.execute(args)).await
    }

    async fn execute(&self, args: NavigateArgs) -> ToolResult {
        match Url::parse(&args.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(ToolError::invalid(
                    "URL must be absolute and start with http:// or https://",
                ));
            }
        }
        // A new page would pull the document out from under a running capture
        self.ctx.validate(
            NAME,
            &Requirements {
                page: false,
                exclusive: true,
            },
        )?;
        let timeout = validate_navigation_timeout(args.timeout_ms, self.timeouts.navigation_ms)?;

        let page = self.ctx.pages.open_page().await.map_err(|e| {
            self.ctx.workflow.page_lost();
            ToolError::Failed(e.context("Browser unavailable"))
        })?;
        self.ctx.workflow.browser_ready();

        match tokio::time::timeout(timeout, page.goto(&args.url)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(anyhow::anyhow!(
                    "Navigation failed for {}: {}. Check the URL is reachable and returns an \
                     HTTP response.",
                    args.url,
                    e
                )
                .into());
            }
            Err(_) => {
                return Err(anyhow::anyhow!(
                    "Navigation timeout after {}ms for {}. Increase timeout_ms or check whether \
                     the site blocks headless browsers.",
                    timeout.as_millis(),
                    args.url
                )
                .into());
            }
        }

        let final_url = page.url().await.unwrap_or_else(|| args.url.clone());
        self.ctx.workflow.page_loaded(Some(final_url.clone()));

        if let Some(selector) = &args.wait_for_selector {
            wait_for_element(page.as_ref(), selector, timeout)
                .await
                .map_err(|e| anyhow::anyhow!("Page loaded but {e}"))?;
        }

        let redirected = final_url != args.url;
        let mut summary = format!("✓ Navigation complete\n\nURL: {final_url}");
        if redirected {
            summary.push_str(&format!("\n  Redirected: {} → {}", args.url, final_url));
        }
        if let Some(selector) = &args.wait_for_selector {
            summary.push_str(&format!("\n  Found: {selector}"));
        }

        let output = NavigateOutput {
            success: true,
            url: final_url,
            requested_url: args.url,
            redirected,
            timeout_ms: timeout.as_millis() as u64,
            waited_for: args.wait_for_selector,
        };
        Ok(ToolOutput::new(summary, &output))
    }
}
