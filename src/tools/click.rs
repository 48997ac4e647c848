//! Browser click tool - resolves the selector through the locator, then clicks

use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ToolContext, ToolError, ToolOutput, ToolResult};
use crate::TimeoutConfig;
use crate::locator::{Locator, Strategy};
use crate::utils::validate_interaction_timeout;
use crate::workflow::Requirements;

pub const NAME: &str = "browser_click";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ClickArgs {
    /// CSS selector of the element; fallbacks apply when it no longer matches
    pub selector: String,
    /// Wait for the navigation the click starts (links, submit buttons)
    #[serde(default)]
    pub wait_for_navigation: Option<bool>,
    /// Navigation wait timeout in milliseconds (max 30000)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClickOutput {
    found: bool,
    used_selector: String,
    strategy: Strategy,
    element: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

#[derive(Clone)]
pub struct BrowserClickTool {
    ctx: ToolContext,
    timeouts: TimeoutConfig,
}

impl BrowserClickTool {
    pub fn new(ctx: ToolContext, timeouts: TimeoutConfig) -> Self {
        Self { ctx, timeouts }
    }

    pub async fn call(&self, args: ClickArgs) -> CallToolResult {
        self.ctx.run(NAME, self.execute(args)).await
    }

    async fn execute(&self, args: ClickArgs) -> ToolResult {
        if args.selector.trim().is_empty() {
            return Err(ToolError::invalid("Selector cannot be empty"));
        }
        let wait = args.wait_for_navigation.unwrap_or(false);
        let timeout = validate_interaction_timeout(args.timeout_ms, self.timeouts.interaction_ms)?;
        self.ctx.validate(NAME, &Requirements::PAGE)?;
        let page = self.ctx.current_page(NAME).await?;

        let located = Locator.locate(page.as_ref(), &args.selector).await;
        self.ctx
            .metrics
            .record_locate(located.as_ref().ok().map(|r| r.strategy));
        let located = located?;

        page.click(&located.element).await.map_err(|e| {
            anyhow::anyhow!(
                "Click on {} (via {}) failed: {}. The element may be covered, disabled or \
                 replaced after it was found.",
                located.element.describe(),
                located.strategy,
                e
            )
        })?;

        let mut url = None;
        if wait {
            match tokio::time::timeout(timeout, page.wait_for_load()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(anyhow::anyhow!("Navigation after click failed: {e}").into()),
                Err(_) => {
                    return Err(anyhow::anyhow!(
                        "Clicked, but no navigation completed within {}ms",
                        timeout.as_millis()
                    )
                    .into());
                }
            }
            url = page.url().await;
            self.ctx.workflow.page_loaded(url.clone());
        }

        let mut summary = format!("✓ Clicked {}", located.element.describe());
        if located.strategy != Strategy::Primary {
            summary.push_str(&format!(
                "\n  '{}' did not match; resolved via {} as '{}'",
                args.selector, located.strategy, located.used_selector
            ));
        }
        if let Some(url) = &url {
            summary.push_str(&format!("\n  Now at: {url}"));
        }

        let output = ClickOutput {
            found: true,
            element: located.element.describe(),
            used_selector: located.used_selector,
            strategy: located.strategy,
            url,
        };
        Ok(ToolOutput::new(summary, &output))
    }
}
