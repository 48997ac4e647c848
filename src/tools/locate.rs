//! Locate tool - runs the locator without acting on the element

use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ToolContext, ToolError, ToolOutput, ToolResult};
use crate::locator::selector::selector_for;
use crate::locator::{Locator, LocatorError, Strategy, StrategyAttempt};
use crate::page::ElementRef;
use crate::workflow::Requirements;

pub const NAME: &str = "browser_locate";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LocateArgs {
    /// CSS selector to resolve
    pub selector: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocateOutput {
    found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    used_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    strategy: Option<Strategy>,
    /// Stable selector built from the element's own attributes
    #[serde(skip_serializing_if = "Option::is_none")]
    suggested_selector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    element: Option<ElementRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    primary_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<Vec<StrategyAttempt>>,
}

/// A miss is a normal answer here, reported with `found: false`
#[derive(Clone)]
pub struct BrowserLocateTool {
    ctx: ToolContext,
}

impl BrowserLocateTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn call(&self, args: LocateArgs) -> CallToolResult {
        self.ctx.run(NAME, self.execute(args)).await
    }

    async fn execute(&self, args: LocateArgs) -> ToolResult {
        if args.selector.trim().is_empty() {
            return Err(ToolError::invalid("Selector cannot be empty"));
        }
        self.ctx.validate(NAME, &Requirements::PAGE)?;
        let page = self.ctx.current_page(NAME).await?;

        match Locator.locate(page.as_ref(), &args.selector).await {
            Ok(located) => {
                self.ctx.metrics.record_locate(Some(located.strategy));
                let summary = format!(
                    "✓ {} resolved via {} as '{}'",
                    located.element.describe(),
                    located.strategy,
                    located.used_selector
                );
                let output = LocateOutput {
                    found: true,
                    suggested_selector: Some(selector_for(&located.element)),
                    used_selector: Some(located.used_selector),
                    strategy: Some(located.strategy),
                    element: Some(located.element),
                    primary_error: None,
                    diagnostics: None,
                };
                Ok(ToolOutput::new(summary, &output))
            }
            Err(e) => {
                self.ctx.metrics.record_locate(None);
                let summary = format!("✗ {}\n\n{}", e, e.diagnostics());
                let LocatorError::NotFound {
                    primary_error,
                    attempts,
                    ..
                } = e;
                let output = LocateOutput {
                    found: false,
                    used_selector: None,
                    strategy: None,
                    suggested_selector: None,
                    element: None,
                    primary_error,
                    diagnostics: Some(attempts),
                };
                Ok(ToolOutput::new(summary, &output))
            }
        }
    }
}
