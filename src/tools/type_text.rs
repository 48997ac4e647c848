//! Browser type text tool - fills an input resolved through the locator

use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ToolContext, ToolError, ToolOutput, ToolResult};
use crate::locator::{Locator, Strategy};
use crate::workflow::Requirements;

pub const NAME: &str = "browser_type_text";

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct TypeTextArgs {
    /// CSS selector of the input; fallbacks apply when it no longer matches
    pub selector: String,
    pub text: String,
    /// Clear the current value first (default true)
    #[serde(default)]
    pub clear: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TypeTextOutput {
    found: bool,
    used_selector: String,
    strategy: Strategy,
    text_length: usize,
    cleared: bool,
}

#[derive(Clone)]
pub struct BrowserTypeTextTool {
    ctx: ToolContext,
}

impl BrowserTypeTextTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn call(&self, args: TypeTextArgs) -> CallToolResult {
        self.ctx.run(NAME, self.execute(args)).await
    }

    async fn execute(&self, args: TypeTextArgs) -> ToolResult {
        if args.selector.trim().is_empty() {
            return Err(ToolError::invalid("Selector cannot be empty"));
        }
        self.ctx.validate(NAME, &Requirements::PAGE)?;
        let page = self.ctx.current_page(NAME).await?;

        let located = Locator.locate(page.as_ref(), &args.selector).await;
        self.ctx
            .metrics
            .record_locate(located.as_ref().ok().map(|r| r.strategy));
        let located = located?;

        let clear = args.clear.unwrap_or(true);
        page.type_text(&located.element, &args.text, clear)
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Typing into {} failed: {}. Make sure the element is an editable field.",
                    located.element.describe(),
                    e
                )
            })?;

        let text_length = args.text.chars().count();
        let summary = format!(
            "✓ Typed {} characters into {} (via {})",
            text_length,
            located.element.describe(),
            located.strategy
        );
        let output = TypeTextOutput {
            found: true,
            used_selector: located.used_selector,
            strategy: located.strategy,
            text_length,
            cleared: clear,
        };
        Ok(ToolOutput::new(summary, &output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::fake::{FakeElement, FakePage};
    use crate::tools::testing::{json_of, loaded_context};
    use std::sync::Arc;

    #[tokio::test]
    async fn types_into_placeholder_matched_input() {
        let page = Arc::new(FakePage::new());
        let email = page.add_element(FakeElement::new("input").attr("placeholder", "email"));
        let tool = BrowserTypeTextTool::new(loaded_context(page.clone()));

        let result = tool
            .call(TypeTextArgs {
                selector: "#email".to_string(),
                text: "ana@example.com".to_string(),
                clear: None,
            })
            .await;

        let body = json_of(&result);
        assert_eq!(body["found"], true);
        assert_eq!(body["textLength"], 15);
        assert_eq!(page.typed(), vec![(email, "ana@example.com".to_string())]);
    }

    #[tokio::test]
    async fn empty_selector_is_rejected() {
        let page = Arc::new(FakePage::new());
        let tool = BrowserTypeTextTool::new(loaded_context(page));

        let result = tool
            .call(TypeTextArgs {
                selector: "  ".to_string(),
                text: "x".to_string(),
                clear: Some(false),
            })
            .await;
        assert_eq!(json_of(&result)["error"], "invalid_arguments");
    }
}
