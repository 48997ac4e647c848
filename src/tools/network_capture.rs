//! Network recording tool - lists requests and responses seen during a window

use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use url::Url;

use super::{ToolContext, ToolError, ToolOutput, ToolResult};
use crate::CaptureConfig;
use crate::capture::recorder::{self, RecordFilter, RecordingRequest};
use crate::utils::clamp_capture_window;
use crate::utils::constants::MAX_RECORDED_EXCHANGES;
use crate::workflow::Requirements;

pub const NAME: &str = "browser_network_capture";

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct NetworkCaptureArgs {
    /// Load this URL after the listeners are attached; defaults to the current page
    #[serde(default)]
    pub url: Option<String>,
    /// Recording window in milliseconds (clamped to the configured maximum)
    #[serde(default)]
    pub wait_ms: Option<u64>,
    /// Keep only these resource types, e.g. ["xhr", "fetch", "media"]
    #[serde(default)]
    pub resource_types: Option<Vec<String>>,
    /// Keep only URLs containing this substring
    #[serde(default)]
    pub url_contains: Option<String>,
}

#[derive(Clone)]
pub struct BrowserNetworkCaptureTool {
    ctx: ToolContext,
    config: CaptureConfig,
}

impl BrowserNetworkCaptureTool {
    pub fn new(ctx: ToolContext, config: CaptureConfig) -> Self {
        Self { ctx, config }
    }

    pub async fn call(&self, args: NetworkCaptureArgs) -> CallToolResult {
        self.ctx.run(NAME, self.execute(args)).await
    }

    async fn execute(&self, args: NetworkCaptureArgs) -> ToolResult {
        if let Some(url) = &args.url
            && !Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
        {
            return Err(ToolError::invalid(
                "url must be absolute and start with http:// or https://",
            ));
        }
        self.ctx.validate(
            NAME,
            &Requirements {
                page: args.url.is_none(),
                exclusive: true,
            },
        )?;
        let _claim = self
            .ctx
            .workflow
            .begin_capture()
            .ok_or_else(|| ToolError::Precondition {
                reason: "Another capture session is running on this page".to_string(),
                suggested_action: "Wait for it to return, then retry".to_string(),
            })?;

        let page = if args.url.is_some() {
            self.ctx.page_or_open().await?
        } else {
            self.ctx.current_page(NAME).await?
        };

        let request = RecordingRequest {
            url: args.url.clone(),
            window: clamp_capture_window(
                args.wait_ms,
                self.config.default_wait_ms,
                self.config.max_wait_ms,
            ),
            filter: RecordFilter {
                resource_types: args.resource_types.unwrap_or_default(),
                url_contains: args.url_contains.filter(|s| !s.is_empty()),
            },
            max_entries: MAX_RECORDED_EXCHANGES,
        };
        let recording = recorder::record(page, request).await;

        if args.url.is_some() && recording.navigation_error.is_none() {
            self.ctx.workflow.page_loaded(recording.page_url.clone());
        }

        let mut summary = format!(
            "✓ Recorded {} exchange(s) in {}ms{}",
            recording.exchanges.len(),
            recording.elapsed_ms,
            if recording.truncated { " (truncated)" } else { "" }
        );
        for exchange in recording.exchanges.iter().take(10) {
            summary.push_str(&format!(
                "\n  {} {} {}",
                exchange.method.as_deref().unwrap_or("-"),
                exchange
                    .status
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "---".to_string()),
                exchange.url
            ));
        }
        if recording.exchanges.len() > 10 {
            summary.push_str(&format!("\n  … {} more", recording.exchanges.len() - 10));
        }

        Ok(ToolOutput::new(summary, &recording))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageHandle;
    use crate::page::fake::FakePage;
    use crate::tools::testing::{json_of, loaded_context};
    use std::sync::Arc;

    #[tokio::test]
    async fn filters_are_passed_through() {
        let page = Arc::new(FakePage::new());
        page.script_request("https://site.example/api/items", Some("XHR"));
        page.script_request("https://site.example/logo.png", Some("Image"));
        let config = CaptureConfig {
            default_wait_ms: 0,
            ..CaptureConfig::default()
        };
        let tool = BrowserNetworkCaptureTool::new(loaded_context(page.clone()), config);

        let result = tool
            .call(NetworkCaptureArgs {
                resource_types: Some(vec!["xhr".to_string()]),
                ..NetworkCaptureArgs::default()
            })
            .await;
        let body = json_of(&result);
        let exchanges = body["exchanges"].as_array().cloned().unwrap_or_default();
        assert_eq!(exchanges.len(), 1);
        assert_eq!(exchanges[0]["url"], "https://site.example/api/items");
        assert_eq!(page.listener_count(), 0);
        assert!(!tool.ctx.workflow.snapshot().capture_running);
    }

    #[tokio::test]
    async fn rejected_while_a_capture_is_running() {
        let page = Arc::new(FakePage::new());
        let tool = BrowserNetworkCaptureTool::new(loaded_context(page.clone()), CaptureConfig::default());

        let _running = tool.ctx.workflow.begin_capture();
        let result = tool
            .call(NetworkCaptureArgs {
                url: Some("https://site.example/".to_string()),
                ..NetworkCaptureArgs::default()
            })
            .await;
        assert_eq!(json_of(&result)["error"], "precondition");
        assert!(page.navigations().is_empty());
        assert_eq!(page.listener_count(), 0);
    }
}
