//! MCP server surface
//!
//! Each method deserializes its arguments through rmcp and hands them to the matching tool.
//! Tool failures come back as `CallToolResult`s with `is_error` set; `McpError` is left to
//! rmcp for protocol-level problems such as malformed arguments.

use anyhow::Context;
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, ServerCapabilities, ServerInfo};
use rmcp::transport::stdio;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt, tool, tool_handler, tool_router};
use std::sync::Arc;
use tracing::info;

use crate::Config;
use crate::capture::CaptureAggregator;
use crate::manager::{BrowserManager, PageProvider};
use crate::metrics::MetricsStore;
use crate::tools::{
    BrowserCaptureMediaTool, BrowserClickTool, BrowserLocateTool, BrowserMetricsTool,
    BrowserNavigateTool, BrowserNetworkCaptureTool, BrowserTypeTextTool,
    BrowserWorkflowStatusTool, CaptureMediaArgs, ClickArgs, LocateArgs, NavigateArgs,
    NetworkCaptureArgs, ToolContext, TypeTextArgs,
};
use crate::workflow::WorkflowValidator;

const INSTRUCTIONS: &str = "Browser automation with self-healing selectors and media capture. \
Start with browser_navigate. browser_click, browser_type_text and browser_locate resolve \
selectors through fallbacks (text, relaxed structure, attributes, tag) and report which one \
matched. browser_capture_media watches the page for a fixed window and returns every HLS, \
DASH and direct media URL found through network traffic, in-page hooks, video elements and \
player libraries.";

#[derive(Clone)]
pub struct BrowserCaptureServer {
    navigate: BrowserNavigateTool,
    click: BrowserClickTool,
    type_text: BrowserTypeTextTool,
    locate: BrowserLocateTool,
    capture_media: BrowserCaptureMediaTool,
    network_capture: BrowserNetworkCaptureTool,
    workflow_status: BrowserWorkflowStatusTool,
    metrics: BrowserMetricsTool,
    tool_router: ToolRouter<Self>,
}

impl BrowserCaptureServer {
    /// Server over any page source, with its own workflow state and metrics
    pub fn new(config: &Config, pages: Arc<dyn PageProvider>) -> Self {
        let ctx = ToolContext::new(
            pages,
            Arc::new(WorkflowValidator::new()),
            Arc::new(MetricsStore::new()),
        );
        Self {
            navigate: BrowserNavigateTool::new(ctx.clone(), config.timeouts.clone()),
            click: BrowserClickTool::new(ctx.clone(), config.timeouts.clone()),
            type_text: BrowserTypeTextTool::new(ctx.clone()),
            locate: BrowserLocateTool::new(ctx.clone()),
            capture_media: BrowserCaptureMediaTool::new(
                ctx.clone(),
                CaptureAggregator::new(config.capture.clone()),
            ),
            network_capture: BrowserNetworkCaptureTool::new(ctx.clone(), config.capture.clone()),
            workflow_status: BrowserWorkflowStatusTool::new(ctx.clone()),
            metrics: BrowserMetricsTool::new(ctx),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl BrowserCaptureServer {
    #[tool(
        description = "Navigate to an http(s) URL and wait for the load to complete. Opens a fresh page. \
                       Optional wait_for_selector polls for an element after load. Returns the final URL \
                       (may differ from the requested one after redirects)."
    )]
    async fn browser_navigate(
        &self,
        Parameters(args): Parameters<NavigateArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.navigate.call(args).await)
    }

    #[tool(
        description = "Click an element. When the selector no longer matches, text, relaxed-structure, \
                       attribute and tag fallbacks are tried in that order; the response names the strategy \
                       and the selector that matched. Set wait_for_navigation for links and submit buttons."
    )]
    async fn browser_click(
        &self,
        Parameters(args): Parameters<ClickArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.click.call(args).await)
    }

    #[tool(
        description = "Type text into an input resolved with the same fallbacks as browser_click. \
                       Clears the field first unless clear is false."
    )]
    async fn browser_type_text(
        &self,
        Parameters(args): Parameters<TypeTextArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.type_text.call(args).await)
    }

    #[tool(
        description = "Resolve a selector without acting on it. Returns found, the strategy and selector \
                       that matched and a stable suggested selector, or diagnostics of every strategy tried."
    )]
    async fn browser_locate(
        &self,
        Parameters(args): Parameters<LocateArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.locate.call(args).await)
    }

    #[tool(
        description = "Capture media URLs for a fixed window (wait_ms). Watches network requests and \
                       responses, hooks fetch/XHR/crypto/atob/JSON.parse in the page, video element sources \
                       and player libraries, and optionally clicks play buttons. Returns URLs grouped as \
                       hls/dash/direct/other with per-channel counts and detected platforms."
    )]
    async fn browser_capture_media(
        &self,
        Parameters(args): Parameters<CaptureMediaArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.capture_media.call(args).await)
    }

    #[tool(
        description = "Record network requests and responses for a fixed window, optionally filtered by \
                       resource type and URL substring. Returns method, status and content type per URL."
    )]
    async fn browser_network_capture(
        &self,
        Parameters(args): Parameters<NetworkCaptureArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(self.network_capture.call(args).await)
    }

    #[tool(description = "Current workflow state, loaded URL and the most recent tool steps.")]
    async fn browser_workflow_status(&self) -> Result<CallToolResult, McpError> {
        Ok(self.workflow_status.call().await)
    }

    #[tool(description = "Per-tool call counters, locator strategy counts and capture totals.")]
    async fn browser_metrics(&self) -> Result<CallToolResult, McpError> {
        Ok(self.metrics.call().await)
    }
}

#[tool_handler]
impl ServerHandler for BrowserCaptureServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Serve the tools over stdin/stdout until the client disconnects, then close the browser
pub async fn serve_stdio(config: Config) -> anyhow::Result<()> {
    let manager = Arc::new(BrowserManager::new(config.browser.clone()));
    let server = BrowserCaptureServer::new(&config, manager.clone());

    info!("Serving browser capture tools over stdio");
    let service = server
        .serve(stdio())
        .await
        .context("MCP initialization failed")?;
    let outcome = service.waiting().await;

    manager.shutdown().await?;
    let reason = outcome.context("MCP service task failed")?;
    info!("MCP session ended: {:?}", reason);
    Ok(())
}
