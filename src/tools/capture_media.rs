//! Media capture tool - runs one capture session over the current (or a freshly loaded) page

use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use url::Url;

use super::{ToolContext, ToolError, ToolOutput, ToolResult};
use crate::capture::{CaptureAggregator, CaptureReport, CaptureRequest};
use crate::utils::clamp_capture_window;
use crate::workflow::Requirements;

pub const NAME: &str = "browser_capture_media";

/// Interaction iterations are capped regardless of what the caller asks for
const MAX_INTERACTIONS_CAP: usize = 10;

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct CaptureMediaArgs {
    /// Load this URL after the capture channels are attached; defaults to the current page
    #[serde(default)]
    pub url: Option<String>,
    /// Capture window in milliseconds (clamped to the configured maximum)
    #[serde(default)]
    pub wait_ms: Option<u64>,
    /// Click play/server buttons to trigger lazy players (default true)
    #[serde(default)]
    pub interact: Option<bool>,
    #[serde(default)]
    pub max_interactions: Option<usize>,
    /// Scan JSON/JS/playlist response bodies for embedded media URLs
    #[serde(default)]
    pub inspect_response_bodies: Option<bool>,
}

#[derive(Clone)]
pub struct BrowserCaptureMediaTool {
    ctx: ToolContext,
    aggregator: CaptureAggregator,
}

impl BrowserCaptureMediaTool {
    pub fn new(ctx: ToolContext, aggregator: CaptureAggregator) -> Self {
        Self { ctx, aggregator }
    }

    pub async fn call(&self, args: CaptureMediaArgs) -> CallToolResult {
        self.ctx.run(NAME, self.execute(args)).await
    }

    fn request(&self, args: &CaptureMediaArgs) -> CaptureRequest {
        let config = self.aggregator.config();
        let mut request = CaptureRequest::from_config(config);
        request.url = args.url.clone();
        request.window = clamp_capture_window(args.wait_ms, config.default_wait_ms, config.max_wait_ms);
        if let Some(interact) = args.interact {
            request.interact = interact;
        }
        if let Some(max) = args.max_interactions {
            request.max_interactions = max.min(MAX_INTERACTIONS_CAP);
        }
        if let Some(inspect) = args.inspect_response_bodies {
            request.inspect_response_bodies = inspect;
        }
        request
    }

    async fn execute(&self, args: CaptureMediaArgs) -> ToolResult {
        if let Some(url) = &args.url
            && !Url::parse(url).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
        {
            return Err(ToolError::invalid(
                "url must be absolute and start with http:// or https://",
            ));
        }

        let requirements = Requirements {
            page: args.url.is_none(),
            exclusive: true,
        };
        self.ctx.validate(NAME, &requirements)?;
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

        let request = self.request(&args);
        let report = self.aggregator.run(page, request).await;

        if args.url.is_some() && report.navigation_error.is_none() {
            self.ctx.workflow.page_loaded(report.page_url.clone());
        }
        self.ctx.metrics.record_capture(&report);

        Ok(ToolOutput::new(summarize(&report), &report))
    }
}

fn summarize(report: &CaptureReport) -> String {
    let kinds = &report.resources_by_kind;
    let channels = &report.channel_counts;
    let mut summary = format!(
        "✓ Capture finished in {}ms: {} resource(s)\n\n\
         HLS: {} · DASH: {} · Direct: {} · Other: {}\n\
         Channels: network {} · hooks {} · DOM {} · players {}",
        report.elapsed_ms,
        report.total(),
        kinds.hls.len(),
        kinds.dash.len(),
        kinds.direct.len(),
        kinds.other.len(),
        channels.network,
        channels.hooks,
        channels.dom_mutation,
        channels.player_library,
    );
    if !report.platforms_detected.is_empty() {
        summary.push_str(&format!("\nPlatforms: {}", report.platforms_detected.join(", ")));
    }
    if !report.interactions.clicked.is_empty() {
        summary.push_str(&format!("\nClicked: {}", report.interactions.clicked.join(", ")));
    }
    for url in kinds.hls.iter().chain(&kinds.dash).take(5) {
        summary.push_str(&format!("\n  {url}"));
    }
    if let Some(error) = &report.navigation_error {
        summary.push_str(&format!("\n\n⚠ Navigation failed ({error}); captured what the page produced anyway"));
    }
    summary
}
