//! Tool implementations and the shared result envelope
//!
//! Every tool returns a [`ToolOutput`] (human summary plus pretty JSON) or a [`ToolError`].
//! Both become a `CallToolResult`; failures are reported in-band with `is_error` set so the
//! calling agent always gets a readable explanation.

mod capture_media;
mod click;
mod locate;
mod metrics;
mod navigate;
mod network_capture;
mod type_text;
mod workflow_status;

pub use capture_media::{BrowserCaptureMediaTool, CaptureMediaArgs};
pub use click::{BrowserClickTool, ClickArgs};
pub use locate::{BrowserLocateTool, LocateArgs};
pub use metrics::BrowserMetricsTool;
pub use navigate::{BrowserNavigateTool, NavigateArgs};
pub use network_capture::{BrowserNetworkCaptureTool, NetworkCaptureArgs};
pub use type_text::{BrowserTypeTextTool, TypeTextArgs};
pub use workflow_status::BrowserWorkflowStatusTool;

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use crate::locator::LocatorError;
use crate::manager::PageProvider;
use crate::metrics::MetricsStore;
use crate::page::PageHandle;
use crate::workflow::{Requirements, Validation, WorkflowValidator};

#[derive(Debug, Error)]
pub enum ToolError {
    /// The call cannot run in the current state; never retried internally
    #[error("{reason}")]
    Precondition {
        reason: String,
        suggested_action: String,
    },

    #[error("{0}")]
    NotFound(#[from] LocatorError),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl ToolError {
    pub fn invalid(message: impl Into<String>) -> Self {
        ToolError::InvalidArguments(message.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            ToolError::Precondition { .. } => "precondition",
            ToolError::NotFound(_) => "not_found",
            ToolError::InvalidArguments(_) => "invalid_arguments",
            ToolError::Failed(_) => "failed",
        }
    }

    fn suggested_action(&self) -> Option<String> {
        match self {
            ToolError::Precondition {
                suggested_action, ..
            } => Some(suggested_action.clone()),
            ToolError::NotFound(_) => Some(
                "Check the diagnostics for what each strategy tried and call again with a \
                 different selector"
                    .to_string(),
            ),
            ToolError::InvalidArguments(_) | ToolError::Failed(_) => None,
        }
    }

    /// Error envelope: one readable text block plus a JSON block
    pub fn into_call_result(self) -> CallToolResult {
        let mut body = json!({
            "success": false,
            "error": self.kind(),
            "message": self.to_string(),
        });
        if let Some(action) = self.suggested_action() {
            body["suggestedAction"] = Value::String(action);
        }
        if let ToolError::NotFound(e) = &self {
            body["diagnostics"] = json!(e.attempts());
            if let LocatorError::NotFound {
                primary_error: Some(primary),
                ..
            } = e
            {
                body["primaryError"] = Value::String(primary.clone());
            }
        }

        let mut summary = format!("✗ {}", self);
        if let ToolError::NotFound(e) = &self {
            summary.push_str("\n\n");
            summary.push_str(&e.diagnostics());
        }
        if let Some(action) = self.suggested_action() {
            summary.push_str(&format!("\n\nNext step: {action}"));
        }

        CallToolResult::error(vec![Content::text(summary), Content::text(pretty(&body))])
    }
}

impl From<Validation> for ToolError {
    fn from(validation: Validation) -> Self {
        ToolError::Precondition {
            reason: validation
                .error_message
                .unwrap_or_else(|| "Workflow precondition not met".to_string()),
            suggested_action: validation
                .suggested_action
                .unwrap_or_else(|| "Call browser_workflow_status to inspect the state".to_string()),
        }
    }
}

/// Successful tool output
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub summary: String,
    pub data: Value,
}

impl ToolOutput {
    pub fn new(summary: impl Into<String>, data: &impl Serialize) -> Self {
        Self {
            summary: summary.into(),
            data: serde_json::to_value(data).unwrap_or(Value::Null),
        }
    }

    pub fn into_call_result(self) -> CallToolResult {
        CallToolResult::success(vec![
            Content::text(self.summary),
            Content::text(pretty(&self.data)),
        ])
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

pub type ToolResult = Result<ToolOutput, ToolError>;

/// Per-server state every tool reads from
#[derive(Clone)]
pub struct ToolContext {
    pub pages: Arc<dyn PageProvider>,
    pub workflow: Arc<WorkflowValidator>,
    pub metrics: Arc<MetricsStore>,
}

impl ToolContext {
    pub fn new(
        pages: Arc<dyn PageProvider>,
        workflow: Arc<WorkflowValidator>,
        metrics: Arc<MetricsStore>,
    ) -> Self {
        Self {
            pages,
            workflow,
            metrics,
        }
    }

    pub fn validate(&self, tool: &str, requirements: &Requirements) -> Result<(), ToolError> {
        let validation = self.workflow.validate(tool, requirements);
        if validation.is_valid {
            Ok(())
        } else {
            Err(validation.into())
        }
    }

    /// The page tools act on; absence is a precondition failure
    pub async fn current_page(&self, tool: &str) -> Result<Arc<dyn PageHandle>, ToolError> {
        match self.pages.current_page().await {
            Some(page) => Ok(page),
            None => {
                self.workflow.page_lost();
                Err(ToolError::Precondition {
                    reason: format!("{tool} needs a page, but no browser page is available"),
                    suggested_action: "Call browser_navigate with a URL first".to_string(),
                })
            }
        }
    }

    /// Reuse the current page or open a blank one
    pub async fn page_or_open(&self) -> Result<Arc<dyn PageHandle>, ToolError> {
        if let Some(page) = self.pages.current_page().await {
            return Ok(page);
        }
        let page = self.pages.open_page().await.map_err(ToolError::Failed)?;
        self.workflow.browser_ready();
        Ok(page)
    }

    /// Run one tool body, recording its outcome in the metrics and workflow history
    pub async fn run<F>(&self, tool: &'static str, body: F) -> CallToolResult
    where
        F: Future<Output = ToolResult>,
    {
        let started = Instant::now();
        let outcome = body.await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(output) => {
                debug!("{} succeeded in {:?}", tool, elapsed);
                self.metrics.record_call(tool, elapsed, None);
                self.workflow.record(tool, true, None);
                output.into_call_result()
            }
            Err(e) => {
                let message = e.to_string();
                match &e {
                    ToolError::Failed(inner) => warn!("{} failed: {:#}", tool, inner),
                    _ => debug!("{} rejected: {}", tool, message),
                }
                self.metrics.record_call(tool, elapsed, Some(&message));
                self.workflow.record(tool, false, Some(message));
                e.into_call_result()
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::page::fake::FakePage;

    #[tokio::test]
    async fn failures_become_error_envelopes_and_are_counted() {
        let ctx = context(FakeProvider::empty(Arc::new(FakePage::new())));
        let result = ctx
            .run("browser_click", async {
                Err(ToolError::Precondition {
                    reason: "no page".to_string(),
                    suggested_action: "navigate".to_string(),
                })
            })
            .await;

        assert_eq!(result.is_error, Some(true));
        let body = json_of(&result);
        assert_eq!(body["error"], "precondition");
        assert_eq!(body["suggestedAction"], "navigate");

        let metrics = ctx.metrics.snapshot();
        assert_eq!(metrics.tools["browser_click"].failures, 1);
        assert!(!ctx.workflow.snapshot().history[0].success);
    }

    #[tokio::test]
    async fn missing_page_is_a_precondition_failure() {
        let ctx = context(FakeProvider::empty(Arc::new(FakePage::new())));
        let err = match ctx.current_page("browser_locate").await {
            Err(e) => e,
            Ok(_) => panic!("expected no page"),
        };
        assert!(matches!(err, ToolError::Precondition { .. }));
    }
}
