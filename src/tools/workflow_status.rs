//! Workflow status tool - state, current URL and recent steps

use rmcp::model::CallToolResult;

use super::{ToolContext, ToolOutput, ToolResult};

pub const NAME: &str = "browser_workflow_status";

#[derive(Clone)]
pub struct BrowserWorkflowStatusTool {
    ctx: ToolContext,
}

impl BrowserWorkflowStatusTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn call(&self) -> CallToolResult {
        self.ctx.run(NAME, self.execute()).await
    }

    async fn execute(&self) -> ToolResult {
        let snapshot = self.ctx.workflow.snapshot();
        let mut summary = format!("Workflow state: {:?}", snapshot.state);
        if let Some(url) = &snapshot.current_url {
            summary.push_str(&format!("\nCurrent page: {url}"));
        }
        if snapshot.capture_running {
            summary.push_str("\nA capture session is running");
        }
        if let Some(last) = snapshot.history.last() {
            summary.push_str(&format!(
                "\nLast step: {} ({})",
                last.tool,
                if last.success { "ok" } else { "failed" }
            ));
        }
        Ok(ToolOutput::new(summary, &snapshot))
    }
}
