//! Metrics tool - per-tool counters and capture totals for this server

use rmcp::model::CallToolResult;

use super::{ToolContext, ToolOutput, ToolResult};

pub const NAME: &str = "browser_metrics";

#[derive(Clone)]
pub struct BrowserMetricsTool {
    ctx: ToolContext,
}

impl BrowserMetricsTool {
    pub fn new(ctx: ToolContext) -> Self {
        Self { ctx }
    }

    pub async fn call(&self) -> CallToolResult {
        self.ctx.run(NAME, self.execute()).await
    }

    async fn execute(&self) -> ToolResult {
        let snapshot = self.ctx.metrics.snapshot();
        let calls: u64 = snapshot.tools.values().map(|t| t.calls).sum();
        let failures: u64 = snapshot.tools.values().map(|t| t.failures).sum();
        let mut summary = format!(
            "Uptime {}s · {} call(s), {} failed\nCaptures: {} session(s), {} resource(s)",
            snapshot.uptime_secs,
            calls,
            failures,
            snapshot.captures.sessions,
            snapshot.captures.resources
        );
        for (tool, counters) in &snapshot.tools {
            summary.push_str(&format!(
                "\n  {tool}: {} call(s), avg {}ms",
                counters.calls,
                counters.average_ms()
            ));
        }
        Ok(ToolOutput::new(summary, &snapshot))
    }
}
