//! Workflow gate for tool calls
//!
//! Tracks whether a page is loaded and whether a capture currently owns it, and rejects
//! tool calls whose preconditions do not hold with a reason plus the next step to take.
//! One validator exists per server instance.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Steps kept in the history ring
const HISTORY_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// No browser launched yet, or it was lost
    NoBrowser,
    BrowserReady,
    PageLoaded,
}

/// What a tool needs before it may run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirements {
    /// A page must already be loaded
    pub page: bool,
    /// No capture session may be running
    pub exclusive: bool,
}

impl Requirements {
    pub const NONE: Requirements = Requirements {
        page: false,
        exclusive: false,
    };

    pub const PAGE: Requirements = Requirements {
        page: true,
        exclusive: false,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<String>,
}

impl Validation {
    fn ok() -> Self {
        Self {
            is_valid: true,
            error_message: None,
            suggested_action: None,
        }
    }

    fn reject(message: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error_message: Some(message.into()),
            suggested_action: Some(action.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub tool: String,
    pub at: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    pub current_url: Option<String>,
    pub capture_running: bool,
    /// Successful calls per tool
    pub executed: BTreeMap<String, u64>,
    pub history: Vec<WorkflowStep>,
}

#[derive(Debug)]
struct Inner {
    state: WorkflowState,
    current_url: Option<String>,
    capture_running: bool,
    executed: BTreeMap<String, u64>,
    history: VecDeque<WorkflowStep>,
}

#[derive(Debug)]
pub struct WorkflowValidator {
    inner: Mutex<Inner>,
}

impl Default for WorkflowValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowValidator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: WorkflowState::NoBrowser,
                current_url: None,
                capture_running: false,
                executed: BTreeMap::new(),
                history: VecDeque::with_capacity(HISTORY_LIMIT),
            }),
        }
    }

    pub fn validate(&self, tool: &str, requirements: &Requirements) -> Validation {
        let inner = self.inner.lock();
        if requirements.page && inner.state != WorkflowState::PageLoaded {
            debug!("{} rejected: no page loaded (state {:?})", tool, inner.state);
            return Validation::reject(
                format!("{tool} needs a loaded page, but no page has been loaded yet"),
                "Call browser_navigate with a URL first",
            );
        }
        if requirements.exclusive && inner.capture_running {
            debug!("{} rejected: capture in progress", tool);
            return Validation::reject(
                format!("{tool} cannot start while another capture session is running"),
                "Wait for the running capture to return, then retry",
            );
        }
        Validation::ok()
    }

    /// Append a finished call to the history
    pub fn record(&self, tool: &str, success: bool, detail: Option<String>) {
        let mut inner = self.inner.lock();
        if success {
            *inner.executed.entry(tool.to_string()).or_default() += 1;
        }
        if inner.history.len() == HISTORY_LIMIT {
            inner.history.pop_front();
        }
        inner.history.push_back(WorkflowStep {
            tool: tool.to_string(),
            at: Utc::now(),
            success,
            detail,
        });
    }

    pub fn browser_ready(&self) {
        let mut inner = self.inner.lock();
        if inner.state == WorkflowState::NoBrowser {
            inner.state = WorkflowState::BrowserReady;
        }
    }

    pub fn page_loaded(&self, url: Option<String>) {
        let mut inner = self.inner.lock();
        inner.state = WorkflowState::PageLoaded;
        inner.current_url = url;
    }

    /// The page went away (browser crash or shutdown)
    pub fn page_lost(&self) {
        let mut inner = self.inner.lock();
        inner.state = WorkflowState::NoBrowser;
        inner.current_url = None;
    }

    /// Claim the capture slot. `None` when a capture is already running.
    pub fn begin_capture(self: &Arc<Self>) -> Option<CaptureClaim> {
        let mut inner = self.inner.lock();
        if inner.capture_running {
            return None;
        }
        inner.capture_running = true;
        Some(CaptureClaim {
            validator: self.clone(),
        })
    }

    pub fn state(&self) -> WorkflowState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        let inner = self.inner.lock();
        WorkflowSnapshot {
            state: inner.state,
            current_url: inner.current_url.clone(),
            capture_running: inner.capture_running,
            executed: inner.executed.clone(),
            history: inner.history.iter().cloned().collect(),
        }
    }
}

/// Held for the duration of a capture; releases the slot on drop
#[derive(Debug)]
pub struct CaptureClaim {
    validator: Arc<WorkflowValidator>,
}

impl Drop for CaptureClaim {
    fn drop(&mut self) {
        self.validator.inner.lock().capture_running = false;
    }
}
