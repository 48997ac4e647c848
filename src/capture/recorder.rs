//! Time-boxed network recording
//!
//! Records every request/response pair seen during a window, optionally filtered by
//! resource type and URL substring. Shares the capture session lifecycle, so the
//! listeners are detached on every exit path.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::navigate_within;
use super::session::CaptureSession;
use crate::page::{BodyPolicy, PageHandle, RequestCallback, RequestEvent, ResponseCallback, ResponseEvent};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordedExchange {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Which exchanges to keep
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Case-insensitive CDP resource type names (`xhr`, `media`, ...); empty keeps all
    pub resource_types: Vec<String>,
    pub url_contains: Option<String>,
}

impl RecordFilter {
    pub fn matches(&self, url: &str, resource_type: Option<&str>) -> bool {
        if let Some(needle) = &self.url_contains
            && !url.contains(needle.as_str())
        {
            return false;
        }
        if self.resource_types.is_empty() {
            return true;
        }
        resource_type.is_some_and(|rt| {
            self.resource_types
                .iter()
                .any(|wanted| wanted.eq_ignore_ascii_case(rt))
        })
    }
}

#[derive(Debug, Clone)]
pub struct RecordingRequest {
    pub url: Option<String>,
    pub window: Duration,
    pub filter: RecordFilter,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRecording {
    pub session_id: Uuid,
    pub page_url: Option<String>,
    pub window_ms: u64,
    pub elapsed_ms: u64,
    pub exchanges: Vec<RecordedExchange>,
    /// More matching exchanges were seen than `max_entries`
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation_error: Option<String>,
}

#[derive(Debug, Default)]
struct Log {
    exchanges: Vec<RecordedExchange>,
    by_request: HashMap<String, usize>,
    truncated: bool,
}

impl Log {
    fn slot(&mut self, request_id: &str, url: &str, limit: usize) -> Option<&mut RecordedExchange> {
        if let Some(&index) = self.by_request.get(request_id) {
            return self.exchanges.get_mut(index);
        }
        if self.exchanges.len() >= limit {
            self.truncated = true;
            return None;
        }
        self.by_request
            .insert(request_id.to_string(), self.exchanges.len());
        self.exchanges.push(RecordedExchange {
            url: url.to_string(),
            method: None,
            resource_type: None,
            status: None,
            mime_type: None,
        });
        self.exchanges.last_mut()
    }
}

pub async fn record(page: Arc<dyn PageHandle>, request: RecordingRequest) -> NetworkRecording {
    let started = Instant::now();
    let initial_url = page.url().await;
    let mut session = CaptureSession::new(page.clone(), request.window, initial_url.as_deref());
    let log = Arc::new(Mutex::new(Log::default()));
    let limit = request.max_entries.max(1);

    let on_request: RequestCallback = {
        let log = log.clone();
        let filter = request.filter.clone();
        Arc::new(move |event: RequestEvent| {
            if !filter.matches(&event.url, event.resource_type.as_deref()) {
                return;
            }
            if let Some(slot) = log.lock().slot(&event.request_id, &event.url, limit) {
                slot.method = Some(event.method.clone());
                slot.resource_type = event.resource_type.clone();
            }
        })
    };
    match page.on_request(on_request).await {
        Ok(id) => session.listeners_mut().add_listener(id),
        Err(e) => debug!("Request recording unavailable: {}", e),
    }

    let on_response: ResponseCallback = {
        let log = log.clone();
        let filter = request.filter.clone();
        Arc::new(move |event: ResponseEvent| {
            if !filter.matches(&event.url, event.resource_type.as_deref()) {
                return;
            }
            if let Some(slot) = log.lock().slot(&event.request_id, &event.url, limit) {
                slot.status = Some(event.status);
                slot.mime_type = Some(event.mime_type.clone());
                if slot.resource_type.is_none() {
                    slot.resource_type = event.resource_type.clone();
                }
            }
        })
    };
    match page.on_response(on_response, BodyPolicy::NONE).await {
        Ok(id) => session.listeners_mut().add_listener(id),
        Err(e) => debug!("Response recording unavailable: {}", e),
    }

    let deadline = started + request.window;
    let mut navigation_error = None;
    if let Some(url) = &request.url {
        navigation_error = navigate_within(page.as_ref(), url, deadline, request.window).await;
    }

    tokio::time::sleep_until(deadline).await;

    let session_id = session.id();
    session.finish().await;

    let Log {
        exchanges,
        truncated,
        ..
    } = std::mem::take(&mut *log.lock());
    info!(
        "Network recording {} captured {} exchanges{}",
        session_id,
        exchanges.len(),
        if truncated { " (truncated)" } else { "" }
    );

    NetworkRecording {
        session_id,
        page_url: page.url().await,
        window_ms: request.window.as_millis() as u64,
        elapsed_ms: started.elapsed().as_millis() as u64,
        exchanges,
        truncated,
        navigation_error,
    }
}
