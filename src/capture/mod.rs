//! Multi-source media capture
//!
//! A capture session watches one page for a fixed window through five channels at once:
//!
//! - outgoing requests with a media resource type or media-looking URL
//! - responses with media content types, plus text bodies scanned for embedded URLs
//! - injected hooks around the page's own crypto, fetch, XHR, `atob` and `JSON.parse`
//! - `<video>`/`<source>` `src` mutations and a rescan of media elements on every drain
//! - load entry points of known player libraries
//!
//! Everything lands in one [`ResourceSet`] keyed by normalized URL. The window always runs
//! to completion; channel failures only mean fewer resources, never an error.

pub mod classify;
pub(crate) mod hooks;
pub mod interaction;
pub mod platform;
pub mod recorder;
pub mod resource;
pub mod session;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::CaptureConfig;
use crate::page::{BodyPolicy, PageHandle, RequestCallback, RequestEvent, ResponseCallback, ResponseEvent};
pub use classify::ContentHint;
use classify::{extract_media_urls, is_media_request, is_media_response};
use hooks::{DRAIN_FUNCTION, Drained, INSTALL_FUNCTION};
use interaction::{INTERACTION_RULES, InteractionSummary};
pub use resource::{CapturedResource, ChannelCounts, DiscoverySource, ResourceSet, ResourcesByKind};
pub use session::CaptureSession;

/// Parameters of one capture run
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    /// Navigate here after the channels are attached
    pub url: Option<String>,
    pub window: Duration,
    pub interact: bool,
    pub max_interactions: usize,
    pub inspect_response_bodies: bool,
}

impl CaptureRequest {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            url: None,
            window: Duration::from_millis(config.default_wait_ms),
            interact: true,
            max_interactions: config.max_interactions,
            inspect_response_bodies: config.inspect_response_bodies,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub page_url: Option<String>,
    pub window_ms: u64,
    pub elapsed_ms: u64,
    pub resources_by_kind: ResourcesByKind,
    pub channel_counts: ChannelCounts,
    pub platforms_detected: Vec<String>,
    pub interactions: InteractionSummary,
    /// Every captured resource with its attribution, in arrival order
    pub resources: Vec<CapturedResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation_error: Option<String>,
}

impl CaptureReport {
    pub fn total(&self) -> usize {
        self.resources.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct CaptureAggregator {
    config: CaptureConfig,
}

impl CaptureAggregator {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Run one session to the end of its window
///
/// The window opens with the session; an optional navigation runs inside it and is cut
/// off at the deadline.
    pub async fn run(&self, page: Arc<dyn PageHandle>, request: CaptureRequest) -> CaptureReport {
        let started = Instant::now();
        let initial_url = page.url().await;
        let mut session = CaptureSession::new(page.clone(), request.window, initial_url.as_deref());
        info!(
            "Capture session {} started ({}ms window, interactions: {})",
            session.id(),
            request.window.as_millis(),
            request.interact
        );

        self.attach_network(&mut session, request.inspect_response_bodies)
            .await;
        attach_hooks(&mut session).await;

        let deadline = started + request.window;
        let mut navigation_error = None;
        if let Some(url) = &request.url {
            navigation_error = navigate_within(page.as_ref(), url, deadline, request.window).await;
            let current = page.url().await;
            session
                .resources()
                .lock()
                .set_base(current.as_deref().or(Some(url.as_str())));
        }

        let poll_token = session.poll_token();
        let poller = {
            let page = page.clone();
            let resources = session.resources();
            let players = session.players();
            let token = poll_token.clone();
            let every = Duration::from_millis(self.config.poll_interval_ms.max(10));
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(every);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => drain_hooks(page.as_ref(), &resources, &players).await,
                    }
                }
            })
        };

        let interactions = if request.interact && request.max_interactions > 0 {
            let settle = Duration::from_millis(self.config.settle_ms);
            let drive = interaction::drive(
                page.as_ref(),
                INTERACTION_RULES,
                request.max_interactions,
                settle,
            );
            match tokio::time::timeout_at(deadline, drive).await {
                Ok(summary) => summary,
                Err(_) => {
                    debug!("Interactions cut off by the capture window");
                    InteractionSummary::default()
                }
            }
        } else {
            InteractionSummary::default()
        };

        tokio::time::sleep_until(deadline).await;

        let final_drain = Duration::from_millis(self.config.final_drain_timeout_ms);
        poll_token.cancel();
        if tokio::time::timeout(final_drain, poller).await.is_err() {
            debug!("Hook poller did not stop within {:?}", final_drain);
        }
        let resources = session.resources();
        let players = session.players();
        if tokio::time::timeout(final_drain, drain_hooks(page.as_ref(), &resources, &players))
            .await
            .is_err()
        {
            debug!("Final hook drain timed out");
        }

        let page_url = page.url().await;
        let players = players.lock().clone();
        let session_id = session.id();
        let started_at = session.started_at();
        let set = session.finish().await;

        let report = CaptureReport {
            session_id,
            started_at,
            platforms_detected: platform::detect_platforms(
                page_url.as_deref(),
                set.resources().iter().map(|r| r.url.as_str()),
                &players,
            ),
            page_url,
            window_ms: request.window.as_millis() as u64,
            elapsed_ms: started.elapsed().as_millis() as u64,
            resources_by_kind: set.by_kind(),
            channel_counts: set.channel_counts(),
            interactions,
            resources: set.resources().to_vec(),
            navigation_error,
        };
        info!(
            "Capture session {} finished: {} resources in {}ms",
            session_id,
            report.total(),
            report.elapsed_ms
        );
        report
    }

    async fn attach_network(&self, session: &mut CaptureSession, inspect_bodies: bool) {
        let page = session.page().clone();

        let resources = session.resources();
        let on_request: RequestCallback = Arc::new(move |event: RequestEvent| {
            if is_media_request(&event.url, event.resource_type.as_deref()) {
                resources
                    .lock()
                    .insert(&event.url, DiscoverySource::NetworkRequest, None);
            }
        });
        match page.on_request(on_request).await {
            Ok(id) => session.listeners_mut().add_listener(id),
            Err(e) => debug!("Request channel unavailable: {}", e),
        }

        let resources = session.resources();
        let on_response: ResponseCallback = Arc::new(move |event: ResponseEvent| {
            let embedded = event
                .body
                .as_deref()
                .map(|body| extract_media_urls(body, Url::parse(&event.url).ok().as_ref()))
                .unwrap_or_default();

            let mut set = resources.lock();
            if is_media_response(&event.url, &event.mime_type, event.resource_type.as_deref()) {
                set.insert(
                    &event.url,
                    DiscoverySource::NetworkResponse,
                    Some(&event.mime_type),
                );
            }
            for url in embedded {
                set.insert(&url, DiscoverySource::NetworkResponse, None);
            }
        });
        let bodies = BodyPolicy {
            read_text_bodies: inspect_bodies,
            max_bytes: self.config.max_body_bytes,
        };
        match page.on_response(on_response, bodies).await {
            Ok(id) => session.listeners_mut().add_listener(id),
            Err(e) => debug!("Response channel unavailable: {}", e),
        }
    }
}

/// Register the hooks for future documents and install them in the current one
/// Navigate without letting a slow load outlive `deadline`; returns the failure, if any
pub(crate) async fn navigate_within(
    page: &dyn PageHandle,
    url: &str,
    deadline: Instant,
    window: Duration,
) -> Option<String> {
    match tokio::time::timeout_at(deadline, page.goto(url)).await {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            warn!("Capture navigation to {} failed: {}", url, e);
            Some(e.to_string())
        }
        Err(_) => {
            warn!("Capture navigation to {} outlasted the {}ms window", url, window.as_millis());
            Some(format!(
                "{url}: navigation did not finish within the {}ms capture window",
                window.as_millis()
            ))
        }
    }
}

async fn attach_hooks(session: &mut CaptureSession) {
    let page = session.page().clone();
    match page.inject_before_load(&hooks::before_load_source()).await {
        Ok(id) => session.listeners_mut().add_script(id),
        Err(e) => debug!("Before-load hook registration failed: {}", e),
    }
    match page.evaluate_in_page(INSTALL_FUNCTION, Vec::new()).await {
        Ok(_) => session.listeners_mut().mark_hooks_installed(),
        Err(e) => debug!("Hook install in current document failed: {}", e),
    }
}

async fn drain_hooks(
    page: &dyn PageHandle,
    resources: &Mutex<ResourceSet>,
    players: &Mutex<Vec<String>>,
) {
    let drained = match page.evaluate_in_page(DRAIN_FUNCTION, Vec::new()).await {
        Ok(value) => Drained::from_value(value),
        Err(e) => {
            debug!("Hook drain failed: {}", e);
            return;
        }
    };

    {
        let mut set = resources.lock();
        for entry in &drained.entries {
            set.insert(&entry.url, entry.discovery_source(), None);
        }
    }
    let mut known = players.lock();
    for player in drained.players {
        if !known.contains(&player) {
            known.push(player);
        }
    }
}
