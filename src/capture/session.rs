//! Capture session lifetime
//!
//! A session owns every listener, before-load script and poll task it attaches. All of
//! them are detached together, exactly once: by [`CaptureSession::finish`] on the normal
//! path, or by `Drop` (spawned on the runtime that created the session) when an error or
//! early return skipped `finish`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use super::hooks::UNINSTALL_FUNCTION;
use super::resource::ResourceSet;
use crate::page::{ListenerId, PageHandle, ScriptId};

/// Everything a session attached to the page
#[derive(Debug, Default)]
pub struct ListenerSet {
    listeners: Vec<ListenerId>,
    scripts: Vec<ScriptId>,
    hooks_installed: bool,
}

impl ListenerSet {
    pub fn add_listener(&mut self, id: ListenerId) {
        self.listeners.push(id);
    }

    pub fn add_script(&mut self, id: ScriptId) {
        self.scripts.push(id);
    }

    /// Hooks are live in the current document and must be uninstalled
    pub fn mark_hooks_installed(&mut self) {
        self.hooks_installed = true;
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.scripts.is_empty() && !self.hooks_installed
    }

    /// Detach everything. Failures are logged and skipped.
    pub async fn detach(self, page: &dyn PageHandle) {
        for id in self.listeners {
            page.remove_listener(id).await;
        }
        for id in self.scripts {
            page.remove_injected(id).await;
        }
        if self.hooks_installed
            && let Err(e) = page.evaluate_in_page(UNINSTALL_FUNCTION, Vec::new()).await
        {
            debug!("Hook uninstall failed (page may have navigated): {}", e);
        }
    }
}

pub struct CaptureSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    window: Duration,
    page: Arc<dyn PageHandle>,
    listeners: Option<ListenerSet>,
    resources: Arc<Mutex<ResourceSet>>,
    players: Arc<Mutex<Vec<String>>>,
    poll: Option<DropGuard>,
    runtime: Option<Handle>,
}

impl CaptureSession {
    pub fn new(page: Arc<dyn PageHandle>, window: Duration, base_url: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            window,
            page,
            listeners: Some(ListenerSet::default()),
            resources: Arc::new(Mutex::new(ResourceSet::with_base(base_url))),
            players: Arc::new(Mutex::new(Vec::new())),
            poll: None,
            runtime: Handle::try_current().ok(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn page(&self) -> &Arc<dyn PageHandle> {
        &self.page
    }

    /// Shared set every channel writes into
    pub fn resources(&self) -> Arc<Mutex<ResourceSet>> {
        self.resources.clone()
    }

    /// Player libraries reported by the hook drains
    pub fn players(&self) -> Arc<Mutex<Vec<String>>> {
        self.players.clone()
    }

    pub fn listeners_mut(&mut self) -> &mut ListenerSet {
        self.listeners.get_or_insert_with(ListenerSet::default)
    }

    /// Token that stops the poll task; cancelled at the latest when the session ends
    pub fn poll_token(&mut self) -> CancellationToken {
        let token = CancellationToken::new();
        self.poll = Some(token.clone().drop_guard());
        token
    }

    /// Stop polling and detach everything, returning the captured set
    pub async fn finish(mut self) -> ResourceSet {
        self.poll.take();
        if let Some(listeners) = self.listeners.take() {
            listeners.detach(self.page.as_ref()).await;
        }
        debug!("Capture session {} detached", self.id);
        std::mem::take(&mut *self.resources.lock())
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.poll.take();
        let Some(listeners) = self.listeners.take() else {
            return;
        };
        if listeners.is_empty() {
            return;
        }

        warn!("Capture session {} ended without finish(); detaching listeners", self.id);
        match &self.runtime {
            Some(runtime) => {
                let page = self.page.clone();
                runtime.spawn(async move {
                    listeners.detach(page.as_ref()).await;
                });
            }
            None => warn!("No runtime to detach capture listeners on; they stay attached"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::fake::FakePage;
    use crate::page::{BodyPolicy, RequestCallback, ResponseCallback};

    async fn attach_all(page: &Arc<dyn PageHandle>, session: &mut CaptureSession) {
        let on_request: RequestCallback = Arc::new(|_| {});
        let on_response: ResponseCallback = Arc::new(|_| {});
        let request = page.on_request(on_request).await.unwrap();
        let response = page.on_response(on_response, BodyPolicy::NONE).await.unwrap();
        let script = page.inject_before_load("void 0;").await.unwrap();
        let listeners = session.listeners_mut();
        listeners.add_listener(request);
        listeners.add_listener(response);
        listeners.add_script(script);
    }

    #[tokio::test]
    async fn finish_detaches_everything() {
        let fake = Arc::new(FakePage::new());
        let page: Arc<dyn PageHandle> = fake.clone();
        let mut session = CaptureSession::new(page.clone(), Duration::ZERO, None);
        attach_all(&page, &mut session).await;
        assert_eq!(fake.listener_count(), 3);

        session.finish().await;
        assert_eq!(fake.listener_count(), 0);
    }

    #[tokio::test]
    async fn drop_without_finish_still_detaches() {
        let fake = Arc::new(FakePage::new());
        let page: Arc<dyn PageHandle> = fake.clone();
        {
            let mut session = CaptureSession::new(page.clone(), Duration::ZERO, None);
            attach_all(&page, &mut session).await;
            assert_eq!(fake.listener_count(), 3);
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fake.listener_count(), 0);
    }

    #[tokio::test]
    async fn poll_token_is_cancelled_when_session_ends() {
        let page: Arc<dyn PageHandle> = Arc::new(FakePage::new());
        let mut session = CaptureSession::new(page, Duration::ZERO, None);
        let token = session.poll_token();
        assert!(!token.is_cancelled());
        session.finish().await;
        assert!(token.is_cancelled());
    }
}
