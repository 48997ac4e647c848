//! [`PageHandle`] over a chromiumoxide [`Page`]

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    GetResponseBodyParams, RequestId,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, RemoveScriptToEvaluateOnNewDocumentParams,
    ScriptIdentifier,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::element::Element;
use dashmap::{DashMap, DashSet};
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{
    BodyPolicy, ElementFilter, ElementRef, ListenerId, MAX_QUERY_RESULTS, PageError, PageHandle,
    RequestCallback, RequestEvent, ResponseCallback, ResponseEvent, ScriptId,
};

/// Attribute used to tag queried nodes so they can be resolved again for interaction
const REF_ATTRIBUTE: &str = "data-kodegen-ref";

/// Filters before truncating so a large DOM cannot hide a matching node past the cap
const QUERY_FUNCTION: &str = r#"(selector, refAttr, maxResults, filter) => {
    const f = filter || {};
    const textNeedles = f.textContains || [];
    const attrNames = f.attributes || [];
    const attrNeedles = f.attributeContains || [];
    const collapse = (s) => String(s || '').replace(/\s+/g, ' ').trim();
    const isVisible = (el) => {
        const rect = el.getBoundingClientRect();
        const style = window.getComputedStyle(el);
        return rect.width > 0 && rect.height > 0
            && style.visibility !== 'hidden' && style.display !== 'none';
    };
    const textOf = (el) => collapse(el.innerText || el.textContent || el.value);
    const accepts = (el) => {
        if (f.visibleOnly && !isVisible(el)) return false;
        if (!textNeedles.length && !attrNeedles.length) return true;
        const text = textOf(el).toLowerCase();
        if (textNeedles.some((n) => text.includes(n))) return true;
        return attrNames.some((name) => {
            const value = el.getAttribute(name);
            return value != null && attrNeedles.some((n) => value.toLowerCase().includes(n));
        });
    };

    const nodes = [];
    for (const el of document.querySelectorAll(selector)) {
        if (!accepts(el)) continue;
        nodes.push(el);
        if (nodes.length >= maxResults) break;
    }

    window.__kodegenRefSeq = window.__kodegenRefSeq || 0;
    return nodes.map((el) => {
        let token = el.getAttribute(refAttr);
        if (!token) {
            token = 'r' + (++window.__kodegenRefSeq);
            el.setAttribute(refAttr, token);
        }
        const attributes = {};
        for (const attr of Array.from(el.attributes)) {
            if (attr.name !== refAttr) attributes[attr.name] = String(attr.value).slice(0, 256);
        }
        const text = textOf(el).slice(0, 200);
        return { token, tag: el.tagName.toLowerCase(), id: el.id || null, text, attributes, visible: isVisible(el) };
    });
}"#;

/// Chromium page plus the listener bookkeeping the capability surface requires
pub struct ChromiumPage {
    page: Page,
    listeners: Arc<DashMap<u64, JoinHandle<()>>>,
    scripts: DashSet<String>,
    next_listener: AtomicU64,
    network_enabled: AtomicBool,
}

impl ChromiumPage {
    pub fn new(page: Page) -> Self {
        Self {
            page,
            listeners: Arc::new(DashMap::new()),
            scripts: DashSet::new(),
            next_listener: AtomicU64::new(1),
            network_enabled: AtomicBool::new(false),
        }
    }

    /// Underlying chromiumoxide page
    pub fn inner(&self) -> &Page {
        &self.page
    }

    async fn ensure_network_enabled(&self) -> Result<(), PageError> {
        if self.network_enabled.load(Ordering::Acquire) {
            return Ok(());
        }
        self.page
            .execute(EnableParams::default())
            .await
            .map_err(|e| PageError::Listener(format!("Network.enable failed: {e}")))?;
        self.network_enabled.store(true, Ordering::Release);
        Ok(())
    }

    fn register(&self, handle: JoinHandle<()>) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, handle);
        ListenerId(id)
    }

    async fn resolve(&self, element: &ElementRef) -> Result<Element, PageError> {
        let selector = format!("[{REF_ATTRIBUTE}=\"{}\"]", element.token);
        self.page
            .find_element(selector)
            .await
            .map_err(|e| PageError::StaleElement(format!("{} ({e})", element.describe())))
    }

    async fn focus_by_click(&self, element: &ElementRef) -> Result<Element, PageError> {
        let node = self.resolve(element).await?;

        node.scroll_into_view().await.map_err(|e| {
            PageError::Interaction(format!(
                "Failed to scroll {} into view: {e}",
                element.describe()
            ))
        })?;

        // Clickable point + page click avoids the IntersectionObserver hang in Element::click
        let point = node.clickable_point().await.map_err(|e| {
            PageError::Interaction(format!(
                "{} has no clickable point (hidden or zero-sized): {e}",
                element.describe()
            ))
        })?;

        self.page.click(point).await.map_err(|e| {
            PageError::Interaction(format!("Click on {} failed: {e}", element.describe()))
        })?;

        Ok(node)
    }
}

#[async_trait]
impl PageHandle for ChromiumPage {
    async fn url(&self) -> Option<String> {
        self.page.url().await.ok().flatten()
    }

    async fn query_matching(
        &self,
        selector: &str,
        filter: &ElementFilter,
    ) -> Result<Vec<ElementRef>, PageError> {
        let filter = serde_json::to_value(filter).map_err(|e| PageError::Query {
            selector: selector.to_string(),
            reason: format!("filter is not serializable: {e}"),
        })?;
        let value = self
            .evaluate_in_page(
                QUERY_FUNCTION,
                vec![
                    Value::from(selector),
                    Value::from(REF_ATTRIBUTE),
                    Value::from(MAX_QUERY_RESULTS),
                    filter,
                ],
            )
            .await
            .map_err(|e| PageError::Query {
                selector: selector.to_string(),
                reason: e.to_string(),
            })?;

        serde_json::from_value(value).map_err(|e| PageError::Query {
            selector: selector.to_string(),
            reason: format!("unexpected query result shape: {e}"),
        })
    }

    async fn evaluate_in_page(&self, function: &str, args: Vec<Value>) -> Result<Value, PageError> {
        let args = serde_json::to_string(&args)
            .map_err(|e| PageError::Evaluation(format!("arguments are not serializable: {e}")))?;
        let expression = format!("(async () => {{ const __fn = ({function}); return await __fn(...{args}); }})()");

        let params = EvaluateParams::builder()
            .expression(expression)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(PageError::Evaluation)?;

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .map_err(|e| PageError::Evaluation(e.to_string()))?;

        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn on_request(&self, callback: RequestCallback) -> Result<ListenerId, PageError> {
        self.ensure_network_enabled().await?;
        let mut events = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| PageError::Listener(e.to_string()))?;

        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                callback(RequestEvent {
                    request_id: event.request_id.inner().clone(),
                    url: event.request.url.clone(),
                    method: event.request.method.clone(),
                    resource_type: event.r#type.as_ref().map(|t| format!("{t:?}")),
                });
            }
            trace!("Request listener stream ended");
        });

        Ok(self.register(handle))
    }

    async fn on_response(
        &self,
        callback: ResponseCallback,
        bodies: BodyPolicy,
    ) -> Result<ListenerId, PageError> {
        self.ensure_network_enabled().await?;
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(|e| PageError::Listener(e.to_string()))?;
        let mut finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|e| PageError::Listener(e.to_string()))?;

        let page = self.page.clone();
        let handle = tokio::spawn(async move {
            // Bodies are only readable once loading finished
            let mut awaiting_body: HashMap<String, (RequestId, ResponseEvent)> = HashMap::new();

            loop {
                tokio::select! {
                    Some(event) = responses.next() => {
                        let response = ResponseEvent {
                            request_id: event.request_id.inner().clone(),
                            url: event.response.url.clone(),
                            status: event.response.status,
                            mime_type: event.response.mime_type.clone(),
                            resource_type: Some(format!("{:?}", event.r#type)),
                            body: None,
                        };
                        if bodies.wants_body(response.status, &response.mime_type) {
                            awaiting_body.insert(
                                response.request_id.clone(),
                                (event.request_id.clone(), response),
                            );
                        } else {
                            callback(response);
                        }
                    }
                    Some(event) = finished.next() => {
                        let Some((request_id, mut response)) =
                            awaiting_body.remove(event.request_id.inner())
                        else {
                            continue;
                        };
                        match page.execute(GetResponseBodyParams::new(request_id)).await {
                            Ok(reply) if !reply.result.base64_encoded => {
                                let mut body = reply.result.body.clone();
                                if body.len() > bodies.max_bytes {
                                    let mut cut = bodies.max_bytes;
                                    while !body.is_char_boundary(cut) {
                                        cut -= 1;
                                    }
                                    body.truncate(cut);
                                }
                                response.body = Some(body);
                            }
                            Ok(_) => trace!("Skipping base64 body for {}", response.url),
                            Err(e) => debug!("Response body unavailable for {}: {}", response.url, e),
                        }
                        callback(response);
                    }
                    else => break,
                }
            }
            trace!("Response listener streams ended");
        });

        Ok(self.register(handle))
    }

    async fn remove_listener(&self, id: ListenerId) {
        if let Some((_, handle)) = self.listeners.remove(&id.0) {
            handle.abort();
        }
    }

    async fn inject_before_load(&self, source: &str) -> Result<ScriptId, PageError> {
        let reply = self
            .page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await
            .map_err(|e| PageError::Listener(format!("addScriptToEvaluateOnNewDocument: {e}")))?;
        let id = reply.result.identifier.inner().clone();
        self.scripts.insert(id.clone());
        Ok(ScriptId(id))
    }

    async fn remove_injected(&self, id: ScriptId) {
        if self.scripts.remove(&id.0).is_none() {
            return;
        }
        let params = RemoveScriptToEvaluateOnNewDocumentParams::new(ScriptIdentifier::new(id.0));
        if let Err(e) = self.page.execute(params).await {
            warn!("Failed to remove before-load script: {}", e);
        }
    }

    async fn click(&self, element: &ElementRef) -> Result<(), PageError> {
        self.focus_by_click(element).await.map(|_| ())
    }

    async fn type_text(&self, element: &ElementRef, text: &str, clear: bool) -> Result<(), PageError> {
        let node = self.focus_by_click(element).await?;

        if clear {
            node.call_js_fn("function() { this.value = ''; }", false)
                .await
                .map_err(|e| {
                    PageError::Interaction(format!(
                        "Failed to clear {} (not an input, read-only or disabled): {e}",
                        element.describe()
                    ))
                })?;
        }

        node.type_str(text).await.map_err(|e| {
            PageError::Interaction(format!("Typing into {} failed: {e}", element.describe()))
        })?;
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<(), PageError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| PageError::Navigation(format!("{url}: {e}")))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| PageError::Navigation(format!("waiting for load of {url}: {e}")))?;
        Ok(())
    }

    async fn wait_for_load(&self) -> Result<(), PageError> {
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| PageError::Navigation(format!("waiting for load: {e}")))?;
        Ok(())
    }

    fn listener_count(&self) -> usize {
        self.listeners.len() + self.scripts.len()
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        for entry in self.listeners.iter() {
            entry.value().abort();
        }
    }
}
