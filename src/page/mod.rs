//! Page capability surface
//!
//! Everything the locator and the capture aggregator need from a live browser page,
//! expressed as one object-safe trait. The Chromium implementation lives in
//! [`chromium`]; any host able to provide these operations can drive the core unchanged.
//!
//! # Element references
//!
//! [`ElementRef`] is a snapshot taken at query time plus an opaque token the page uses to
//! find the node again. Tokens go stale when the DOM is replaced (navigation, re-render),
//! so callers must never cache them across tool calls.
//!
//! # In-page evaluation
//!
//! [`PageHandle::evaluate_in_page`] runs a serialized JavaScript function in the page realm.
//! Nothing is shared with the host: arguments and results cross as plain JSON.

mod chromium;
#[cfg(test)]
pub(crate) mod fake;

pub use chromium::ChromiumPage;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Handle for a network listener attached through [`PageHandle::on_request`] or
/// [`PageHandle::on_response`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub u64);

/// Handle for a script registered through [`PageHandle::inject_before_load`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptId(pub String);

/// Snapshot of a DOM element returned by [`PageHandle::query`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRef {
    /// Opaque token the page uses to resolve the live node
    pub token: String,
    /// Lowercase tag name
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    /// Whitespace-collapsed visible text (or input value)
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub visible: bool,
}

impl ElementRef {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or_default().split_whitespace()
    }

    /// Short human-readable description used in diagnostics, e.g. `<button#go "Submit">`
    pub fn describe(&self) -> String {
        let mut out = format!("<{}", self.tag);
        if let Some(id) = self.id.as_deref().filter(|id| !id.is_empty()) {
            out.push('#');
            out.push_str(id);
        }
        if let Some(class) = self.classes().next() {
            out.push('.');
            out.push_str(class);
        }
        let text = self.text.trim();
        if !text.is_empty() {
            let preview: String = text.chars().take(24).collect();
            if preview.len() < text.len() {
                out.push_str(&format!(" \"{preview}...\""));
            } else {
                out.push_str(&format!(" \"{preview}\""));
            }
        }
        out.push('>');
        out
    }
}

/// Upper bound on elements returned by a single query
pub const MAX_QUERY_RESULTS: usize = 200;

/// Narrowing applied inside the page, before results are capped at [`MAX_QUERY_RESULTS`]
///
/// With no needles every (visible) match passes. Otherwise an element passes when its
/// collapsed lowercase text contains a text needle or one of `attributes` contains an
/// attribute needle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementFilter {
    pub visible_only: bool,
    pub text_contains: Vec<String>,
    pub attributes: Vec<String>,
    pub attribute_contains: Vec<String>,
}

impl ElementFilter {
    pub fn visible() -> Self {
        Self {
            visible_only: true,
            ..Self::default()
        }
    }

    pub fn text_containing<S: AsRef<str>>(mut self, needles: impl IntoIterator<Item = S>) -> Self {
        push_needles(&mut self.text_contains, needles);
        self
    }

    pub fn attributes_containing<S: AsRef<str>>(
        mut self,
        attributes: &[&str],
        needles: impl IntoIterator<Item = S>,
    ) -> Self {
        for attribute in attributes {
            if !self.attributes.iter().any(|a| a == attribute) {
                self.attributes.push(attribute.to_string());
            }
        }
        push_needles(&mut self.attribute_contains, needles);
        self
    }

    /// Same decision the in-page query makes
    pub fn accepts(&self, element: &ElementRef) -> bool {
        if self.visible_only && !element.visible {
            return false;
        }
        if self.text_contains.is_empty() && self.attribute_contains.is_empty() {
            return true;
        }
        let text = collapse(&element.text);
        if self.text_contains.iter().any(|n| text.contains(n.as_str())) {
            return true;
        }
        self.attributes
            .iter()
            .filter_map(|name| element.attr(name))
            .map(str::to_lowercase)
            .any(|value| self.attribute_contains.iter().any(|n| value.contains(n.as_str())))
    }
}

/// Whitespace-collapsed lowercase text
pub fn collapse(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn push_needles<S: AsRef<str>>(into: &mut Vec<String>, needles: impl IntoIterator<Item = S>) {
    for needle in needles {
        let needle = collapse(needle.as_ref());
        if !needle.is_empty() && !into.contains(&needle) {
            into.push(needle);
        }
    }
}

/// Outgoing request observed on the page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEvent {
    pub request_id: String,
    pub url: String,
    pub method: String,
    /// CDP resource type name (`Media`, `XHR`, `Document`, ...) when known
    pub resource_type: Option<String>,
}

/// Response observed on the page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub request_id: String,
    pub url: String,
    pub status: i64,
    pub mime_type: String,
    pub resource_type: Option<String>,
    /// Text body, present only when requested by the [`BodyPolicy`] and readable
    pub body: Option<String>,
}

pub type RequestCallback = Arc<dyn Fn(RequestEvent) + Send + Sync>;
pub type ResponseCallback = Arc<dyn Fn(ResponseEvent) + Send + Sync>;

/// Whether a response listener should read bodies before dispatching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyPolicy {
    /// Read bodies of 200 responses with a textual content type
    pub read_text_bodies: bool,
    /// Bodies longer than this are truncated
    pub max_bytes: usize,
}

impl BodyPolicy {
    pub const NONE: BodyPolicy = BodyPolicy {
        read_text_bodies: false,
        max_bytes: 0,
    };

    pub fn wants_body(&self, status: i64, mime_type: &str) -> bool {
        self.read_text_bodies && status == 200 && is_textual_mime(mime_type)
    }
}

/// Content types worth scanning as text
pub fn is_textual_mime(mime_type: &str) -> bool {
    let mime = mime_type.to_ascii_lowercase();
    mime.starts_with("text/")
        || mime.contains("json")
        || mime.contains("javascript")
        || mime.contains("xml")
        || mime.contains("mpegurl")
}

#[derive(Debug, Error)]
pub enum PageError {
    #[error("Query failed for selector '{selector}': {reason}")]
    Query { selector: String, reason: String },

    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    #[error("Element is no longer attached: {0}")]
    StaleElement(String),

    #[error("Interaction failed: {0}")]
    Interaction(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Listener could not be attached: {0}")]
    Listener(String),
}

/// Minimal capability surface of a live page
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Current document URL, if the page reports one
    async fn url(&self) -> Option<String>;

    /// Run a CSS selector against the current DOM, first [`MAX_QUERY_RESULTS`] matches
    async fn query(&self, selector: &str) -> Result<Vec<ElementRef>, PageError> {
        self.query_matching(selector, &ElementFilter::default()).await
    }

    /// Like [`PageHandle::query`], keeping only elements `filter` accepts before the cap
    async fn query_matching(
        &self,
        selector: &str,
        filter: &ElementFilter,
    ) -> Result<Vec<ElementRef>, PageError>;

    /// Call a serialized JavaScript function in the page with JSON arguments
    async fn evaluate_in_page(&self, function: &str, args: Vec<Value>) -> Result<Value, PageError>;

    async fn on_request(&self, callback: RequestCallback) -> Result<ListenerId, PageError>;

    async fn on_response(
        &self,
        callback: ResponseCallback,
        bodies: BodyPolicy,
    ) -> Result<ListenerId, PageError>;

    /// Detach a network listener. Unknown ids are ignored.
    async fn remove_listener(&self, id: ListenerId);

    /// Register a script that runs before any page script on every new document
    async fn inject_before_load(&self, source: &str) -> Result<ScriptId, PageError>;

    /// Unregister a before-load script. Unknown ids are ignored.
    async fn remove_injected(&self, id: ScriptId);

    async fn click(&self, element: &ElementRef) -> Result<(), PageError>;

    async fn type_text(&self, element: &ElementRef, text: &str, clear: bool) -> Result<(), PageError>;

    /// Navigate and wait for the load to complete
    async fn goto(&self, url: &str) -> Result<(), PageError>;

    /// Wait for a navigation started by the page itself (e.g. a submitted form) to finish
    async fn wait_for_load(&self) -> Result<(), PageError>;

    /// Number of network listeners and before-load scripts currently attached
    fn listener_count(&self) -> usize;
}
