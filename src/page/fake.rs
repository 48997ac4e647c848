//! In-memory [`PageHandle`] double for unit tests
//!
//! Holds a flat list of elements (each with an optional ancestor chain), a tiny CSS
//! matcher covering the selector subset the locator generates, scripted network events
//! replayed when a listener attaches, and an emulated hook queue for the capture scripts.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::{
    BodyPolicy, ElementFilter, ElementRef, ListenerId, MAX_QUERY_RESULTS, PageError, PageHandle,
    RequestCallback, RequestEvent, ResponseCallback, ResponseEvent, ScriptId,
};
use crate::capture::hooks;
use crate::locator::selector::split_top_level;

#[derive(Debug, Clone)]
pub(crate) struct FakeElement {
    element: ElementRef,
    ancestors: Vec<ElementRef>,
}

impl FakeElement {
    pub(crate) fn new(tag: &str) -> Self {
        Self {
            element: ElementRef {
                token: String::new(),
                tag: tag.to_string(),
                id: None,
                text: String::new(),
                attributes: BTreeMap::new(),
                visible: true,
            },
            ancestors: Vec::new(),
        }
    }

    pub(crate) fn id(mut self, id: &str) -> Self {
        self.element.id = Some(id.to_string());
        self.element.attributes.insert("id".into(), id.into());
        self
    }

    pub(crate) fn class(mut self, class: &str) -> Self {
        let entry = self.element.attributes.entry("class".into()).or_default();
        if !entry.is_empty() {
            entry.push(' ');
        }
        entry.push_str(class);
        self
    }

    pub(crate) fn text(mut self, text: &str) -> Self {
        self.element.text = text.to_string();
        self
    }

    pub(crate) fn attr(mut self, name: &str, value: &str) -> Self {
        self.element.attributes.insert(name.into(), value.into());
        self
    }

    pub(crate) fn hidden(mut self) -> Self {
        self.element.visible = false;
        self
    }

    /// Nest under an ancestor; call outermost first
    pub(crate) fn inside(mut self, ancestor: FakeElement) -> Self {
        self.ancestors.push(ancestor.element);
        self
    }
}

#[derive(Default)]
struct FakeState {
    url: Option<String>,
    elements: Vec<FakeElement>,
    request_listeners: HashMap<u64, RequestCallback>,
    response_listeners: HashMap<u64, (ResponseCallback, BodyPolicy)>,
    scripts: HashMap<String, String>,
    scripted_requests: Vec<RequestEvent>,
    scripted_responses: Vec<ResponseEvent>,
    hook_queue: Vec<Value>,
    players: Vec<String>,
    reveal_on_click: HashMap<String, Vec<Value>>,
    clicks: Vec<String>,
    typed: Vec<(String, String)>,
    navigations: Vec<String>,
    fail_listeners: bool,
    fail_evaluation: bool,
    fail_clicks: bool,
    fail_navigation: bool,
    redirects: HashMap<String, String>,
    navigation_delay: Option<Duration>,
    next_id: u64,
}

#[derive(Default)]
pub(crate) struct FakePage {
    state: Mutex<FakeState>,
}

impl FakePage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_elements(elements: Vec<FakeElement>) -> Self {
        let page = Self::new();
        for element in elements {
            page.add_element(element);
        }
        page
    }

    pub(crate) fn set_url(&self, url: &str) {
        self.state.lock().url = Some(url.to_string());
    }

    pub(crate) fn add_element(&self, mut element: FakeElement) -> String {
        let mut state = self.state.lock();
        let token = format!("f{}", state.elements.len() + 1);
        element.element.token = token.clone();
        state.elements.push(element);
        token
    }

    pub(crate) fn remove_all_elements(&self) {
        self.state.lock().elements.clear();
    }

    pub(crate) fn script_request(&self, url: &str, resource_type: Option<&str>) {
        let mut state = self.state.lock();
        let request_id = format!("req-{}", state.scripted_requests.len() + 1);
        state.scripted_requests.push(RequestEvent {
            request_id,
            url: url.to_string(),
            method: "GET".to_string(),
            resource_type: resource_type.map(str::to_string),
        });
    }

    pub(crate) fn script_response(&self, url: &str, status: i64, mime_type: &str, body: Option<&str>) {
        let mut state = self.state.lock();
        let request_id = format!("res-{}", state.scripted_responses.len() + 1);
        state.scripted_responses.push(ResponseEvent {
            request_id,
            url: url.to_string(),
            status,
            mime_type: mime_type.to_string(),
            resource_type: Some("XHR".to_string()),
            body: body.map(str::to_string),
        });
    }

    /// Queue an entry as if an injected hook had pushed it
    pub(crate) fn push_hook_entry(&self, url: &str, source: &str) {
        self.state
            .lock()
            .hook_queue
            .push(json!({ "url": url, "source": source }));
    }

    pub(crate) fn set_players(&self, players: &[&str]) {
        self.state.lock().players = players.iter().map(|p| p.to_string()).collect();
    }

    /// Clicking the element with this token pushes the entries into the hook queue
    pub(crate) fn reveal_on_click(&self, token: &str, entries: Vec<(&str, &str)>) {
        let entries = entries
            .into_iter()
            .map(|(url, source)| json!({ "url": url, "source": source }))
            .collect();
        self.state
            .lock()
            .reveal_on_click
            .insert(token.to_string(), entries);
    }

    pub(crate) fn fail_listeners(&self) {
        self.state.lock().fail_listeners = true;
    }

    pub(crate) fn fail_evaluation(&self) {
        self.state.lock().fail_evaluation = true;
    }

    pub(crate) fn fail_clicks(&self) {
        self.state.lock().fail_clicks = true;
    }

    pub(crate) fn fail_navigation(&self) {
        self.state.lock().fail_navigation = true;
    }

    /// Every `goto` takes this long before it lands
    pub(crate) fn slow_navigation(&self, delay: Duration) {
        self.state.lock().navigation_delay = Some(delay);
    }

    /// Navigating to `from` lands on `to`
    pub(crate) fn redirect(&self, from: &str, to: &str) {
        self.state
            .lock()
            .redirects
            .insert(from.to_string(), to.to_string());
    }

    pub(crate) fn clicks(&self) -> Vec<String> {
        self.state.lock().clicks.clone()
    }

    pub(crate) fn typed(&self) -> Vec<(String, String)> {
        self.state.lock().typed.clone()
    }

    pub(crate) fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    fn drain_hooks(state: &mut FakeState) -> Value {
        let mut entries = std::mem::take(&mut state.hook_queue);
        for fake in &state.elements {
            let tag = fake.element.tag.as_str();
            if tag != "video" && tag != "source" {
                continue;
            }
            if let Some(src) = fake.element.attr("src") {
                entries.push(json!({ "url": src, "source": "video-element" }));
            }
        }
        json!({ "entries": entries, "players": state.players })
    }
}

#[async_trait]
impl PageHandle for FakePage {
    async fn url(&self) -> Option<String> {
        self.state.lock().url.clone()
    }

    async fn query_matching(
        &self,
        selector: &str,
        filter: &ElementFilter,
    ) -> Result<Vec<ElementRef>, PageError> {
        let state = self.state.lock();
        let groups = parse_selector_list(selector).map_err(|reason| PageError::Query {
            selector: selector.to_string(),
            reason,
        })?;
        Ok(state
            .elements
            .iter()
            .filter(|fake| groups.iter().any(|chain| chain_matches(chain, fake)))
            .filter(|fake| filter.accepts(&fake.element))
            .take(MAX_QUERY_RESULTS)
            .map(|fake| fake.element.clone())
            .collect())
    }

    async fn evaluate_in_page(&self, function: &str, _args: Vec<Value>) -> Result<Value, PageError> {
        let mut state = self.state.lock();
        if state.fail_evaluation {
            return Err(PageError::Evaluation("evaluation disabled".into()));
        }
        if function.contains(hooks::DRAIN_MARKER) {
            return Ok(Self::drain_hooks(&mut state));
        }
        if function.contains(hooks::INSTALL_MARKER) || function.contains(hooks::UNINSTALL_MARKER) {
            return Ok(Value::Bool(true));
        }
        Ok(Value::Null)
    }

    async fn on_request(&self, callback: RequestCallback) -> Result<ListenerId, PageError> {
        let replay = {
            let mut state = self.state.lock();
            if state.fail_listeners {
                return Err(PageError::Listener("listeners disabled".into()));
            }
            state.next_id += 1;
            let id = state.next_id;
            state.request_listeners.insert(id, callback.clone());
            (id, state.scripted_requests.clone())
        };
        for event in replay.1 {
            callback(event);
        }
        Ok(ListenerId(replay.0))
    }

    async fn on_response(
        &self,
        callback: ResponseCallback,
        bodies: BodyPolicy,
    ) -> Result<ListenerId, PageError> {
        let replay = {
            let mut state = self.state.lock();
            if state.fail_listeners {
                return Err(PageError::Listener("listeners disabled".into()));
            }
            state.next_id += 1;
            let id = state.next_id;
            state.response_listeners.insert(id, (callback.clone(), bodies));
            (id, state.scripted_responses.clone())
        };
        for mut event in replay.1 {
            if !bodies.wants_body(event.status, &event.mime_type) {
                event.body = None;
            }
            callback(event);
        }
        Ok(ListenerId(replay.0))
    }

    async fn remove_listener(&self, id: ListenerId) {
        let mut state = self.state.lock();
        state.request_listeners.remove(&id.0);
        state.response_listeners.remove(&id.0);
    }

    async fn inject_before_load(&self, source: &str) -> Result<ScriptId, PageError> {
        let mut state = self.state.lock();
        if state.fail_listeners {
            return Err(PageError::Listener("scripts disabled".into()));
        }
        state.next_id += 1;
        let id = format!("script-{}", state.next_id);
        state.scripts.insert(id.clone(), source.to_string());
        Ok(ScriptId(id))
    }

    async fn remove_injected(&self, id: ScriptId) {
        self.state.lock().scripts.remove(&id.0);
    }

    async fn click(&self, element: &ElementRef) -> Result<(), PageError> {
        let mut state = self.state.lock();
        if state.fail_clicks {
            return Err(PageError::Interaction("clicks disabled".into()));
        }
        if !state.elements.iter().any(|e| e.element.token == element.token) {
            return Err(PageError::StaleElement(element.describe()));
        }
        state.clicks.push(element.token.clone());
        if let Some(entries) = state.reveal_on_click.remove(&element.token) {
            state.hook_queue.extend(entries);
        }
        Ok(())
    }

    async fn type_text(&self, element: &ElementRef, text: &str, _clear: bool) -> Result<(), PageError> {
        let mut state = self.state.lock();
        if !state.elements.iter().any(|e| e.element.token == element.token) {
            return Err(PageError::StaleElement(element.describe()));
        }
        state.typed.push((element.token.clone(), text.to_string()));
        Ok(())
    }

    async fn goto(&self, url: &str) -> Result<(), PageError> {
        let delay = self.state.lock().navigation_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        state.navigations.push(url.to_string());
        if state.fail_navigation {
            return Err(PageError::Navigation(format!("{url}: net::ERR_NAME_NOT_RESOLVED")));
        }
        let landed = state.redirects.get(url).cloned().unwrap_or_else(|| url.to_string());
        state.url = Some(landed);
        Ok(())
    }

    async fn wait_for_load(&self) -> Result<(), PageError> {
        if self.state.lock().fail_navigation {
            return Err(PageError::Navigation("load did not complete".into()));
        }
        Ok(())
    }

    fn listener_count(&self) -> usize {
        let state = self.state.lock();
        state.request_listeners.len() + state.response_listeners.len() + state.scripts.len()
    }
}

#[derive(Debug, Default, Clone)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<(String, Option<(String, String)>)>,
}

fn parse_selector_list(selector: &str) -> Result<Vec<Vec<Compound>>, String> {
    split_top_level(selector, |c| c == ',')
        .into_iter()
        .map(|part| {
            let chain = split_top_level(&part, |c| c.is_whitespace() || c == '>')
                .iter()
                .map(|s| parse_compound(s.trim()))
                .collect::<Result<Vec<_>, _>>()?;
            if chain.is_empty() {
                return Err("empty selector".to_string());
            }
            Ok(chain)
        })
        .collect()
}

fn parse_compound(input: &str) -> Result<Compound, String> {
    let mut compound = Compound::default();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    let ident = |i: &mut usize| {
        let start = *i;
        while *i < chars.len() && (chars[*i].is_alphanumeric() || chars[*i] == '-' || chars[*i] == '_') {
            *i += 1;
        }
        chars[start..*i].iter().collect::<String>()
    };

    if i < chars.len() && chars[i] == '*' {
        i += 1;
    } else {
        let tag = ident(&mut i);
        if !tag.is_empty() {
            compound.tag = Some(tag.to_lowercase());
        }
    }

    while i < chars.len() {
        match chars[i] {
            '#' => {
                i += 1;
                compound.id = Some(ident(&mut i));
            }
            '.' => {
                i += 1;
                compound.classes.push(ident(&mut i));
            }
            '[' => {
                let close = chars[i..]
                    .iter()
                    .position(|&c| c == ']')
                    .ok_or_else(|| format!("unterminated attribute in '{input}'"))?;
                let body: String = chars[i + 1..i + close].iter().collect();
                compound.attributes.push(parse_attribute(&body));
                i += close + 1;
            }
            other => return Err(format!("unsupported selector syntax '{other}' in '{input}'")),
        }
    }
    Ok(compound)
}

fn parse_attribute(body: &str) -> (String, Option<(String, String)>) {
    for op in ["*=", "^=", "$=", "="] {
        if let Some((name, value)) = body.split_once(op) {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            return (name.trim().to_string(), Some((op.to_string(), value.to_string())));
        }
    }
    (body.trim().to_string(), None)
}

fn compound_matches(compound: &Compound, element: &ElementRef) -> bool {
    if compound.tag.as_deref().is_some_and(|tag| tag != element.tag) {
        return false;
    }
    if compound.id.is_some() && compound.id != element.id {
        return false;
    }
    if !compound
        .classes
        .iter()
        .all(|class| element.classes().any(|c| c == class))
    {
        return false;
    }
    compound.attributes.iter().all(|(name, test)| {
        let Some(actual) = element.attr(name) else {
            return false;
        };
        match test {
            None => true,
            Some((op, value)) => match op.as_str() {
                "*=" => actual.contains(value.as_str()),
                "^=" => actual.starts_with(value.as_str()),
                "$=" => actual.ends_with(value.as_str()),
                _ => actual == value,
            },
        }
    })
}

fn chain_matches(chain: &[Compound], fake: &FakeElement) -> bool {
    let Some((last, ancestors)) = chain.split_last() else {
        return false;
    };
    if !compound_matches(last, &fake.element) {
        return false;
    }
    // Descendant combinator: remaining compounds must match ancestors in order
    let mut remaining = ancestors.iter().rev();
    let mut wanted = remaining.next();
    for ancestor in fake.ancestors.iter().rev() {
        match wanted {
            Some(compound) if compound_matches(compound, ancestor) => wanted = remaining.next(),
            Some(_) => {}
            None => break,
        }
    }
    wanted.is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queries_are_capped_after_filtering() {
        let page = FakePage::new();
        for i in 0..250 {
            page.add_element(FakeElement::new("div").text(&format!("Filler {i}")));
        }
        page.add_element(FakeElement::new("div").text("Checkout"));

        assert_eq!(page.query("div").await.unwrap().len(), MAX_QUERY_RESULTS);

        let filter = ElementFilter::visible().text_containing(["checkout"]);
        let found = page.query_matching("div", &filter).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].token, "f251");
    }

    #[tokio::test]
    async fn text_pseudo_classes_are_not_css() {
        let page = FakePage::with_elements(vec![FakeElement::new("button").text("Go")]);
        assert!(page.query("button:has-text(\"Go\")").await.is_err());
    }
}
