//! Bounded synthetic interactions that nudge a page into loading its media

use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use crate::page::{ElementFilter, ElementRef, PageHandle};

/// One way of finding something worth clicking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionRule {
    /// CSS selector of a known control
    Selector(&'static str),
    /// Case-insensitive keyword in a clickable element's text or `aria-label`
    Keyword(&'static str),
}

/// Rules in priority order: known player controls first, then keyword matches
pub const INTERACTION_RULES: &[InteractionRule] = &[
    InteractionRule::Selector(".jw-icon-playback"),
    InteractionRule::Selector(".jw-display-icon-container"),
    InteractionRule::Selector(".vjs-big-play-button"),
    InteractionRule::Selector(".plyr__control--overlaid"),
    InteractionRule::Selector(".fp-play"),
    InteractionRule::Selector("button[aria-label*=\"Play\"]"),
    InteractionRule::Selector("[class*=\"play-button\"]"),
    InteractionRule::Selector("[class*=\"play-btn\"]"),
    InteractionRule::Selector("[data-server]"),
    InteractionRule::Selector(".server-item"),
    InteractionRule::Keyword("play"),
    InteractionRule::Keyword("watch"),
    InteractionRule::Keyword("server"),
    InteractionRule::Keyword("stream"),
    InteractionRule::Keyword("download"),
];

/// Elements keyword rules look at
const CLICKABLE: &str = "button, a, [role=\"button\"], [onclick]";

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionSummary {
    /// Iterations that found at least one new target
    pub iterations: usize,
    /// Descriptions of clicked elements, in click order
    pub clicked: Vec<String>,
    /// Clicks that failed and were skipped
    pub failed: usize,
}

/// Anchors that would navigate the page away are never clicked
fn stays_on_page(element: &ElementRef) -> bool {
    if element.tag != "a" {
        return true;
    }
    match element.attr("href") {
        None => true,
        Some(href) => {
            let href = href.trim();
            href.is_empty() || href.starts_with('#') || href.starts_with("javascript:")
        }
    }
}

/// Visible matches of a rule, narrowed in the page so filler elements cannot crowd out
/// the control behind the result cap
async fn targets_for(page: &dyn PageHandle, rule: InteractionRule) -> Vec<ElementRef> {
    let (selector, filter) = match rule {
        InteractionRule::Selector(selector) => (selector, ElementFilter::visible()),
        InteractionRule::Keyword(keyword) => (
            CLICKABLE,
            ElementFilter::visible()
                .text_containing([keyword])
                .attributes_containing(&["aria-label"], [keyword]),
        ),
    };
    match page.query_matching(selector, &filter).await {
        Ok(found) => found,
        Err(e) => {
            debug!("Interaction rule {:?} failed: {}", rule, e);
            Vec::new()
        }
    }
}

/// Run up to `max_iterations` passes over `rules`
///
/// Each pass clicks the first not-yet-clicked visible target of every rule, then waits
/// `settle` for the page to react. A pass that finds no new target ends the loop. Click
/// failures are counted and otherwise ignored.
pub async fn drive(
    page: &dyn PageHandle,
    rules: &[InteractionRule],
    max_iterations: usize,
    settle: Duration,
) -> InteractionSummary {
    let mut summary = InteractionSummary::default();
    let mut tried: HashSet<String> = HashSet::new();

    for iteration in 0..max_iterations {
        let mut found_any = false;

        for &rule in rules {
            let targets = targets_for(page, rule).await;
            let Some(target) = targets
                .into_iter()
                .find(|e| stays_on_page(e) && !tried.contains(&e.token))
            else {
                continue;
            };

            found_any = true;
            tried.insert(target.token.clone());
            match page.click(&target).await {
                Ok(()) => {
                    debug!("Interaction {} clicked {}", iteration + 1, target.describe());
                    summary.clicked.push(target.describe());
                }
                Err(e) => {
                    debug!("Interaction click on {} failed: {}", target.describe(), e);
                    summary.failed += 1;
                }
            }
        }

        if !found_any {
            break;
        }
        summary.iterations += 1;
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::fake::{FakeElement, FakePage};

    #[test]
    fn selector_rules_precede_keyword_rules() {
        let first_keyword = INTERACTION_RULES
            .iter()
            .position(|r| matches!(r, InteractionRule::Keyword(_)))
            .unwrap();
        assert!(
            INTERACTION_RULES[first_keyword..]
                .iter()
                .all(|r| matches!(r, InteractionRule::Keyword(_)))
        );
    }

    #[tokio::test]
    async fn clicks_known_controls_then_stops() {
        let page = FakePage::with_elements(vec![
            FakeElement::new("div").class("vjs-big-play-button"),
            FakeElement::new("button").text("Server 2"),
            FakeElement::new("a").attr("href", "https://elsewhere.example").text("Play elsewhere"),
        ]);

        let summary = drive(&page, INTERACTION_RULES, 3, Duration::ZERO).await;
        assert_eq!(summary.clicked.len(), 2);
        assert_eq!(summary.iterations, 1);
        assert_eq!(page.clicks(), vec!["f1", "f2"]);
    }

    #[tokio::test]
    async fn stops_immediately_when_nothing_matches() {
        let page = FakePage::with_elements(vec![FakeElement::new("p").text("article")]);
        let summary = drive(&page, INTERACTION_RULES, 3, Duration::ZERO).await;
        assert_eq!(summary.iterations, 0);
        assert!(summary.clicked.is_empty());
    }

    #[tokio::test]
    async fn keyword_target_behind_many_links_is_still_clicked() {
        let mut elements: Vec<FakeElement> = (0..250)
            .map(|i| FakeElement::new("a").attr("href", "#").text(&format!("Episode {i}")))
            .collect();
        elements.push(FakeElement::new("button").text("Play"));
        let page = FakePage::with_elements(elements);

        let summary = drive(&page, INTERACTION_RULES, 1, Duration::ZERO).await;
        assert_eq!(page.clicks(), vec!["f251"]);
        assert_eq!(summary.clicked, vec!["<button \"Play\">".to_string()]);
    }

    #[tokio::test]
    async fn failed_clicks_are_swallowed() {
        let page = FakePage::with_elements(vec![FakeElement::new("button").text("Play")]);
        page.fail_clicks();

        let summary = drive(&page, INTERACTION_RULES, 3, Duration::ZERO).await;
        assert_eq!(summary.failed, 1);
        assert!(summary.clicked.is_empty());
        assert_eq!(summary.iterations, 1);
    }
}
