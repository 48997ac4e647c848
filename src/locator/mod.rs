//! Resilient element locator
//!
//! Resolves one element from a selector that may be stale. The primary selector is tried
//! first; on a miss the fallback strategies run in a fixed order, each against the live
//! DOM, and the first hit wins:
//!
//! 1. `text-match`: text hints or keywords from the selector against visible text
//! 2. `structural-relax`: the selector with ids, trailing qualifiers and ancestors dropped
//! 3. `attribute-fuzzy`: keywords against `aria-label`, `data-testid`, `name`, ...
//! 4. `tag-fallback`: first visible element of the inferred tag
//!
//! Nothing is cached between calls: the same selector on the same DOM always resolves the
//! same element, and a changed DOM is always re-queried.

pub mod selector;
mod strategies;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::page::{ElementRef, PageHandle};
use selector::SelectorAnalysis;
use strategies::{Attempt, fallback_chain};

/// How an element was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    Primary,
    TextMatch,
    StructuralRelax,
    AttributeFuzzy,
    TagFallback,
}

impl Strategy {
    /// Fallbacks in the order they are tried after the primary selector
    pub const FALLBACK_ORDER: [Strategy; 4] = [
        Strategy::TextMatch,
        Strategy::StructuralRelax,
        Strategy::AttributeFuzzy,
        Strategy::TagFallback,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Primary => "primary",
            Strategy::TextMatch => "text-match",
            Strategy::StructuralRelax => "structural-relax",
            Strategy::AttributeFuzzy => "attribute-fuzzy",
            Strategy::TagFallback => "tag-fallback",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved element. Valid until the DOM changes; never cache it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatorResult {
    pub element: ElementRef,
    /// Selector that actually matched (reusable by the caller)
    pub used_selector: String,
    pub strategy: Strategy,
}

/// Record of one fallback strategy that did not resolve anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyAttempt {
    pub strategy: Strategy,
    /// Selectors or text patterns the strategy tried
    pub tried: Vec<String>,
    pub outcome: String,
}

#[derive(Debug, Clone, Error)]
pub enum LocatorError {
    #[error("No element found for '{selector}' (primary selector and {} fallback strategies missed)", .attempts.len())]
    NotFound {
        selector: String,
        /// Why the primary query failed, when it errored rather than matched nothing
        primary_error: Option<String>,
        /// One entry per fallback strategy, in the order tried
        attempts: Vec<StrategyAttempt>,
    },
}

impl LocatorError {
    /// Multi-line explanation of what each strategy tried
    pub fn diagnostics(&self) -> String {
        let LocatorError::NotFound {
            selector,
            primary_error,
            attempts,
        } = self;

        let mut out = match primary_error {
            Some(err) => format!("primary '{selector}': {err}\n"),
            None => format!("primary '{selector}': no matching element\n"),
        };
        for attempt in attempts {
            out.push_str(&format!("{}: {}", attempt.strategy, attempt.outcome));
            if !attempt.tried.is_empty() {
                out.push_str(&format!(" (tried {})", attempt.tried.join(", ")));
            }
            out.push('\n');
        }
        out
    }

    pub fn attempts(&self) -> &[StrategyAttempt] {
        let LocatorError::NotFound { attempts, .. } = self;
        attempts
    }
}

/// Stateless element resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct Locator;

impl Locator {
    pub async fn locate(
        &self,
        page: &dyn PageHandle,
        selector: &str,
    ) -> Result<LocatorResult, LocatorError> {
        let primary_error = match page.query(selector).await {
            Ok(found) => {
                if let Some(element) = found.into_iter().next() {
                    return Ok(LocatorResult {
                        element,
                        used_selector: selector.to_string(),
                        strategy: Strategy::Primary,
                    });
                }
                None
            }
            Err(e) => {
                debug!("Primary selector '{}' failed: {}", selector, e);
                Some(e.to_string())
            }
        };

        let analysis = SelectorAnalysis::of(selector);
        let mut attempts = Vec::with_capacity(Strategy::FALLBACK_ORDER.len());

        for strategy in fallback_chain() {
            match strategy.attempt(page, &analysis).await {
                Attempt::Found {
                    element,
                    used_selector,
                } => {
                    info!(
                        "Selector '{}' healed via {} as '{}'",
                        selector,
                        strategy.kind(),
                        used_selector
                    );
                    return Ok(LocatorResult {
                        element,
                        used_selector,
                        strategy: strategy.kind(),
                    });
                }
                Attempt::Missed(attempt) => {
                    debug!("{} missed for '{}': {}", attempt.strategy, selector, attempt.outcome);
                    attempts.push(attempt);
                }
            }
        }

        Err(LocatorError::NotFound {
            selector: selector.to_string(),
            primary_error,
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::fake::{FakeElement, FakePage};

    #[tokio::test]
    async fn primary_selector_wins_when_it_matches() {
        let page = FakePage::with_elements(vec![
            FakeElement::new("button").id("go").text("Go"),
            FakeElement::new("button").text("Go"),
        ]);

        let found = Locator.locate(&page, "#go").await.unwrap();
        assert_eq!(found.strategy, Strategy::Primary);
        assert_eq!(found.used_selector, "#go");
        assert_eq!(found.element.id.as_deref(), Some("go"));
    }

    #[tokio::test]
    async fn stale_id_heals_through_text_match() {
        let page = FakePage::with_elements(vec![
            FakeElement::new("div").text("Please submit your answers below"),
            FakeElement::new("button").text("Submit"),
        ]);

        let found = Locator.locate(&page, "#submit-btn").await.unwrap();
        assert_eq!(found.strategy, Strategy::TextMatch);
        assert_eq!(found.element.text, "Submit");
        assert_eq!(found.element.tag, "button");
    }

    #[tokio::test]
    async fn exhausted_strategies_report_every_attempt() {
        let page = FakePage::with_elements(vec![FakeElement::new("p").text("Nothing to see")]);

        let err = Locator.locate(&page, "#checkout-now").await.unwrap_err();
        let LocatorError::NotFound {
            selector,
            primary_error,
            attempts,
        } = &err;
        assert_eq!(selector, "#checkout-now");
        assert!(primary_error.is_none());
        let order: Vec<Strategy> = attempts.iter().map(|a| a.strategy).collect();
        assert_eq!(order, Strategy::FALLBACK_ORDER.to_vec());
        assert!(err.diagnostics().contains("tag-fallback"));
    }

    #[tokio::test]
    async fn text_match_sees_past_hundreds_of_filler_elements() {
        let mut elements: Vec<FakeElement> = (0..250)
            .map(|i| FakeElement::new("div").text(&format!("Row {i}")))
            .collect();
        elements.push(FakeElement::new("button").class("cta").text("Submit"));
        let page = FakePage::with_elements(elements);

        let found = Locator.locate(&page, "#submit-btn").await.unwrap();
        assert_eq!(found.strategy, Strategy::TextMatch);
        assert_eq!(found.element.token, "f251");

        // The reported selector is plain CSS and finds the same element again
        let again = page.query(&found.used_selector).await.unwrap();
        assert_eq!(again.first().map(|e| e.token.as_str()), Some("f251"));
    }

    #[tokio::test]
    async fn attribute_fuzzy_sees_past_hundreds_of_filler_elements() {
        let mut elements: Vec<FakeElement> = (0..250)
            .map(|_| FakeElement::new("div").attr("role", "presentation"))
            .collect();
        elements.push(FakeElement::new("input").attr("aria-label", "Search"));
        let page = FakePage::with_elements(elements);

        let found = Locator.locate(&page, "#search-box-old").await.unwrap();
        assert_eq!(found.strategy, Strategy::AttributeFuzzy);
        assert_eq!(found.used_selector, "input[aria-label=\"Search\"]");
        assert_eq!(found.element.token, "f251");
    }

    #[tokio::test]
    async fn text_match_is_tried_before_attribute_fuzzy() {
        let page = FakePage::with_elements(vec![
            FakeElement::new("input").attr("aria-label", "submit order"),
            FakeElement::new("button").text("Submit"),
        ]);

        let found = Locator.locate(&page, "#submit-btn").await.unwrap();
        assert_eq!(found.strategy, Strategy::TextMatch);
        assert_eq!(found.element.tag, "button");
    }

    #[tokio::test]
    async fn structural_relax_drops_stale_id() {
        let page = FakePage::with_elements(vec![
            FakeElement::new("a").class("nav-item").text("Home"),
            FakeElement::new("a").class("nav-item").class("active").text("Pricing"),
        ]);

        let found = Locator
            .locate(&page, "a#old-link.nav-item.active")
            .await
            .unwrap();
        assert_eq!(found.strategy, Strategy::StructuralRelax);
        assert_eq!(found.used_selector, "a.nav-item.active");
        assert_eq!(found.element.text, "Pricing");
    }

    #[tokio::test]
    async fn structural_relax_keeps_surviving_ancestors_first() {
        let page = FakePage::with_elements(vec![
            FakeElement::new("button").class("play").text("Trailer"),
            FakeElement::new("button")
                .class("play")
                .text("Episode 1")
                .inside(FakeElement::new("div").class("menu")),
        ]);

        let found = Locator
            .locate(&page, "#sidebar .menu button.play")
            .await
            .unwrap();
        assert_eq!(found.strategy, Strategy::StructuralRelax);
        assert_eq!(found.used_selector, ".menu button.play");
        assert_eq!(found.element.text, "Episode 1");
    }

    #[tokio::test]
    async fn attribute_fuzzy_matches_placeholder() {
        let page = FakePage::with_elements(vec![
            FakeElement::new("input").attr("placeholder", "Your email address"),
        ]);

        let found = Locator.locate(&page, "#newsletter-email").await.unwrap();
        assert_eq!(found.strategy, Strategy::AttributeFuzzy);
        assert_eq!(
            found.used_selector,
            "input[placeholder=\"Your email address\"]"
        );
    }

    #[tokio::test]
    async fn tag_fallback_skips_hidden_elements() {
        let page = FakePage::with_elements(vec![
            FakeElement::new("button").hidden(),
            FakeElement::new("button").class("x9"),
        ]);

        let found = Locator.locate(&page, "#zzq-btn").await.unwrap();
        assert_eq!(found.strategy, Strategy::TagFallback);
        assert_eq!(found.used_selector, "button");
        assert!(found.element.visible);
    }

    #[tokio::test]
    async fn invalid_primary_selector_is_recorded_and_fallbacks_run() {
        let page = FakePage::with_elements(vec![FakeElement::new("a").text("Sign in")]);

        let found = Locator.locate(&page, "text=Sign in").await.unwrap();
        assert_eq!(found.strategy, Strategy::TextMatch);
        assert_eq!(found.element.tag, "a");
    }

    #[tokio::test]
    async fn resolution_is_deterministic_and_not_cached() {
        let page = FakePage::with_elements(vec![
            FakeElement::new("button").text("Submit"),
            FakeElement::new("button").text("Submit"),
        ]);

        let first = Locator.locate(&page, "#submit-btn").await.unwrap();
        let second = Locator.locate(&page, "#submit-btn").await.unwrap();
        assert_eq!(first.element, second.element);

        page.remove_all_elements();
        let replacement = page.add_element(FakeElement::new("button").text("Submit"));
        let third = Locator.locate(&page, "#submit-btn").await.unwrap();
        assert_eq!(third.element.token, replacement);
    }
}
