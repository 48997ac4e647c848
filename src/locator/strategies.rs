//! Fallback strategies, tried in [`Strategy::FALLBACK_ORDER`] after the primary selector misses

use async_trait::async_trait;
use tracing::debug;

use super::selector::{SelectorAnalysis, escape_value, relaxed_variants};
use super::{Strategy, StrategyAttempt};
use crate::page::{ElementFilter, ElementRef, PageHandle, collapse};

/// Elements likely to carry user-facing text
pub(crate) const TEXT_CANDIDATES: &str = "button, a, input, textarea, select, label, summary, option, [role], \
     li, td, th, span, div, p, h1, h2, h3, h4, h5, h6";

/// Attributes scanned by the fuzzy match, in priority order
const FUZZY_ATTRIBUTES: &[&str] = &[
    "aria-label",
    "data-testid",
    "name",
    "placeholder",
    "title",
    "alt",
    "role",
];

const ATTRIBUTE_CANDIDATES: &str =
    "[aria-label], [data-testid], [name], [placeholder], [title], [alt], [role]";

/// What a single strategy produced
pub(crate) enum Attempt {
    Found {
        element: ElementRef,
        used_selector: String,
    },
    Missed(StrategyAttempt),
}

#[async_trait]
pub(crate) trait FallbackStrategy: Send + Sync {
    fn kind(&self) -> Strategy;

    async fn attempt(&self, page: &dyn PageHandle, analysis: &SelectorAnalysis) -> Attempt;
}

pub(crate) struct TextMatch;
pub(crate) struct StructuralRelax;
pub(crate) struct AttributeFuzzy;
pub(crate) struct TagFallback;

/// Strategies in the order they are tried
pub(crate) fn fallback_chain() -> [&'static dyn FallbackStrategy; 4] {
    [&TextMatch, &StructuralRelax, &AttributeFuzzy, &TagFallback]
}

fn missed(strategy: Strategy, tried: Vec<String>, outcome: impl Into<String>) -> Attempt {
    Attempt::Missed(StrategyAttempt {
        strategy,
        tried,
        outcome: outcome.into(),
    })
}

#[async_trait]
impl FallbackStrategy for TextMatch {
    fn kind(&self) -> Strategy {
        Strategy::TextMatch
    }

    async fn attempt(&self, page: &dyn PageHandle, analysis: &SelectorAnalysis) -> Attempt {
        let hints: &[String] = if analysis.text_hints.is_empty() {
            &analysis.keywords
        } else {
            &analysis.text_hints
        };
        if hints.is_empty() {
            return missed(self.kind(), Vec::new(), "no text could be derived from the selector");
        }

        let tried = hints.iter().map(|h| format!("text~\"{h}\"")).collect();
        let filter = ElementFilter::visible().text_containing(hints);
        let visible = match page.query_matching(TEXT_CANDIDATES, &filter).await {
            Ok(candidates) => candidates,
            Err(e) => return missed(self.kind(), tried, e.to_string()),
        };

        for hint in hints {
            let wanted = collapse(hint);
            let texts: Vec<String> = visible.iter().map(|c| collapse(&c.text)).collect();

            // Exact text beats containment; among containers the tightest text wins, then DOM order
            let exact = texts.iter().position(|t| *t == wanted);
            let contained = || {
                texts
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.contains(&wanted))
                    .min_by_key(|(i, t)| (t.len(), *i))
                    .map(|(i, _)| i)
            };

            if let Some(index) = exact.or_else(contained) {
                let element = visible[index].clone();
                debug!("Text match for '{}' resolved {}", hint, element.describe());
                return Attempt::Found {
                    used_selector: super::selector::selector_for(&element),
                    element,
                };
            }
        }

        missed(
            self.kind(),
            tried,
            format!("none of {} visible candidates carried the text", visible.len()),
        )
    }
}

#[async_trait]
impl FallbackStrategy for StructuralRelax {
    fn kind(&self) -> Strategy {
        Strategy::StructuralRelax
    }

    async fn attempt(&self, page: &dyn PageHandle, analysis: &SelectorAnalysis) -> Attempt {
        let variants = relaxed_variants(&analysis.selector);
        if variants.is_empty() {
            return missed(self.kind(), Vec::new(), "selector has no qualifiers to relax");
        }

        let mut errors = Vec::new();
        for variant in &variants {
            match page.query_matching(variant, &ElementFilter::visible()).await {
                Ok(found) => {
                    if let Some(element) = found.into_iter().next() {
                        return Attempt::Found {
                            element,
                            used_selector: variant.clone(),
                        };
                    }
                }
                Err(e) => errors.push(e.to_string()),
            }
        }

        let outcome = if errors.is_empty() {
            "no visible element matched any relaxed variant".to_string()
        } else {
            format!("no visible match; {} variant(s) failed: {}", errors.len(), errors.join("; "))
        };
        missed(self.kind(), variants, outcome)
    }
}

#[async_trait]
impl FallbackStrategy for AttributeFuzzy {
    fn kind(&self) -> Strategy {
        Strategy::AttributeFuzzy
    }

    async fn attempt(&self, page: &dyn PageHandle, analysis: &SelectorAnalysis) -> Attempt {
        let mut needles: Vec<String> = analysis.keywords.clone();
        for hint in &analysis.text_hints {
            let hint = collapse(hint);
            if !needles.contains(&hint) {
                needles.push(hint);
            }
        }
        if needles.is_empty() {
            return missed(self.kind(), Vec::new(), "no keywords could be derived from the selector");
        }

        let tried = vec![format!("{ATTRIBUTE_CANDIDATES} ~ {}", needles.join("|"))];
        let filter = ElementFilter::visible().attributes_containing(FUZZY_ATTRIBUTES, &needles);
        let candidates = match page.query_matching(ATTRIBUTE_CANDIDATES, &filter).await {
            Ok(candidates) => candidates,
            Err(e) => return missed(self.kind(), tried, e.to_string()),
        };

        for needle in &needles {
            for attr in FUZZY_ATTRIBUTES {
                let hit = candidates.iter().find(|c| {
                    c.attr(attr)
                        .is_some_and(|value| value.to_lowercase().contains(needle.as_str()))
                });
                if let Some(element) = hit {
                    let value = element.attr(attr).unwrap_or_default();
                    return Attempt::Found {
                        used_selector: format!("{}[{attr}=\"{}\"]", element.tag, escape_value(value)),
                        element: element.clone(),
                    };
                }
            }
        }

        missed(
            self.kind(),
            tried,
            format!("no attribute of {} candidates contained a keyword", candidates.len()),
        )
    }
}

#[async_trait]
impl FallbackStrategy for TagFallback {
    fn kind(&self) -> Strategy {
        Strategy::TagFallback
    }

    async fn attempt(&self, page: &dyn PageHandle, analysis: &SelectorAnalysis) -> Attempt {
        let Some(tag) = analysis.target_tag.clone() else {
            return missed(self.kind(), Vec::new(), "no target tag could be inferred");
        };

        match page.query_matching(&tag, &ElementFilter::visible()).await {
            Ok(found) => match found.into_iter().next() {
                Some(element) => Attempt::Found {
                    element,
                    used_selector: tag,
                },
                None => missed(self.kind(), vec![tag], "no visible element with this tag"),
            },
            Err(e) => missed(self.kind(), vec![tag], e.to_string()),
        }
    }
}
