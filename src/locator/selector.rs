//! Selector analysis for the fallback strategies
//!
//! Pure string work: pulling text hints and keywords out of a (possibly stale) selector,
//! generating structurally relaxed variants, inferring the targeted tag, and building a
//! reusable selector for a resolved element.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::page::ElementRef;

/// `:has-text("..")`, `:contains('..')`, `:text(..)`, `:text-is(..)`
static TEXT_PSEUDO: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#":(?:has-text|contains|text-is|text)\(\s*["']?([^"')]+)["']?\s*\)"#)
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Quoted attribute values whose attribute usually carries human text
static TEXT_ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\[\s*(?:aria-label|title|alt|placeholder|value)\s*[*^$~|]?=\s*["']([^"']+)["']\s*\]"#)
        .unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

static PSEUDO_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":[a-zA-Z-]+").unwrap_or_else(|e| unreachable!("static regex: {e}")));

static CAMEL_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([a-z0-9])([A-Z])").unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Tokens that say nothing about which element was meant
const NOISE_WORDS: &[&str] = &[
    "btn", "div", "span", "button", "input", "form", "class", "type", "name", "role", "aria",
    "label", "data", "testid", "test", "has", "text", "contains", "nth", "child", "first",
    "last", "of", "not", "icon", "container", "wrapper", "primary", "secondary", "main",
    "item", "col", "row", "the", "and", "for", "li", "ul", "h1", "h2", "h3", "img", "svg",
    "textarea", "select", "option", "section", "nav", "header", "footer",
];

/// Everything the fallback strategies derive from a primary selector
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorAnalysis {
    /// The selector as given
    pub selector: String,
    /// Explicit human text carried by the selector
    pub text_hints: Vec<String>,
    /// Lowercase semantic words from ids, classes and attribute values
    pub keywords: Vec<String>,
    /// Tag the selector most likely targeted
    pub target_tag: Option<String>,
}

impl SelectorAnalysis {
    pub fn of(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            text_hints: text_hints(selector),
            keywords: extract_keywords(selector),
            target_tag: infer_tag(selector),
        }
    }
}

/// Explicit text carried by the selector (`text=Submit`, `:has-text("Submit")`, `[aria-label="Submit"]`)
pub fn text_hints(selector: &str) -> Vec<String> {
    let mut hints = Vec::new();
    let trimmed = selector.trim();

    if let Some(rest) = trimmed.strip_prefix("text=") {
        let hint = rest.trim().trim_matches(|c| c == '"' || c == '\'');
        if !hint.is_empty() {
            hints.push(hint.to_string());
        }
    }

    for caps in TEXT_PSEUDO.captures_iter(trimmed) {
        push_unique(&mut hints, caps[1].trim());
    }
    for caps in TEXT_ATTRIBUTE.captures_iter(trimmed) {
        push_unique(&mut hints, caps[1].trim());
    }
    hints
}

/// Semantic keywords, e.g. `#submit-btn` → `["submit"]`, `.loginForm input[name=userEmail]` → `["login", "user", "email"]`
pub fn extract_keywords(selector: &str) -> Vec<String> {
    let without_pseudo_names = PSEUDO_NAME.replace_all(selector, " ");
    let split_camel = CAMEL_BOUNDARY.replace_all(&without_pseudo_names, "$1 $2");

    let cleaned: String = split_camel
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut keywords = Vec::new();
    for word in cleaned.split_whitespace() {
        let word = word.to_lowercase();
        if word.len() > 2
            && !word.chars().all(|c| c.is_ascii_digit())
            && !NOISE_WORDS.contains(&word.as_str())
        {
            push_unique(&mut keywords, &word);
        }
    }
    keywords
}

/// Tag the selector targeted, explicit or implied by its vocabulary
pub fn infer_tag(selector: &str) -> Option<String> {
    let last = split_top_level(selector.split(',').next_back().unwrap_or(selector), |c| {
        c.is_whitespace() || c == '>' || c == '+' || c == '~'
    })
    .pop()?;
    let explicit: String = last
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase();
    if !explicit.is_empty() && explicit != "text" {
        return Some(explicit);
    }

    let lower = selector.to_lowercase();
    let implies = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    if implies(&["btn", "button", "submit", "play", "login", "signin", "buy"]) {
        Some("button".to_string())
    } else if implies(&["email", "search", "password", "field", "query", "username", "input"]) {
        Some("input".to_string())
    } else if implies(&["textarea", "comment", "message"]) {
        Some("textarea".to_string())
    } else if implies(&["dropdown", "select"]) {
        Some("select".to_string())
    } else if implies(&["link", "href"]) {
        Some("a".to_string())
    } else {
        None
    }
}

/// Broader variants of a selector, least relaxed first
///
/// Drops the id of the targeted compound, then its trailing qualifiers, and drops
/// leading ancestor segments. Every variant keeps at least one id/class/attribute
/// qualifier on the targeted element; bare tags are left to the tag fallback.
pub fn relaxed_variants(selector: &str) -> Vec<String> {
    const MAX_VARIANTS: usize = 12;

    let mut variants = Vec::new();
    if selector.trim_start().starts_with("text=") {
        return variants;
    }

    for part in split_top_level(selector, |c| c == ',') {
        let chain = split_top_level(&part, |c| c.is_whitespace() || c == '>' || c == '+' || c == '~');
        let Some((target, ancestors)) = chain.split_last() else {
            continue;
        };

        let (tag, qualifiers) = split_compound(target);
        let mut forms = Vec::new();
        let mut current: Vec<String> = qualifiers.clone();
        forms.push(current.clone());
        if let Some(pos) = current.iter().position(|q| q.starts_with('#'))
            && current.len() > 1
        {
            current.remove(pos);
            forms.push(current.clone());
        }
        while current.len() > 1 {
            current.pop();
            forms.push(current.clone());
        }

        for form in forms.iter().filter(|f| !f.is_empty()) {
            let compound = format!("{tag}{}", form.concat());
            for skip in 0..=ancestors.len() {
                let mut segments: Vec<&str> = ancestors[skip..].iter().map(String::as_str).collect();
                segments.push(&compound);
                let candidate = segments.join(" ");
                if candidate != part.trim() && !variants.contains(&candidate) {
                    variants.push(candidate);
                }
            }
        }
    }

    variants.truncate(MAX_VARIANTS);
    variants
}

/// A plain CSS selector the agent can reuse for a resolved element
///
/// Prefers an id, then identifying attributes, then classes, then descriptive
/// attributes. Text is never encoded; the result always parses as CSS.
pub fn selector_for(element: &ElementRef) -> String {
    if let Some(id) = element.id.as_deref().filter(|id| is_css_ident(id)) {
        return format!("#{id}");
    }
    for attr in ["data-testid", "name", "aria-label", "placeholder"] {
        if let Some(value) = element.attr(attr).filter(|v| !v.is_empty()) {
            return format!("{}[{attr}=\"{}\"]", element.tag, escape_value(value));
        }
    }
    let classes: Vec<&str> = element.classes().filter(|c| is_css_ident(c)).take(2).collect();
    if !classes.is_empty() {
        return format!("{}.{}", element.tag, classes.join("."));
    }
    for attr in ["type", "role", "title", "alt", "href"] {
        if let Some(value) = element.attr(attr).filter(|v| !v.is_empty()) {
            return format!("{}[{attr}=\"{}\"]", element.tag, escape_value(value));
        }
    }
    element.tag.clone()
}

pub(crate) fn escape_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn is_css_ident(value: &str) -> bool {
    let mut chars = value.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '-')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !value.is_empty() && !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}

/// Split a compound like `button#go.primary[type=submit]` into `("button", ["#go", ".primary", "[type=submit]"])`
///
/// Text pseudo-classes are not CSS and are dropped.
fn split_compound(compound: &str) -> (String, Vec<String>) {
    let chars: Vec<char> = compound.chars().collect();
    let mut i = 0;
    let mut tag = String::new();
    while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '*') {
        tag.push(chars[i]);
        i += 1;
    }

    let mut qualifiers = Vec::new();
    while i < chars.len() {
        let start = i;
        match chars[i] {
            '[' => {
                while i < chars.len() && chars[i] != ']' {
                    i += 1;
                }
                i = (i + 1).min(chars.len());
            }
            ':' => {
                i += 1;
                while i < chars.len() && !matches!(chars[i], '#' | '.' | '[' | ':' | '(') {
                    i += 1;
                }
                if i < chars.len() && chars[i] == '(' {
                    let mut depth = 0;
                    while i < chars.len() {
                        match chars[i] {
                            '(' => depth += 1,
                            ')' => {
                                depth -= 1;
                                if depth == 0 {
                                    i += 1;
                                    break;
                                }
                            }
                            _ => {}
                        }
                        i += 1;
                    }
                }
            }
            _ => {
                i += 1;
                while i < chars.len() && !matches!(chars[i], '#' | '.' | '[' | ':') {
                    i += 1;
                }
            }
        }
        let qualifier: String = chars[start..i].iter().collect();
        if !TEXT_PSEUDO.is_match(&qualifier) {
            qualifiers.push(qualifier);
        }
    }
    (tag, qualifiers)
}

/// Split on separators outside brackets, parentheses and quotes
pub(crate) fn split_top_level(input: &str, is_separator: impl Fn(char) -> bool) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for c in input.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, c) if depth == 0 && is_separator(c) => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(c);
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_drop_css_noise() {
        assert_eq!(extract_keywords("#submit-btn"), vec!["submit"]);
        assert_eq!(
            extract_keywords("form.loginForm input[name=userEmail]"),
            vec!["login", "user", "email"]
        );
    }

    #[test]
    fn text_hints_cover_pseudo_and_attribute_forms() {
        assert_eq!(text_hints("text=Sign in"), vec!["Sign in"]);
        assert_eq!(text_hints("button:has-text(\"Play now\")"), vec!["Play now"]);
        assert_eq!(text_hints("[aria-label='Close dialog']"), vec!["Close dialog"]);
        assert!(text_hints("#submit-btn").is_empty());
    }

    #[test]
    fn infer_tag_prefers_explicit_tag() {
        assert_eq!(infer_tag("div.actions button.primary").as_deref(), Some("button"));
        assert_eq!(infer_tag("#submit-btn").as_deref(), Some("button"));
        assert_eq!(infer_tag("#user-email").as_deref(), Some("input"));
        assert_eq!(infer_tag("#banner"), None);
    }

    #[test]
    fn relaxed_variants_keep_a_qualifier() {
        let variants = relaxed_variants("form#login .actions button#go.primary.large");
        assert_eq!(variants[0], ".actions button#go.primary.large");
        assert!(variants.contains(&"button.primary.large".to_string()));
        assert!(variants.contains(&"button.primary".to_string()));
        assert!(!variants.contains(&"button".to_string()));
    }

    #[test]
    fn selector_for_prefers_stable_attributes() {
        let mut element = ElementRef {
            token: "r1".into(),
            tag: "button".into(),
            id: None,
            text: "Submit".into(),
            attributes: Default::default(),
            visible: true,
        };
        assert_eq!(selector_for(&element), "button");
        element.attributes.insert("type".into(), "submit".into());
        assert_eq!(selector_for(&element), "button[type=\"submit\"]");
        element.attributes.insert("class".into(), "btn primary wide".into());
        assert_eq!(selector_for(&element), "button.btn.primary");
        element.attributes.insert("name".into(), "go".into());
        assert_eq!(selector_for(&element), "button[name=\"go\"]");
        element.id = Some("send".into());
        assert_eq!(selector_for(&element), "#send");
    }
}
