//! Fuzzy element descriptions → one concrete element.
//!
//! A description like "the search box" is expanded into an ordered list of
//! [`Locator`]s, most specific first. The list is swept until one matches or
//! the wait bound runs out.

use crate::bounded;
use crate::config::TimeoutConfig;
use crate::driver::{ElementHandle, Locator, Session};
use crate::ActionKind;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

const FILLER: &[&str] = &[
    "the", "a", "an", "field", "button", "btn", "link", "box", "input", "textbox", "text", "area",
    "element", "icon", "on", "in", "into", "of", "please",
];

/// Element description reduced to its keywords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTarget {
    raw: String,
    words: Vec<String>,
}

impl NormalizedTarget {
    pub fn new(target: &str) -> Self {
        let raw = target.trim().to_string();
        let cleaned: String = raw
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '@' || c == '.' { c } else { ' ' })
            .collect();
        let all: Vec<String> = cleaned.split_whitespace().map(str::to_string).collect();
        let keywords: Vec<String> = all
            .iter()
            .filter(|w| !FILLER.contains(&w.as_str()))
            .cloned()
            .collect();
        let words = if keywords.is_empty() { all } else { keywords };
        Self { raw, words }
    }

    /// Words joined with spaces: "user name".
    pub fn phrase(&self) -> String {
        if self.words.is_empty() {
            return self.raw.to_lowercase();
        }
        self.words.join(" ")
    }

    /// Words joined without separators: "username".
    pub fn compact(&self) -> String {
        if self.words.is_empty() {
            return self.raw.to_lowercase().replace(char::is_whitespace, "");
        }
        self.words.concat()
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

/// Hand-picked selectors for descriptions that show up constantly.
fn known_css(kind: ActionKind, target: &NormalizedTarget) -> &'static [&'static str] {
    let phrase = target.phrase();
    match kind {
        ActionKind::Type if phrase == "search" || phrase.starts_with("search ") => &[
            r#"textarea[name="q"]"#,
            r#"input[name="q"]"#,
            r#"input[type="search"]"#,
            "#twotabsearchtextbox",
            r#"input[name="search_query"]"#,
            r#"input[name*="search" i]"#,
            r#"[data-testid*="search"]"#,
        ],
        ActionKind::Type if phrase == "username" || phrase == "user name" || phrase == "email" => {
            &[
                "#username",
                r#"input[name="username"]"#,
                r#"input[type="email"]"#,
                r#"input[autocomplete="username"]"#,
            ]
        }
        ActionKind::Type if phrase == "password" => &[r#"input[type="password"]"#],
        ActionKind::Click
            if matches!(phrase.as_str(), "login" | "log" | "sign" | "signin" | "submit") =>
        {
            &[
                "#loginBtn",
                r#"button[type="submit"]"#,
                r#"input[type="submit"]"#,
            ]
        }
        _ => &[],
    }
}

/// Whether `target` reads like a CSS selector rather than prose.
fn looks_like_selector(target: &str) -> bool {
    let t = target.trim();
    if t.is_empty() || t.contains(' ') {
        return false;
    }
    t.starts_with('#') || t.starts_with('.') || t.starts_with('[') || (t.contains('[') && t.ends_with(']'))
}

/// Ordered locator strategies for an action's target.
pub fn candidates(kind: ActionKind, target: &str) -> Vec<Locator> {
    let norm = NormalizedTarget::new(target);
    let mut out: Vec<Locator> = Vec::new();

    if looks_like_selector(target) && kind != ActionKind::Verify {
        out.push(Locator::Css(target.trim().to_string()));
    }
    out.extend(
        known_css(kind, &norm)
            .iter()
            .map(|s| Locator::Css(s.to_string())),
    );

    match kind {
        ActionKind::Type => {
            out.push(Locator::IdContains(norm.compact()));
            out.push(Locator::NameContains(norm.compact()));
            out.push(Locator::Placeholder(norm.phrase()));
            out.push(Locator::Label(norm.phrase()));
            out.push(Locator::role("textbox"));
            out.push(Locator::role("combobox"));
            out.push(Locator::AnyInput);
        }
        ActionKind::Click => {
            out.push(Locator::Label(norm.phrase()));
            out.push(Locator::Text(norm.phrase()));
            out.push(Locator::role_named("button", &norm.phrase()));
            out.push(Locator::role_named("link", &norm.phrase()));
            out.push(Locator::IdContains(norm.compact()));
        }
        ActionKind::Verify => {
            if looks_like_selector(target) {
                out.push(Locator::Css(target.trim().to_string()));
            }
            let text = target.trim().trim_matches(|c| c == '"' || c == '\'');
            out.push(Locator::VisibleText(text.to_string()));
        }
        ActionKind::Navigate | ActionKind::Press | ActionKind::Error => {}
    }

    // Keep the first occurrence of each strategy.
    let mut seen: Vec<Locator> = Vec::with_capacity(out.len());
    out.retain(|l| {
        if seen.contains(l) {
            false
        } else {
            seen.push(l.clone());
            true
        }
    });
    out
}

/// What a resolve attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Found {
        handle: ElementHandle,
        locator: Locator,
    },
    /// Every strategy was tried until the deadline.
    NotFound { tried: Vec<Locator> },
}

/// Sweeps locator candidates against a live session.
#[derive(Debug, Clone)]
pub struct Resolver {
    per_strategy_ms: u64,
    verify_ms: u64,
    poll_interval_ms: u64,
    probe_ms: u64,
}

impl Resolver {
    pub fn new(timeouts: &TimeoutConfig) -> Self {
        Self {
            per_strategy_ms: timeouts.element,
            verify_ms: timeouts.verify,
            poll_interval_ms: timeouts.poll_interval,
            probe_ms: timeouts.action,
        }
    }

    /// Total wait for `kind` given `strategies` candidates.
    pub fn deadline_ms(&self, kind: ActionKind, strategies: usize) -> u64 {
        match kind {
            ActionKind::Verify => self.verify_ms,
            _ => self.per_strategy_ms.saturating_mul(strategies.max(1) as u64),
        }
    }

    pub async fn resolve(&self, session: &dyn Session, kind: ActionKind, target: &str) -> Resolution {
        let tried = candidates(kind, target);
        if tried.is_empty() {
            return Resolution::NotFound { tried };
        }
        let wait = Duration::from_millis(self.deadline_ms(kind, tried.len()));
        let poll = Duration::from_millis(self.poll_interval_ms);
        let deadline = Instant::now() + wait;

        loop {
            for locator in &tried {
                match bounded(self.probe_ms, "element probe", session.find(locator)).await {
                    Ok(Some(handle)) => {
                        debug!("'{}' resolved via {}", target, locator);
                        return Resolution::Found {
                            handle,
                            locator: locator.clone(),
                        };
                    }
                    Ok(None) => {}
                    Err(e) => debug!("probe {} failed: {}", locator, e),
                }
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(poll.min(deadline - now)).await;
        }

        debug!("'{}' not found after {:?}", target, wait);
        Resolution::NotFound { tried }
    }
}
