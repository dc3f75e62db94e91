//! Keyword rules. Deterministic and closed-world: a clause either matches one
//! of the intents below or is reported as unmatched.

use crate::sites::SiteDirectory;
use crate::{Action, Error, Result};
use regex::Regex;
use tracing::debug;

/// Rule output plus the clauses no rule recognised.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOutcome {
    pub actions: Vec<Action>,
    pub unmatched: Vec<String>,
}

impl RuleOutcome {
    /// Every clause was recognised.
    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }
}

/// Verbs that start a new clause. A fragment after `and` that starts with
/// anything else belongs to the clause before it ("salt and pepper").
const CLAUSE_VERBS: &[&str] = &[
    "open", "go", "goto", "navigate", "visit", "load", "browse", "search", "type", "enter",
    "fill", "input", "write", "click", "tap", "press", "hit", "submit", "verify", "check",
    "assert", "ensure", "confirm", "expect", "wait", "see", "log", "login", "sign",
];

/// Clauses whose trailing words are a value or an element name and may
/// legitimately contain `and` ("Save and Continue").
const OPEN_ENDED_VERBS: &[&str] = &[
    "search", "type", "enter", "fill", "input", "write", "log", "login", "sign", "click", "tap",
];

/// Navigation targets that mean "the browser itself" and need no action.
const BROWSER_WORDS: &[&str] = &["browser", "a browser", "the browser", "chrome", "a new tab", "new tab"];

struct Intents {
    split: Regex,
    navigate: Regex,
    search: Regex,
    search_site_first: Regex,
    search_on: Regex,
    type_into: Regex,
    fill_with: Regex,
    press_key: Regex,
    click: Regex,
    verify: Regex,
    wait_for: Regex,
    login: Regex,
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Config(format!("invalid rule pattern: {}", e)))
}

impl Intents {
    fn new() -> Result<Self> {
        Ok(Self {
            split: compile(r"(?i)\s*(?:[,;]|\band\s+then\b|\bthen\b|\band\b)\s*")?,
            navigate: compile(
                r"(?i)^(?:open|go\s+to|goto|navigate\s+to|visit|load|browse\s+to)\s+(.+)$",
            )?,
            search: compile(r"(?i)^search\s+(?:for\s+)?(.+)$")?,
            search_site_first: compile(r"(?i)^search\s+(\S+)\s+for\s+(.+)$")?,
            search_on: compile(r"(?i)^(.+)\s+on\s+(.+)$")?,
            type_into: compile(
                r"(?i)^(?:type|enter|input|write|fill\s+in|fill)\s+(.+?)\s+(?:into|in|on)\s+(?:the\s+)?(.+)$",
            )?,
            fill_with: compile(r"(?i)^fill(?:\s+in)?\s+(?:the\s+)?(.+?)\s+with\s+(.+)$")?,
            press_key: compile(
                r"(?i)^(?:press|hit)\s+(?:the\s+)?(enter|return|tab|escape|esc)(?:\s+key)?$",
            )?,
            click: compile(r"(?i)^(?:click|tap|press|hit|submit)\s+(?:on\s+)?(?:the\s+)?(.+)$")?,
            verify: compile(
                r"(?i)^(?:verify|check|assert|ensure|confirm|expect)\s+(?:that\s+)?(?:the\s+)?(.+?)(?:\s+(?:is|are)\s+(?:visible|displayed|shown|present))?$",
            )?,
            wait_for: compile(r"(?i)^(?:wait\s+for|see)\s+(?:the\s+)?(.+)$")?,
            login: compile(
                r"(?i)^(?:log\s*in|sign\s*in)(?:\s+(?:with|using|as)\s+(?:username\s+)?(\S+)\s+and\s+(?:password\s+)?(\S+))?$",
            )?,
        })
    }
}

/// Regex intent matcher over instruction clauses.
pub struct RuleParser {
    sites: SiteDirectory,
    intents: Intents,
}

impl RuleParser {
    pub fn new(sites: SiteDirectory) -> Result<Self> {
        Ok(Self {
            sites,
            intents: Intents::new()?,
        })
    }

    /// Split an instruction into clauses, keeping original casing.
    pub fn clauses<'a>(&self, instruction: &'a str) -> Vec<&'a str> {
        let text = instruction.trim();
        let mut spans: Vec<(usize, usize)> = Vec::new();
        let quoted = quoted_ranges(text);
        let mut start = 0;
        for sep in self.intents.split.find_iter(text) {
            if quoted.iter().any(|&(qs, qe)| sep.start() > qs && sep.start() < qe) {
                continue;
            }
            spans.push((start, sep.start()));
            start = sep.end();
        }
        spans.push((start, text.len()));

        let mut merged: Vec<(usize, usize)> = Vec::new();
        for (s, e) in spans {
            if text[s..e].trim().is_empty() {
                continue;
            }
            if let Some(prev) = merged.last_mut() {
                if !starts_with_any(&text[s..e], CLAUSE_VERBS)
                    && starts_with_any(&text[prev.0..prev.1], OPEN_ENDED_VERBS)
                {
                    prev.1 = e;
                    continue;
                }
            }
            merged.push((s, e));
        }

        merged
            .into_iter()
            .map(|(s, e)| text[s..e].trim())
            .collect()
    }

    /// Match every clause against the intents.
    pub fn parse_rules(&self, instruction: &str) -> RuleOutcome {
        let mut outcome = RuleOutcome::default();
        for clause in self.clauses(instruction) {
            match self.match_clause(clause) {
                Some(actions) => {
                    debug!("rule matched '{}' -> {} action(s)", clause, actions.len());
                    outcome.actions.extend(actions);
                }
                None => {
                    debug!("no rule for '{}'", clause);
                    outcome.unmatched.push(clause.to_string());
                }
            }
        }
        outcome
    }

    fn match_clause(&self, clause: &str) -> Option<Vec<Action>> {
        let clause = clause.trim_end_matches(['.', '!']).trim();
        let i = &self.intents;

        if let Some(c) = i.login.captures(clause) {
            let mut actions = Vec::with_capacity(3);
            if let (Some(user), Some(pass)) = (c.get(1), c.get(2)) {
                actions.push(Action::type_text("username", unquote(user.as_str())));
                actions.push(Action::type_text("password", unquote(pass.as_str())));
            }
            actions.push(Action::click("login button"));
            return Some(actions);
        }

        if let Some(c) = i.search_site_first.captures(clause) {
            let site = &c[1];
            if self.sites.knows(site) {
                return Some(vec![
                    Action::navigate(site),
                    Action::type_text("search box", unquote(&c[2])),
                    Action::press("Enter"),
                ]);
            }
        }

        if let Some(c) = i.search.captures(clause) {
            let query = &c[1];
            let mut actions = Vec::with_capacity(3);
            // Only a trailing "on <known site>" names a site; "books on
            // machine learning" is all query.
            match i.search_on.captures(query) {
                Some(on) if self.sites.knows(on[2].trim()) => {
                    actions.push(Action::navigate(on[2].trim()));
                    actions.push(Action::type_text("search box", unquote(&on[1])));
                }
                _ => actions.push(Action::type_text("search box", unquote(query))),
            }
            actions.push(Action::press("Enter"));
            return Some(actions);
        }

        if let Some(c) = i.navigate.captures(clause) {
            let target = c[1].trim();
            if BROWSER_WORDS.contains(&target.to_lowercase().as_str()) {
                return Some(Vec::new());
            }
            return Some(vec![Action::navigate(unquote(target))]);
        }

        if let Some(c) = i.fill_with.captures(clause) {
            return Some(vec![Action::type_text(c[1].trim(), unquote(&c[2]))]);
        }

        if let Some(c) = i.type_into.captures(clause) {
            return Some(vec![Action::type_text(c[2].trim(), unquote(&c[1]))]);
        }

        if let Some(c) = i.press_key.captures(clause) {
            return Some(vec![Action::press(key_name(&c[1]))]);
        }

        if let Some(c) = i.click.captures(clause) {
            return Some(vec![Action::click(unquote(&c[1]))]);
        }

        if let Some(c) = i.verify.captures(clause).or_else(|| i.wait_for.captures(clause)) {
            return Some(vec![Action::verify(unquote(&c[1]))]);
        }

        None
    }
}

fn starts_with_any(clause: &str, verbs: &[&str]) -> bool {
    let first = clause
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();
    verbs.contains(&first.as_str())
}

/// Byte ranges of quoted spans, quotes included. A `'` only opens at a word
/// start and only closes at a word end, so apostrophes are left alone.
fn quoted_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut open: Option<(char, usize)> = None;
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        let next = chars.peek().map(|&(_, n)| n);
        match open {
            None => {
                let opens = match c {
                    '"' | '`' => true,
                    '\'' => prev.map_or(true, char::is_whitespace),
                    _ => false,
                };
                if opens {
                    open = Some((c, i));
                }
            }
            Some((q, start)) if c == q => {
                if q != '\'' || next.map_or(true, |n| !n.is_alphanumeric()) {
                    ranges.push((start, i + c.len_utf8()));
                    open = None;
                }
            }
            Some(_) => {}
        }
        prev = Some(c);
    }
    ranges
}

fn unquote(s: &str) -> String {
    s.trim()
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .to_string()
}

fn key_name(key: &str) -> &'static str {
    match key.to_lowercase().as_str() {
        "tab" => "Tab",
        "escape" | "esc" => "Escape",
        _ => "Enter",
    }
}
