use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// One browser operation derived from an instruction.
///
/// `Type` always carries its payload; anything a parser cannot express as one
/// of these variants becomes [`Action::Error`] so the failure stays visible
/// in the report instead of being dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Load a URL or a known site name.
    Navigate { target: String },
    /// Click the element described by `target`.
    Click { target: String },
    /// Fill the input described by `target` with `value`.
    Type { target: String, value: String },
    /// Wait for `target` (text or selector) to become visible.
    Verify { target: String },
    /// Press a keyboard key on the focused element.
    Press { key: String },
    /// Parse failure marker.
    Error { reason: String },
}

/// Discriminant of [`Action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Verify,
    Press,
    Error,
}

impl ActionKind {
    /// Short name for logging.
    pub fn name(self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Click => "click",
            Self::Type => "type",
            Self::Verify => "verify",
            Self::Press => "press",
            Self::Error => "error",
        }
    }

    /// Map a model-supplied action name onto a kind.
    ///
    /// `search` is not a kind of its own; see [`Action::expand_value`].
    fn from_alias(name: &str) -> Option<Self> {
        let kind = match name.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "navigate" | "open" | "goto" | "go_to" | "open_browser" | "open_website" | "visit"
            | "load" => Self::Navigate,
            "click" | "tap" | "click_button" => Self::Click,
            "type" | "fill" | "enter" | "input" | "type_text" | "fill_input" => Self::Type,
            "verify" | "assert" | "assert_visible" | "assert_text" | "check" | "expect"
            | "wait_for_text" | "wait_for" | "wait_for_visible" | "wait_for_selector" => {
                Self::Verify
            }
            "press" | "press_key" | "key" | "submit" => Self::Press,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const KIND_KEYS: &[&str] = &["action", "type", "kind", "command"];
const TARGET_KEYS: &[&str] = &["target", "url", "selector", "element", "description", "site"];
const VALUE_KEYS: &[&str] = &["value", "text", "query", "input"];

impl Action {
    pub fn navigate(target: impl Into<String>) -> Self {
        Self::Navigate {
            target: target.into(),
        }
    }

    pub fn click(target: impl Into<String>) -> Self {
        Self::Click {
            target: target.into(),
        }
    }

    pub fn type_text(target: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Type {
            target: target.into(),
            value: value.into(),
        }
    }

    pub fn verify(target: impl Into<String>) -> Self {
        Self::Verify {
            target: target.into(),
        }
    }

    pub fn press(key: impl Into<String>) -> Self {
        Self::Press { key: key.into() }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Navigate { .. } => ActionKind::Navigate,
            Self::Click { .. } => ActionKind::Click,
            Self::Type { .. } => ActionKind::Type,
            Self::Verify { .. } => ActionKind::Verify,
            Self::Press { .. } => ActionKind::Press,
            Self::Error { .. } => ActionKind::Error,
        }
    }

    /// Element description, URL, key name, or error text.
    pub fn target(&self) -> &str {
        match self {
            Self::Navigate { target }
            | Self::Click { target }
            | Self::Type { target, .. }
            | Self::Verify { target } => target,
            Self::Press { key } => key,
            Self::Error { reason } => reason,
        }
    }

    /// Payload of a `Type` action; `None` for every other kind.
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::Type { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Decode a single step object, e.g. `{"action": "click", "target": "Login"}`.
    ///
    /// Never fails: anything malformed comes back as [`Action::Error`].
    /// Use [`Action::expand_value`] when the step may describe a compound
    /// intent such as `search`.
    pub fn from_value(value: &Value) -> Action {
        let mut expanded = Self::expand_value(value);
        if expanded.len() == 1 {
            return expanded.remove(0);
        }
        if let Some(err) = expanded.iter().find(|a| a.is_error()) {
            return err.clone();
        }
        Action::error(format!(
            "step expands to {} actions, expected one: {}",
            expanded.len(),
            value
        ))
    }

    /// Decode one step object into the actions it stands for.
    ///
    /// A `search` step becomes `Type("search box", query)` followed by
    /// `Press("Enter")`, preceded by a `Navigate` when it names a site.
    pub fn expand_value(value: &Value) -> Vec<Action> {
        let Some(obj) = value.as_object() else {
            return vec![Action::error(format!("expected step object, got {}", value))];
        };

        let Some(kind_name) = first_str(obj, KIND_KEYS) else {
            return vec![Action::error(format!("step has no action kind: {}", value))];
        };
        let target = first_str(obj, TARGET_KEYS);
        let payload = first_str(obj, VALUE_KEYS);

        if kind_name.trim().eq_ignore_ascii_case("search") {
            let Some(query) = payload.or_else(|| obj.get("q").and_then(Value::as_str)) else {
                return vec![Action::error("search step has no query")];
            };
            let mut actions = Vec::with_capacity(3);
            if let Some(site) = obj
                .get("engine")
                .or_else(|| obj.get("site"))
                .and_then(Value::as_str)
            {
                actions.push(Action::navigate(site));
            }
            actions.push(Action::type_text("search box", query));
            actions.push(Action::press("Enter"));
            return actions;
        }

        // A fixed pause adds nothing: every step already waits, bounded, for
        // its element. A wait that names something is a Verify.
        if is_pause(kind_name) {
            return match payload.or(target) {
                Some(t) if !t.trim().is_empty() => vec![Action::verify(t.trim())],
                _ => Vec::new(),
            };
        }

        let Some(kind) = ActionKind::from_alias(kind_name) else {
            return vec![Action::error(format!("unknown action kind '{}'", kind_name))];
        };

        let action = match kind {
            ActionKind::Navigate => match target {
                Some(t) if !t.trim().is_empty() => Action::navigate(t.trim()),
                _ => Action::error("navigate step has no target"),
            },
            ActionKind::Click => match target.or(payload) {
                Some(t) if !t.trim().is_empty() => Action::click(t.trim()),
                _ => Action::error("click step has no target"),
            },
            ActionKind::Type => match (target, payload) {
                (Some(t), Some(v)) if !t.trim().is_empty() => Action::type_text(t.trim(), v),
                (_, None) => Action::error(format!(
                    "type step for '{}' has no value",
                    target.unwrap_or("?")
                )),
                _ => Action::error("type step has no target"),
            },
            // `assert_text` style steps put the expected text in `text`.
            ActionKind::Verify => match payload.or(target) {
                Some(t) if !t.trim().is_empty() => Action::verify(t.trim()),
                _ => Action::error("verify step has no target"),
            },
            ActionKind::Press => {
                let key = obj
                    .get("key")
                    .and_then(Value::as_str)
                    .or(target)
                    .or(payload)
                    .unwrap_or("Enter");
                Action::press(key)
            }
            ActionKind::Error => unreachable!("from_alias never yields Error"),
        };
        vec![action]
    }
}

fn is_pause(name: &str) -> bool {
    matches!(
        name.trim().to_ascii_lowercase().as_str(),
        "wait" | "sleep" | "pause" | "delay" | "wait_for_timeout"
    )
}

fn first_str<'a>(obj: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigate { target } => write!(f, "navigate '{}'", target),
            Self::Click { target } => write!(f, "click '{}'", target),
            Self::Type { target, value } => write!(f, "type '{}' into '{}'", value, target),
            Self::Verify { target } => write!(f, "verify '{}'", target),
            Self::Press { key } => write!(f, "press {}", key),
            Self::Error { reason } => write!(f, "error: {}", reason),
        }
    }
}
