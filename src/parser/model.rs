//! Model-backed parsing: prompt a [`TextGenerator`] and decode the JSON it
//! returns.

use super::extract::extract_value;
use crate::llm::TextGenerator;
use crate::{bounded, Action};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

const PROMPT: &str = r#"You are a browser test instruction parser.

Convert the user instruction into an ordered list of browser actions.

Allowed actions:
- navigate (target: site name or URL)
- click (target: description of the element)
- type (target: description of the input, value: text to enter)
- verify (target: text or CSS selector that must become visible)
- press (key: Enter, Tab or Escape)

Examples:
"open google and search for laptops" ->
[{"action": "navigate", "target": "google"}, {"action": "type", "target": "search box", "value": "laptops"}, {"action": "press", "key": "Enter"}]
"log in as admin with password admin123" ->
[{"action": "type", "target": "username", "value": "admin"}, {"action": "type", "target": "password", "value": "admin123"}, {"action": "click", "target": "login button"}]

Every "type" step MUST have a "value".
Do not emit wait, sleep, screenshot or assert_url steps: every step already
waits for its element, and URL checks are not supported.

User instruction:
{instruction}

Return ONLY a JSON array, no explanation."#;

/// Parses instructions with a text generator.
pub struct ModelParser {
    generator: Arc<dyn TextGenerator>,
    timeout_ms: u64,
}

impl ModelParser {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout_ms: u64) -> Self {
        Self {
            generator,
            timeout_ms,
        }
    }

    /// Prompt sent for `instruction`.
    pub fn prompt(instruction: &str) -> String {
        PROMPT.replace("{instruction}", instruction.trim())
    }

    /// Never fails: transport, timeout and decoding problems all collapse
    /// into a single [`Action::Error`].
    pub async fn parse(&self, instruction: &str) -> Vec<Action> {
        let prompt = Self::prompt(instruction);
        let text = match bounded(self.timeout_ms, "model call", self.generator.generate(&prompt)).await
        {
            Ok(text) => text,
            Err(e) => {
                warn!("model parse failed: {}", e);
                return vec![Action::error(format!("model call failed: {}", e))];
            }
        };
        debug!("model output: {} chars", text.len());
        decode_steps(&text)
    }
}

/// Decode model output into actions, all-or-nothing.
pub fn decode_steps(text: &str) -> Vec<Action> {
    let Some(value) = extract_value(text) else {
        return vec![Action::error(format!(
            "model output contains no JSON: {}",
            excerpt(text)
        ))];
    };

    let steps = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => match obj.get("steps").or_else(|| obj.get("actions")) {
            Some(Value::Array(items)) => items.as_slice(),
            Some(other) => {
                return vec![Action::error(format!(
                    "expected a list of steps, got {}",
                    other
                ))]
            }
            None => std::slice::from_ref(&value),
        },
        other => {
            return vec![Action::error(format!(
                "expected a list of steps, got {}",
                other
            ))]
        }
    };

    let mut actions = Vec::with_capacity(steps.len());
    for step in steps {
        for action in Action::expand_value(step) {
            if action.is_error() {
                return vec![action];
            }
            actions.push(action);
        }
    }
    actions
}

fn excerpt(text: &str) -> String {
    let s: String = text.chars().take(80).collect();
    if text.chars().count() > 80 {
        format!("{}...", s)
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeGenerator;
    use crate::ActionKind;
    use std::time::Duration;

    #[test]
    fn accepts_array_object_and_single_step() {
        let array = r#"[{"action":"navigate","target":"github"},{"action":"click","target":"Sign in"}]"#;
        assert_eq!(
            decode_steps(array),
            vec![Action::navigate("github"), Action::click("Sign in")]
        );

        let wrapped = r#"Here you go: {"steps": [{"action": "verify", "target": "Welcome"}]}"#;
        assert_eq!(decode_steps(wrapped), vec![Action::verify("Welcome")]);

        let single = "```json\n{\"action\": \"press\", \"key\": \"Tab\"}\n```";
        assert_eq!(decode_steps(single), vec![Action::press("Tab")]);
    }

    #[test]
    fn search_steps_expand() {
        let actions = decode_steps(r#"[{"action":"search","engine":"google","query":"laptops"}]"#);
        assert_eq!(
            actions,
            vec![
                Action::navigate("google"),
                Action::type_text("search box", "laptops"),
                Action::press("Enter"),
            ]
        );
    }

    #[test]
    fn malformed_output_is_a_single_error() {
        let actions = decode_steps("I'm sorry, I can't help with that.");
        assert_eq!(actions.len(), 1);
        assert!(actions[0].is_error());

        let actions = decode_steps(r#"[{"action":"navigate","target":"x"}"#);
        assert_eq!(actions.len(), 1);
        assert!(actions[0].is_error());

        let actions = decode_steps(r#"{"steps": "open google"}"#);
        assert!(actions[0].is_error());
    }

    #[test]
    fn one_bad_step_poisons_the_list() {
        let actions = decode_steps(
            r#"[{"action":"navigate","target":"google"},{"action":"type","target":"search box"}]"#,
        );
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind(), ActionKind::Error);
        assert!(actions[0].target().contains("no value"));
    }

    #[test]
    fn pauses_are_dropped_not_fatal() {
        let actions = decode_steps(
            r#"[{"action":"navigate","target":"github"},{"action":"WAIT","duration":3000},{"action":"click","target":"Sign in"}]"#,
        );
        assert_eq!(actions, vec![Action::navigate("github"), Action::click("Sign in")]);
        assert!(ModelParser::prompt("x").contains("assert_url"));
    }

    #[test]
    fn prompt_embeds_instruction() {
        let prompt = ModelParser::prompt("  open bing  ");
        assert!(prompt.contains("User instruction:\nopen bing\n"));
        assert!(!prompt.contains("{instruction}"));
    }

    #[tokio::test]
    async fn parse_uses_generator_output() {
        let gen = Arc::new(FakeGenerator::replying(
            r#"[{"action":"navigate","target":"flipkart"}]"#,
        ));
        let parser = ModelParser::new(gen.clone(), 1_000);
        assert_eq!(parser.parse("go shopping").await, vec![Action::navigate("flipkart")]);
        assert_eq!(gen.calls(), 1);
    }

    #[tokio::test]
    async fn generator_failure_is_an_error_action() {
        let parser = ModelParser::new(Arc::new(FakeGenerator::failing("503")), 1_000);
        let actions = parser.parse("anything").await;
        assert_eq!(actions.len(), 1);
        assert!(actions[0].target().contains("503"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_generator_times_out() {
        let gen = FakeGenerator::replying("[]").with_delay(Duration::from_secs(60));
        let parser = ModelParser::new(Arc::new(gen), 30_000);
        let actions = parser.parse("open google").await;
        assert_eq!(actions.len(), 1);
        assert!(actions[0].is_error());
        assert!(actions[0].target().contains("30000ms"));
    }
}
