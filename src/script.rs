//! Render parsed actions as an eoka-runner automation config, so an
//! instruction can be saved once and replayed without a parser.

use crate::sites::SiteDirectory;
use crate::{Action, Error, Result};
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};

/// Default `wait_for_text` timeout for rendered `Verify` steps.
pub const VERIFY_TIMEOUT_MS: u64 = 5_000;

fn map<const N: usize>(entries: [(&str, Value); N]) -> Value {
    let mut m = Mapping::new();
    for (k, v) in entries {
        m.insert(Value::String(k.to_string()), v);
    }
    Value::Mapping(m)
}

fn s(v: &str) -> Value {
    Value::String(v.to_string())
}

fn is_selector(t: &str) -> bool {
    !t.contains(' ') && (t.starts_with('#') || t.starts_with('.') || t.starts_with('['))
}

/// `text` for prose, `selector` for things that look like CSS.
fn target(t: &str) -> (&'static str, Value) {
    let t = t.trim();
    if is_selector(t) {
        ("selector", s(t))
    } else {
        ("text", s(t))
    }
}

/// Where the script for instruction `index` (0-based) of `total` goes.
/// A single instruction uses `base` as is; several get `name_1.yaml`,
/// `name_2.yaml`, ... next to it.
pub fn script_path(base: &Path, index: usize, total: usize) -> PathBuf {
    if total <= 1 {
        return base.to_path_buf();
    }
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "script".to_string());
    let name = match base.extension() {
        Some(ext) => format!("{}_{}.{}", stem, index + 1, ext.to_string_lossy()),
        None => format!("{}_{}", stem, index + 1),
    };
    base.with_file_name(name)
}

/// Render `actions` as eoka-runner YAML named `name`.
///
/// The first `Navigate` becomes `target.url`; later ones become `goto`
/// steps. Any [`Action::Error`] makes the list unrenderable.
pub fn render(name: &str, actions: &[Action], sites: &SiteDirectory) -> Result<String> {
    if let Some(Action::Error { reason }) = actions.iter().find(|a| a.is_error()) {
        return Err(Error::Config(format!(
            "cannot render a script from a failed parse: {}",
            reason
        )));
    }

    let mut rest = actions;
    let url = match actions.first() {
        Some(Action::Navigate { target }) => {
            rest = &actions[1..];
            sites.resolve(target)
        }
        _ => "about:blank".to_string(),
    };

    let mut steps = Vec::with_capacity(rest.len());
    for action in rest {
        let step = match action {
            Action::Navigate { target } => map([("goto", map([("url", s(&sites.resolve(target)))]))]),
            Action::Click { target: t } => map([("click", map([target(t)]))]),
            Action::Type { target: t, value } => {
                map([("fill", map([target(t), ("value", s(value))]))])
            }
            Action::Verify { target: t } if is_selector(t.trim()) => map([(
                "wait_for_visible",
                map([
                    ("selector", s(t.trim())),
                    ("timeout_ms", Value::Number(VERIFY_TIMEOUT_MS.into())),
                ]),
            )]),
            Action::Verify { target: t } => map([(
                "wait_for_text",
                map([
                    ("text", s(t)),
                    ("timeout_ms", Value::Number(VERIFY_TIMEOUT_MS.into())),
                ]),
            )]),
            Action::Press { key } => map([("press_key", map([("key", s(key))]))]),
            Action::Error { .. } => continue,
        };
        steps.push(step);
    }

    let config = map([
        ("name", s(name)),
        ("target", map([("url", s(&url))])),
        ("actions", Value::Sequence(steps)),
    ]);
    Ok(serde_yaml::to_string(&config)?)
}
