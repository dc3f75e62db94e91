use super::resolver::{Resolution, Resolver};
use crate::config::Config;
use crate::driver::Session;
use crate::report::{Diagnostic, FailureKind, StepResult};
use crate::sites::SiteDirectory;
use crate::{bounded, Action, ActionKind, Error};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use std::path::PathBuf;
use tokio::time::Instant;
use tracing::{info, warn};

/// Per-step facts the executor can't see from the action alone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepContext {
    /// Press Enter after a successful `Type`.
    pub submit_after_type: bool,
}

impl StepContext {
    /// Context for `actions[i]` of a list parsed from `instruction`.
    ///
    /// A search intent implies submitting the typed query unless the next
    /// action already presses a key.
    pub fn for_step(instruction: &str, actions: &[Action], i: usize) -> Self {
        let is_type = matches!(actions.get(i), Some(a) if a.kind() == ActionKind::Type);
        let next_is_press = matches!(actions.get(i + 1), Some(a) if a.kind() == ActionKind::Press);
        Self {
            submit_after_type: is_type
                && !next_is_press
                && mentions_search(instruction),
        }
    }
}

/// `search` as a word of its own; "research" and "searchable" don't count.
fn mentions_search(instruction: &str) -> bool {
    instruction
        .split(|c: char| !c.is_alphanumeric())
        .any(|w| w.eq_ignore_ascii_case("search"))
}

struct StepFailure {
    kind: FailureKind,
    detail: String,
}

impl StepFailure {
    fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl From<Error> for StepFailure {
    fn from(e: Error) -> Self {
        let kind = match e {
            Error::Timeout(_) => FailureKind::Timeout,
            Error::NotFound(_) => FailureKind::NotFound,
            _ => FailureKind::Driver,
        };
        Self::new(kind, e.to_string())
    }
}

/// Runs one [`Action`] against a session and records the outcome.
pub struct StepExecutor {
    resolver: Resolver,
    sites: SiteDirectory,
    navigation_ms: u64,
    action_ms: u64,
    screenshot_dir: Option<PathBuf>,
}

impl StepExecutor {
    pub fn new(config: &Config) -> Self {
        Self {
            resolver: Resolver::new(&config.timeouts),
            sites: SiteDirectory::new(&config.sites, config.test_page.as_deref()),
            navigation_ms: config.timeouts.navigation,
            action_ms: config.timeouts.action,
            screenshot_dir: config.artifacts.screenshot_dir.clone(),
        }
    }

    /// Execute `action` as step `index` (1-based). Never fails; every error
    /// ends up in the returned [`StepResult`].
    pub async fn execute(
        &self,
        session: &dyn Session,
        index: usize,
        action: &Action,
        ctx: &StepContext,
    ) -> StepResult {
        let start = Instant::now();
        info!("Step {}: {}", index, action);

        let mut result = match self.run_action(session, action, ctx).await {
            Ok(detail) => StepResult::pass(index, action.clone(), detail),
            Err(f) => {
                warn!("Step {} failed: {}", index, f.detail);
                StepResult::fail(index, action.clone(), f.kind, f.detail)
            }
        };

        if result.failure.is_some_and(|k| k != FailureKind::Parse) {
            result.diagnostic = self.capture(session, index).await;
        }
        result.with_duration(start.elapsed().as_millis() as u64)
    }

    async fn run_action(
        &self,
        session: &dyn Session,
        action: &Action,
        ctx: &StepContext,
    ) -> Result<String, StepFailure> {
        match action {
            Action::Navigate { target } => {
                let url = self.sites.resolve(target);
                info!("Navigating to: {}", shorten(&url));
                bounded(self.navigation_ms, "navigation", session.goto(&url)).await?;
                let landed = bounded(self.action_ms, "current url", session.current_url())
                    .await
                    .unwrap_or(url);
                Ok(format!("loaded {}", shorten(&landed)))
            }
            Action::Click { target } => {
                let (handle, locator) = self.locate(session, ActionKind::Click, target).await?;
                bounded(self.action_ms, "click", session.click(&handle)).await?;
                Ok(format!("clicked {} via {}", handle.selector, locator))
            }
            Action::Type { target, value } => {
                let (handle, locator) = self.locate(session, ActionKind::Type, target).await?;
                bounded(self.action_ms, "fill", session.fill(&handle, value)).await?;
                if ctx.submit_after_type {
                    bounded(self.action_ms, "key press", session.press_key("Enter")).await?;
                    return Ok(format!("typed into {} via {} and submitted", handle.selector, locator));
                }
                Ok(format!("typed into {} via {}", handle.selector, locator))
            }
            Action::Verify { target } => {
                let (handle, locator) = self.locate(session, ActionKind::Verify, target).await?;
                Ok(format!("'{}' visible at {} via {}", target, handle.selector, locator))
            }
            Action::Press { key } => {
                bounded(self.action_ms, "key press", session.press_key(key)).await?;
                Ok(format!("pressed {}", key))
            }
            Action::Error { reason } => Err(StepFailure::new(
                FailureKind::Parse,
                format!("parse error: {}", reason),
            )),
        }
    }

    async fn locate(
        &self,
        session: &dyn Session,
        kind: ActionKind,
        target: &str,
    ) -> Result<(crate::driver::ElementHandle, crate::driver::Locator), StepFailure> {
        match self.resolver.resolve(session, kind, target).await {
            Resolution::Found { handle, locator } => Ok((handle, locator)),
            Resolution::NotFound { tried } => {
                let strategies: Vec<String> = tried.iter().map(ToString::to_string).collect();
                Err(StepFailure::new(
                    FailureKind::NotFound,
                    format!(
                        "no element matched '{}' within {}ms (tried {})",
                        target,
                        self.resolver.deadline_ms(kind, tried.len()),
                        strategies.join(", ")
                    ),
                ))
            }
        }
    }

    /// Best-effort failure screenshot.
    async fn capture(&self, session: &dyn Session, index: usize) -> Option<Diagnostic> {
        let png = match bounded(self.action_ms, "screenshot", session.screenshot()).await {
            Ok(png) => png,
            Err(e) => {
                warn!("Failed to capture screenshot: {}", e);
                return None;
            }
        };

        let Some(ref dir) = self.screenshot_dir else {
            return Some(Diagnostic::Inline {
                data_uri: format!("data:image/png;base64,{}", STANDARD.encode(&png)),
            });
        };

        let name = format!("step{}_{}.png", index, Utc::now().format("%Y%m%d_%H%M%S"));
        let path = dir.join(name);
        info!("Saving failure screenshot to: {}", path.display());
        if let Err(e) = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, &png)) {
            warn!("Failed to save screenshot: {}", e);
            return None;
        }
        Some(Diagnostic::File { path })
    }
}

/// Data URLs are the whole page; keep logs readable.
fn shorten(url: &str) -> &str {
    if url.starts_with("data:") {
        "bundled test page"
    } else {
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Locator;
    use crate::report::Status;
    use crate::testing::FakeDriver;
    use std::time::Duration;

    fn executor() -> StepExecutor {
        StepExecutor::new(&Config::default())
    }

    #[test]
    fn search_instructions_submit_after_type() {
        let typed = vec![Action::navigate("google"), Action::type_text("search box", "rust")];
        assert!(StepContext::for_step("open google and search for rust", &typed, 1).submit_after_type);
        assert!(!StepContext::for_step("open google and search for rust", &typed, 0).submit_after_type);
        assert!(!StepContext::for_step("type rust into the box", &typed, 1).submit_after_type);

        let pressed = vec![Action::type_text("search box", "rust"), Action::press("Enter")];
        assert!(!StepContext::for_step("search for rust", &pressed, 0).submit_after_type);
    }

    #[test]
    fn search_must_be_a_whole_word() {
        let actions = vec![Action::type_text("research notes", "draft"), Action::click("save")];
        let instruction = "type draft into the research notes field and click save";
        assert!(!StepContext::for_step(instruction, &actions, 0).submit_after_type);
        assert!(!StepContext::for_step("fill the searchable list with x", &actions, 0).submit_after_type);
        assert!(StepContext::for_step("Search: rust, then save", &actions, 0).submit_after_type);
    }

    #[tokio::test(start_paused = true)]
    async fn click_error_is_a_driver_failure_with_screenshot() {
        let driver = FakeDriver::new()
            .with_element(Locator::Text("save".into()), "#save")
            .failing_click();
        let session = driver.session();
        let result = executor()
            .execute(&session, 2, &Action::click("Save"), &StepContext::default())
            .await;

        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.failure, Some(FailureKind::Driver));
        assert!(result.detail.contains("element is detached"), "{}", result.detail);
        assert!(result.diagnostic.is_some());
        assert_eq!(driver.log(), vec!["click #save"]);
    }

    #[tokio::test(start_paused = true)]
    async fn verify_waits_for_async_render() {
        let driver = FakeDriver::new().with_delayed_element(
            Locator::VisibleText("Welcome".into()),
            "#welcome",
            Duration::from_secs(2),
        );
        let session = driver.session();
        let result = executor()
            .execute(&session, 1, &Action::verify("Welcome"), &StepContext::default())
            .await;
        assert_eq!(result.status, Status::Pass, "{}", result.detail);
        assert!(result.diagnostic.is_none());
        assert!(result.duration_ms >= 2_000);
    }

    #[tokio::test(start_paused = true)]
    async fn navigate_uses_site_directory() {
        let driver = FakeDriver::new();
        let session = driver.session();
        let result = executor()
            .execute(&session, 1, &Action::navigate("google"), &StepContext::default())
            .await;
        assert!(result.passed());
        assert_eq!(result.detail, "loaded https://www.google.com");
        assert_eq!(driver.log(), vec!["goto https://www.google.com"]);
    }

    #[tokio::test(start_paused = true)]
    async fn type_fills_and_optionally_submits() {
        let driver = FakeDriver::new().with_element(Locator::Css(r#"textarea[name="q"]"#.into()), "#q");
        let session = driver.session();
        let ctx = StepContext {
            submit_after_type: true,
        };
        let result = executor()
            .execute(&session, 2, &Action::type_text("search box", "laptops"), &ctx)
            .await;
        assert!(result.passed(), "{}", result.detail);
        assert_eq!(driver.log(), vec!["fill #q=laptops", "press Enter"]);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_element_fails_with_inline_screenshot() {
        let session = FakeDriver::new().session();
        let result = executor()
            .execute(&session, 3, &Action::click("Submit"), &StepContext::default())
            .await;
        assert_eq!(result.status, Status::Fail);
        assert_eq!(result.failure, Some(FailureKind::NotFound));
        assert!(result.detail.contains("'Submit'"));
        assert_eq!(
            result.diagnostic,
            Some(Diagnostic::Inline {
                data_uri: "data:image/png;base64,iVBORw==".into()
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn screenshot_goes_to_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.artifacts.screenshot_dir = Some(dir.path().join("shots"));
        let session = FakeDriver::new().failing_goto().session();

        let result = StepExecutor::new(&config)
            .execute(&session, 4, &Action::navigate("example.com"), &StepContext::default())
            .await;
        assert_eq!(result.failure, Some(FailureKind::Driver));
        match result.diagnostic {
            Some(Diagnostic::File { ref path }) => {
                assert!(path.exists());
                let name = path.file_name().unwrap().to_string_lossy();
                assert!(name.starts_with("step4_") && name.ends_with(".png"), "{}", name);
            }
            ref other => panic!("expected a screenshot file, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_capture_keeps_original_failure() {
        let session = FakeDriver::new().failing_goto().failing_screenshot().session();
        let result = executor()
            .execute(&session, 1, &Action::navigate("example.com"), &StepContext::default())
            .await;
        assert_eq!(result.failure, Some(FailureKind::Driver));
        assert!(result.detail.contains("ERR_NAME_NOT_RESOLVED"));
        assert!(result.diagnostic.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_navigation_times_out() {
        let session = FakeDriver::new().slow_goto(Duration::from_secs(120)).session();
        let result = executor()
            .execute(&session, 1, &Action::navigate("github"), &StepContext::default())
            .await;
        assert_eq!(result.failure, Some(FailureKind::Timeout));
    }

    #[tokio::test]
    async fn error_action_is_a_parse_failure() {
        let session = FakeDriver::new().session();
        let result = executor()
            .execute(&session, 1, &Action::error("no JSON"), &StepContext::default())
            .await;
        assert_eq!(result.failure, Some(FailureKind::Parse));
        assert!(result.detail.contains("no JSON"));
        assert!(result.diagnostic.is_none());
    }
}
