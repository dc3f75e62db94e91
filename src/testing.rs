//! In-memory fakes for the driver, model and parser seams.

use crate::driver::{Driver, ElementHandle, Locator, Session};
use crate::llm::TextGenerator;
use crate::parser::InstructionParser;
use crate::{Action, Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Canned model replies.
pub struct FakeGenerator {
    reply: std::result::Result<String, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeGenerator {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            reply: Err(msg.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(Error::Model)
    }
}

/// Returns the scripted outputs in order, repeating the last one.
pub struct ScriptedParser {
    outputs: Vec<Vec<Action>>,
    calls: AtomicUsize,
}

impl ScriptedParser {
    pub fn always(actions: Vec<Action>) -> Self {
        Self::sequence(vec![actions])
    }

    pub fn sequence(outputs: Vec<Vec<Action>>) -> Self {
        Self {
            outputs,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InstructionParser for ScriptedParser {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn parse(&self, _instruction: &str) -> Vec<Action> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let i = n.min(self.outputs.len().saturating_sub(1));
        self.outputs.get(i).cloned().unwrap_or_default()
    }
}

#[derive(Clone)]
struct FakeElement {
    locator: Locator,
    handle: ElementHandle,
    appears_after: Duration,
}

/// Page behaviour shared by every session a [`FakeDriver`] opens.
#[derive(Clone, Default)]
struct FakePage {
    elements: Vec<FakeElement>,
    broken_locators: Vec<Locator>,
    fail_open: bool,
    panic_on_open: bool,
    panic_on_close: bool,
    fail_goto: bool,
    goto_delay: Option<Duration>,
    fail_click: bool,
    panic_on_click: bool,
    fail_screenshot: bool,
}

#[derive(Default)]
struct Stats {
    opened: AtomicUsize,
    closed: AtomicUsize,
    log: Mutex<Vec<String>>,
}

impl Stats {
    fn record(&self, entry: String) {
        if let Ok(mut log) = self.log.lock() {
            log.push(entry);
        }
    }
}

/// Scriptable in-memory browser.
///
/// Elements are keyed by the exact [`Locator`] that finds them and can be
/// made to appear some time after the session opens.
#[derive(Default)]
pub struct FakeDriver {
    page: FakePage,
    stats: Arc<Stats>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_element(self, locator: Locator, selector: &str) -> Self {
        self.with_delayed_element(locator, selector, Duration::ZERO)
    }

    pub fn with_delayed_element(mut self, locator: Locator, selector: &str, after: Duration) -> Self {
        self.page.elements.push(FakeElement {
            locator,
            handle: ElementHandle {
                selector: selector.to_string(),
                tag: "input".to_string(),
                text: String::new(),
            },
            appears_after: after,
        });
        self
    }

    /// Probing with `locator` returns an error.
    pub fn with_broken_locator(mut self, locator: Locator) -> Self {
        self.page.broken_locators.push(locator);
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.page.fail_open = true;
        self
    }

    pub fn panicking_open(mut self) -> Self {
        self.page.panic_on_open = true;
        self
    }

    /// Close counts the session, then panics.
    pub fn panicking_close(mut self) -> Self {
        self.page.panic_on_close = true;
        self
    }

    pub fn failing_goto(mut self) -> Self {
        self.page.fail_goto = true;
        self
    }

    pub fn slow_goto(mut self, delay: Duration) -> Self {
        self.page.goto_delay = Some(delay);
        self
    }

    pub fn failing_click(mut self) -> Self {
        self.page.fail_click = true;
        self
    }

    pub fn panicking_click(mut self) -> Self {
        self.page.panic_on_click = true;
        self
    }

    pub fn failing_screenshot(mut self) -> Self {
        self.page.fail_screenshot = true;
        self
    }

    pub fn opened(&self) -> usize {
        self.stats.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.stats.closed.load(Ordering::SeqCst)
    }

    /// Every driver call, in order, e.g. `goto https://...`, `fill #q=rust`.
    pub fn log(&self) -> Vec<String> {
        self.stats.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// A session outside any workflow, for executor and resolver tests.
    pub fn session(&self) -> FakeSession {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        FakeSession {
            page: self.page.clone(),
            stats: self.stats.clone(),
            opened_at: Instant::now(),
            url: Mutex::new("about:blank".to_string()),
        }
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn open(&self) -> Result<Box<dyn Session>> {
        if self.page.panic_on_open {
            panic!("browser process crashed on launch");
        }
        if self.page.fail_open {
            return Err(Error::ActionFailed("could not launch browser".into()));
        }
        Ok(Box::new(self.session()))
    }
}

pub struct FakeSession {
    page: FakePage,
    stats: Arc<Stats>,
    opened_at: Instant,
    url: Mutex<String>,
}

#[async_trait]
impl Session for FakeSession {
    async fn goto(&self, url: &str) -> Result<()> {
        self.stats.record(format!("goto {}", url));
        if let Some(delay) = self.page.goto_delay {
            tokio::time::sleep(delay).await;
        }
        if self.page.fail_goto {
            return Err(Error::ActionFailed("net::ERR_NAME_NOT_RESOLVED".into()));
        }
        if let Ok(mut current) = self.url.lock() {
            *current = url.to_string();
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.lock().map(|u| u.clone()).unwrap_or_default())
    }

    async fn find(&self, locator: &Locator) -> Result<Option<ElementHandle>> {
        if self.page.broken_locators.contains(locator) {
            return Err(Error::ActionFailed(format!("probe {} failed", locator)));
        }
        let elapsed = self.opened_at.elapsed();
        Ok(self
            .page
            .elements
            .iter()
            .find(|e| &e.locator == locator && e.appears_after <= elapsed)
            .map(|e| e.handle.clone()))
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.stats.record(format!("click {}", element.selector));
        if self.page.panic_on_click {
            panic!("driver crashed while clicking {}", element.selector);
        }
        if self.page.fail_click {
            return Err(Error::ActionFailed("element is detached".into()));
        }
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.stats.record(format!("fill {}={}", element.selector, text));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<()> {
        self.stats.record(format!("press {}", key));
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        if self.page.fail_screenshot {
            return Err(Error::ActionFailed("screenshot failed".into()));
        }
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.stats.closed.fetch_add(1, Ordering::SeqCst);
        self.stats.record("close".to_string());
        if self.page.panic_on_close {
            panic!("browser process crashed on close");
        }
        Ok(())
    }
}
