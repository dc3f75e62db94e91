mod executor;
mod resolver;

pub use executor::{StepContext, StepExecutor};
pub use resolver::{candidates, NormalizedTarget, Resolution, Resolver};

use crate::config::Config;
use crate::driver::{Driver, EokaDriver, Session};
use crate::parser::{HybridParser, InstructionParser};
use crate::report::{FailureKind, Report, Status, StepResult};
use crate::{bounded, Action, Result};
use chrono::Utc;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where a workflow run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Parsing,
    Executing,
    Retrying,
    Done(Status),
}

/// Bounded attempt counter for the parse+execute cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub attempt_count: u32,
    pub max_attempts: u32,
}

impl RetryState {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            attempt_count: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Count the attempt that is starting now.
    pub fn begin_attempt(&mut self) {
        self.attempt_count += 1;
    }

    pub fn has_budget(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    /// Next phase after a failed attempt.
    pub fn after_failure(&self) -> Phase {
        if self.has_budget() {
            Phase::Retrying
        } else {
            Phase::Done(Status::Fail)
        }
    }
}

/// Parse, execute, and retry an instruction until it passes or the attempt
/// budget is spent.
pub struct Workflow {
    parser: Arc<dyn InstructionParser>,
    driver: Arc<dyn Driver>,
    executor: StepExecutor,
    max_attempts: u32,
    retry_delay_ms: u64,
    session_ms: u64,
}

impl Workflow {
    /// Workflow over an explicit parser and driver.
    pub fn new(
        parser: Arc<dyn InstructionParser>,
        driver: Arc<dyn Driver>,
        config: &Config,
    ) -> Self {
        Self {
            parser,
            driver,
            executor: StepExecutor::new(config),
            max_attempts: config.workflow.max_attempts,
            retry_delay_ms: config.workflow.retry_delay_ms,
            session_ms: config.timeouts.session,
        }
    }

    /// Hybrid parser plus a real eoka browser, as configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let parser = HybridParser::from_config(config)?;
        let driver = EokaDriver::new(config.browser.clone());
        Ok(Self::new(Arc::new(parser), Arc::new(driver), config))
    }

    pub fn parser(&self) -> &dyn InstructionParser {
        self.parser.as_ref()
    }

    /// Run `instruction` to completion. Never fails: every problem is in
    /// the report.
    pub async fn run(&self, instruction: &str) -> Report {
        let started_at = Utc::now();
        let mut retry = RetryState::new(self.max_attempts);
        let mut phase = Phase::Init;
        let mut actions: Vec<Action> = Vec::new();
        let mut steps: Vec<StepResult> = Vec::new();
        let mut last_error: Option<String> = None;

        let status = loop {
            phase = match phase {
                Phase::Init => Phase::Parsing,
                Phase::Parsing => {
                    retry.begin_attempt();
                    info!(
                        "Attempt {}/{}: parsing with {}",
                        retry.attempt_count,
                        retry.max_attempts,
                        self.parser.name()
                    );
                    actions = match AssertUnwindSafe(self.parser.parse(instruction))
                        .catch_unwind()
                        .await
                    {
                        Ok(actions) => actions,
                        Err(panic) => {
                            let msg = panic_message(panic.as_ref());
                            error!("Parser panicked: {}", msg);
                            vec![Action::error(format!("parser panicked: {}", msg))]
                        }
                    };
                    steps.clear();
                    match actions.first() {
                        None => {
                            info!("Nothing to do for \"{}\"", instruction);
                            Phase::Done(Status::Pass)
                        }
                        Some(Action::Error { reason }) => {
                            warn!("Attempt {} failed to parse: {}", retry.attempt_count, reason);
                            steps.push(StepResult::fail(
                                1,
                                actions[0].clone(),
                                FailureKind::Parse,
                                format!("parse error: {}", reason),
                            ));
                            last_error = Some(format!("parse error: {}", reason));
                            retry.after_failure()
                        }
                        Some(_) => {
                            debug!("Parsed {} action(s)", actions.len());
                            Phase::Executing
                        }
                    }
                }
                Phase::Executing => match self.attempt(instruction, &actions, &mut steps).await {
                    Ok(()) if steps.iter().all(StepResult::passed) => Phase::Done(Status::Pass),
                    Ok(()) => {
                        let detail = steps
                            .iter()
                            .find(|s| !s.passed())
                            .map(|s| format!("step {} failed: {}", s.index, s.detail))
                            .unwrap_or_default();
                        warn!("Attempt {} failed: {}", retry.attempt_count, detail);
                        last_error = Some(detail);
                        retry.after_failure()
                    }
                    Err(e) => {
                        warn!("Attempt {} failed: {}", retry.attempt_count, e);
                        last_error = Some(e);
                        retry.after_failure()
                    }
                },
                Phase::Retrying => {
                    info!("Retry attempt {}/{}", retry.attempt_count + 1, retry.max_attempts);
                    if self.retry_delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(self.retry_delay_ms)).await;
                    }
                    Phase::Parsing
                }
                Phase::Done(status) => break status,
            };
        };

        let error = match status {
            Status::Pass => None,
            Status::Fail => Some(format!(
                "retry budget exhausted after {} attempt{}: {}",
                retry.attempt_count,
                if retry.attempt_count == 1 { "" } else { "s" },
                last_error.unwrap_or_else(|| "unknown failure".into())
            )),
        };
        Report::new(instruction, steps, retry.attempt_count, error, started_at)
    }

    /// Run independent instructions concurrently, one session each.
    pub async fn run_all<S: AsRef<str>>(&self, instructions: &[S]) -> Vec<Report> {
        futures::future::join_all(instructions.iter().map(|i| self.run(i.as_ref()))).await
    }

    /// One execute phase on a fresh session. `Err` only when no session
    /// could be opened; step failures land in `steps`. Driver panics are
    /// contained here, so `run` always gets to build a report.
    async fn attempt(
        &self,
        instruction: &str,
        actions: &[Action],
        steps: &mut Vec<StepResult>,
    ) -> std::result::Result<(), String> {
        let open = AssertUnwindSafe(bounded(self.session_ms, "session launch", self.driver.open()))
            .catch_unwind()
            .await;
        let session = match open {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => return Err(format!("could not open session: {}", e)),
            Err(panic) => {
                let msg = panic_message(panic.as_ref());
                error!("Session launch panicked: {}", msg);
                return Err(format!("could not open session: driver panicked: {}", msg));
            }
        };

        let run = AssertUnwindSafe(self.run_steps(session.as_ref(), instruction, actions, steps))
            .catch_unwind()
            .await;
        if let Err(panic) = run {
            let index = steps.len() + 1;
            let msg = panic_message(panic.as_ref());
            error!("Step {} panicked: {}", index, msg);
            if let Some(action) = actions.get(index - 1) {
                steps.push(StepResult::fail(
                    index,
                    action.clone(),
                    FailureKind::Driver,
                    format!("driver panicked: {}", msg),
                ));
            }
        }

        let close = AssertUnwindSafe(bounded(self.session_ms, "session close", session.close()))
            .catch_unwind()
            .await;
        match close {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to close session: {}", e),
            Err(panic) => warn!("Session close panicked: {}", panic_message(panic.as_ref())),
        }
        Ok(())
    }

    async fn run_steps(
        &self,
        session: &dyn Session,
        instruction: &str,
        actions: &[Action],
        steps: &mut Vec<StepResult>,
    ) {
        for (i, action) in actions.iter().enumerate() {
            let ctx = StepContext::for_step(instruction, actions, i);
            let result = self.executor.execute(session, i + 1, action, &ctx).await;
            let failed = !result.passed();
            steps.push(result);
            if failed {
                break;
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
