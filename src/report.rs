use crate::Action;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Outcome of a step or a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Fail,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("PASS"),
            Self::Fail => f.write_str("FAIL"),
        }
    }
}

/// Why a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The parser could not express this part of the instruction.
    Parse,
    /// No locator strategy matched within the wait bound.
    NotFound,
    /// The browser rejected or broke on the call.
    Driver,
    /// A call exceeded its time bound.
    Timeout,
}

/// Screenshot captured when a step fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Written to disk.
    File { path: PathBuf },
    /// `data:image/png;base64,...`
    Inline { data_uri: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path } => write!(f, "screenshot: {}", path.display()),
            Self::Inline { data_uri } => write!(f, "screenshot: inline ({} bytes)", data_uri.len()),
        }
    }
}

/// Outcome of one executed action.
#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    /// 1-based position in the action list.
    pub index: usize,
    pub action: Action,
    pub status: Status,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    /// Only ever set on failed steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
    pub duration_ms: u64,
}

impl StepResult {
    pub fn pass(index: usize, action: Action, detail: impl Into<String>) -> Self {
        Self {
            index,
            action,
            status: Status::Pass,
            detail: detail.into(),
            failure: None,
            diagnostic: None,
            duration_ms: 0,
        }
    }

    pub fn fail(index: usize, action: Action, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            index,
            action,
            status: Status::Fail,
            detail: detail.into(),
            failure: Some(kind),
            diagnostic: None,
            duration_ms: 0,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == Status::Pass
    }

    pub(crate) fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Final result of a workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub instruction: String,
    pub status: Status,
    /// Steps of the last attempt.
    pub steps: Vec<StepResult>,
    /// Attempts made, including the first.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl Report {
    /// Status is derived: Pass iff there is no error and every step passed.
    pub fn new(
        instruction: impl Into<String>,
        steps: Vec<StepResult>,
        attempts: u32,
        error: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let status = if error.is_none() && steps.iter().all(StepResult::passed) {
            Status::Pass
        } else {
            Status::Fail
        };
        let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        Self {
            instruction: instruction.into(),
            status,
            steps,
            attempts,
            error,
            started_at,
            duration_ms,
        }
    }

    pub fn passed(&self) -> bool {
        self.status == Status::Pass
    }

    /// First failed step, if any.
    pub fn first_failure(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| !s.passed())
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.passed() { "✓" } else { "✗" };
        writeln!(f, "{} {} \"{}\"", mark, self.status, self.instruction)?;
        for step in &self.steps {
            let m = if step.passed() { "✓" } else { "✗" };
            write!(
                f,
                "  {} [{}] {} ({}ms)",
                m, step.index, step.action, step.duration_ms
            )?;
            if !step.detail.is_empty() {
                write!(f, " - {}", step.detail)?;
            }
            writeln!(f)?;
            if let Some(ref d) = step.diagnostic {
                writeln!(f, "      {}", d)?;
            }
        }
        if self.steps.is_empty() {
            writeln!(f, "  (no steps)")?;
        }
        if let Some(ref error) = self.error {
            writeln!(f, "  Error: {}", error)?;
        }
        write!(f, "  Attempts: {}  Duration: {}ms", self.attempts, self.duration_ms)
    }
}
