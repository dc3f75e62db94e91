//! # eoka-pilot
//!
//! Natural-language browser testing. Type an instruction, get a step-by-step
//! pass/fail report.
//!
//! An instruction is parsed (by keyword rules or a hosted model) into a short
//! list of [`Action`]s, each action is resolved against the live page through
//! cascading locator strategies, and the whole parse+execute cycle is retried
//! on failure up to a fixed budget.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use eoka_pilot::{Config, Workflow};
//!
//! # #[tokio::main]
//! # async fn main() -> eoka_pilot::Result<()> {
//! let config = Config::load("configs/pilot.yaml")?;
//! let workflow = Workflow::from_config(&config)?;
//! let report = workflow.run("open google and search for laptops").await;
//! println!("{}", report);
//! # Ok(())
//! # }
//! ```

mod action;
mod config;
pub mod driver;
pub mod llm;
pub mod parser;
mod report;
mod runner;
pub mod script;
mod sites;

#[cfg(test)]
mod testing;

pub use action::{Action, ActionKind};
pub use config::{
    ArtifactConfig, BrowserConfig, Config, ModelConfig, ParserConfig, ParserMode, ProviderConfig,
    TimeoutConfig, Viewport, WorkflowConfig,
};
pub use report::{Diagnostic, FailureKind, Report, Status, StepResult};
pub use runner::{
    candidates, NormalizedTarget, Phase, Resolution, Resolver, RetryState, StepContext,
    StepExecutor, Workflow,
};
pub use sites::SiteDirectory;

/// Result type for eoka-pilot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised inside the pipeline layers.
///
/// These never escape [`Workflow::run`]; they are folded into the
/// [`Report`] as failed steps or a report-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model error: {0}")]
    Model(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("element not found: {0}")]
    NotFound(String),

    #[error("action failed: {0}")]
    ActionFailed(String),
}

/// Run `fut` with a deadline, mapping expiry to [`Error::Timeout`].
pub(crate) async fn bounded<T, F>(ms: u64, what: &str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(std::time::Duration::from_millis(ms), fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout(format!("{} did not finish within {}ms", what, ms))),
    }
}
