//! Instruction parsing: natural language in, [`Action`] list out.
//!
//! Two strategies sit behind one [`InstructionParser`] seam. [`RuleParser`]
//! handles the common phrasings deterministically; [`ModelParser`] asks a
//! hosted model for anything else. [`HybridParser`] routes between them.

mod extract;
mod model;
mod rules;

pub use extract::{extract_json, extract_value};
pub use model::{decode_steps, ModelParser};
pub use rules::{RuleOutcome, RuleParser};

use crate::config::{Config, ParserMode};
use crate::llm::{FallbackGenerator, TextGenerator};
use crate::sites::SiteDirectory;
use crate::{Action, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Turns an instruction into actions.
///
/// Never fails. Problems are reported in-band as [`Action::Error`].
#[async_trait]
pub trait InstructionParser: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn parse(&self, instruction: &str) -> Vec<Action>;
}

#[async_trait]
impl InstructionParser for RuleParser {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn parse(&self, instruction: &str) -> Vec<Action> {
        self.parse_rules(instruction).actions
    }
}

#[async_trait]
impl InstructionParser for ModelParser {
    fn name(&self) -> &'static str {
        "model"
    }

    async fn parse(&self, instruction: &str) -> Vec<Action> {
        ModelParser::parse(self, instruction).await
    }
}

/// Rules first, model for what the rules don't cover.
pub struct HybridParser {
    rules: RuleParser,
    model: Option<ModelParser>,
    mode: ParserMode,
    route_min_words: usize,
}

impl HybridParser {
    pub fn new(
        rules: RuleParser,
        model: Option<ModelParser>,
        mode: ParserMode,
        route_min_words: usize,
    ) -> Self {
        Self {
            rules,
            model,
            mode,
            route_min_words,
        }
    }

    /// Build from config. No model parser is created when no provider is
    /// configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let sites = SiteDirectory::new(&config.sites, config.test_page.as_deref());
        let rules = RuleParser::new(sites)?;
        let providers = &config.parser.model.providers;
        let model = if providers.is_empty() {
            None
        } else {
            // Each provider gets the full model timeout; the parse as a whole
            // may spend it once per provider.
            let fallback = FallbackGenerator::from_providers(providers, config.timeouts.model)?;
            let budget = fallback.budget_ms().unwrap_or(config.timeouts.model);
            let generator: Arc<dyn TextGenerator> = Arc::new(fallback);
            Some(ModelParser::new(generator, budget))
        };
        Ok(Self::new(
            rules,
            model,
            config.parser.mode,
            config.parser.route_min_words,
        ))
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }
}

#[async_trait]
impl InstructionParser for HybridParser {
    fn name(&self) -> &'static str {
        match self.mode {
            ParserMode::Auto => "auto",
            ParserMode::Rules => "rules",
            ParserMode::Model => "model",
        }
    }

    async fn parse(&self, instruction: &str) -> Vec<Action> {
        match self.mode {
            ParserMode::Rules => self.rules.parse_rules(instruction).actions,
            ParserMode::Model => match self.model {
                Some(ref model) => model.parse(instruction).await,
                None => vec![Action::error("parser mode is 'model' but no model is configured")],
            },
            ParserMode::Auto => {
                let outcome = self.rules.parse_rules(instruction);
                if outcome.is_complete() {
                    debug!("rules cover the instruction ({} actions)", outcome.actions.len());
                    return outcome.actions;
                }
                let words = instruction.split_whitespace().count();
                match self.model {
                    Some(ref model) if words >= self.route_min_words => {
                        debug!(
                            "routing to model: {} unmatched clause(s), {} words",
                            outcome.unmatched.len(),
                            words
                        );
                        model.parse(instruction).await
                    }
                    _ => {
                        debug!(
                            "keeping partial rule output, unmatched: {:?}",
                            outcome.unmatched
                        );
                        outcome.actions
                    }
                }
            }
        }
    }
}
