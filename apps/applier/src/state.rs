use std::sync::Arc;

use crate::config::Config;
use crate::errors::RunError;
use crate::ledger::Ledger;
use crate::llm_client::LlmClient;
use crate::matching::{LlmJudge, MatchScorer};
use crate::surface::SelectorRegistry;

/// Everything a run shares, built once at startup.
pub struct AppState {
    pub config: Config,
    pub ledger: Arc<dyn Ledger>,
    /// Keyword-only unless `USE_LLM_SCORING` is on.
    pub scorer: MatchScorer,
    pub selectors: SelectorRegistry,
}

impl AppState {
    /// Builds the scorer from `config`, loading the preference statement
    /// (text or résumé PDF) when the language model is enabled.
    pub fn new(config: Config, ledger: Arc<dyn Ledger>) -> Result<Self, RunError> {
        let rules = config.search.keyword_rules();
        let min_confidence = config.search.min_match_confidence;

        let scorer = match &config.llm {
            None => MatchScorer::keyword_only(rules, min_confidence),
            Some(llm) => {
                let preference = llm
                    .preference
                    .load()
                    .map_err(|e| RunError::Config(format!("{e:#}")))?;
                let judge = Arc::new(LlmJudge(LlmClient::new(llm.api_key.clone())));
                MatchScorer::with_judge(
                    rules,
                    judge,
                    preference,
                    llm.model.clone(),
                    config.search.scoring_mode,
                    min_confidence,
                )
            }
        };

        Ok(Self {
            config,
            ledger,
            scorer,
            selectors: SelectorRegistry::work_ua(),
        })
    }
}
