#![allow(dead_code)]

//! Match Scorer: decides per listing whether to apply.
//!
//! Cheap path: `KeywordRules` (pure, deterministic, no network).
//! Expensive path: a `MatchJudge` (the language model), consulted only when the
//! cheap path is inconclusive, or on every listing in `LanguageModelAlways`.
//!
//! A failing judge never turns into "apply": the scorer falls back to the
//! keyword signal, or skips with `SCORING_UNAVAILABLE`.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::llm_client::LlmError;
use crate::models::Listing;

pub mod judge;
pub mod keywords;
pub mod prompts;

pub use judge::LlmJudge;
pub use keywords::{KeywordRules, KeywordSignal};

pub const SCORING_UNAVAILABLE: &str = "scoring unavailable";

// ────────────────────────────────────────────────────────────────────────────
// Output data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Keyword,
    LanguageModel,
    /// The judge failed; the keyword signal (or nothing) decided.
    Fallback,
}

/// Transient per-listing verdict. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchDecision {
    pub should_apply: bool,
    pub confidence: u8, // 0 – 100
    pub reason: String,
    pub source: DecisionSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringMode {
    /// Language model disabled.
    KeywordOnly,
    /// Judge only listings the keyword path can't settle.
    LanguageModelFallback,
    /// Judge every listing.
    LanguageModelAlways,
}

#[derive(Debug, Error)]
pub enum ScoringError {
    /// Rate limited or out of credit. Later listings will likely fail too.
    #[error("Model quota exhausted: {0}")]
    Quota(String),

    #[error("Model unavailable: {0}")]
    Unavailable(String),

    /// Bad key, unknown model. Retrying will not help.
    #[error("Model misconfigured: {0}")]
    Misconfigured(String),

    #[error("Unusable model verdict: {0}")]
    Malformed(String),

    #[error("Confidence {0} is outside 0-100")]
    OutOfRange(u32),
}

impl From<LlmError> for ScoringError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Quota { .. } => ScoringError::Quota(err.to_string()),
            LlmError::Transport(_) | LlmError::Unavailable { .. } => {
                ScoringError::Unavailable(err.to_string())
            }
            LlmError::Rejected { .. } => ScoringError::Misconfigured(err.to_string()),
            LlmError::Malformed(detail) => ScoringError::Malformed(detail),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Judge trait
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct JudgeRequest {
    pub listing_title: String,
    pub description_text: String,
    pub preference_statement: String,
    pub model_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Judgment {
    pub should_apply: bool,
    pub confidence: u8,
    pub reason: String,
}

/// The remote scoring service. Implement this to swap backends without
/// touching the scorer or the walker.
#[async_trait]
pub trait MatchJudge: Send + Sync {
    async fn judge(&self, request: &JudgeRequest) -> Result<Judgment, ScoringError>;
}

// ────────────────────────────────────────────────────────────────────────────
// MatchScorer
// ────────────────────────────────────────────────────────────────────────────

pub struct MatchScorer {
    rules: KeywordRules,
    judge: Option<Arc<dyn MatchJudge>>,
    preference: String,
    model: String,
    mode: ScoringMode,
    /// Apply only when confidence is strictly greater than this.
    min_confidence: u8,
}

impl MatchScorer {
    pub fn keyword_only(rules: KeywordRules, min_confidence: u8) -> Self {
        Self {
            rules,
            judge: None,
            preference: String::new(),
            model: String::new(),
            mode: ScoringMode::KeywordOnly,
            min_confidence,
        }
    }

    pub fn with_judge(
        rules: KeywordRules,
        judge: Arc<dyn MatchJudge>,
        preference: String,
        model: String,
        mode: ScoringMode,
        min_confidence: u8,
    ) -> Self {
        Self {
            rules,
            judge: Some(judge),
            preference,
            model,
            mode,
            min_confidence,
        }
    }

    pub fn mode(&self) -> ScoringMode {
        if self.judge.is_none() {
            ScoringMode::KeywordOnly
        } else {
            self.mode
        }
    }

    pub async fn score(&self, listing: &Listing) -> MatchDecision {
        let signal = self.rules.evaluate(listing);

        let judge = match (&self.judge, self.mode()) {
            (Some(judge), ScoringMode::LanguageModelAlways) => judge,
            (Some(judge), ScoringMode::LanguageModelFallback)
                if !signal.as_ref().is_some_and(|s| s.conclusive) =>
            {
                judge
            }
            _ => return self.from_keywords(signal, DecisionSource::Keyword),
        };

        let request = JudgeRequest {
            listing_title: listing.title.clone(),
            description_text: listing.description_text.clone(),
            preference_statement: self.preference.clone(),
            model_name: self.model.clone(),
        };

        match judge.judge(&request).await {
            Ok(judgment) => {
                debug!(
                    "Model verdict for {}: apply={} confidence={}",
                    listing.url, judgment.should_apply, judgment.confidence
                );
                MatchDecision {
                    should_apply: judgment.should_apply && self.passes(judgment.confidence),
                    confidence: judgment.confidence,
                    reason: judgment.reason,
                    source: DecisionSource::LanguageModel,
                }
            }
            Err(e @ (ScoringError::Quota(_) | ScoringError::Misconfigured(_))) => {
                error!("Match judge failed for {}: {}", listing.url, e);
                self.from_keywords(signal, DecisionSource::Fallback)
            }
            Err(e) => {
                warn!("Match judge failed for {}: {}", listing.url, e);
                self.from_keywords(signal, DecisionSource::Fallback)
            }
        }
    }

    fn passes(&self, confidence: u8) -> bool {
        confidence > self.min_confidence
    }

    fn from_keywords(&self, signal: Option<KeywordSignal>, source: DecisionSource) -> MatchDecision {
        match signal {
            Some(signal) => MatchDecision {
                should_apply: self.passes(signal.confidence),
                confidence: signal.confidence,
                reason: signal.reason,
                source,
            },
            None => MatchDecision {
                should_apply: false,
                confidence: 0,
                reason: SCORING_UNAVAILABLE.to_string(),
                source: DecisionSource::Fallback,
            },
        }
    }
}
