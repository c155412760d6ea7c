use async_trait::async_trait;
use serde::Deserialize;

use crate::llm_client::prompts::{truncate_chars, JSON_ONLY_SYSTEM};
use crate::llm_client::LlmClient;
use crate::matching::prompts::{MATCH_PROMPT_TEMPLATE, MAX_DESCRIPTION_CHARS};
use crate::matching::{JudgeRequest, Judgment, MatchJudge, ScoringError};

/// Match judge backed by the Anthropic Messages API.
pub struct LlmJudge(pub LlmClient);

#[derive(Debug, Deserialize)]
struct RawJudgment {
    should_apply: bool,
    confidence: u32,
    #[serde(default)]
    reason: String,
}

#[async_trait]
impl MatchJudge for LlmJudge {
    async fn judge(&self, request: &JudgeRequest) -> Result<Judgment, ScoringError> {
        let prompt = build_match_prompt(request);
        let raw: RawJudgment = self
            .0
            .complete_json(&request.model_name, JSON_ONLY_SYSTEM, &prompt)
            .await?;
        validate(raw)
    }
}

fn build_match_prompt(request: &JudgeRequest) -> String {
    MATCH_PROMPT_TEMPLATE
        .replace("{preference}", request.preference_statement.trim())
        .replace("{title}", request.listing_title.trim())
        .replace(
            "{description}",
            truncate_chars(request.description_text.trim(), MAX_DESCRIPTION_CHARS),
        )
}

fn validate(raw: RawJudgment) -> Result<Judgment, ScoringError> {
    let confidence =
        u8::try_from(raw.confidence).map_err(|_| ScoringError::OutOfRange(raw.confidence))?;
    if confidence > 100 {
        return Err(ScoringError::OutOfRange(raw.confidence));
    }
    let reason = if raw.reason.trim().is_empty() {
        "no reason given".to_string()
    } else {
        raw.reason.trim().to_string()
    };
    Ok(Judgment {
        should_apply: raw.should_apply,
        confidence,
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::LlmError;

    fn request(description: &str) -> JudgeRequest {
        JudgeRequest {
            listing_title: "Менеджер з продажу".to_string(),
            description_text: description.to_string(),
            preference_statement: "Remote B2B sales roles only".to_string(),
            model_name: "claude-sonnet-4-5".to_string(),
        }
    }

    #[test]
    fn test_prompt_carries_all_inputs() {
        let prompt = build_match_prompt(&request("Cold calls and CRM"));
        assert!(prompt.contains("Remote B2B sales roles only"));
        assert!(prompt.contains("Менеджер з продажу"));
        assert!(prompt.contains("Cold calls and CRM"));
        assert!(!prompt.contains("{description}"));
    }

    #[test]
    fn test_prompt_truncates_long_descriptions() {
        let long = "x".repeat(MAX_DESCRIPTION_CHARS + 500);
        let prompt = build_match_prompt(&request(&long));
        assert!(prompt.len() < MATCH_PROMPT_TEMPLATE.len() + MAX_DESCRIPTION_CHARS + 200);
    }

    #[test]
    fn test_parse_valid_response() {
        let raw: RawJudgment = serde_json::from_str(
            r#"{"should_apply": true, "confidence": 93, "reason": "Good fit"}"#,
        )
        .unwrap();
        let judgment = validate(raw).unwrap();
        assert!(judgment.should_apply);
        assert_eq!(judgment.confidence, 93);
        assert_eq!(judgment.reason, "Good fit");
    }

    #[test]
    fn test_confidence_above_100_is_rejected() {
        let raw: RawJudgment =
            serde_json::from_str(r#"{"should_apply": true, "confidence": 150}"#).unwrap();
        assert!(matches!(validate(raw), Err(ScoringError::OutOfRange(150))));
    }

    #[test]
    fn test_api_failures_map_to_scoring_errors() {
        let quota = ScoringError::from(LlmError::Quota {
            status: 429,
            message: "slow down".into(),
        });
        assert!(matches!(quota, ScoringError::Quota(_)));

        let rejected = ScoringError::from(LlmError::Rejected {
            status: 401,
            message: "invalid x-api-key".into(),
        });
        assert!(matches!(rejected, ScoringError::Misconfigured(m) if m.contains("invalid x-api-key")));

        let malformed = ScoringError::from(LlmError::Malformed("no text in response".into()));
        assert!(matches!(malformed, ScoringError::Malformed(m) if m == "no text in response"));
    }

    #[test]
    fn test_missing_verdict_is_a_parse_error() {
        let parsed = serde_json::from_str::<RawJudgment>(r#"{"confidence": 50}"#);
        assert!(parsed.is_err());
    }
}
