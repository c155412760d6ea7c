// Prompt constants for the match judge.
// Reuses the JSON-only system prompt from llm_client::prompts.

/// Longest description excerpt sent to the model, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 6000;

/// Match prompt template. Replace `{preference}`, `{title}` and
/// `{description}` before sending.
pub const MATCH_PROMPT_TEMPLATE: &str = r#"You screen job postings for a candidate who applies automatically.
Decide whether the candidate should apply to the posting below.

CANDIDATE PREFERENCES:
{preference}

JOB POSTING:
Title: {title}
Description:
{description}

Return a JSON object with this EXACT schema (no extra fields):
{
  "should_apply": true,
  "confidence": 0,
  "reason": "One or two sentences."
}

Rules:
- "confidence" is an integer from 0 to 100: how sure you are the posting fits the preferences.
- Set "should_apply" to false if the posting conflicts with any hard preference (location, seniority, field, language), whatever the confidence.
- Judge only from the text above. Do NOT assume details the posting does not state.
- The posting may be written in Ukrainian, Russian or English. Write "reason" in English."#;
