use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::db::models::{AssessmentRow, QuestionRow};
use crate::services::prompt;
use crate::services::providers::ModelProvider;

/// Divisor for approximating prompt-side tokens. Approximate, not
/// billing-grade.
pub(crate) const PROMPT_TOKEN_DIVISOR: usize = 3;

#[derive(Debug, Error)]
pub(crate) enum ModelGradeError {
    #[error("model grading failed after {attempts} attempts: {last_error}")]
    AttemptsExhausted { attempts: u32, input_tokens: i64, last_error: String },
}

#[derive(Debug, Clone)]
pub(crate) struct ModelGrade {
    pub(crate) score: f64,
    pub(crate) feedback: String,
    pub(crate) input_tokens: i64,
    pub(crate) output_tokens: i64,
}

/// Model-grading port used by the pipeline for short-answer items.
#[async_trait]
pub(crate) trait GradeModel: Send + Sync {
    async fn grade(
        &self,
        assessment: &AssessmentRow,
        question: &QuestionRow,
        student_text: &str,
    ) -> Result<ModelGrade, ModelGradeError>;
}

pub(crate) struct LlmGrader {
    provider: Box<dyn ModelProvider>,
    max_retries: u32,
}

impl LlmGrader {
    pub(crate) fn new(provider: Box<dyn ModelProvider>, max_retries: u32) -> Self {
        Self { provider, max_retries }
    }
}

#[async_trait]
impl GradeModel for LlmGrader {
    async fn grade(
        &self,
        assessment: &AssessmentRow,
        question: &QuestionRow,
        student_text: &str,
    ) -> Result<ModelGrade, ModelGradeError> {
        let prompt_text = prompt::build_grading_prompt(assessment, question, student_text);
        let input_tokens = approx_tokens(&prompt_text, PROMPT_TOKEN_DIVISOR);
        let mut last_error = String::from("no attempts made");

        // Each attempt is a fresh call; nothing from a failed response is
        // reused.
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(2_u64.pow(attempt - 1))).await;
            }

            let response = match self.provider.invoke(&prompt_text).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "model invocation failed");
                    last_error = err.to_string();
                    continue;
                }
            };

            let Some(raw) = extract_json(&response.text) else {
                tracing::warn!(attempt, "model response contained no JSON object");
                last_error = String::from("response contained no JSON object");
                continue;
            };

            match parse_grade(raw) {
                Ok((score, feedback)) => {
                    let output_tokens = response.output_tokens.unwrap_or_else(|| {
                        approx_tokens(&response.text, self.provider.token_divisor())
                    });
                    return Ok(ModelGrade { score, feedback, input_tokens, output_tokens });
                }
                Err(err) => {
                    tracing::warn!(attempt, error = %err, "model response failed validation");
                    last_error = err;
                }
            }
        }

        Err(ModelGradeError::AttemptsExhausted {
            attempts: self.max_retries + 1,
            input_tokens,
            last_error,
        })
    }
}

/// Whitespace-stripped character count divided by a provider-specific divisor.
pub(crate) fn approx_tokens(text: &str, divisor: usize) -> i64 {
    let compressed: usize = text.split_whitespace().map(str::len).sum();
    ((compressed + 2) / divisor) as i64
}

/// Pulls the outermost JSON object out of a response that may wrap it in
/// markdown fences or prose.
fn extract_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

fn parse_grade(raw: &str) -> Result<(f64, String), String> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| format!("unparseable response: {err}"))?;

    let score = value
        .get("score")
        .and_then(Value::as_f64)
        .ok_or_else(|| String::from("response missing numeric score"))?;
    let feedback = value
        .get("feedback")
        .and_then(Value::as_str)
        .ok_or_else(|| String::from("response missing feedback"))?
        .to_string();

    Ok((score, feedback))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_from_fenced_response() {
        let text = "```json\n{\"score\": 6.5, \"feedback\": \"ok\"}\n```";
        assert_eq!(extract_json(text), Some("{\"score\": 6.5, \"feedback\": \"ok\"}"));
    }

    #[test]
    fn extract_json_from_prose_wrapped_response() {
        let text = "Here is my grading: {\"score\": 2, \"feedback\": \"short\"} hope it helps";
        assert_eq!(extract_json(text), Some("{\"score\": 2, \"feedback\": \"short\"}"));
    }

    #[test]
    fn extract_json_rejects_braceless_text() {
        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("} reversed {"), None);
    }

    #[test]
    fn parse_grade_accepts_valid_shape() {
        let (score, feedback) = parse_grade("{\"score\": 7.5, \"feedback\": \"solid\"}").unwrap();
        assert_eq!(score, 7.5);
        assert_eq!(feedback, "solid");
    }

    #[test]
    fn parse_grade_accepts_empty_feedback() {
        let (score, feedback) = parse_grade("{\"score\": 0, \"feedback\": \"\"}").unwrap();
        assert_eq!(score, 0.0);
        assert_eq!(feedback, "");
    }

    #[test]
    fn parse_grade_rejects_missing_or_non_numeric_score() {
        assert!(parse_grade("{\"feedback\": \"no score\"}").is_err());
        assert!(parse_grade("{\"score\": \"six\", \"feedback\": \"ok\"}").is_err());
    }

    #[test]
    fn parse_grade_rejects_missing_feedback() {
        assert!(parse_grade("{\"score\": 6.0}").is_err());
    }

    #[test]
    fn approx_tokens_strips_whitespace_before_dividing() {
        // "abcd efgh ij" compresses to 10 chars; (10 + 2) / 4 = 3
        assert_eq!(approx_tokens("abcd efgh ij", 4), 3);
        // same input with divisor 3: (10 + 2) / 3 = 4
        assert_eq!(approx_tokens("abcd efgh ij", 3), 4);
        assert_eq!(approx_tokens("", 4), 0);
    }
}
