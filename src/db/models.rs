use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db::types::{ItemStatus, QuestionType, TaskStatus, UsageOutcome};

/// One grading task per (session_token, model_id) pair. `attempts` counts
/// every resume, including the one that created the row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct GraderTask {
    pub(crate) id: i64,
    pub(crate) status: TaskStatus,
    pub(crate) attempts: i32,
}

/// One idempotent processing record per answer; `item_key` is the answer id,
/// unique per task.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct GraderTaskItem {
    pub(crate) id: i64,
    pub(crate) item_key: i64,
    pub(crate) task_id: i64,
    pub(crate) status: ItemStatus,
    pub(crate) attempts: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct SessionAnswer {
    pub(crate) id: i64,
    pub(crate) assessment_id: i64,
    pub(crate) student_id: i64,
    pub(crate) question_id: i64,
    pub(crate) choice_id: Option<i64>,
    pub(crate) answer_text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct AssessmentRow {
    pub(crate) id: i64,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) max_score: f64,
    pub(crate) subject_title: Option<String>,
}

/// A question joined to its correct choice (when it has one). Short-answer
/// questions carry the reference answer in `answer_text` instead.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct QuestionRow {
    pub(crate) assessment_id: i64,
    pub(crate) question_id: i64,
    pub(crate) question_text: String,
    pub(crate) answer_text: Option<String>,
    pub(crate) correct_choice_id: Option<i64>,
    pub(crate) points: f64,
    pub(crate) question_type: QuestionType,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct StudentTaskRow {
    pub(crate) id: i64,
    pub(crate) student_id: i64,
    pub(crate) assessment_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ModelUsageRecord {
    pub(crate) organization_id: i64,
    pub(crate) input_tokens: i64,
    pub(crate) output_tokens: i64,
    pub(crate) provider: String,
    pub(crate) model_id: String,
    pub(crate) outcome: UsageOutcome,
}
