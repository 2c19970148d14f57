use async_trait::async_trait;
use sqlx::PgPool;

use crate::core::time::primitive_now_utc;
use crate::db::models::{
    AssessmentRow, GraderTask, GraderTaskItem, ModelUsageRecord, QuestionRow, SessionAnswer,
    StudentTaskRow,
};
use crate::repositories::commit::{CommitBatch, CommitError, CommitReceipt};
use crate::repositories::{
    commit, grader_tasks, reference_data, session_answers, sessions, student_rows, task_items,
    usage_ledger,
};

/// Durable-store port for the grading pipeline. The orchestrator only ever
/// talks to this trait; tests substitute an in-memory fake.
#[async_trait]
pub(crate) trait GraderStore: Send + Sync {
    async fn resolve_or_create_task(
        &self,
        session_token: &str,
        model_id: &str,
    ) -> Result<Option<GraderTask>, sqlx::Error>;

    async fn list_pending_items(&self, task_id: i64) -> Result<Vec<GraderTaskItem>, sqlx::Error>;

    async fn materialize_items(
        &self,
        answers: &[SessionAnswer],
        model_id: &str,
        task_id: i64,
    ) -> Result<(), sqlx::Error>;

    async fn load_session_answers(
        &self,
        session_token: &str,
    ) -> Result<Vec<SessionAnswer>, sqlx::Error>;

    async fn load_answers_by_item_keys(
        &self,
        item_keys: &[i64],
    ) -> Result<Vec<SessionAnswer>, sqlx::Error>;

    async fn load_reference_data(
        &self,
        assessment_ids: &[i64],
    ) -> Result<(Vec<AssessmentRow>, Vec<QuestionRow>), sqlx::Error>;

    async fn upsert_student_rows(
        &self,
        session_id: i64,
        answers: &[SessionAnswer],
    ) -> Result<(), sqlx::Error>;

    async fn load_student_task_rows(
        &self,
        session_id: i64,
    ) -> Result<Vec<StudentTaskRow>, sqlx::Error>;

    async fn commit_batch(&self, batch: &CommitBatch) -> Result<CommitReceipt, CommitError>;

    async fn append_usage_ledger(&self, records: &[ModelUsageRecord]) -> Result<u64, sqlx::Error>;

    async fn delete_task_and_session_artifacts(
        &self,
        session_token: &str,
    ) -> Result<(), sqlx::Error>;
}

#[derive(Clone)]
pub(crate) struct PgGraderStore {
    pool: PgPool,
}

impl PgGraderStore {
    pub(crate) fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GraderStore for PgGraderStore {
    async fn resolve_or_create_task(
        &self,
        session_token: &str,
        model_id: &str,
    ) -> Result<Option<GraderTask>, sqlx::Error> {
        grader_tasks::resolve_or_create(&self.pool, session_token, model_id, primitive_now_utc())
            .await
    }

    async fn list_pending_items(&self, task_id: i64) -> Result<Vec<GraderTaskItem>, sqlx::Error> {
        task_items::list_pending(&self.pool, task_id).await
    }

    async fn materialize_items(
        &self,
        answers: &[SessionAnswer],
        model_id: &str,
        task_id: i64,
    ) -> Result<(), sqlx::Error> {
        task_items::materialize(&self.pool, answers, model_id, task_id, primitive_now_utc()).await
    }

    async fn load_session_answers(
        &self,
        session_token: &str,
    ) -> Result<Vec<SessionAnswer>, sqlx::Error> {
        session_answers::list_by_session(&self.pool, session_token).await
    }

    async fn load_answers_by_item_keys(
        &self,
        item_keys: &[i64],
    ) -> Result<Vec<SessionAnswer>, sqlx::Error> {
        session_answers::list_by_item_keys(&self.pool, item_keys).await
    }

    async fn load_reference_data(
        &self,
        assessment_ids: &[i64],
    ) -> Result<(Vec<AssessmentRow>, Vec<QuestionRow>), sqlx::Error> {
        let assessments = reference_data::load_assessments(&self.pool, assessment_ids).await?;
        let questions = reference_data::load_questions(&self.pool, assessment_ids).await?;
        Ok((assessments, questions))
    }

    async fn upsert_student_rows(
        &self,
        session_id: i64,
        answers: &[SessionAnswer],
    ) -> Result<(), sqlx::Error> {
        student_rows::upsert_zero_rows(&self.pool, session_id, answers).await
    }

    async fn load_student_task_rows(
        &self,
        session_id: i64,
    ) -> Result<Vec<StudentTaskRow>, sqlx::Error> {
        student_rows::list_by_session(&self.pool, session_id).await
    }

    async fn commit_batch(&self, batch: &CommitBatch) -> Result<CommitReceipt, CommitError> {
        commit::commit_batch(&self.pool, batch, primitive_now_utc()).await
    }

    async fn append_usage_ledger(&self, records: &[ModelUsageRecord]) -> Result<u64, sqlx::Error> {
        usage_ledger::append(&self.pool, records).await
    }

    async fn delete_task_and_session_artifacts(
        &self,
        session_token: &str,
    ) -> Result<(), sqlx::Error> {
        grader_tasks::delete_by_session(&self.pool, session_token).await?;
        sessions::delete(&self.pool, session_token).await
    }
}
