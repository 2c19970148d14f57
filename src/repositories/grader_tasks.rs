use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::GraderTask;

/// Idempotent resume-or-create keyed by (session_token, model_id). A conflict
/// increments `attempts` instead of inserting a second row, so redelivery of
/// the same session never forks the task.
pub(crate) async fn resolve_or_create(
    pool: &PgPool,
    session_token: &str,
    model_id: &str,
    now: PrimitiveDateTime,
) -> Result<Option<GraderTask>, sqlx::Error> {
    sqlx::query_as::<_, GraderTask>(
        "INSERT INTO assessment_grader_tasks (session_token, model_id)
         VALUES ($1, $2)
         ON CONFLICT (session_token, model_id)
         DO UPDATE SET attempts = assessment_grader_tasks.attempts + 1,
                       updated_at = $3
         RETURNING id, status, attempts",
    )
    .bind(session_token)
    .bind(model_id)
    .bind(now)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn delete_by_session(
    pool: &PgPool,
    session_token: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM assessment_grader_tasks WHERE session_token = $1")
        .bind(session_token)
        .execute(pool)
        .await?;
    Ok(())
}
