use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::db::models::{GraderTaskItem, SessionAnswer};
use crate::db::types::ItemStatus;

pub(crate) async fn list_pending(
    pool: &PgPool,
    task_id: i64,
) -> Result<Vec<GraderTaskItem>, sqlx::Error> {
    sqlx::query_as::<_, GraderTaskItem>(
        "SELECT id, item_key, task_id, status, attempts
         FROM grader_task_items
         WHERE task_id = $1 AND status IN ($2, $3)",
    )
    .bind(task_id)
    .bind(ItemStatus::Pending)
    .bind(ItemStatus::FailedRetryable)
    .fetch_all(pool)
    .await
}

/// Idempotent on (task_id, item_key): redelivery refreshes the existing rows
/// instead of duplicating them.
pub(crate) async fn materialize(
    pool: &PgPool,
    answers: &[SessionAnswer],
    model_id: &str,
    task_id: i64,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    if answers.is_empty() {
        return Ok(());
    }

    let item_keys: Vec<i64> = answers.iter().map(|answer| answer.id).collect();
    let idempotency_keys: Vec<String> =
        answers.iter().map(|answer| format!("{model_id}:{}", answer.id)).collect();

    sqlx::query(
        "INSERT INTO grader_task_items (task_id, item_key, idempotency_key)
         SELECT $1, input.key, input.idem
         FROM UNNEST($2::bigint[], $3::text[]) AS input(key, idem)
         ON CONFLICT (task_id, item_key)
         DO UPDATE SET idempotency_key = EXCLUDED.idempotency_key,
                       attempts = grader_task_items.attempts + 1,
                       updated_at = $4",
    )
    .bind(task_id)
    .bind(&item_keys)
    .bind(&idempotency_keys)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}
