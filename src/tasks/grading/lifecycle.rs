use crate::db::models::{GraderTask, GraderTaskItem};
use crate::repositories::store::GraderStore;

pub(crate) enum TaskResolution {
    Ready(GraderTask),
    /// Attempt ceiling exceeded; the caller deletes the session artifacts and
    /// drops the message for good.
    Evicted(GraderTask),
    /// The upsert yielded no row at all.
    Absent,
}

/// Idempotent resume-or-create keyed by (session_token, model_id). Every call
/// bumps `attempts`, so a message that keeps failing eventually crosses the
/// ceiling and is evicted instead of looping forever.
pub(crate) async fn resume_or_create(
    store: &dyn GraderStore,
    session_token: &str,
    model_id: &str,
    max_attempts: i32,
) -> Result<TaskResolution, sqlx::Error> {
    let Some(task) = store.resolve_or_create_task(session_token, model_id).await? else {
        return Ok(TaskResolution::Absent);
    };

    if task.attempts > max_attempts {
        return Ok(TaskResolution::Evicted(task));
    }

    Ok(TaskResolution::Ready(task))
}

pub(crate) enum ItemResolution {
    Pending(Vec<GraderTaskItem>),
    /// Nothing gradable for this session, even after materialization.
    Empty,
}

/// Enumerates the task's PENDING / FAILED_RETRYABLE items. A task with no
/// items at all is on its first successful resume: the session is decomposed
/// into one idempotent item per answer, keyed by (task_id, answer id).
pub(crate) async fn pending_items(
    store: &dyn GraderStore,
    session_token: &str,
    model_id: &str,
    task_id: i64,
) -> Result<ItemResolution, sqlx::Error> {
    let items = store.list_pending_items(task_id).await?;
    if !items.is_empty() {
        return Ok(ItemResolution::Pending(items));
    }

    let answers = store.load_session_answers(session_token).await?;
    if answers.is_empty() {
        return Ok(ItemResolution::Empty);
    }

    store.materialize_items(&answers, model_id, task_id).await?;

    let items = store.list_pending_items(task_id).await?;
    if items.is_empty() {
        return Ok(ItemResolution::Empty);
    }

    Ok(ItemResolution::Pending(items))
}
