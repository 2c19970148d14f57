use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use time::PrimitiveDateTime;

use crate::db::types::{ItemStatus, TaskStatus};

#[derive(Debug, Error)]
pub(crate) enum CommitError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("commit stage {stage} wrote {actual} of {expected} rows")]
    StageIncomplete { stage: &'static str, expected: usize, actual: u64 },
}

#[derive(Debug, Clone)]
pub(crate) struct AnswerUpsert {
    pub(crate) assessment_student_id: i64,
    pub(crate) question_id: i64,
    pub(crate) choice_id: Option<i64>,
    pub(crate) answer_text: Option<String>,
    pub(crate) is_correct: bool,
    pub(crate) feedback: Option<String>,
    pub(crate) points: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct ScoreUpsert {
    pub(crate) student_id: i64,
    pub(crate) assessment_id: i64,
    pub(crate) session_id: i64,
    pub(crate) score: f64,
}

#[derive(Debug, Clone)]
pub(crate) struct CommitBatch {
    pub(crate) task_id: i64,
    pub(crate) answers: Vec<AnswerUpsert>,
    pub(crate) item_keys: Vec<i64>,
    pub(crate) scores: Vec<ScoreUpsert>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CommitReceipt {
    pub(crate) answers_upserted: u64,
    pub(crate) items_completed: u64,
    pub(crate) scores_upserted: u64,
}

/// One transaction, fixed order: answers, item status, task status, student
/// scores. Any stage writing fewer rows than expected aborts the whole batch;
/// the transaction rolls back on drop.
pub(crate) async fn commit_batch(
    pool: &PgPool,
    batch: &CommitBatch,
    now: PrimitiveDateTime,
) -> Result<CommitReceipt, CommitError> {
    let mut tx = pool.begin().await?;

    let answers_upserted = upsert_answers(&mut tx, &batch.answers).await?;
    if answers_upserted != batch.answers.len() as u64 {
        return Err(CommitError::StageIncomplete {
            stage: "assessment_answers",
            expected: batch.answers.len(),
            actual: answers_upserted,
        });
    }

    let items_completed = complete_items(&mut tx, batch.task_id, &batch.item_keys, now).await?;
    if items_completed != batch.item_keys.len() as u64 {
        return Err(CommitError::StageIncomplete {
            stage: "grader_task_items",
            expected: batch.item_keys.len(),
            actual: items_completed,
        });
    }

    let tasks_completed = complete_task(&mut tx, batch.task_id, now).await?;
    if tasks_completed != 1 {
        return Err(CommitError::StageIncomplete {
            stage: "assessment_grader_tasks",
            expected: 1,
            actual: tasks_completed,
        });
    }

    let scores_upserted = upsert_scores(&mut tx, &batch.scores).await?;
    if scores_upserted != batch.scores.len() as u64 {
        return Err(CommitError::StageIncomplete {
            stage: "assessments_students",
            expected: batch.scores.len(),
            actual: scores_upserted,
        });
    }

    tx.commit().await?;

    Ok(CommitReceipt { answers_upserted, items_completed, scores_upserted })
}

async fn upsert_answers(
    tx: &mut Transaction<'_, Postgres>,
    answers: &[AnswerUpsert],
) -> Result<u64, sqlx::Error> {
    if answers.is_empty() {
        return Ok(0);
    }

    let assessment_student_ids: Vec<i64> =
        answers.iter().map(|answer| answer.assessment_student_id).collect();
    let question_ids: Vec<i64> = answers.iter().map(|answer| answer.question_id).collect();
    let choice_ids: Vec<Option<i64>> = answers.iter().map(|answer| answer.choice_id).collect();
    let answer_texts: Vec<Option<String>> =
        answers.iter().map(|answer| answer.answer_text.clone()).collect();
    let is_correct: Vec<bool> = answers.iter().map(|answer| answer.is_correct).collect();
    let feedback: Vec<Option<String>> =
        answers.iter().map(|answer| answer.feedback.clone()).collect();
    let points: Vec<f64> = answers.iter().map(|answer| answer.points).collect();

    let result = sqlx::query(
        "INSERT INTO assessment_answers
             (assessment_student_id, question_id, choice_id, answer_text, is_correct, feedback,
              points)
         SELECT *
         FROM UNNEST($1::bigint[], $2::bigint[], $3::bigint[], $4::text[], $5::boolean[],
                     $6::text[], $7::double precision[])
         ON CONFLICT (assessment_student_id, question_id)
         DO UPDATE SET choice_id = EXCLUDED.choice_id,
                       answer_text = EXCLUDED.answer_text,
                       is_correct = EXCLUDED.is_correct,
                       feedback = EXCLUDED.feedback,
                       points = EXCLUDED.points",
    )
    .bind(&assessment_student_ids)
    .bind(&question_ids)
    .bind(&choice_ids)
    .bind(&answer_texts)
    .bind(&is_correct)
    .bind(&feedback)
    .bind(&points)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

async fn complete_items(
    tx: &mut Transaction<'_, Postgres>,
    task_id: i64,
    item_keys: &[i64],
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    if item_keys.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "UPDATE grader_task_items
         SET status = $1, updated_at = $2
         WHERE task_id = $3 AND item_key = ANY($4)",
    )
    .bind(ItemStatus::Completed)
    .bind(now)
    .bind(task_id)
    .bind(item_keys)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

async fn complete_task(
    tx: &mut Transaction<'_, Postgres>,
    task_id: i64,
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE assessment_grader_tasks
         SET status = $1, updated_at = $2
         WHERE id = $3",
    )
    .bind(TaskStatus::Completed)
    .bind(now)
    .bind(task_id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

async fn upsert_scores(
    tx: &mut Transaction<'_, Postgres>,
    scores: &[ScoreUpsert],
) -> Result<u64, sqlx::Error> {
    if scores.is_empty() {
        return Ok(0);
    }

    let student_ids: Vec<i64> = scores.iter().map(|score| score.student_id).collect();
    let assessment_ids: Vec<i64> = scores.iter().map(|score| score.assessment_id).collect();
    let session_ids: Vec<i64> = scores.iter().map(|score| score.session_id).collect();
    let totals: Vec<f64> = scores.iter().map(|score| score.score).collect();

    let result = sqlx::query(
        "INSERT INTO assessments_students (student_id, assessment_id, session_id, score)
         SELECT *
         FROM UNNEST($1::bigint[], $2::bigint[], $3::bigint[], $4::double precision[])
         ON CONFLICT (student_id, assessment_id, session_id)
         DO UPDATE SET score = EXCLUDED.score",
    )
    .bind(&student_ids)
    .bind(&assessment_ids)
    .bind(&session_ids)
    .bind(&totals)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}
