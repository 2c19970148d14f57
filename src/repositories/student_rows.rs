use sqlx::PgPool;

use crate::db::models::{SessionAnswer, StudentTaskRow};

/// Pre-insert one zero-score row per (student, assessment) so the final score
/// upsert always has a row id to attach answers to. Existing rows are left
/// untouched.
pub(crate) async fn upsert_zero_rows(
    pool: &PgPool,
    session_id: i64,
    answers: &[SessionAnswer],
) -> Result<(), sqlx::Error> {
    let mut student_ids = Vec::new();
    let mut assessment_ids = Vec::new();
    for answer in answers {
        let pair = (answer.student_id, answer.assessment_id);
        if !student_ids
            .iter()
            .zip(assessment_ids.iter())
            .any(|(student, assessment)| (*student, *assessment) == pair)
        {
            student_ids.push(answer.student_id);
            assessment_ids.push(answer.assessment_id);
        }
    }

    if student_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO assessments_students (session_id, student_id, assessment_id, score)
         SELECT $1, input.student, input.assessment, 0
         FROM UNNEST($2::bigint[], $3::bigint[]) AS input(student, assessment)
         ON CONFLICT (student_id, assessment_id, session_id) DO NOTHING",
    )
    .bind(session_id)
    .bind(&student_ids)
    .bind(&assessment_ids)
    .execute(pool)
    .await?;

    Ok(())
}

pub(crate) async fn list_by_session(
    pool: &PgPool,
    session_id: i64,
) -> Result<Vec<StudentTaskRow>, sqlx::Error> {
    sqlx::query_as::<_, StudentTaskRow>(
        "SELECT id, student_id, assessment_id
         FROM assessments_students
         WHERE session_id = $1",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await
}
