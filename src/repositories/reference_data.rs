use sqlx::PgPool;

use crate::db::models::{AssessmentRow, QuestionRow};

pub(crate) async fn load_assessments(
    pool: &PgPool,
    assessment_ids: &[i64],
) -> Result<Vec<AssessmentRow>, sqlx::Error> {
    if assessment_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, AssessmentRow>(
        "SELECT ast.id, ast.title, ast.description, ast.max_score, sj.title AS subject_title
         FROM assessments ast
         LEFT JOIN subjects sj ON sj.id = ast.subject_id
         WHERE ast.id = ANY($1)",
    )
    .bind(assessment_ids)
    .fetch_all(pool)
    .await
}

/// Each question joined to its correct choice; short-answer questions have no
/// correct choice and carry the reference answer text instead.
pub(crate) async fn load_questions(
    pool: &PgPool,
    assessment_ids: &[i64],
) -> Result<Vec<QuestionRow>, sqlx::Error> {
    if assessment_ids.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, QuestionRow>(
        "SELECT q.assessment_id, q.id AS question_id, q.question_text, q.answer_text,
                c.id AS correct_choice_id, q.points, q.question_type
         FROM questions q
         LEFT JOIN choices c ON c.question_id = q.id AND c.is_correct = TRUE
         WHERE q.assessment_id = ANY($1)
         ORDER BY q.assessment_id, q.id",
    )
    .bind(assessment_ids)
    .fetch_all(pool)
    .await
}
