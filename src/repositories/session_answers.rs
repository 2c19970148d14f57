use sqlx::PgPool;

use crate::db::models::SessionAnswer;

pub(crate) const COLUMNS: &str =
    "id, assessment_id, student_id, question_id, choice_id, answer_text";

pub(crate) async fn list_by_session(
    pool: &PgPool,
    session_token: &str,
) -> Result<Vec<SessionAnswer>, sqlx::Error> {
    sqlx::query_as::<_, SessionAnswer>(&format!(
        "SELECT {COLUMNS}
         FROM session_answers
         WHERE session_token = $1"
    ))
    .bind(session_token)
    .fetch_all(pool)
    .await
}

pub(crate) async fn list_by_item_keys(
    pool: &PgPool,
    item_keys: &[i64],
) -> Result<Vec<SessionAnswer>, sqlx::Error> {
    if item_keys.is_empty() {
        return Ok(Vec::new());
    }

    sqlx::query_as::<_, SessionAnswer>(&format!(
        "SELECT {COLUMNS}
         FROM session_answers
         WHERE id = ANY($1)"
    ))
    .bind(item_keys)
    .fetch_all(pool)
    .await
}
