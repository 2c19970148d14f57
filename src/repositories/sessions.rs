use sqlx::PgPool;

pub(crate) async fn delete(pool: &PgPool, session_token: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM assessment_sessions WHERE session_token = $1")
        .bind(session_token)
        .execute(pool)
        .await?;
    Ok(())
}
