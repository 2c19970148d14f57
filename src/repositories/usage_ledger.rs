use sqlx::PgPool;

use crate::db::models::ModelUsageRecord;
use crate::db::types::UsageOutcome;

/// Appends one row per model invocation, failed ones included: a failed call
/// still consumed input tokens that must be attributed to the organization.
pub(crate) async fn append(
    pool: &PgPool,
    records: &[ModelUsageRecord],
) -> Result<u64, sqlx::Error> {
    if records.is_empty() {
        return Ok(0);
    }

    let organization_ids: Vec<i64> = records.iter().map(|record| record.organization_id).collect();
    let input_tokens: Vec<i64> = records.iter().map(|record| record.input_tokens).collect();
    let output_tokens: Vec<i64> = records.iter().map(|record| record.output_tokens).collect();
    let providers: Vec<String> = records.iter().map(|record| record.provider.clone()).collect();
    let model_ids: Vec<String> = records.iter().map(|record| record.model_id.clone()).collect();
    let outcomes: Vec<UsageOutcome> = records.iter().map(|record| record.outcome).collect();

    let result = sqlx::query(
        "INSERT INTO llm_usage (organization_id, input_tokens, output_tokens, provider, model, status)
         SELECT *
         FROM UNNEST($1::bigint[], $2::bigint[], $3::bigint[], $4::text[], $5::text[],
                     $6::llmusagestatus[])",
    )
    .bind(&organization_ids)
    .bind(&input_tokens)
    .bind(&output_tokens)
    .bind(&providers)
    .bind(&model_ids)
    .bind(&outcomes)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}
