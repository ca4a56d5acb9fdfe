pub mod price_row_queries;
pub mod region_queries;

use sqlx::PgPool;

use crate::domain::ProviderGroup;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

/// Create the `regions` and `price_rows` tables if they do not exist yet.
pub async fn apply_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await.map(|_| ())
}

/// Touch the region and swap its whole price table in one transaction.
///
/// Readers observe either the previous table or the new one, never an empty
/// region in between. Returns the number of rows inserted.
pub async fn refresh_region(
    pool: &PgPool,
    normalized_name: &str,
    groups: &[ProviderGroup],
) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let region_id = region_queries::upsert_region(&mut *tx, normalized_name).await?;
    let inserted = price_row_queries::replace_price_rows(&mut *tx, region_id, groups).await?;

    tx.commit().await?;
    Ok(inserted)
}
