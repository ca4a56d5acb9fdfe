use sqlx::PgExecutor;

use crate::domain::Region;

/// Look up a region by its normalized name.
pub async fn find_region<'e, E>(executor: E, normalized_name: &str) -> Result<Option<Region>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, Region>(
        r#"
        SELECT id, normalized_name, last_refreshed_at
        FROM regions
        WHERE normalized_name = lower(trim($1))
        "#,
    )
    .bind(normalized_name)
    .fetch_optional(executor)
    .await
}

/// Insert the region stamped with the current time, or re-stamp it if it
/// already exists.
///
/// Concurrent callers are serialized by the unique index on
/// `normalized_name`; both get the same id back.
pub async fn upsert_region<'e, E>(executor: E, normalized_name: &str) -> Result<i64, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO regions (normalized_name, last_refreshed_at)
        VALUES (lower(trim($1)), now())
        ON CONFLICT (normalized_name)
        DO UPDATE SET last_refreshed_at = EXCLUDED.last_refreshed_at
        RETURNING id
        "#,
    )
    .bind(normalized_name)
    .fetch_one(executor)
    .await?;

    Ok(id)
}
