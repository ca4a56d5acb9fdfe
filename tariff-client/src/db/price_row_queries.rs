use sqlx::{PgConnection, PgExecutor, Postgres, QueryBuilder};

use crate::domain::{PriceRow, ProviderGroup};

/// Delete every price row of `region_id` and insert one row per
/// (provider, tier) pair.
///
/// Takes a connection rather than a pool so the caller can run it inside the
/// same transaction as the region upsert.
pub async fn replace_price_rows(
    conn: &mut PgConnection,
    region_id: i64,
    groups: &[ProviderGroup],
) -> Result<u64, sqlx::Error> {
    sqlx::query("DELETE FROM price_rows WHERE region_id = $1")
        .bind(region_id)
        .execute(&mut *conn)
        .await?;

    let rows: Vec<(&ProviderGroup, &str, f64)> = groups
        .iter()
        .flat_map(|g| g.tiers.iter().map(move |t| (g, t.tier_label.as_str(), t.unit_price)))
        .collect();

    if rows.is_empty() {
        return Ok(0);
    }

    let mut builder = QueryBuilder::<Postgres>::new(
        "INSERT INTO price_rows (region_id, tier_label, unit_price, fixed_charge, provider_name) ",
    );
    builder.push_values(&rows, |mut b, (group, tier_label, unit_price)| {
        b.push_bind(region_id)
            .push_bind(*tier_label)
            .push_bind(*unit_price)
            .push_unseparated("::numeric")
            .push_bind(group.fixed_charge)
            .push_unseparated("::numeric")
            .push_bind(group.provider_name.as_deref());
    });

    let result = builder.build().execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Fetch the price table of a region, case-insensitively, in insertion order.
pub async fn read_price_rows<'e, E>(executor: E, normalized_name: &str) -> Result<Vec<PriceRow>, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query_as::<_, PriceRow>(
        r#"
        SELECT
            p.tier_label,
            p.unit_price::float8   AS unit_price,
            p.fixed_charge::float8 AS fixed_charge,
            p.provider_name,
            r.last_refreshed_at
        FROM price_rows p
        JOIN regions r ON p.region_id = r.id
        WHERE lower(r.normalized_name) = lower(trim($1))
        ORDER BY p.id
        "#,
    )
    .bind(normalized_name)
    .fetch_all(executor)
    .await
}
