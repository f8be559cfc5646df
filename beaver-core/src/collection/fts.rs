use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use beaver_common::Result;

/// Replaces every indexed field row for `item_id` with `fields`, inside the
/// caller's transaction so it commits atomically with the vector and
/// trigram writes (§4.G: `index` is atomic across all four sub-structures).
pub(super) async fn reindex(
    tx: &mut Transaction<'_, Sqlite>,
    collection: &str,
    item_id: &str,
    fields: &[(String, String)],
) -> Result<()> {
    sqlx::query("DELETE FROM beaver_fts WHERE collection_name = ? AND item_id = ?")
        .bind(collection)
        .bind(item_id)
        .execute(&mut **tx)
        .await?;
    for (field, text) in fields {
        sqlx::query(
            "INSERT INTO beaver_fts (collection_name, item_id, field, flattened_text) VALUES (?, ?, ?, ?)",
        )
        .bind(collection)
        .bind(item_id)
        .bind(field)
        .bind(text)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub(super) async fn drop_item(tx: &mut Transaction<'_, Sqlite>, collection: &str, item_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM beaver_fts WHERE collection_name = ? AND item_id = ?")
        .bind(collection)
        .bind(item_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Boolean full-text search via FTS5, optionally restricted to the fields
/// named in `on`. Returns `(item_id, rank)` pairs ordered by the FTS
/// ranking function ascending (smaller is a better match).
pub async fn search(pool: &SqlitePool, collection: &str, query: &str, on: Option<&[String]>, k: usize) -> Result<Vec<(String, f64)>> {
    let mut sql = String::from(
        "SELECT item_id, MIN(rank) AS best_rank FROM beaver_fts WHERE beaver_fts MATCH ? AND collection_name = ?",
    );
    if let Some(fields) = on {
        if !fields.is_empty() {
            let placeholders = fields.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
            sql.push_str(&format!(" AND field IN ({placeholders})"));
        }
    }
    sql.push_str(" GROUP BY item_id ORDER BY best_rank ASC LIMIT ?");

    let mut q = sqlx::query(&sql).bind(query).bind(collection);
    if let Some(fields) = on {
        for field in fields {
            q = q.bind(field);
        }
    }
    q = q.bind(k as i64);

    let rows = q.fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|row| (row.get("item_id"), row.get("best_rank")))
        .collect())
}
