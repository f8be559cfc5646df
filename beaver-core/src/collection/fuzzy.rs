use std::collections::HashSet;

use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use beaver_common::Result;

fn trigrams_of(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    let chars: Vec<char> = lower.chars().collect();
    if chars.len() < 3 {
        return [lower].into_iter().filter(|s| !s.is_empty()).collect();
    }
    chars.windows(3).map(|w| w.iter().collect()).collect()
}

/// Replaces every trigram row for `item_id`, derived from the same
/// flattened text the FTS index was built from, inside the caller's
/// transaction (§4.G atomicity).
pub(super) async fn reindex(tx: &mut Transaction<'_, Sqlite>, collection: &str, item_id: &str, flattened: &str) -> Result<()> {
    sqlx::query("DELETE FROM beaver_trigrams WHERE collection_name = ? AND item_id = ?")
        .bind(collection)
        .bind(item_id)
        .execute(&mut **tx)
        .await?;
    for trigram in trigrams_of(flattened) {
        sqlx::query("INSERT INTO beaver_trigrams (collection_name, trigram, item_id) VALUES (?, ?, ?)")
            .bind(collection)
            .bind(trigram)
            .bind(item_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

pub(super) async fn drop_item(tx: &mut Transaction<'_, Sqlite>, collection: &str, item_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM beaver_trigrams WHERE collection_name = ? AND item_id = ?")
        .bind(collection)
        .bind(item_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Verification-stage distance between `query` and a candidate's flattened
/// text. Comparing the whole query against the whole (possibly multi-field,
/// multi-word) joined text penalizes length mismatches that have nothing to
/// do with the typo being tolerated — a single mistyped word would score as
/// distance against the entire document. Instead, each query word is matched
/// against its closest word in the text and the per-word distances summed,
/// so e.g. "pythn" against "python database" scores against "python" alone
/// (distance 1), not against the ten-character joined string.
fn token_distance(query: &str, text: &str) -> u32 {
    let text_tokens: Vec<&str> = text.split_whitespace().collect();
    let query_tokens: Vec<&str> = query.split_whitespace().collect();
    if text_tokens.is_empty() || query_tokens.is_empty() {
        return levenshtein(query, text);
    }
    query_tokens
        .iter()
        .map(|q_tok| text_tokens.iter().map(|t_tok| levenshtein(q_tok, t_tok)).min().unwrap())
        .sum()
}

fn levenshtein(a: &str, b: &str) -> u32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<u32> = (0..=b.len() as u32).collect();
    let mut curr = vec![0u32; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i as u32;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Two-stage fuzzy search (§4.G): a trigram-overlap candidate filter
/// followed by bounded-fan-out Levenshtein verification. Returns
/// `(item_id, distance)` pairs sorted by distance ascending.
pub async fn search(pool: &SqlitePool, collection: &str, query: &str, fuzziness: u32, k: usize) -> Result<Vec<(String, u32)>> {
    let query_trigrams = trigrams_of(query);
    let t_q = query_trigrams.len() as f64;
    if t_q == 0.0 {
        return Ok(Vec::new());
    }
    let threshold = (((t_q - fuzziness as f64 * 3.0) / t_q).ceil() * t_q).max(0.0) as i64;

    let placeholders = query_trigrams.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let sql = format!(
        "SELECT item_id, COUNT(DISTINCT trigram) AS shared FROM beaver_trigrams
         WHERE collection_name = ? AND trigram IN ({placeholders})
         GROUP BY item_id HAVING shared >= ?
         ORDER BY shared DESC LIMIT ?",
    );
    let mut q = sqlx::query(&sql).bind(collection);
    for trigram in &query_trigrams {
        q = q.bind(trigram);
    }
    let fan_out = (10 * k).max(k) as i64;
    q = q.bind(threshold).bind(fan_out);
    let candidate_rows = q.fetch_all(pool).await?;
    if candidate_rows.is_empty() {
        return Ok(Vec::new());
    }
    let candidate_ids: Vec<String> = candidate_rows.into_iter().map(|row| row.get("item_id")).collect();

    let id_placeholders = candidate_ids.iter().map(|_| "?").collect::<Vec<_>>().join(", ");
    let text_sql = format!(
        "SELECT item_id, GROUP_CONCAT(flattened_text, ' ') AS joined FROM beaver_fts
         WHERE collection_name = ? AND item_id IN ({id_placeholders}) GROUP BY item_id",
    );
    let mut text_q = sqlx::query(&text_sql).bind(collection);
    for id in &candidate_ids {
        text_q = text_q.bind(id);
    }
    let text_rows = text_q.fetch_all(pool).await?;

    let mut verified: Vec<(String, u32)> = text_rows
        .into_iter()
        .filter_map(|row| {
            let item_id: String = row.get("item_id");
            let text: String = row.get("joined");
            let distance = token_distance(query, &text);
            (distance <= fuzziness).then_some((item_id, distance))
        })
        .collect();
    verified.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    verified.truncate(k);
    Ok(verified)
}
