use sqlx::{Row, SqlitePool};

use beaver_common::{AnyMap, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Both,
}

/// Directed weighted edge table over `(source_id, target_id, label)`
/// triples, per §4.G. Cycles are allowed and well-defined (§9); `walk`
/// guards against them with `SELECT DISTINCT`.
pub struct Graph {
    pool: SqlitePool,
    collection: String,
}

impl Graph {
    pub(super) fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        Self { pool, collection: collection.into() }
    }

    pub async fn connect(&self, source: &str, target: &str, label: &str, weight: f64, metadata: Option<&AnyMap>) -> Result<()> {
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;
        sqlx::query(
            "INSERT INTO beaver_edges (collection_name, source_id, target_id, label, weight, metadata_json) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(collection_name, source_id, target_id, label) DO UPDATE SET weight = excluded.weight, metadata_json = excluded.metadata_json",
        )
        .bind(&self.collection)
        .bind(source)
        .bind(target)
        .bind(label)
        .bind(weight)
        .bind(metadata_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// One-hop forward edges from `doc`, optionally restricted to `label`.
    pub async fn neighbors(&self, doc: &str, label: Option<&str>) -> Result<Vec<String>> {
        let rows = match label {
            Some(label) => {
                sqlx::query("SELECT target_id FROM beaver_edges WHERE collection_name = ? AND source_id = ? AND label = ?")
                    .bind(&self.collection)
                    .bind(doc)
                    .bind(label)
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT target_id FROM beaver_edges WHERE collection_name = ? AND source_id = ?")
                    .bind(&self.collection)
                    .bind(doc)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(rows.into_iter().map(|row| row.get("target_id")).collect())
    }

    /// Set-based breadth-first search out to `depth` hops, excluding
    /// `source`, via the recursive query from §4.G. `Both` unions a
    /// forward-matching and a backward-matching term at every hop, so a
    /// walked path may switch direction between hops.
    pub async fn walk(&self, source: &str, labels: Option<&[String]>, depth: u32, direction: Direction) -> Result<Vec<String>> {
        let all_labels = labels.map(|l| l.is_empty()).unwrap_or(true);
        let label_list: Vec<String> = labels.map(|l| l.to_vec()).unwrap_or_default();
        let placeholders = label_list.iter().map(|_| "?").collect::<Vec<_>>().join(", ");

        let forward_seed = format!(
            "SELECT target_id, 1 FROM beaver_edges WHERE collection_name = ? AND source_id = ? AND (? OR label IN ({placeholders}))"
        );
        let backward_seed = format!(
            "SELECT source_id, 1 FROM beaver_edges WHERE collection_name = ? AND target_id = ? AND (? OR label IN ({placeholders}))"
        );
        let forward_step = format!(
            "SELECT e.target_id, bfs.d + 1 FROM beaver_edges e JOIN bfs ON e.source_id = bfs.id WHERE bfs.d < ? AND e.collection_name = ? AND (? OR e.label IN ({placeholders}))"
        );
        let backward_step = format!(
            "SELECT e.source_id, bfs.d + 1 FROM beaver_edges e JOIN bfs ON e.target_id = bfs.id WHERE bfs.d < ? AND e.collection_name = ? AND (? OR e.label IN ({placeholders}))"
        );

        let (seed_terms, step_terms): (Vec<&str>, Vec<&str>) = match direction {
            Direction::Forward => (vec![&forward_seed], vec![&forward_step]),
            Direction::Backward => (vec![&backward_seed], vec![&backward_step]),
            Direction::Both => (vec![&forward_seed, &backward_seed], vec![&forward_step, &backward_step]),
        };

        let sql = format!(
            "WITH RECURSIVE bfs(id, d) AS (\n{}\n    UNION\n{}\n)\nSELECT DISTINCT id FROM bfs WHERE id != ?",
            seed_terms.join("\n    UNION\n"),
            step_terms.join("\n    UNION\n"),
        );

        let mut q = sqlx::query(&sql);
        for _ in &seed_terms {
            q = q.bind(&self.collection).bind(source).bind(all_labels);
            for l in &label_list {
                q = q.bind(l);
            }
        }
        for _ in &step_terms {
            q = q.bind(depth as i64).bind(&self.collection).bind(all_labels);
            for l in &label_list {
                q = q.bind(l);
            }
        }
        q = q.bind(source);

        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(|row| row.get("id")).collect())
    }
}
