mod distance;

use std::sync::Arc;

use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex as AsyncMutex;

use beaver_common::{AnyMap, Error, LockOptions, Result};

use crate::lock::FairLock;
use distance::cosine_distance;

/// One scored hit returned by `search`.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub distance: f32,
}

struct Entry {
    id: String,
    vector: Vec<f32>,
}

/// In-memory state of §3.2: base snapshot, delta, tombstones, and the two
/// version counters, all behind one mutex so a sync-then-scan in `search`
/// observes a consistent view.
struct State {
    base: Vec<Entry>,
    delta: Vec<Entry>,
    tombstones: std::collections::HashSet<String>,
    base_version: i64,
    last_seen_log_id: i64,
}

/// Snapshot+delta-log hybrid vector index over a collection's
/// `(id, vector)` pairs, per §4.F. Vectors are kept as `f32` in memory —
/// the spec leaves precision open (§9); `f32` halves the in-memory
/// footprint and is adequate for cosine similarity at embedding scale.
pub struct VectorIndex {
    pool: SqlitePool,
    collection: String,
    compaction_lock: Arc<FairLock>,
    compaction_threshold: usize,
    state: AsyncMutex<State>,
}

impl VectorIndex {
    pub(crate) fn new(pool: SqlitePool, collection: impl Into<String>) -> Self {
        let collection = collection.into();
        let compaction_lock = FairLock::new(
            pool.clone(),
            format!("__vector_compact__{collection}"),
            LockOptions::default(),
        );
        Self {
            pool,
            collection,
            compaction_lock,
            compaction_threshold: 1000,
            state: AsyncMutex::new(State {
                base: Vec::new(),
                delta: Vec::new(),
                tombstones: std::collections::HashSet::new(),
                base_version: -1,
                last_seen_log_id: 0,
            }),
        }
    }

    /// Inserts or overwrites `id`'s vector. The surrounding transaction
    /// commits the collection-table row and the change-log row together;
    /// the in-memory fast path runs only after that commit succeeds (§4.F
    /// write path steps 1-3).
    pub async fn insert(&self, id: &str, vector: &[f32], metadata: Option<&AnyMap>) -> Result<()> {
        if vector.iter().all(|v| *v == 0.0) {
            return Err(Error::InvalidArgument("zero-norm vector rejected on insert".into()));
        }
        let vector_bytes = encode_vector(vector);
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO beaver_collections (collection_name, item_id, vector_blob, metadata_json) VALUES (?, ?, ?, ?)
             ON CONFLICT(collection_name, item_id) DO UPDATE SET vector_blob = excluded.vector_blob, metadata_json = excluded.metadata_json",
        )
        .bind(&self.collection)
        .bind(id)
        .bind(&vector_bytes)
        .bind(&metadata_json)
        .execute(&mut *tx)
        .await?;
        let log_row = sqlx::query(
            "INSERT INTO beaver_vector_log (collection_name, item_id, op) VALUES (?, ?, 1) RETURNING log_id",
        )
        .bind(&self.collection)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        let log_id: i64 = log_row.get("log_id");
        tx.commit().await?;

        let mut state = self.state.lock().await;
        state.delta.retain(|e| e.id != id);
        state.delta.push(Entry {
            id: id.to_string(),
            vector: vector.to_vec(),
        });
        state.tombstones.remove(id);
        state.last_seen_log_id = state.last_seen_log_id.max(log_id);
        let delta_len = state.delta.len();
        drop(state);

        if delta_len >= self.compaction_threshold {
            if let Err(err) = self.compact().await {
                log::warn!("vector index {} scheduled compaction failed: {err}", self.collection);
            }
        }
        Ok(())
    }

    /// Symmetric to `insert`: tombstones `id` and drops it from the delta
    /// if present there.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM beaver_collections WHERE collection_name = ? AND item_id = ?")
            .bind(&self.collection)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let log_row = sqlx::query(
            "INSERT INTO beaver_vector_log (collection_name, item_id, op) VALUES (?, ?, 2) RETURNING log_id",
        )
        .bind(&self.collection)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        let log_id: i64 = log_row.get("log_id");
        tx.commit().await?;

        let mut state = self.state.lock().await;
        state.delta.retain(|e| e.id != id);
        state.tombstones.insert(id.to_string());
        state.last_seen_log_id = state.last_seen_log_id.max(log_id);
        Ok(())
    }

    /// Synchronizes this process's in-memory state against `base_version`
    /// and the change log, then scans for the `k` nearest ids by cosine
    /// distance. Ties broken by id ascending, per §9's resolved ambiguity.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        if query.iter().all(|v| *v == 0.0) {
            return Err(Error::InvalidArgument("zero-norm query vector".into()));
        }
        let mut state = self.state.lock().await;
        self.sync(&mut state).await?;

        let mut hits: Vec<Hit> = state
            .base
            .iter()
            .filter(|e| !state.tombstones.contains(&e.id))
            .chain(state.delta.iter())
            .map(|e| Hit {
                id: e.id.clone(),
                distance: cosine_distance(query, &e.vector),
            })
            .collect();
        drop(state);

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        Ok(hits)
    }

    async fn sync(&self, state: &mut State) -> Result<()> {
        let db_version = self.current_base_version().await?;
        if state.base_version < 0 || db_version > state.base_version {
            let jitter_secs = rand::random::<f64>();
            tokio::time::sleep(std::time::Duration::from_secs_f64(jitter_secs)).await;
            self.rebuild_from_scratch(state).await?;
            return Ok(());
        }

        let rows = sqlx::query(
            "SELECT log_id, item_id, op FROM beaver_vector_log WHERE collection_name = ? AND log_id > ? ORDER BY log_id ASC",
        )
        .bind(&self.collection)
        .bind(state.last_seen_log_id)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            return Ok(());
        }

        for row in rows {
            let log_id: i64 = row.get("log_id");
            let item_id: String = row.get("item_id");
            let op: i64 = row.get("op");
            match op {
                1 => {
                    let vector = self.fetch_vector(&item_id).await?;
                    if let Some(vector) = vector {
                        state.delta.retain(|e| e.id != item_id);
                        state.delta.push(Entry { id: item_id.clone(), vector });
                        state.tombstones.remove(&item_id);
                    }
                }
                2 => {
                    state.tombstones.insert(item_id.clone());
                    state.delta.retain(|e| e.id != item_id);
                }
                other => {
                    return Err(Error::Corrupted(format!("unknown vector change-log op {other}")));
                }
            }
            state.last_seen_log_id = state.last_seen_log_id.max(log_id);
        }
        Ok(())
    }

    async fn rebuild_from_scratch(&self, state: &mut State) -> Result<()> {
        let db_version = self.current_base_version().await?;
        let rows = sqlx::query(
            "SELECT item_id, vector_blob FROM beaver_collections WHERE collection_name = ? AND vector_blob IS NOT NULL",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;
        let max_log_id_row = sqlx::query("SELECT COALESCE(MAX(log_id), 0) AS m FROM beaver_vector_log WHERE collection_name = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;

        state.base = rows
            .into_iter()
            .map(|row| {
                let id: String = row.get("item_id");
                let bytes: Vec<u8> = row.get("vector_blob");
                Entry { id, vector: decode_vector(&bytes) }
            })
            .collect();
        state.delta.clear();
        state.tombstones.clear();
        state.base_version = db_version;
        state.last_seen_log_id = max_log_id_row.get("m");
        Ok(())
    }

    async fn fetch_vector(&self, id: &str) -> Result<Option<Vec<f32>>> {
        let row = sqlx::query(
            "SELECT vector_blob FROM beaver_collections WHERE collection_name = ? AND item_id = ? AND vector_blob IS NOT NULL",
        )
        .bind(&self.collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| {
            let bytes: Vec<u8> = row.get("vector_blob");
            decode_vector(&bytes)
        }))
    }

    async fn current_base_version(&self) -> Result<i64> {
        let row = sqlx::query("SELECT base_version FROM beaver_collection_versions WHERE collection_name = ?")
            .bind(&self.collection)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| row.get("base_version")).unwrap_or(0))
    }

    /// Updates only the in-memory fast path for an insert already committed
    /// by the caller (the collection's combined transaction covers vector +
    /// FTS + trigram writes; this just mirrors `insert`'s post-commit step).
    pub(crate) async fn record_insert(&self, id: &str, vector: &[f32], log_id: i64) {
        let mut state = self.state.lock().await;
        state.delta.retain(|e| e.id != id);
        state.delta.push(Entry { id: id.to_string(), vector: vector.to_vec() });
        state.tombstones.remove(id);
        state.last_seen_log_id = state.last_seen_log_id.max(log_id);
    }

    /// Updates only the in-memory fast path for a delete already committed
    /// by the caller. See `record_insert`.
    pub(crate) async fn record_delete(&self, id: &str, log_id: i64) {
        let mut state = self.state.lock().await;
        state.delta.retain(|e| e.id != id);
        state.tombstones.insert(id.to_string());
        state.last_seen_log_id = state.last_seen_log_id.max(log_id);
    }

    pub(crate) async fn delta_len(&self) -> usize {
        self.state.lock().await.delta.len()
    }

    pub(crate) fn compaction_threshold(&self) -> usize {
        self.compaction_threshold
    }

    /// Runs the compaction algorithm of §4.F under the collection's named
    /// inter-process lock: deletes rows behind tombstones, clears the
    /// change log, and bumps `base_version` so every other process rebuilds
    /// on its next `search`.
    pub async fn compact(&self) -> Result<()> {
        let guard = self.compaction_lock.acquire(None).await?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "DELETE FROM beaver_collections WHERE collection_name = ? AND item_id IN
             (SELECT item_id FROM beaver_vector_log WHERE collection_name = ? AND op = 2)",
        )
        .bind(&self.collection)
        .bind(&self.collection)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM beaver_vector_log WHERE collection_name = ?")
            .bind(&self.collection)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO beaver_collection_versions (collection_name, base_version) VALUES (?, 1)
             ON CONFLICT(collection_name) DO UPDATE SET base_version = base_version + 1",
        )
        .bind(&self.collection)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        guard.release().await?;
        Ok(())
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
