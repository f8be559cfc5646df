mod fts;
mod fuzzy;
mod graph;
mod rerank;

use std::sync::Arc;

use sqlx::{Row, SqlitePool};

use beaver_common::{AnyMap, Error, LockOptions, Result};

use crate::lock::FairLock;
use crate::vector::{Hit, VectorIndex};

pub use graph::{Direction, Graph};
pub use rerank::rerank;

/// Which fields of a document's metadata get a full-text/trigram surface.
pub enum FtsFields {
    All,
    Only(Vec<String>),
}

/// One document submitted to `Collection::index`. `fields` doubles as the
/// row's metadata and as the source of flattened text for FTS/trigram
/// indexing.
pub struct Document {
    pub id: String,
    pub vector: Option<Vec<f32>>,
    pub fields: AnyMap,
}

/// A document collection: the composition of a vector index, an FTS index,
/// a trigram fuzzy index, and a directed weighted edge table, all scoped to
/// one collection name (§4.G).
pub struct Collection {
    pool: SqlitePool,
    name: String,
    lock: Arc<FairLock>,
    vectors: VectorIndex,
    graph: Graph,
}

impl Collection {
    pub(crate) fn new(pool: SqlitePool, name: impl Into<String>) -> Self {
        let name = name.into();
        let lock = FairLock::new(pool.clone(), format!("__collection_idx__{name}"), LockOptions::default());
        let vectors = VectorIndex::new(pool.clone(), name.clone());
        let graph = graph::Graph::new(pool.clone(), name.clone());
        Self { pool, name, lock, vectors, graph }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Indexes `doc` atomically across the collection row, the vector
    /// change log, the FTS index, and (if `fuzzy`) the trigram index, under
    /// one transaction protected by the collection's internal fair lock
    /// (§4.G). The edge table is managed independently via `graph().connect`.
    pub async fn index(&self, doc: &Document, fts_fields: FtsFields, fuzzy: bool) -> Result<()> {
        if let Some(vector) = &doc.vector {
            if vector.iter().all(|v| *v == 0.0) {
                return Err(Error::InvalidArgument("zero-norm vector rejected on insert".into()));
            }
        }
        let vector_bytes = doc.vector.as_ref().map(|v| encode_vector(v));
        let metadata_json = serde_json::to_string(&doc.fields)?;

        let flattened: Vec<(String, String)> = doc
            .fields
            .iter()
            .filter(|(field, _)| match &fts_fields {
                FtsFields::All => true,
                FtsFields::Only(names) => names.contains(field),
            })
            .map(|(field, value)| (field.clone(), render_field(value)))
            .collect();
        let joined: String = flattened.iter().map(|(_, text)| text.as_str()).collect::<Vec<_>>().join(" ");

        let guard = self.lock.acquire(None).await?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO beaver_collections (collection_name, item_id, vector_blob, metadata_json) VALUES (?, ?, ?, ?)
             ON CONFLICT(collection_name, item_id) DO UPDATE SET vector_blob = excluded.vector_blob, metadata_json = excluded.metadata_json",
        )
        .bind(&self.name)
        .bind(&doc.id)
        .bind(vector_bytes)
        .bind(metadata_json)
        .execute(&mut *tx)
        .await?;
        let log_row = sqlx::query(
            "INSERT INTO beaver_vector_log (collection_name, item_id, op) VALUES (?, ?, 1) RETURNING log_id",
        )
        .bind(&self.name)
        .bind(&doc.id)
        .fetch_one(&mut *tx)
        .await?;
        let log_id: i64 = log_row.get("log_id");

        fts::reindex(&mut tx, &self.name, &doc.id, &flattened).await?;
        if fuzzy {
            fuzzy::reindex(&mut tx, &self.name, &doc.id, &joined).await?;
        } else {
            fuzzy::drop_item(&mut tx, &self.name, &doc.id).await?;
        }
        tx.commit().await?;
        guard.release().await?;

        if let Some(vector) = &doc.vector {
            self.vectors.record_insert(&doc.id, vector, log_id).await;
            if self.vectors.delta_len().await >= self.vectors.compaction_threshold() {
                if let Err(err) = self.vectors.compact().await {
                    log::warn!("collection {} scheduled compaction failed: {err}", self.name);
                }
            }
        }
        Ok(())
    }

    /// Symmetric to `index`: removes the collection row, the FTS rows, and
    /// the trigram rows for `id` in one transaction.
    pub async fn drop(&self, id: &str) -> Result<()> {
        let guard = self.lock.acquire(None).await?;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM beaver_collections WHERE collection_name = ? AND item_id = ?")
            .bind(&self.name)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let log_row = sqlx::query(
            "INSERT INTO beaver_vector_log (collection_name, item_id, op) VALUES (?, ?, 2) RETURNING log_id",
        )
        .bind(&self.name)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        let log_id: i64 = log_row.get("log_id");
        fts::drop_item(&mut tx, &self.name, id).await?;
        fuzzy::drop_item(&mut tx, &self.name, id).await?;
        tx.commit().await?;
        guard.release().await?;

        self.vectors.record_delete(id, log_id).await;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<AnyMap> {
        let row = sqlx::query("SELECT metadata_json FROM beaver_collections WHERE collection_name = ? AND item_id = ?")
            .bind(&self.name)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(Error::NotFound);
        };
        let metadata_json: String = row.get("metadata_json");
        Ok(serde_json::from_str(&metadata_json)?)
    }

    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<Hit>> {
        self.vectors.search(query, k).await
    }

    pub async fn compact(&self) -> Result<()> {
        self.vectors.compact().await
    }

    pub async fn fts_match(&self, query: &str, on: Option<&[String]>, k: usize) -> Result<Vec<(String, f64)>> {
        fts::search(&self.pool, &self.name, query, on, k).await
    }

    pub async fn fuzzy_match(&self, query: &str, fuzziness: u32, k: usize) -> Result<Vec<(String, u32)>> {
        fuzzy::search(&self.pool, &self.name, query, fuzziness, k).await
    }

    pub fn batch(&self) -> crate::batch::CollectionBatch<'_> {
        crate::batch::CollectionBatch::new(self)
    }
}

fn render_field(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}
