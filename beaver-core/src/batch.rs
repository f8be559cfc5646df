use sqlx::{Row, SqlitePool};

use beaver_common::{AnyMap, Codec, JsonCodec, Result};

use crate::collection::{Collection, Document, FtsFields};
use crate::time::now_secs;

/// Buffers dict writes in memory; `close` applies them as one bulk upsert
/// transaction (§4.H). Reads against the dict during the batch's lifetime
/// do not observe these pending writes.
pub struct DictBatch {
    pool: SqlitePool,
    name: String,
    pending: Vec<(String, Vec<u8>, Option<f64>)>,
}

impl DictBatch {
    pub(crate) fn new(pool: SqlitePool, name: impl Into<String>) -> Self {
        Self { pool, name: name.into(), pending: Vec::new() }
    }

    pub fn set<T: serde::Serialize>(&mut self, key: &str, value: &T, ttl: Option<std::time::Duration>) -> Result<()> {
        self.set_with(&JsonCodec, key, value, ttl)
    }

    pub fn set_with<T, C: Codec<T>>(&mut self, codec: &C, key: &str, value: &T, ttl: Option<std::time::Duration>) -> Result<()> {
        let bytes = codec.encode(value)?;
        let expires_at = ttl.map(|d| now_secs() + d.as_secs_f64());
        self.pending.push((key.to_string(), bytes, expires_at));
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, bytes, expires_at) in self.pending {
            sqlx::query(
                "INSERT INTO beaver_dicts (dict_name, key, value_blob, expires_at) VALUES (?, ?, ?, ?)
                 ON CONFLICT(dict_name, key) DO UPDATE SET value_blob = excluded.value_blob, expires_at = excluded.expires_at",
            )
            .bind(&self.name)
            .bind(key)
            .bind(bytes)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

enum ListOp {
    Push(Vec<u8>),
    Prepend(Vec<u8>),
}

/// Buffers push/prepend-only list writes (§4.H: `insert` is not supported
/// inside a batch). `close` reads `min`/`max` order_key once and assigns
/// consecutive decrements/increments, so the whole batch costs one read and
/// one bulk write regardless of size.
pub struct ListBatch {
    pool: SqlitePool,
    name: String,
    pending: Vec<ListOp>,
}

impl ListBatch {
    pub(crate) fn new(pool: SqlitePool, name: impl Into<String>) -> Self {
        Self { pool, name: name.into(), pending: Vec::new() }
    }

    pub fn push<T: serde::Serialize>(&mut self, value: &T) -> Result<()> {
        self.push_with(&JsonCodec, value)
    }

    pub fn push_with<T, C: Codec<T>>(&mut self, codec: &C, value: &T) -> Result<()> {
        self.pending.push(ListOp::Push(codec.encode(value)?));
        Ok(())
    }

    pub fn prepend<T: serde::Serialize>(&mut self, value: &T) -> Result<()> {
        self.prepend_with(&JsonCodec, value)
    }

    pub fn prepend_with<T, C: Codec<T>>(&mut self, codec: &C, value: &T) -> Result<()> {
        self.pending.push(ListOp::Prepend(codec.encode(value)?));
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT MIN(order_key) AS lo, MAX(order_key) AS hi FROM beaver_lists WHERE list_name = ?")
            .bind(&self.name)
            .fetch_one(&mut *tx)
            .await?;
        let mut lo: f64 = row.try_get::<Option<f64>, _>("lo")?.unwrap_or(0.0);
        let mut hi: f64 = row.try_get::<Option<f64>, _>("hi")?.unwrap_or(0.0);
        let mut has_rows = row.try_get::<Option<f64>, _>("lo")?.is_some();

        for op in self.pending {
            let (key, bytes) = match op {
                ListOp::Push(bytes) => {
                    let key = if has_rows { hi + 1.0 } else { 0.0 };
                    hi = key;
                    has_rows = true;
                    (key, bytes)
                }
                ListOp::Prepend(bytes) => {
                    let key = if has_rows { lo - 1.0 } else { 0.0 };
                    lo = key;
                    has_rows = true;
                    (key, bytes)
                }
            };
            sqlx::query("INSERT INTO beaver_lists (list_name, order_key, value_blob) VALUES (?, ?, ?)")
                .bind(&self.name)
                .bind(key)
                .bind(bytes)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Buffers log appends; `close` applies them with the same monotonicity
/// substitution rule as `TimeLog::append`, seeded from one read of the
/// current max timestamp.
pub struct LogBatch {
    pool: SqlitePool,
    name: String,
    pending: Vec<(f64, Vec<u8>)>,
}

impl LogBatch {
    pub(crate) fn new(pool: SqlitePool, name: impl Into<String>) -> Self {
        Self { pool, name: name.into(), pending: Vec::new() }
    }

    pub fn append(&mut self, t: f64, data: &[u8]) {
        self.pending.push((t, data.to_vec()));
    }

    pub async fn close(self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT MAX(timestamp) AS m FROM beaver_logs WHERE log_name = ?")
            .bind(&self.name)
            .fetch_one(&mut *tx)
            .await?;
        let mut last: Option<f64> = row.try_get("m")?;
        for (t, data) in self.pending {
            let effective = match last {
                Some(prev) if t <= prev => prev + crate::time::EPSILON,
                _ => t,
            };
            sqlx::query("INSERT INTO beaver_logs (log_name, timestamp, data_blob) VALUES (?, ?, ?)")
                .bind(&self.name)
                .bind(effective)
                .bind(data)
                .execute(&mut *tx)
                .await?;
            last = Some(effective);
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Buffers blob writes; `close` applies them as one bulk upsert transaction.
pub struct BlobBatch {
    pool: SqlitePool,
    name: String,
    pending: Vec<(String, Vec<u8>, Option<String>)>,
}

impl BlobBatch {
    pub(crate) fn new(pool: SqlitePool, name: impl Into<String>) -> Self {
        Self { pool, name: name.into(), pending: Vec::new() }
    }

    pub fn set(&mut self, key: &str, data: &[u8], metadata: Option<&AnyMap>) -> Result<()> {
        let metadata_json = metadata.map(serde_json::to_string).transpose()?;
        self.pending.push((key.to_string(), data.to_vec(), metadata_json));
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for (key, data, metadata_json) in self.pending {
            sqlx::query(
                "INSERT INTO beaver_blobs (store_name, key, data, metadata_json) VALUES (?, ?, ?, ?)
                 ON CONFLICT(store_name, key) DO UPDATE SET data = excluded.data, metadata_json = excluded.metadata_json",
            )
            .bind(&self.name)
            .bind(key)
            .bind(data)
            .bind(metadata_json)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

/// Buffers collection `index` calls; `close` applies the collection-row,
/// FTS, and trigram writes for every buffered document in one transaction,
/// then replays the vector index's in-memory fast path per document.
pub struct CollectionBatch<'a> {
    collection: &'a Collection,
    pending: Vec<(Document, FtsFields, bool)>,
}

impl<'a> CollectionBatch<'a> {
    pub(crate) fn new(collection: &'a Collection) -> Self {
        Self { collection, pending: Vec::new() }
    }

    pub fn index(&mut self, doc: Document, fts_fields: FtsFields, fuzzy: bool) {
        self.pending.push((doc, fts_fields, fuzzy));
    }

    pub async fn close(self) -> Result<()> {
        for (doc, fts_fields, fuzzy) in self.pending {
            self.collection.index(&doc, fts_fields, fuzzy).await?;
        }
        Ok(())
    }
}
