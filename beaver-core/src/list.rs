use std::sync::Arc;

use sqlx::{Row, SqlitePool};

use beaver_common::{Codec, Error, JsonCodec, LockOptions, Result};

use crate::lock::FairLock;

/// Ordered sequence manager over `beaver_lists`. Order keys are dense
/// floats, never integer indices (§3.1): pushes/prepends pick keys strictly
/// past the current extremes and `insert` picks the midpoint between
/// neighbors, so existing rows never need to be renumbered.
pub struct List {
    pool: SqlitePool,
    name: String,
    lock: Arc<FairLock>,
}

impl List {
    pub(crate) fn new(pool: SqlitePool, name: impl Into<String>) -> Self {
        let name = name.into();
        let lock = FairLock::new(pool.clone(), format!("__list_idx__{name}"), LockOptions::default());
        Self { pool, name, lock }
    }

    async fn min_max(&self) -> Result<(Option<f64>, Option<f64>)> {
        let row = sqlx::query("SELECT MIN(order_key) AS lo, MAX(order_key) AS hi FROM beaver_lists WHERE list_name = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;
        Ok((row.get("lo"), row.get("hi")))
    }

    pub async fn push<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        self.push_with(&JsonCodec, value).await
    }

    pub async fn push_with<T, C: Codec<T>>(&self, codec: &C, value: &T) -> Result<()> {
        let bytes = codec.encode(value)?;
        let guard = self.lock.acquire(None).await?;
        let (_, hi) = self.min_max().await?;
        let key = hi.map(|h| h + 1.0).unwrap_or(0.0);
        sqlx::query("INSERT INTO beaver_lists (list_name, order_key, value_blob) VALUES (?, ?, ?)")
            .bind(&self.name)
            .bind(key)
            .bind(bytes)
            .execute(&self.pool)
            .await?;
        guard.release().await?;
        Ok(())
    }

    pub async fn prepend<T: serde::Serialize>(&self, value: &T) -> Result<()> {
        self.prepend_with(&JsonCodec, value).await
    }

    pub async fn prepend_with<T, C: Codec<T>>(&self, codec: &C, value: &T) -> Result<()> {
        let bytes = codec.encode(value)?;
        let guard = self.lock.acquire(None).await?;
        let (lo, _) = self.min_max().await?;
        let key = lo.map(|l| l - 1.0).unwrap_or(0.0);
        sqlx::query("INSERT INTO beaver_lists (list_name, order_key, value_blob) VALUES (?, ?, ?)")
            .bind(&self.name)
            .bind(key)
            .bind(bytes)
            .execute(&self.pool)
            .await?;
        guard.release().await?;
        Ok(())
    }

    /// Inserts `value` so it lands at position `index` (0-based) in the
    /// current order, with its key set to the midpoint between the
    /// neighbors at `index - 1` and `index`.
    pub async fn insert<T: serde::Serialize>(&self, index: usize, value: &T) -> Result<()> {
        self.insert_with(&JsonCodec, index, value).await
    }

    pub async fn insert_with<T, C: Codec<T>>(&self, codec: &C, index: usize, value: &T) -> Result<()> {
        let bytes = codec.encode(value)?;
        let guard = self.lock.acquire(None).await?;
        let keys: Vec<f64> = sqlx::query(
            "SELECT order_key FROM beaver_lists WHERE list_name = ? ORDER BY order_key ASC, id ASC",
        )
        .bind(&self.name)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|row| row.get("order_key"))
        .collect();

        let key = match (index.checked_sub(1).and_then(|i| keys.get(i)), keys.get(index)) {
            (Some(&before), Some(&after)) => (before + after) / 2.0,
            (Some(&before), None) => before + 1.0,
            (None, Some(&after)) => after - 1.0,
            (None, None) => 0.0,
        };

        sqlx::query("INSERT INTO beaver_lists (list_name, order_key, value_blob) VALUES (?, ?, ?)")
            .bind(&self.name)
            .bind(key)
            .bind(bytes)
            .execute(&self.pool)
            .await?;
        guard.release().await?;
        Ok(())
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, index: usize) -> Result<T> {
        self.get_with(&JsonCodec, index).await
    }

    pub async fn get_with<T, C: Codec<T>>(&self, codec: &C, index: usize) -> Result<T> {
        let row = sqlx::query(
            "SELECT value_blob FROM beaver_lists WHERE list_name = ? ORDER BY order_key ASC, id ASC LIMIT 1 OFFSET ?",
        )
        .bind(&self.name)
        .bind(index as i64)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Err(Error::NotFound);
        };
        let bytes: Vec<u8> = row.get("value_blob");
        codec.decode(&bytes)
    }

    pub async fn to_vec<T: serde::de::DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.to_vec_with(&JsonCodec).await
    }

    pub async fn to_vec_with<T, C: Codec<T>>(&self, codec: &C) -> Result<Vec<T>> {
        let rows = sqlx::query("SELECT value_blob FROM beaver_lists WHERE list_name = ? ORDER BY order_key ASC, id ASC")
            .bind(&self.name)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let bytes: Vec<u8> = row.get("value_blob");
                codec.decode(&bytes)
            })
            .collect()
    }

    pub async fn len(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM beaver_lists WHERE list_name = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn remove(&self, index: usize) -> Result<()> {
        let guard = self.lock.acquire(None).await?;
        let row = sqlx::query("SELECT id FROM beaver_lists WHERE list_name = ? ORDER BY order_key ASC, id ASC LIMIT 1 OFFSET ?")
            .bind(&self.name)
            .bind(index as i64)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            guard.release().await?;
            return Err(Error::NotFound);
        };
        let id: i64 = row.get("id");
        sqlx::query("DELETE FROM beaver_lists WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        guard.release().await?;
        Ok(())
    }
}
