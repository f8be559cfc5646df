use std::sync::Arc;

use sqlx::{Row, SqlitePool};

use beaver_common::{Codec, Error, JsonCodec, LockOptions, Result};

use crate::lock::FairLock;
use crate::time::now_secs;

/// Keyed mapping manager over `beaver_dicts`. TTL expiry is lazy: reads
/// treat an expired row as missing and opportunistically delete it under
/// the manager's internal fair lock (§5: "dict TTL expiry" is one of the
/// read-modify-write paths the internal locks protect).
pub struct Dict {
    pool: SqlitePool,
    name: String,
    lock: Arc<FairLock>,
}

impl Dict {
    pub(crate) fn new(pool: SqlitePool, name: impl Into<String>) -> Self {
        let name = name.into();
        let lock = FairLock::new(pool.clone(), format!("__dict_ttl__{name}"), LockOptions::default());
        Self { pool, name, lock }
    }

    pub async fn set<T: serde::Serialize>(&self, key: &str, value: &T, ttl: Option<std::time::Duration>) -> Result<()> {
        self.set_with(&JsonCodec, key, value, ttl).await
    }

    pub async fn set_with<T, C: Codec<T>>(&self, codec: &C, key: &str, value: &T, ttl: Option<std::time::Duration>) -> Result<()> {
        let bytes = codec.encode(value)?;
        let expires_at = ttl.map(|d| now_secs() + d.as_secs_f64());
        sqlx::query(
            "INSERT INTO beaver_dicts (dict_name, key, value_blob, expires_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(dict_name, key) DO UPDATE SET value_blob = excluded.value_blob, expires_at = excluded.expires_at",
        )
        .bind(&self.name)
        .bind(key)
        .bind(bytes)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        self.get_with(&JsonCodec, key).await
    }

    pub async fn get_with<T, C: Codec<T>>(&self, codec: &C, key: &str) -> Result<T> {
        let row = sqlx::query("SELECT value_blob, expires_at FROM beaver_dicts WHERE dict_name = ? AND key = ?")
            .bind(&self.name)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Err(Error::NotFound);
        };
        let expires_at: Option<f64> = row.get("expires_at");
        if let Some(expires_at) = expires_at {
            if expires_at < now_secs() {
                self.expire_lazily(key).await;
                return Err(Error::NotFound);
            }
        }
        let bytes: Vec<u8> = row.get("value_blob");
        codec.decode(&bytes)
    }

    async fn expire_lazily(&self, key: &str) {
        let guard = match self.lock.acquire(Some(std::time::Duration::from_secs(1))).await {
            Ok(g) => g,
            Err(_) => return,
        };
        if let Err(err) = sqlx::query("DELETE FROM beaver_dicts WHERE dict_name = ? AND key = ? AND expires_at < ?")
            .bind(&self.name)
            .bind(key)
            .bind(now_secs())
            .execute(&self.pool)
            .await
        {
            log::warn!("dict {} lazy expiry failed: {err}", self.name);
        }
        drop(guard);
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM beaver_dicts WHERE dict_name = ? AND key = ?")
            .bind(&self.name)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn contains(&self, key: &str) -> Result<bool> {
        match self.get::<serde_json::Value>(key).await {
            Ok(_) => Ok(true),
            Err(Error::NotFound) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn len(&self) -> Result<i64> {
        let now = now_secs();
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM beaver_dicts WHERE dict_name = ? AND (expires_at IS NULL OR expires_at >= ?)",
        )
        .bind(&self.name)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("n"))
    }
}
