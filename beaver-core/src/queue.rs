use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::{Row, SqlitePool};

use beaver_common::{Codec, Error, JsonCodec, LockOptions, Result};

use crate::lock::FairLock;
use crate::time::{jittered_sleep, now_secs};

/// Priority-queue manager over `beaver_queues`. `get` delivers each
/// successfully-put item to exactly one caller across every participating
/// process (§4.C): the atomic select-then-delete happens inside the
/// queue's internal fair lock, which is distinct from any user-facing lock
/// naming the same queue.
pub struct Queue {
    pool: SqlitePool,
    name: String,
    lock: Arc<FairLock>,
    poll_interval: Duration,
}

impl Queue {
    pub(crate) fn new(pool: SqlitePool, name: impl Into<String>) -> Self {
        let name = name.into();
        let lock = FairLock::new(pool.clone(), format!("__queue_pop__{name}"), LockOptions::default());
        Self {
            pool,
            name,
            lock,
            poll_interval: Duration::from_millis(50),
        }
    }

    pub async fn put<T: serde::Serialize>(&self, value: &T, priority: f64) -> Result<()> {
        self.put_with(&JsonCodec, value, priority).await
    }

    pub async fn put_with<T, C: Codec<T>>(&self, codec: &C, value: &T, priority: f64) -> Result<()> {
        let bytes = codec.encode(value)?;
        sqlx::query("INSERT INTO beaver_queues (queue_name, priority, timestamp, data_blob) VALUES (?, ?, ?, ?)")
            .bind(&self.name)
            .bind(priority)
            .bind(now_secs())
            .bind(bytes)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn peek<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        self.peek_with(&JsonCodec).await
    }

    pub async fn peek_with<T, C: Codec<T>>(&self, codec: &C) -> Result<T> {
        let row = sqlx::query(
            "SELECT data_blob FROM beaver_queues WHERE queue_name = ? ORDER BY priority ASC, timestamp ASC, id ASC LIMIT 1",
        )
        .bind(&self.name)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Err(Error::Empty);
        };
        let bytes: Vec<u8> = row.get("data_blob");
        codec.decode(&bytes)
    }

    /// Atomically selects and removes the minimum-`(priority, timestamp,
    /// id)` row. If `block` is false and the queue is empty, returns
    /// `Error::Empty` immediately; if `block` is true, polls with jitter
    /// until an item appears or `timeout` elapses (`Error::TimedOut`).
    pub async fn get<T: serde::de::DeserializeOwned>(&self, block: bool, timeout: Option<Duration>) -> Result<T> {
        self.get_with(&JsonCodec, block, timeout).await
    }

    pub async fn get_with<T, C: Codec<T>>(&self, codec: &C, block: bool, timeout: Option<Duration>) -> Result<T> {
        let start = Instant::now();
        loop {
            let popped = self.try_pop(codec).await?;
            match popped {
                Some(value) => return Ok(value),
                None => {
                    if !block {
                        return Err(Error::Empty);
                    }
                    if let Some(timeout) = timeout {
                        if start.elapsed() >= timeout {
                            return Err(Error::TimedOut(self.name.clone()));
                        }
                    }
                    jittered_sleep(self.poll_interval).await;
                }
            }
        }
    }

    async fn try_pop<T, C: Codec<T>>(&self, codec: &C) -> Result<Option<T>> {
        let guard = self.lock.acquire(None).await?;
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(
            "SELECT id, data_blob FROM beaver_queues WHERE queue_name = ? ORDER BY priority ASC, timestamp ASC, id ASC LIMIT 1",
        )
        .bind(&self.name)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            tx.commit().await?;
            guard.release().await?;
            return Ok(None);
        };
        let id: i64 = row.get("id");
        let bytes: Vec<u8> = row.get("data_blob");
        sqlx::query("DELETE FROM beaver_queues WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        guard.release().await?;
        Ok(Some(codec.decode(&bytes)?))
    }

    pub async fn len(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM beaver_queues WHERE queue_name = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }

    pub async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM beaver_queues WHERE queue_name = ?")
            .bind(&self.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
