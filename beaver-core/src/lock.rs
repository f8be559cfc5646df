use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex as AsyncMutex;

use beaver_common::{Error, LockOptions, Result, WaiterId};

use crate::time::{jittered_sleep, now_secs};

struct LockState {
    /// Re-entrancy depth for this lock object. 0 means not held by this
    /// instance. Per §4.B/§9: depth lives on the instance, but re-entrancy
    /// only fires for the task that actually drove depth 0→1 — tracked by
    /// `owner` below. A different task sharing this same `Arc<FairLock>`
    /// (the session caches one instance per name, so concurrent callers
    /// commonly share one) is foreign and must go through the insert-and-poll
    /// queue path like any other waiter, even though `depth > 0`.
    depth: u32,
    waiter_id: Option<WaiterId>,
    /// The task that currently owns `depth`/`waiter_id`, if any. `None` when
    /// not held, or when the holder acquired from outside a tracked task
    /// context (in which case re-entrancy never matches and every acquire on
    /// that identity serializes through the queue — the safe default).
    owner: Option<tokio::task::Id>,
}

/// A named mutex usable across processes sharing the datastore file, per
/// §4.B. Each manager that needs internal read-modify-write serialization
/// (queue pop, list mutation, dict TTL expiry, collection index/drop) owns
/// its own `FairLock` with a distinctly prefixed name so it can never
/// collide with a user-facing lock of the same logical name.
pub struct FairLock {
    pool: SqlitePool,
    name: String,
    options: LockOptions,
    state: AsyncMutex<LockState>,
}

impl FairLock {
    pub(crate) fn new(pool: SqlitePool, name: impl Into<String>, options: LockOptions) -> Arc<Self> {
        Arc::new(Self {
            pool,
            name: name.into(),
            options,
            state: AsyncMutex::new(LockState {
                depth: 0,
                waiter_id: None,
                owner: None,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks until the lock is held or `timeout` elapses.
    ///
    /// Re-entrancy only short-circuits for the task that already owns this
    /// instance's hold (§9: re-entrant per instance, serialized — not a
    /// thread-local counter — across any other caller of that same
    /// instance). A foreign task sharing this `Arc` falls through to the
    /// same insert-and-poll queue path a brand new waiter would take. The
    /// `state` mutex is only held for the brief owner check and, on success,
    /// to record the new owner — never across the poll loop itself, so a
    /// foreign waiter blocked in that loop can never stall the real owner's
    /// `release()`, which also needs `state` briefly to clear it.
    pub async fn acquire(self: &Arc<Self>, timeout: Option<Duration>) -> Result<LockGuard> {
        let current_task = tokio::task::try_id();
        {
            let mut state = self.state.lock().await;
            if state.depth > 0 && current_task.is_some() && state.owner == current_task {
                state.depth += 1;
                return Ok(LockGuard {
                    lock: self.clone(),
                    released: false,
                });
            }
        }

        let waiter_id = WaiterId::new();
        let requested_at = now_secs();
        sqlx::query(
            "INSERT INTO beaver_locks (lock_name, waiter_id, requested_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&self.name)
        .bind(waiter_id.to_string())
        .bind(requested_at)
        .bind(requested_at + self.options.ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;

        let start = Instant::now();
        loop {
            let mut tx = self.pool.begin().await?;
            let now = now_secs();
            sqlx::query("DELETE FROM beaver_locks WHERE lock_name = ? AND expires_at < ?")
                .bind(&self.name)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            let front = sqlx::query(
                "SELECT waiter_id FROM beaver_locks WHERE lock_name = ? ORDER BY requested_at ASC, waiter_id ASC LIMIT 1",
            )
            .bind(&self.name)
            .fetch_optional(&mut *tx)
            .await?;
            tx.commit().await?;

            if let Some(row) = front {
                let front_waiter: String = row.get("waiter_id");
                if front_waiter == waiter_id.to_string() {
                    let mut state = self.state.lock().await;
                    state.depth = 1;
                    state.waiter_id = Some(waiter_id);
                    state.owner = current_task;
                    return Ok(LockGuard {
                        lock: self.clone(),
                        released: false,
                    });
                }
            }

            if let Some(timeout) = timeout {
                if start.elapsed() >= timeout {
                    sqlx::query("DELETE FROM beaver_locks WHERE lock_name = ? AND waiter_id = ?")
                        .bind(&self.name)
                        .bind(waiter_id.to_string())
                        .execute(&self.pool)
                        .await?;
                    return Err(Error::TimedOut(self.name.clone()));
                }
            }

            jittered_sleep(self.options.poll_interval).await;
        }
    }

    /// Non-blocking variant: returns `Err(Error::TimedOut)` immediately if
    /// the lock is not free rather than polling.
    pub async fn try_acquire(self: &Arc<Self>) -> Result<LockGuard> {
        self.acquire(Some(Duration::ZERO)).await
    }

    async fn release_one_level(&self, state: &mut LockState) -> Result<()> {
        if state.depth == 0 {
            return Ok(());
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            if let Some(waiter_id) = state.waiter_id.take() {
                sqlx::query("DELETE FROM beaver_locks WHERE lock_name = ? AND waiter_id = ?")
                    .bind(&self.name)
                    .bind(waiter_id.to_string())
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }
}

/// RAII guard returned by `acquire`/`try_acquire`. Dropping it releases one
/// level of re-entrancy; call `release()` directly to observe errors from
/// the final row deletion instead of only logging them.
pub struct LockGuard {
    lock: Arc<FairLock>,
    released: bool,
}

impl LockGuard {
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        let mut state = self.lock.state.lock().await;
        self.lock.release_one_level(&mut state).await
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let lock = self.lock.clone();
        tokio::spawn(async move {
            let mut state = lock.state.lock().await;
            if let Err(err) = lock.release_one_level(&mut state).await {
                log::warn!("failed to release lock {}: {err}", lock.name());
            }
        });
    }
}
