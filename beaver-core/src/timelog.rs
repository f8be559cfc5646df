use std::time::Duration;

use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use beaver_common::Result;

use crate::time::{EPSILON, now_secs};

/// One stored event: a timestamp plus an opaque byte payload. Kept
/// codec-agnostic (§9: the live aggregator is `fn(&[Event]) -> R`) so the
/// aggregator can parse events however it likes.
#[derive(Clone, Debug)]
pub struct Event {
    pub timestamp: f64,
    pub data: Vec<u8>,
}

/// Time-series log manager over `beaver_logs`. Enforces monotonic
/// timestamps per log at write time (§4.E) using an in-process cache of
/// the last written timestamp, seeded from the table on first use.
pub struct TimeLog {
    pool: SqlitePool,
    name: String,
    last_written: AsyncMutex<Option<f64>>,
}

impl TimeLog {
    pub(crate) fn new(pool: SqlitePool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
            last_written: AsyncMutex::new(None),
        }
    }

    /// Appends an event at caller timestamp `t`, substituting
    /// `last_written_timestamp + EPSILON` if `t` would not be strictly
    /// increasing. Returns the timestamp actually written.
    pub async fn append(&self, t: f64, data: &[u8]) -> Result<f64> {
        let mut last = self.last_written.lock().await;
        if last.is_none() {
            let row = sqlx::query("SELECT MAX(timestamp) AS m FROM beaver_logs WHERE log_name = ?")
                .bind(&self.name)
                .fetch_one(&self.pool)
                .await?;
            *last = row.get::<Option<f64>, _>("m");
        }

        let effective = match *last {
            Some(prev) if t <= prev => prev + EPSILON,
            _ => t,
        };

        sqlx::query("INSERT INTO beaver_logs (log_name, timestamp, data_blob) VALUES (?, ?, ?)")
            .bind(&self.name)
            .bind(effective)
            .bind(data)
            .execute(&self.pool)
            .await?;

        *last = Some(effective);
        Ok(effective)
    }

    /// Events with `timestamp ∈ [start, end)` in ascending order.
    pub async fn range(&self, start: f64, end: f64) -> Result<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT timestamp, data_blob FROM beaver_logs WHERE log_name = ? AND timestamp >= ? AND timestamp < ? ORDER BY timestamp ASC, id ASC",
        )
        .bind(&self.name)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| Event {
                timestamp: row.get("timestamp"),
                data: row.get("data_blob"),
            })
            .collect())
    }

    /// Starts a rolling-window aggregation: every `period`, takes events
    /// with `timestamp ∈ [now - window, now]` (inclusive at both ends),
    /// passes them to `aggregator`, and makes its return value available
    /// via `Live::next`.
    pub fn live<R, F>(&self, window: Duration, period: Duration, aggregator: F) -> Live<R>
    where
        R: Send + 'static,
        F: Fn(&[Event]) -> R + Send + 'static,
    {
        let pool = self.pool.clone();
        let name = self.name.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(period).await;
                let now = now_secs();
                let start = now - window.as_secs_f64();
                let rows = match sqlx::query(
                    "SELECT timestamp, data_blob FROM beaver_logs WHERE log_name = ? AND timestamp >= ? AND timestamp <= ? ORDER BY timestamp ASC, id ASC",
                )
                .bind(&name)
                .bind(start)
                .bind(now)
                .fetch_all(&pool)
                .await
                {
                    Ok(rows) => rows,
                    Err(err) => {
                        log::warn!("live log {name} tick failed: {err}");
                        continue;
                    }
                };
                let events: Vec<Event> = rows
                    .into_iter()
                    .map(|row| Event {
                        timestamp: row.get("timestamp"),
                        data: row.get("data_blob"),
                    })
                    .collect();
                let result = aggregator(&events);
                if tx.send(result).is_err() {
                    return;
                }
            }
        });
        Live { rx, task }
    }
}

/// A finite-once-stopped, otherwise infinite, non-restartable sequence of
/// aggregator results (§9).
pub struct Live<R> {
    rx: mpsc::UnboundedReceiver<R>,
    task: JoinHandle<()>,
}

impl<R> Live<R> {
    pub async fn next(&mut self) -> Option<R> {
        self.rx.recv().await
    }

    /// Stops the background ticker and joins it cleanly, per §4.E.
    pub async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

impl<R> Drop for Live<R> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
