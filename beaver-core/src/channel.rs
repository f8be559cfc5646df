use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as SyncMutex};
use std::time::Duration;

use sqlx::{Row, SqlitePool};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use beaver_common::{Error, Result};

use crate::time::jittered_sleep;

type SubscriberMap = Arc<SyncMutex<HashMap<u64, mpsc::UnboundedSender<Vec<u8>>>>>;

struct Fanout {
    subscribers: SubscriberMap,
    task: JoinHandle<()>,
}

/// Pub/sub channel manager backed by `beaver_pubsub_log`. Every publish is
/// persisted and assigned a `msg_id`; a single background "fan-out" task
/// per process polls for new rows and pushes them to every live
/// subscription's in-process queue, per §4.D.
pub struct Channel {
    pool: SqlitePool,
    name: String,
    poll_interval: Duration,
    next_sub_id: AtomicU64,
    fanout: SyncMutex<Option<Fanout>>,
}

impl Channel {
    pub(crate) fn new(pool: SqlitePool, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            name: name.into(),
            poll_interval: Duration::from_millis(50),
            next_sub_id: AtomicU64::new(0),
            fanout: SyncMutex::new(None),
        })
    }

    pub async fn publish(&self, payload: &[u8]) -> Result<i64> {
        let row = sqlx::query("INSERT INTO beaver_pubsub_log (channel_name, payload_blob) VALUES (?, ?) RETURNING msg_id")
            .bind(&self.name)
            .bind(payload)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("msg_id"))
    }

    async fn current_max_msg_id(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COALESCE(MAX(msg_id), 0) AS m FROM beaver_pubsub_log WHERE channel_name = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("m"))
    }

    /// Registers a new in-process subscription. A subscriber that
    /// subscribes after N publishes have already happened sees
    /// `last_seen_id = current max`, so it never replays history (§8 #7).
    pub async fn subscribe(self: &Arc<Self>) -> Result<Subscription> {
        let last_seen_id = self.current_max_msg_id().await?;
        let mut fanout_guard = self.fanout.lock().unwrap();
        if fanout_guard.is_none() {
            let subscribers: SubscriberMap = Arc::new(SyncMutex::new(HashMap::new()));
            let task = spawn_fanout(self.clone(), subscribers.clone(), last_seen_id);
            *fanout_guard = Some(Fanout { subscribers, task });
        }
        let subscribers = fanout_guard.as_ref().unwrap().subscribers.clone();
        drop(fanout_guard);

        let id = self.next_sub_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        subscribers.lock().unwrap().insert(id, tx);

        Ok(Subscription {
            channel: self.clone(),
            id,
            rx,
        })
    }

    fn unsubscribe(&self, id: u64) {
        let mut fanout_guard = self.fanout.lock().unwrap();
        let Some(fanout) = fanout_guard.as_mut() else {
            return;
        };
        fanout.subscribers.lock().unwrap().remove(&id);
        let empty = fanout.subscribers.lock().unwrap().is_empty();
        if empty {
            fanout.task.abort();
            *fanout_guard = None;
        }
    }
}

fn spawn_fanout(channel: Arc<Channel>, subscribers: SubscriberMap, mut last_seen_id: i64) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            jittered_sleep(channel.poll_interval).await;
            let rows = match sqlx::query(
                "SELECT msg_id, payload_blob FROM beaver_pubsub_log WHERE channel_name = ? AND msg_id > ? ORDER BY msg_id ASC",
            )
            .bind(&channel.name)
            .bind(last_seen_id)
            .fetch_all(&channel.pool)
            .await
            {
                Ok(rows) => rows,
                Err(err) => {
                    log::warn!("channel {} poll failed: {err}", channel.name);
                    continue;
                }
            };
            if rows.is_empty() {
                continue;
            }
            let senders: Vec<mpsc::UnboundedSender<Vec<u8>>> =
                subscribers.lock().unwrap().values().cloned().collect();
            for row in rows {
                let msg_id: i64 = row.get("msg_id");
                let payload: Vec<u8> = row.get("payload_blob");
                for sender in &senders {
                    let _ = sender.send(payload.clone());
                }
                last_seen_id = msg_id;
            }
        }
    })
}

/// One subscriber's view of a channel. `listen` yields payloads in strict
/// `msg_id` order; dropping or explicitly unsubscribing removes it from
/// the fan-out, stopping the background task once the last subscriber in
/// the process is gone.
pub struct Subscription {
    channel: Arc<Channel>,
    id: u64,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Subscription {
    pub async fn listen(&mut self, timeout: Option<Duration>) -> Result<Vec<u8>> {
        match timeout {
            None => self.rx.recv().await.ok_or(Error::AlreadyClosed),
            Some(timeout) => match tokio::time::timeout(timeout, self.rx.recv()).await {
                Ok(Some(payload)) => Ok(payload),
                Ok(None) => Err(Error::AlreadyClosed),
                Err(_) => Err(Error::TimedOut(self.channel.name.clone())),
            },
        }
    }

    pub fn unsubscribe(self) {
        // Drop performs the same removal; this just makes the intent explicit.
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.channel.unsubscribe(self.id);
    }
}
