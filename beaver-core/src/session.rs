use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex as SyncMutex};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use beaver_common::{Error, Result, SessionOptions};

use crate::batch::{BlobBatch, DictBatch, ListBatch, LogBatch};
use crate::blob::Blob;
use crate::channel::Channel;
use crate::collection::Collection;
use crate::dict::Dict;
use crate::list::List;
use crate::lock::FairLock;
use crate::queue::Queue;
use crate::schema;
use crate::timelog::TimeLog;

use beaver_common::LockOptions;

#[derive(Default)]
struct Registries {
    dicts: HashMap<String, Arc<Dict>>,
    lists: HashMap<String, Arc<List>>,
    queues: HashMap<String, Arc<Queue>>,
    channels: HashMap<String, Arc<Channel>>,
    logs: HashMap<String, Arc<TimeLog>>,
    blobs: HashMap<String, Arc<Blob>>,
    collections: HashMap<String, Arc<Collection>>,
    locks: HashMap<String, Arc<FairLock>>,
}

/// The storage session (§4.A): owns the shared `SqlitePool`, bootstraps the
/// schema idempotently, and caches one manager instance per `(type, name)`
/// so internal locks and background tasks have a single home.
pub struct Session {
    pool: SqlitePool,
    registries: SyncMutex<Registries>,
    closed: std::sync::atomic::AtomicBool,
}

impl Session {
    /// Opens (creating if necessary) the shared database file at `path`,
    /// applies the configured pragmas, and idempotently bootstraps the
    /// schema. Two processes racing on the same path are safe: `bootstrap`
    /// runs inside one exclusive transaction per process and every
    /// statement is `CREATE ... IF NOT EXISTS`.
    pub async fn open(path: impl AsRef<Path>, options: SessionOptions) -> Result<Arc<Session>> {
        let connect_options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true)
            .pragma("mmap_size", options.mmap_bytes.to_string());

        let pool_options = if options.cache_enabled {
            SqlitePoolOptions::new()
        } else {
            SqlitePoolOptions::new().max_connections(1)
        };
        let pool = pool_options.connect_with(connect_options).await?;

        schema::bootstrap(&pool).await?;

        Ok(Arc::new(Session {
            pool,
            registries: SyncMutex::new(Registries::default()),
            closed: std::sync::atomic::AtomicBool::new(false),
        }))
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(std::sync::atomic::Ordering::Acquire) {
            return Err(Error::AlreadyClosed);
        }
        Ok(())
    }

    /// A handle to the shared pool. `sqlx::SqlitePool` is itself safely
    /// shareable across tasks and threads, so the per-thread handle
    /// contract (§4.A/§9) collapses to "a pool clone plus the session's
    /// closed check" rather than a thread-affine object.
    pub fn handle(&self) -> Result<SqlitePool> {
        self.check_open()?;
        Ok(self.pool.clone())
    }

    pub fn dict(&self, name: &str) -> Result<Arc<Dict>> {
        self.check_open()?;
        let mut registries = self.registries.lock().unwrap();
        if let Some(existing) = registries.dicts.get(name) {
            return Ok(existing.clone());
        }
        let manager = Arc::new(Dict::new(self.pool.clone(), name));
        registries.dicts.insert(name.to_string(), manager.clone());
        Ok(manager)
    }

    pub fn list(&self, name: &str) -> Result<Arc<List>> {
        self.check_open()?;
        let mut registries = self.registries.lock().unwrap();
        if let Some(existing) = registries.lists.get(name) {
            return Ok(existing.clone());
        }
        let manager = Arc::new(List::new(self.pool.clone(), name));
        registries.lists.insert(name.to_string(), manager.clone());
        Ok(manager)
    }

    pub fn queue(&self, name: &str) -> Result<Arc<Queue>> {
        self.check_open()?;
        let mut registries = self.registries.lock().unwrap();
        if let Some(existing) = registries.queues.get(name) {
            return Ok(existing.clone());
        }
        let manager = Arc::new(Queue::new(self.pool.clone(), name));
        registries.queues.insert(name.to_string(), manager.clone());
        Ok(manager)
    }

    pub fn channel(&self, name: &str) -> Result<Arc<Channel>> {
        self.check_open()?;
        let mut registries = self.registries.lock().unwrap();
        if let Some(existing) = registries.channels.get(name) {
            return Ok(existing.clone());
        }
        let manager = Channel::new(self.pool.clone(), name);
        registries.channels.insert(name.to_string(), manager.clone());
        Ok(manager)
    }

    pub fn log(&self, name: &str) -> Result<Arc<TimeLog>> {
        self.check_open()?;
        let mut registries = self.registries.lock().unwrap();
        if let Some(existing) = registries.logs.get(name) {
            return Ok(existing.clone());
        }
        let manager = Arc::new(TimeLog::new(self.pool.clone(), name));
        registries.logs.insert(name.to_string(), manager.clone());
        Ok(manager)
    }

    pub fn blobs(&self, name: &str) -> Result<Arc<Blob>> {
        self.check_open()?;
        let mut registries = self.registries.lock().unwrap();
        if let Some(existing) = registries.blobs.get(name) {
            return Ok(existing.clone());
        }
        let manager = Arc::new(Blob::new(self.pool.clone(), name));
        registries.blobs.insert(name.to_string(), manager.clone());
        Ok(manager)
    }

    pub fn collection(&self, name: &str) -> Result<Arc<Collection>> {
        self.check_open()?;
        let mut registries = self.registries.lock().unwrap();
        if let Some(existing) = registries.collections.get(name) {
            return Ok(existing.clone());
        }
        let manager = Arc::new(Collection::new(self.pool.clone(), name));
        registries.collections.insert(name.to_string(), manager.clone());
        Ok(manager)
    }

    /// A user-facing named lock (§4.B). Distinct from the manager-internal
    /// locks that protect queue pops, list mutation, dict TTL expiry and
    /// collection index/drop, which are keyed under a reserved prefix and
    /// never reachable through this factory.
    pub fn lock(&self, name: &str) -> Result<Arc<FairLock>> {
        self.check_open()?;
        let mut registries = self.registries.lock().unwrap();
        if let Some(existing) = registries.locks.get(name) {
            return Ok(existing.clone());
        }
        let manager = FairLock::new(self.pool.clone(), format!("user:{name}"), LockOptions::default());
        registries.locks.insert(name.to_string(), manager.clone());
        Ok(manager)
    }

    pub fn dict_batch(&self, name: &str) -> Result<DictBatch> {
        self.check_open()?;
        Ok(DictBatch::new(self.pool.clone(), name))
    }

    pub fn list_batch(&self, name: &str) -> Result<ListBatch> {
        self.check_open()?;
        Ok(ListBatch::new(self.pool.clone(), name))
    }

    pub fn log_batch(&self, name: &str) -> Result<LogBatch> {
        self.check_open()?;
        Ok(LogBatch::new(self.pool.clone(), name))
    }

    pub fn blob_batch(&self, name: &str) -> Result<BlobBatch> {
        self.check_open()?;
        Ok(BlobBatch::new(self.pool.clone(), name))
    }

    /// Drops every cached manager (releasing channel fan-out tasks and any
    /// live-log tickers along with them) and closes the pool, so any
    /// operation still holding a stale handle fails going forward (§4.A).
    pub async fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
        {
            let mut registries = self.registries.lock().unwrap();
            *registries = Registries::default();
        }
        self.pool.close().await;
    }
}
