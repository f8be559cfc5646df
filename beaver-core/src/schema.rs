use sqlx::SqlitePool;

use beaver_common::Result;

/// DDL for every table in §3.1, created idempotently inside one exclusive
/// transaction so two processes racing on `Session::open` against the same
/// file cannot interleave and corrupt the schema.
const STATEMENTS: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS beaver_locks (
        lock_name TEXT NOT NULL,
        waiter_id TEXT NOT NULL,
        requested_at REAL NOT NULL,
        expires_at REAL NOT NULL,
        PRIMARY KEY (lock_name, requested_at)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS beaver_locks_name_idx ON beaver_locks (lock_name, requested_at, waiter_id)"#,
    r#"CREATE TABLE IF NOT EXISTS beaver_dicts (
        dict_name TEXT NOT NULL,
        key TEXT NOT NULL,
        value_blob BLOB NOT NULL,
        expires_at REAL,
        PRIMARY KEY (dict_name, key)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS beaver_lists (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        list_name TEXT NOT NULL,
        order_key REAL NOT NULL,
        value_blob BLOB NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS beaver_lists_name_idx ON beaver_lists (list_name, order_key, id)"#,
    r#"CREATE TABLE IF NOT EXISTS beaver_blobs (
        store_name TEXT NOT NULL,
        key TEXT NOT NULL,
        data BLOB NOT NULL,
        metadata_json TEXT,
        PRIMARY KEY (store_name, key)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS beaver_queues (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        queue_name TEXT NOT NULL,
        priority REAL NOT NULL,
        timestamp REAL NOT NULL,
        data_blob BLOB NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS beaver_queues_order_idx ON beaver_queues (queue_name, priority, timestamp, id)"#,
    r#"CREATE TABLE IF NOT EXISTS beaver_logs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        log_name TEXT NOT NULL,
        timestamp REAL NOT NULL,
        data_blob BLOB NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS beaver_logs_range_idx ON beaver_logs (log_name, timestamp, id)"#,
    r#"CREATE TABLE IF NOT EXISTS beaver_pubsub_log (
        msg_id INTEGER PRIMARY KEY AUTOINCREMENT,
        channel_name TEXT NOT NULL,
        payload_blob BLOB NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS beaver_pubsub_channel_idx ON beaver_pubsub_log (channel_name, msg_id)"#,
    r#"CREATE TABLE IF NOT EXISTS beaver_collections (
        collection_name TEXT NOT NULL,
        item_id TEXT NOT NULL,
        vector_blob BLOB,
        metadata_json TEXT,
        PRIMARY KEY (collection_name, item_id)
    )"#,
    r#"CREATE VIRTUAL TABLE IF NOT EXISTS beaver_fts USING fts5(
        collection_name UNINDEXED,
        item_id UNINDEXED,
        field UNINDEXED,
        flattened_text
    )"#,
    r#"CREATE TABLE IF NOT EXISTS beaver_trigrams (
        collection_name TEXT NOT NULL,
        trigram TEXT NOT NULL,
        item_id TEXT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS beaver_trigrams_idx ON beaver_trigrams (collection_name, trigram)"#,
    r#"CREATE TABLE IF NOT EXISTS beaver_edges (
        collection_name TEXT NOT NULL,
        source_id TEXT NOT NULL,
        target_id TEXT NOT NULL,
        label TEXT NOT NULL,
        weight REAL NOT NULL DEFAULT 1.0,
        metadata_json TEXT,
        PRIMARY KEY (collection_name, source_id, target_id, label)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS beaver_edges_source_idx ON beaver_edges (collection_name, source_id)"#,
    r#"CREATE INDEX IF NOT EXISTS beaver_edges_target_idx ON beaver_edges (collection_name, target_id)"#,
    r#"CREATE TABLE IF NOT EXISTS beaver_vector_log (
        log_id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection_name TEXT NOT NULL,
        item_id TEXT NOT NULL,
        op INTEGER NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS beaver_vector_log_idx ON beaver_vector_log (collection_name, log_id)"#,
    r#"CREATE TABLE IF NOT EXISTS beaver_collection_versions (
        collection_name TEXT PRIMARY KEY,
        base_version INTEGER NOT NULL DEFAULT 0
    )"#,
];

pub(crate) async fn bootstrap(pool: &SqlitePool) -> Result<()> {
    let mut tx = pool.begin().await?;
    for statement in STATEMENTS {
        sqlx::query(statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}
