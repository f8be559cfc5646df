//! `tokio::spawn` tasks stand in for separate OS processes here; each still
//! gets its own `Session`/`FairLock` instance over a shared file, so the
//! queueing and eviction logic under test is the same as across processes.

mod common;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
pub use common::*;

// Each "waiter" below opens its own session against the same file, so each
// gets its own `FairLock` instance — matching the spec's separate-process
// framing for these file-backed, multi-session scenarios. Re-entrancy is
// owner-tracked (see `fairlock_does_not_let_a_foreign_task_piggyback_on_an_instances_hold`
// below), so a single shared session/instance would also queue correctly,
// but separate instances keep these tests a closer analogue of separate
// OS processes racing on the same row.
async fn open_file_session(path: &std::path::Path) -> Arc<beaver_core::Session> {
    beaver_core::Session::open(path, beaver_core::SessionOptions::default())
        .await
        .expect("failed to open file-backed session")
}

#[tokio::test]
async fn at_most_one_holder_is_ever_in_the_critical_section() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("shared.db");

    let counter = Arc::new(AtomicI64::new(0));
    let max_seen = Arc::new(AtomicI64::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let path = path.clone();
        let counter = counter.clone();
        let max_seen = max_seen.clone();
        handles.push(tokio::spawn(async move {
            let session = open_file_session(&path).await;
            let lock = session.lock("critical").unwrap();
            let guard = lock.acquire(Some(Duration::from_secs(5))).await.unwrap();
            let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            counter.fetch_sub(1, Ordering::SeqCst);
            guard.release().await.unwrap();
        }));
    }
    for handle in handles {
        handle.await?;
    }

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn waiters_acquire_in_request_order() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("shared.db");

    let first_session = open_file_session(&path).await;
    let first = first_session.lock("fifo")?.acquire(None).await?;

    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for i in 0..4 {
        let path = path.clone();
        let order = order.clone();
        handles.push(tokio::spawn(async move {
            // stagger requests so requested_at is strictly increasing
            tokio::time::sleep(Duration::from_millis(10 * (i + 1))).await;
            let session = open_file_session(&path).await;
            let lock = session.lock("fifo").unwrap();
            let guard = lock.acquire(Some(Duration::from_secs(5))).await.unwrap();
            order.lock().unwrap().push(i);
            guard.release().await.unwrap();
        }));
    }

    // let every waiter enqueue before releasing the first holder
    tokio::time::sleep(Duration::from_millis(60)).await;
    first.release().await?;

    for handle in handles {
        handle.await?;
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    Ok(())
}

#[tokio::test]
async fn a_crashed_holders_lock_becomes_acquirable_after_ttl() -> Result<()> {
    let session = setup().await;

    // Simulate a holder that acquired and never released: insert the row
    // directly with a TTL already in the past.
    let pool = session.handle()?;
    sqlx::query(
        "INSERT INTO beaver_locks (lock_name, waiter_id, requested_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind("crashed")
    .bind("dead-waiter")
    .bind(0.0_f64)
    .bind(0.0_f64)
    .execute(&pool)
    .await?;

    let lock = session.lock("crashed")?;
    let guard = lock.acquire(Some(Duration::from_secs(2))).await?;
    guard.release().await?;
    Ok(())
}

#[tokio::test]
async fn reentrant_acquire_on_the_same_instance_nests() -> Result<()> {
    let session = setup().await;
    let lock = session.lock("reentrant")?;

    let outer = lock.acquire(None).await?;
    let inner = lock.acquire(Some(Duration::from_millis(50))).await?;
    inner.release().await?;
    outer.release().await?;
    Ok(())
}

#[tokio::test]
async fn try_acquire_fails_fast_across_separate_sessions() -> Result<()> {
    use beaver_core::SessionOptions;

    let dir = tempfile::tempdir()?;
    let path = dir.path().join("shared.db");

    let session_a = beaver_core::Session::open(&path, SessionOptions::default()).await?;
    let session_b = beaver_core::Session::open(&path, SessionOptions::default()).await?;

    let lock_a = session_a.lock("busy")?;
    let lock_b = session_b.lock("busy")?;

    let guard = lock_a.acquire(None).await?;
    let result = lock_b.try_acquire().await;
    assert!(result.is_err());

    guard.release().await?;
    let guard_b = lock_b.try_acquire().await?;
    guard_b.release().await?;
    Ok(())
}

/// Two tasks sharing one `Session` (and therefore one cached `FairLock`
/// `Arc`, per `Session::lock`'s per-name singleton) must still serialize:
/// the second task is foreign to whichever task's turn already bumped
/// `depth` to 1, so it must queue behind the real row instead of treating
/// `depth > 0` as its own re-entrancy.
#[tokio::test]
async fn fairlock_does_not_let_a_foreign_task_piggyback_on_an_instances_hold() -> Result<()> {
    let session = setup().await;
    let lock = session.lock("shared-instance")?;

    let counter = Arc::new(AtomicI64::new(0));
    let max_seen = Arc::new(AtomicI64::new(0));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let lock = lock.clone();
        let counter = counter.clone();
        let max_seen = max_seen.clone();
        handles.push(tokio::spawn(async move {
            let guard = lock.acquire(Some(Duration::from_secs(5))).await.unwrap();
            let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            counter.fetch_sub(1, Ordering::SeqCst);
            guard.release().await.unwrap();
        }));
    }
    for handle in handles {
        handle.await?;
    }

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    Ok(())
}
