mod common;

use anyhow::Result;
use beaver_common::Error;
pub use common::*;

#[tokio::test]
async fn dict_batch_applies_all_writes_on_close() -> Result<()> {
    let session = setup().await;
    let dict = session.dict("settings")?;

    let mut batch = session.dict_batch("settings")?;
    batch.set("a", &1i32, None)?;
    batch.set("b", &2i32, None)?;

    // not yet visible before close
    assert!(matches!(dict.get::<i32>("a").await, Err(Error::NotFound)));

    batch.close().await?;

    assert_eq!(dict.get::<i32>("a").await?, 1);
    assert_eq!(dict.get::<i32>("b").await?, 2);
    Ok(())
}

#[tokio::test]
async fn list_batch_push_and_prepend_assign_consecutive_keys() -> Result<()> {
    let session = setup().await;
    let list = session.list("queue")?;
    list.push(&"seed".to_string()).await?;

    let mut batch = session.list_batch("queue")?;
    batch.push(&"b".to_string())?;
    batch.push(&"c".to_string())?;
    batch.prepend(&"a".to_string())?;
    batch.close().await?;

    let values: Vec<String> = list.to_vec().await?;
    assert_eq!(values, vec!["a", "seed", "b", "c"]);
    Ok(())
}

#[tokio::test]
async fn log_batch_preserves_monotonicity_rule() -> Result<()> {
    let session = setup().await;
    let log = session.log("events")?;

    let mut batch = session.log_batch("events")?;
    batch.append(5.0, b"first");
    batch.append(1.0, b"second");
    batch.append(1.0, b"third");
    batch.close().await?;

    let events = log.range(0.0, f64::MAX).await?;
    let timestamps: Vec<f64> = events.iter().map(|e| e.timestamp).collect();
    let mut sorted = timestamps.clone();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    assert_eq!(timestamps, sorted);
    assert_eq!(timestamps.len(), 3);
    assert_eq!(timestamps[0], 5.0);
    Ok(())
}

#[tokio::test]
async fn blob_batch_applies_all_writes_on_close() -> Result<()> {
    let session = setup().await;
    let blobs = session.blobs("assets")?;

    let mut batch = session.blob_batch("assets")?;
    batch.set("one", b"hello", None)?;
    batch.set("two", b"world", None)?;
    batch.close().await?;

    let (data, _) = blobs.get("one").await?;
    assert_eq!(data, b"hello");
    let (data, _) = blobs.get("two").await?;
    assert_eq!(data, b"world");
    Ok(())
}
