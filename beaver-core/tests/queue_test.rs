mod common;

use anyhow::Result;
use beaver_common::Error;
pub use common::*;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, PartialEq)]
struct Item {
    x: i32,
}

#[tokio::test]
async fn priority_then_fifo_ordering() -> Result<()> {
    let session = setup().await;
    let queue = session.queue("jobs")?;

    queue.put(&Item { x: 1 }, 5.0).await?;
    queue.put(&Item { x: 2 }, 1.0).await?;
    queue.put(&Item { x: 3 }, 5.0).await?;

    let a: Item = queue.get(false, None).await?;
    let b: Item = queue.get(false, None).await?;
    let c: Item = queue.get(false, None).await?;
    assert_eq!(a, Item { x: 2 });
    assert_eq!(b, Item { x: 1 });
    assert_eq!(c, Item { x: 3 });
    Ok(())
}

#[tokio::test]
async fn non_blocking_get_on_empty_queue_fails_empty() -> Result<()> {
    let session = setup().await;
    let queue = session.queue("empty")?;
    let result = queue.get::<Item>(false, None).await;
    assert!(matches!(result, Err(Error::Empty)));
    Ok(())
}

/// `tokio::task`s stand in for separate processes racing on the same queue.
#[tokio::test]
async fn concurrent_pops_deliver_every_item_exactly_once() -> Result<()> {
    let session = setup().await;
    let queue = session.queue("fanout")?;
    for i in 0..100 {
        queue.put(&Item { x: i }, 0.0).await?;
    }

    let mut handles = Vec::new();
    for _ in 0..10 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let mut popped = Vec::new();
            loop {
                match queue.get::<Item>(false, None).await {
                    Ok(item) => popped.push(item.x),
                    Err(Error::Empty) => break,
                    Err(err) => panic!("unexpected error: {err}"),
                }
            }
            popped
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await?);
    }
    all.sort();
    assert_eq!(all, (0..100).collect::<Vec<_>>());
    Ok(())
}
