mod common;

use anyhow::Result;
pub use common::*;

#[tokio::test]
async fn subscriber_does_not_replay_history() -> Result<()> {
    let session = setup().await;
    let channel = session.channel("events")?;

    channel.publish(b"before").await?;

    let mut sub = channel.subscribe().await?;
    channel.publish(b"after").await?;

    let received = sub.listen(Some(std::time::Duration::from_secs(1))).await?;
    assert_eq!(received, b"after");
    Ok(())
}

#[tokio::test]
async fn multiple_subscribers_see_the_same_order() -> Result<()> {
    let session = setup().await;
    let channel = session.channel("events")?;

    let mut sub_a = channel.subscribe().await?;
    let mut sub_b = channel.subscribe().await?;

    channel.publish(b"one").await?;
    channel.publish(b"two").await?;
    channel.publish(b"three").await?;

    for sub in [&mut sub_a, &mut sub_b] {
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(sub.listen(Some(std::time::Duration::from_secs(1))).await?);
        }
        assert_eq!(seen, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
    }
    Ok(())
}

#[tokio::test]
async fn listen_times_out_when_nothing_is_published() -> Result<()> {
    let session = setup().await;
    let channel = session.channel("quiet")?;
    let mut sub = channel.subscribe().await?;

    let result = sub.listen(Some(std::time::Duration::from_millis(100))).await;
    assert!(result.is_err());
    Ok(())
}
