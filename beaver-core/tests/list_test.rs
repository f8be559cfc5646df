mod common;

use anyhow::Result;
pub use common::*;

#[tokio::test]
async fn order_is_stable_across_push_prepend_insert() -> Result<()> {
    let session = setup().await;
    let list = session.list("todo")?;

    list.push(&"A".to_string()).await?;
    list.push(&"B".to_string()).await?;
    list.push(&"C".to_string()).await?;
    list.prepend(&"D".to_string()).await?;

    let values: Vec<String> = list.to_vec().await?;
    assert_eq!(values, vec!["D", "A", "B", "C"]);

    list.insert(1, &"E".to_string()).await?;
    let values: Vec<String> = list.to_vec().await?;
    assert_eq!(values, vec!["D", "E", "A", "B", "C"]);
    Ok(())
}

#[tokio::test]
async fn remove_drops_the_item_at_index() -> Result<()> {
    let session = setup().await;
    let list = session.list("queue")?;

    list.push(&1i32).await?;
    list.push(&2i32).await?;
    list.push(&3i32).await?;
    list.remove(1).await?;

    let values: Vec<i32> = list.to_vec().await?;
    assert_eq!(values, vec![1, 3]);
    Ok(())
}
