mod common;

use anyhow::Result;
use beaver_common::Error;
pub use common::*;

#[tokio::test]
async fn set_and_get_round_trips() -> Result<()> {
    let session = setup().await;
    let dict = session.dict("settings")?;

    dict.set("theme", &"dark".to_string(), None).await?;
    let value: String = dict.get("theme").await?;
    assert_eq!(value, "dark");
    Ok(())
}

#[tokio::test]
async fn missing_key_is_not_found() -> Result<()> {
    let session = setup().await;
    let dict = session.dict("settings")?;

    let result = dict.get::<String>("nope").await;
    assert!(matches!(result, Err(Error::NotFound)));
    Ok(())
}

#[tokio::test]
async fn ttl_expiry_is_silent() -> Result<()> {
    let session = setup().await;
    let dict = session.dict("sessions")?;

    dict.set("token", &"abc".to_string(), Some(std::time::Duration::from_millis(1))).await?;
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    let result = dict.get::<String>("token").await;
    assert!(matches!(result, Err(Error::NotFound)));
    assert!(!dict.contains("token").await?);
    Ok(())
}

#[tokio::test]
async fn delete_removes_key() -> Result<()> {
    let session = setup().await;
    let dict = session.dict("settings")?;

    dict.set("theme", &"dark".to_string(), None).await?;
    dict.delete("theme").await?;
    assert!(!dict.contains("theme").await?);
    Ok(())
}
