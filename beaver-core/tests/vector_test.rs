mod common;

use std::collections::HashMap;

use anyhow::Result;
use beaver_core::{Document, FtsFields};
pub use common::*;

fn doc(id: &str, vector: Vec<f32>) -> Document {
    Document {
        id: id.to_string(),
        vector: Some(vector),
        fields: HashMap::new(),
    }
}

#[tokio::test]
async fn search_returns_the_just_indexed_document_first() -> Result<()> {
    let session = setup().await;
    let collection = session.collection("docs")?;

    collection.index(&doc("a", vec![1.0, 0.0, 0.0]), FtsFields::All, false).await?;
    collection.index(&doc("b", vec![0.0, 1.0, 0.0]), FtsFields::All, false).await?;

    let hits = collection.search(&[1.0, 0.0, 0.0], 1).await?;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "a");
    Ok(())
}

#[tokio::test]
async fn deleted_documents_do_not_appear_in_search() -> Result<()> {
    let session = setup().await;
    let collection = session.collection("docs")?;

    collection.index(&doc("a", vec![1.0, 0.0, 0.0]), FtsFields::All, false).await?;
    collection.index(&doc("b", vec![0.9, 0.1, 0.0]), FtsFields::All, false).await?;
    collection.drop("a").await?;

    let hits = collection.search(&[1.0, 0.0, 0.0], 2).await?;
    let ids: Vec<String> = hits.into_iter().map(|h| h.id).collect();
    assert_eq!(ids, vec!["b".to_string()]);
    Ok(())
}

#[tokio::test]
async fn search_results_are_stable_across_compaction() -> Result<()> {
    let session = setup().await;
    let collection = session.collection("docs")?;

    for i in 0..5 {
        let angle = i as f32;
        collection
            .index(&doc(&format!("d{i}"), vec![1.0 + angle * 0.01, angle * 0.01, 0.0]), FtsFields::All, false)
            .await?;
    }

    let before = collection.search(&[1.0, 0.0, 0.0], 5).await?;
    let mut before_ids: Vec<String> = before.into_iter().map(|h| h.id).collect();
    before_ids.sort();

    collection.compact().await?;

    let after = collection.search(&[1.0, 0.0, 0.0], 5).await?;
    let mut after_ids: Vec<String> = after.into_iter().map(|h| h.id).collect();
    after_ids.sort();

    assert_eq!(before_ids, after_ids);
    Ok(())
}

#[tokio::test]
async fn zero_norm_vector_is_rejected() -> Result<()> {
    let session = setup().await;
    let collection = session.collection("docs")?;
    let result = collection.index(&doc("zero", vec![0.0, 0.0, 0.0]), FtsFields::All, false).await;
    assert!(result.is_err());
    Ok(())
}
