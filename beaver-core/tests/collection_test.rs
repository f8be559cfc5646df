mod common;

use std::collections::HashMap;

use anyhow::Result;
use beaver_common::AnyMap;
use beaver_core::{Direction, Document, FtsFields};
pub use common::*;
use serde_json::json;

fn fields(pairs: &[(&str, &str)]) -> AnyMap {
    let mut map = HashMap::new();
    for (k, v) in pairs {
        map.insert(k.to_string(), json!(v));
    }
    map
}

/// End-to-end retrieval scenario: a handful of documents with both vectors
/// and text, queried by vector similarity and by full-text match.
#[tokio::test]
async fn vector_and_fts_search_agree_on_the_relevant_documents() -> Result<()> {
    let session = setup().await;
    let collection = session.collection("knowledge")?;

    collection
        .index(
            &Document {
                id: "cat-fact".to_string(),
                vector: Some(vec![1.0, 0.0, 0.0]),
                fields: fields(&[("text", "the cat sat on the mat")]),
            },
            FtsFields::All,
            false,
        )
        .await?;
    collection
        .index(
            &Document {
                id: "dog-fact".to_string(),
                vector: Some(vec![0.0, 1.0, 0.0]),
                fields: fields(&[("text", "the dog chased the ball")]),
            },
            FtsFields::All,
            false,
        )
        .await?;
    collection
        .index(
            &Document {
                id: "weather".to_string(),
                vector: Some(vec![0.0, 0.0, 1.0]),
                fields: fields(&[("text", "it rained all afternoon")]),
            },
            FtsFields::All,
            false,
        )
        .await?;

    let nearest = collection.search(&[1.0, 0.0, 0.0], 2).await?;
    assert_eq!(nearest[0].id, "cat-fact");

    let matches = collection.fts_match("cat", None, 5).await?;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].0, "cat-fact");
    Ok(())
}

#[tokio::test]
async fn fuzzy_match_tolerates_small_typos() -> Result<()> {
    let session = setup().await;
    let collection = session.collection("typos")?;

    collection
        .index(
            &Document {
                id: "greeting".to_string(),
                vector: None,
                fields: fields(&[("text", "hello world")]),
            },
            FtsFields::All,
            true,
        )
        .await?;

    let hits = collection.fuzzy_match("helo wrold", 3, 5).await?;
    assert!(hits.iter().any(|(id, _)| id == "greeting"));
    Ok(())
}

/// §8 S5: a single-word typo must match against the mistyped word, not the
/// whole (possibly multi-word) flattened text it's embedded in.
#[tokio::test]
async fn fuzzy_match_scores_a_single_word_typo_against_its_word_not_the_whole_text() -> Result<()> {
    let session = setup().await;
    let collection = session.collection("typos")?;

    collection
        .index(
            &Document {
                id: "db-doc".to_string(),
                vector: None,
                fields: fields(&[("text", "python database")]),
            },
            FtsFields::All,
            true,
        )
        .await?;

    let hits = collection.fuzzy_match("pythn", 1, 5).await?;
    assert!(hits.iter().any(|(id, _)| id == "db-doc"));

    let no_hits = collection.fuzzy_match("jva", 1, 5).await?;
    assert!(no_hits.is_empty());
    Ok(())
}

#[tokio::test]
async fn graph_walk_respects_depth_and_direction() -> Result<()> {
    let session = setup().await;
    let collection = session.collection("graph-docs")?;

    for id in ["a", "b", "c", "d"] {
        collection
            .index(
                &Document { id: id.to_string(), vector: None, fields: fields(&[]) },
                FtsFields::All,
                false,
            )
            .await?;
    }

    let graph = collection.graph();
    graph.connect("a", "b", "next", 1.0, None).await?;
    graph.connect("b", "c", "next", 1.0, None).await?;
    graph.connect("c", "d", "next", 1.0, None).await?;

    let depth_two: Vec<String> = {
        let mut v = graph.walk("a", None, 2, Direction::Forward).await?;
        v.sort();
        v
    };
    assert_eq!(depth_two, vec!["b".to_string(), "c".to_string()]);

    let depth_three: Vec<String> = {
        let mut v = graph.walk("a", None, 3, Direction::Forward).await?;
        v.sort();
        v
    };
    assert_eq!(depth_three, vec!["b".to_string(), "c".to_string(), "d".to_string()]);

    let backward: Vec<String> = {
        let mut v = graph.walk("d", None, 3, Direction::Backward).await?;
        v.sort();
        v
    };
    assert_eq!(backward, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
    Ok(())
}

#[tokio::test]
async fn rerank_favors_a_document_ranked_first_by_every_list() -> Result<()> {
    let lists = vec![
        vec!["x".to_string(), "y".to_string(), "z".to_string()],
        vec!["x".to_string(), "z".to_string(), "y".to_string()],
        vec!["x".to_string(), "y".to_string(), "z".to_string()],
    ];
    let merged = beaver_core::rerank(&lists, 60);
    assert_eq!(merged.first(), Some(&"x".to_string()));
    Ok(())
}
