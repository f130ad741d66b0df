//! Damaged snapshot files must never make a collection unusable.

use crate::common::TestWorkspace;
use dualrag::{
    Collection, CollectionId, CollectionManager, EmbeddingGenerator, HashEmbeddingGenerator, KnowledgeBase,
    LoadOutcome, Metadata, StyleExample, TopK, VectorDimension,
};
use std::fs;

const STYLE: &str = "historical_emails_collection";

fn seed_style(ws: &TestWorkspace, count: usize) {
    let retriever = ws.retriever();
    for i in 0..count {
        retriever
            .index_style_example(
                None,
                StyleExample::new(format!("domanda {i}"), format!("risposta {i}")).unwrap(),
            )
            .unwrap();
    }
}

fn truncate_file(path: &std::path::Path) {
    let bytes = fs::read(path).unwrap();
    fs::write(path, &bytes[..bytes.len() / 2]).unwrap();
}

#[test]
fn test_truncated_documents_file_recovers_empty() {
    let ws = TestWorkspace::new();
    seed_style(&ws, 2);

    let pkl = ws.artifact(STYLE, "pkl");
    let index = ws.artifact(STYLE, "index");
    truncate_file(&pkl);

    let retriever = ws.retriever();
    let style = retriever.collection(KnowledgeBase::Style, None).unwrap();
    assert_eq!(style.count(), 0);
    assert!(!pkl.exists());
    assert!(!index.exists());

    // Usable again right away
    let count = retriever
        .index_style_example(None, StyleExample::new("nuova", "domanda").unwrap())
        .unwrap();
    assert_eq!(count, 1);
    assert!(pkl.exists() && index.exists());
}

#[test]
fn test_truncated_vectors_file_recovers_empty() {
    let ws = TestWorkspace::new();
    seed_style(&ws, 3);

    let index = ws.artifact(STYLE, "index");
    truncate_file(&index);

    let id = CollectionId::new(STYLE, None).unwrap();
    let (collection, outcome) =
        Collection::open(&ws.data_dir(), id, VectorDimension::dimension_384()).unwrap();
    assert!(matches!(outcome, LoadOutcome::Recovered { .. }));
    assert!(collection.is_empty());
    assert!(!index.exists());
    assert!(!ws.artifact(STYLE, "pkl").exists());
}

#[test]
fn test_lone_file_is_discarded() {
    let ws = TestWorkspace::new();
    seed_style(&ws, 1);
    fs::remove_file(ws.artifact(STYLE, "index")).unwrap();

    let retriever = ws.retriever();
    let result = retriever.retrieve("domanda 0", None, TopK::default());
    assert!(result.style.is_empty());
    assert!(result.degraded.is_empty());
    assert!(!ws.artifact(STYLE, "pkl").exists());
}

#[test]
fn test_documents_from_another_snapshot_are_rejected() {
    let ws = TestWorkspace::new();
    seed_style(&ws, 2);
    let stale_pkl = fs::read(ws.artifact(STYLE, "pkl")).unwrap();

    seed_style(&ws, 1);
    fs::write(ws.artifact(STYLE, "pkl"), stale_pkl).unwrap();

    let id = CollectionId::new(STYLE, None).unwrap();
    let (collection, outcome) =
        Collection::open(&ws.data_dir(), id, VectorDimension::dimension_384()).unwrap();
    assert!(matches!(outcome, LoadOutcome::Recovered { .. }));
    assert_eq!(collection.count(), 0);
}

#[test]
fn test_garbage_files_recover_empty() {
    let ws = TestWorkspace::new();
    fs::create_dir_all(ws.data_dir()).unwrap();
    fs::write(ws.artifact("scratch", "index"), b"not an index").unwrap();
    fs::write(ws.artifact("scratch", "pkl"), b"{ not json").unwrap();

    let embedder = HashEmbeddingGenerator::default();
    let manager = CollectionManager::new(ws.data_dir(), embedder.dimension()).unwrap();
    let collection = manager
        .get_or_create(&CollectionId::new("scratch", None).unwrap())
        .unwrap();
    assert!(collection.is_empty());

    let vectors = embedder.embed_many(&["ripartenza"]).unwrap();
    collection
        .add(&vectors, vec!["ripartenza".into()], vec![Metadata::new()])
        .unwrap();
    assert_eq!(collection.count(), 1);
}

#[test]
fn test_wrong_dimension_is_an_error_and_keeps_files() {
    let ws = TestWorkspace::new();
    seed_style(&ws, 1);

    let manager = CollectionManager::new(ws.data_dir(), VectorDimension::new(8).unwrap()).unwrap();
    let err = manager
        .get_or_create(&CollectionId::new(STYLE, None).unwrap())
        .unwrap_err();
    assert!(err.to_string().contains("dimension"), "{err}");
    assert!(ws.artifact(STYLE, "index").exists());
    assert!(ws.artifact(STYLE, "pkl").exists());
}
