//! Collections shared across threads keep their counts consistent.

use crate::common::TestWorkspace;
use dualrag::{
    CollectionId, CollectionManager, EmbeddingGenerator, HashEmbeddingGenerator, KnowledgeBase,
    Metadata, StyleExample, TenantId, TopK,
};
use std::sync::Arc;
use std::thread;

const THREADS: usize = 8;
const ADDS_PER_THREAD: usize = 10;

#[test]
fn test_concurrent_get_or_create_returns_one_instance() {
    let ws = TestWorkspace::new();
    let embedder = HashEmbeddingGenerator::default();
    let manager = CollectionManager::new(ws.data_dir(), embedder.dimension()).unwrap();
    let id = CollectionId::new("corrections_collection", None).unwrap();

    let instances: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| s.spawn(|| manager.get_or_create(&id).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(instances.iter().all(|c| Arc::ptr_eq(c, &instances[0])));
    assert_eq!(manager.open_count(), 1);
}

#[test]
fn test_concurrent_adds_are_all_kept() {
    let ws = TestWorkspace::new();
    let embedder = HashEmbeddingGenerator::default();
    let manager = CollectionManager::new(ws.data_dir(), embedder.dimension()).unwrap();
    let tenant = TenantId::new("3").unwrap();
    let id = CollectionId::new("enrollment_docs_collection", Some(&tenant)).unwrap();

    thread::scope(|s| {
        for t in 0..THREADS {
            let manager = &manager;
            let embedder = &embedder;
            let id = &id;
            s.spawn(move || {
                let collection = manager.get_or_create(id).unwrap();
                for i in 0..ADDS_PER_THREAD {
                    let text = format!("thread {t} document {i}");
                    let vectors = embedder.embed_many(&[text.as_str()]).unwrap();
                    collection
                        .add(&vectors, vec![text], vec![Metadata::new()])
                        .unwrap();
                    // Readers never see a torn state
                    let hits = collection.search(&vectors[0], 1).unwrap();
                    assert_eq!(hits.len(), 1);
                }
            });
        }
    });

    let collection = manager.get_or_create(&id).unwrap();
    assert_eq!(collection.count(), THREADS * ADDS_PER_THREAD);

    // What hit the disk matches what is in memory
    let restarted = CollectionManager::new(ws.data_dir(), embedder.dimension()).unwrap();
    let reloaded = restarted.get_or_create(&id).unwrap();
    assert_eq!(reloaded.count(), THREADS * ADDS_PER_THREAD);
}

#[test]
fn test_retrieve_while_indexing() {
    let ws = TestWorkspace::new();
    let retriever = ws.retriever();

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..20 {
                retriever
                    .index_style_example(
                        None,
                        StyleExample::new(format!("domanda {i}"), "risposta").unwrap(),
                    )
                    .unwrap();
            }
        });
        s.spawn(|| {
            for _ in 0..20 {
                let result = retriever.retrieve("domanda", None, TopK::default());
                assert!(result.degraded.is_empty());
                assert!(result.style.len() <= 2);
            }
        });
    });

    let style = retriever.collection(KnowledgeBase::Style, None).unwrap();
    assert_eq!(style.count(), 20);
}
