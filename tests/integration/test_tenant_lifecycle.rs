//! Cloning, clearing and deleting tenant collections on disk.

use crate::common::TestWorkspace;
use dualrag::{
    CollectionId, Correction, FactDocument, KnowledgeBase, StyleExample, TenantId, TopK,
};

fn tenant(id: &str) -> TenantId {
    TenantId::new(id).unwrap()
}

#[test]
fn test_duplicate_of_missing_source_copies_nothing() {
    let ws = TestWorkspace::new();
    let retriever = ws.retriever();
    let source = CollectionId::new("corrections_collection", Some(&tenant("1"))).unwrap();
    let target = CollectionId::new("corrections_collection", Some(&tenant("2"))).unwrap();

    let copied = retriever
        .manager()
        .duplicate_artifacts(&source, &target)
        .unwrap();
    assert_eq!(copied, 0);
    assert!(!ws.artifact(target.name(), "index").exists());
    assert!(!ws.artifact(target.name(), "pkl").exists());
}

#[test]
fn test_duplicate_onto_itself_is_rejected() {
    let ws = TestWorkspace::new();
    let retriever = ws.retriever();
    let id = CollectionId::new("corrections_collection", None).unwrap();

    assert!(retriever.manager().duplicate_artifacts(&id, &id).is_err());
}

#[test]
fn test_clone_tenant_copies_populated_collections() {
    let ws = TestWorkspace::new();
    let retriever = ws.retriever();
    let source = tenant("10");
    let target = tenant("11");

    retriever
        .index_style_example(Some(&source), StyleExample::new("orari", "9-13").unwrap())
        .unwrap();
    retriever
        .index_fact_document(
            Some(&source),
            FactDocument::new("La segreteria è aperta dalle 9 alle 13.").unwrap(),
        )
        .unwrap();

    // Open the target first so the clone has to refresh a cached instance
    assert!(retriever.retrieve("orari", Some(&target), TopK::default()).is_empty());
    let held_style = retriever
        .collection(KnowledgeBase::Style, Some(&target))
        .unwrap();

    let copied = retriever.clone_tenant(&source, &target).unwrap();
    assert_eq!(copied, 2);
    assert_eq!(held_style.count(), 1);

    let stats = retriever.stats(Some(&target)).unwrap();
    assert_eq!(stats.total(), 2);
    let result = retriever.retrieve("orari segreteria", Some(&target), TopK::default());
    assert_eq!(result.style.len(), 1);
    assert_eq!(result.facts.len(), 1);
    assert!(result.corrections.is_empty());

    // Source untouched, copies independent
    retriever
        .index_correction(Some(&target), Correction::new("8-12", "9-13").unwrap())
        .unwrap();
    assert_eq!(retriever.stats(Some(&source)).unwrap().total(), 2);
    assert_eq!(retriever.stats(Some(&target)).unwrap().total(), 3);
}

#[test]
fn test_delete_tenant_removes_files_and_empties_open_instances() {
    let ws = TestWorkspace::new();
    let retriever = ws.retriever();
    let doomed = tenant("5");
    let kept = tenant("6");

    for t in [&doomed, &kept] {
        retriever
            .index_correction(Some(t), Correction::new("a", "b").unwrap())
            .unwrap();
    }
    let doomed_id = retriever
        .collection_id(KnowledgeBase::Corrections, Some(&doomed))
        .unwrap();
    assert!(retriever.manager().is_open(&doomed_id));

    let held = retriever
        .collection(KnowledgeBase::Corrections, Some(&doomed))
        .unwrap();

    assert_eq!(retriever.delete_tenant(&doomed).unwrap(), 1);
    assert!(held.is_empty());
    assert!(std::sync::Arc::ptr_eq(
        &held,
        &retriever
            .collection(KnowledgeBase::Corrections, Some(&doomed))
            .unwrap()
    ));
    assert!(!ws.artifact(doomed_id.name(), "index").exists());
    assert!(!ws.artifact(doomed_id.name(), "pkl").exists());

    assert!(retriever.retrieve("a", Some(&doomed), TopK::default()).is_empty());
    assert_eq!(
        retriever
            .retrieve("a", Some(&kept), TopK::default())
            .corrections
            .len(),
        1
    );

    // Deleting again is a no-op
    assert_eq!(retriever.delete_tenant(&doomed).unwrap(), 0);
}

#[test]
fn test_clear_all_empties_every_knowledge_base() {
    let ws = TestWorkspace::new();
    let retriever = ws.retriever();

    retriever
        .index_style_example(None, StyleExample::new("q", "r").unwrap())
        .unwrap();
    retriever
        .index_fact_document(None, FactDocument::new("fatto").unwrap())
        .unwrap();
    retriever
        .index_correction(None, Correction::new("no", "si").unwrap())
        .unwrap();
    assert_eq!(retriever.stats(None).unwrap().total(), 3);

    retriever.clear_all(None).unwrap();
    assert_eq!(retriever.stats(None).unwrap().total(), 0);

    // Cleared state survives a restart
    let restarted = ws.retriever();
    assert_eq!(restarted.stats(None).unwrap().total(), 0);
    retriever.clear_all(None).unwrap();
}
