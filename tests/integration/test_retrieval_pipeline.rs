//! End-to-end indexing and retrieval over the three knowledge bases.

use crate::common::TestWorkspace;
use dualrag::config::CollectionsConfig;
use dualrag::{
    Collection, CollectionId, CollectionManager, Correction, EmbeddingGenerator, FactDocument,
    HashEmbeddingGenerator, KnowledgeBase, Metadata, StyleExample, TenantId, TopK,
    VectorDimension, load_text_documents,
};

fn kind(hit: &dualrag::SearchHit) -> Option<&str> {
    hit.metadata.get("type").and_then(|v| v.as_str())
}

#[test]
fn test_identical_text_is_found_at_distance_zero() {
    let ws = TestWorkspace::new();
    let embedder = HashEmbeddingGenerator::default();
    let manager = CollectionManager::new(ws.data_dir(), embedder.dimension()).unwrap();
    let id = CollectionId::new("enrollment_docs_collection", None).unwrap();

    let collection = manager.get_or_create(&id).unwrap();
    let vectors = embedder.embed_many(&["hello world"]).unwrap();
    let count = collection
        .add(&vectors, vec!["hello world".to_string()], vec![Metadata::new()])
        .unwrap();
    assert_eq!(count, 1);

    let query = embedder.embed_one("hello world").unwrap();
    let hits = collection.search(&query, 1).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document, "hello world");
    assert!(hits[0].distance.get() < 1e-6);

    assert!(ws.artifact("enrollment_docs_collection", "index").exists());
    assert!(ws.artifact("enrollment_docs_collection", "pkl").exists());
}

#[test]
fn test_retrieve_labels_every_knowledge_base() {
    let ws = TestWorkspace::new();
    let retriever = ws.retriever();

    retriever
        .index_style_example(
            None,
            StyleExample::new("Quando chiudono le iscrizioni?", "Il 31 luglio.")
                .unwrap()
                .with_language("it"),
        )
        .unwrap();
    retriever
        .index_fact_document(
            None,
            FactDocument::new("Le iscrizioni chiudono il 31 luglio di ogni anno.")
                .unwrap()
                .with_title("Calendario"),
        )
        .unwrap();
    retriever
        .index_correction(
            None,
            Correction::new("Le iscrizioni chiudono a giugno", "Chiudono il 31 luglio").unwrap(),
        )
        .unwrap();

    let result = retriever.retrieve("Quando chiudono le iscrizioni?", None, TopK::default());

    assert!(result.degraded.is_empty());
    assert_eq!(result.style.len(), 1);
    assert_eq!(result.facts.len(), 1);
    assert_eq!(result.corrections.len(), 1);
    assert_eq!(kind(&result.style[0]), Some("historical_email"));
    assert_eq!(kind(&result.facts[0]), Some("enrollment_doc"));
    assert_eq!(kind(&result.corrections[0]), Some("correction"));
    assert_eq!(
        result.facts[0].metadata.get("title").and_then(|v| v.as_str()),
        Some("Calendario")
    );

    let confidence = result.confidence();
    assert!((0.0..=1.0).contains(&confidence));
    assert!(confidence > 0.3);
}

#[test]
fn test_empty_store_gives_no_facts_confidence() {
    let ws = TestWorkspace::new();
    let retriever = ws.retriever();

    let result = retriever.retrieve("anything", None, TopK::default());
    assert!(result.is_empty());
    assert!(result.degraded.is_empty());
    assert!((result.confidence() - 0.3).abs() < 1e-6);
}

#[test]
fn test_exact_fact_match_gives_full_confidence_without_style() {
    let ws = TestWorkspace::new();
    let retriever = ws.retriever();
    let text = "La tassa di iscrizione è di 150 euro.";

    retriever
        .index_fact_document(None, FactDocument::new(text).unwrap())
        .unwrap();

    // No style hits count as distance 1.0: 1 - (0.3 * 1.0 + 0.7 * 0.0) / 2
    let result = retriever.retrieve(text, None, TopK::default());
    assert_eq!(result.facts.len(), 1);
    assert!(result.style.is_empty());
    assert!((result.confidence() - 0.85).abs() < 1e-4);
}

#[test]
fn test_top_k_limits_and_orders_hits() {
    let ws = TestWorkspace::new();
    let retriever = ws.retriever();

    for (query, response) in [
        ("borsa di studio requisiti", "Serve l'ISEE."),
        ("alloggio studenti", "Ci sono residenze."),
        ("borsa di studio scadenza", "Entro settembre."),
    ] {
        retriever
            .index_style_example(None, StyleExample::new(query, response).unwrap())
            .unwrap();
    }

    let k = TopK {
        style: 2,
        facts: 3,
        corrections: 2,
    };
    let result = retriever.retrieve("borsa di studio", None, k);
    assert_eq!(result.style.len(), 2);
    assert!(result.style[0].distance.get() <= result.style[1].distance.get());
    assert!(result.style.iter().all(|hit| hit.document.contains("borsa")));
}

#[test]
fn test_long_document_is_chunked_with_source_metadata() {
    let ws = TestWorkspace::new();
    let body = "Le domande di ammissione si presentano online. ".repeat(40);
    ws.add_file("docs/ammissione.txt", &body);
    ws.add_file("docs/notes.pdf", "ignored");

    let documents = load_text_documents(&ws.path().join("docs")).unwrap();
    assert_eq!(documents.len(), 1);

    let retriever = ws.retriever();
    let metadata = FactDocument::new(body.as_str())
        .unwrap()
        .with_title("Ammissione")
        .metadata();
    let added = retriever
        .index_source_documents(None, &documents, &metadata)
        .unwrap();
    assert!(added > 1);

    let facts = retriever.collection(KnowledgeBase::Facts, None).unwrap();
    assert_eq!(facts.count(), added);

    let result = retriever.retrieve("domande di ammissione online", None, TopK::default());
    let hit = &result.facts[0];
    assert_eq!(
        hit.metadata.get("filename").and_then(|v| v.as_str()),
        Some("ammissione.txt")
    );
    assert_eq!(
        hit.metadata.get("title").and_then(|v| v.as_str()),
        Some("Ammissione")
    );
}

#[test]
fn test_collections_reload_after_restart() {
    let ws = TestWorkspace::new();
    let tenant = TenantId::new("7").unwrap();

    {
        let retriever = ws.retriever();
        retriever
            .index_style_example(Some(&tenant), StyleExample::new("ciao", "salve").unwrap())
            .unwrap();
        retriever
            .index_style_example(Some(&tenant), StyleExample::new("grazie", "prego").unwrap())
            .unwrap();
    }

    let retriever = ws.retriever();
    let stats = retriever.stats(Some(&tenant)).unwrap();
    assert_eq!(stats.total(), 2);

    let style = retriever.collection(KnowledgeBase::Style, Some(&tenant)).unwrap();
    assert_eq!(style.id().name(), "historical_emails_collection_ws7");
    assert_eq!(style.count(), 2);

    let result = retriever.retrieve("DOMANDA STUDENTE: grazie\n\nRISPOSTA: prego", Some(&tenant), TopK::default());
    assert!(result.style[0].distance.get() < 1e-6);
}

#[test]
fn test_tenants_do_not_see_each_other() {
    let ws = TestWorkspace::new();
    let retriever = ws.retriever();
    let a = TenantId::new("a").unwrap();
    let b = TenantId::new("b").unwrap();

    retriever
        .index_correction(Some(&a), Correction::new("x", "y").unwrap())
        .unwrap();

    assert_eq!(retriever.retrieve("x", Some(&a), TopK::default()).corrections.len(), 1);
    assert!(retriever.retrieve("x", Some(&b), TopK::default()).is_empty());
    assert!(retriever.retrieve("x", None, TopK::default()).is_empty());

    let names = CollectionsConfig::default();
    let global = CollectionId::for_kb(KnowledgeBase::Corrections, &names, None).unwrap();
    assert!(!ws.artifact(global.name(), "index").exists());
}

#[test]
fn test_failing_knowledge_base_does_not_hide_the_others() {
    let ws = TestWorkspace::new();

    // Facts persisted by a different model cannot be opened
    {
        let facts_id = CollectionId::new("enrollment_docs_collection", None).unwrap();
        let (facts, _) =
            Collection::open(&ws.data_dir(), facts_id, VectorDimension::new(8).unwrap()).unwrap();
        facts
            .add(&[vec![0.5; 8]], vec!["old model".into()], vec![Metadata::new()])
            .unwrap();
    }

    let retriever = ws.retriever();
    retriever
        .index_style_example(None, StyleExample::new("tasse", "150 euro").unwrap())
        .unwrap();
    retriever
        .index_correction(None, Correction::new("tasse 100 euro", "tasse 150 euro").unwrap())
        .unwrap();

    let result = retriever.retrieve("tasse", None, TopK::default());
    assert_eq!(result.degraded, vec![KnowledgeBase::Facts]);
    assert!(result.facts.is_empty());
    assert_eq!(result.style.len(), 1);
    assert_eq!(result.corrections.len(), 1);
    assert!((result.confidence() - 0.3).abs() < 1e-6);

    // Left on disk for the operator
    assert!(ws.artifact("enrollment_docs_collection", "index").exists());
}
