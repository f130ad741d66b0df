//! Settings files drive the retriever end to end.

use crate::common::TestWorkspace;
use dualrag::config::ConfigError;
use dualrag::vector::embedder_from_config;
use dualrag::{KnowledgeBase, KnowledgeRetriever, Settings, StyleExample};

#[test]
fn test_retriever_from_settings_file() {
    let ws = TestWorkspace::new();
    let data_dir = ws.path().join("store");
    let settings_path = ws.add_file(
        ".dualrag/settings.toml",
        &format!(
            r#"
version = 1

[storage]
data_dir = "{}"

[embedding]
model = "hash"

[collections]
style = "stile"

[retrieval]
top_k_style = 1
"#,
            data_dir.display()
        ),
    );

    let settings = Settings::load_from(&settings_path).expect("Should load settings");
    assert_eq!(settings.retrieval.top_k_style, 1);
    assert_eq!(settings.retrieval.top_k_facts, 3);

    let embedder = embedder_from_config(&settings.embedding).unwrap();
    assert_eq!(embedder.model_name(), "hash");

    let retriever = KnowledgeRetriever::from_settings(&settings, embedder).unwrap();
    retriever
        .index_style_example(None, StyleExample::new("q", "r").unwrap())
        .unwrap();

    let style = retriever.collection(KnowledgeBase::Style, None).unwrap();
    assert_eq!(style.id().name(), "stile");
    assert!(data_dir.join("stile.index").exists());
    assert!(data_dir.join("stile.pkl").exists());
}

#[test]
fn test_invalid_chunking_is_rejected_on_load() {
    let ws = TestWorkspace::new();
    let settings_path = ws.add_file(
        "settings.toml",
        r#"
[chunking]
chunk_size = 50
chunk_overlap = 50
"#,
    );

    let err = Settings::load_from(&settings_path).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }), "{err}");
}

#[test]
fn test_collection_name_with_workspace_marker_is_rejected() {
    let mut settings = Settings::default();
    settings.embedding.model = "hash".to_string();
    settings.collections.facts = "docs_ws1".to_string();

    let embedder = embedder_from_config(&settings.embedding).unwrap();
    assert!(KnowledgeRetriever::from_settings(&settings, embedder).is_err());
}
