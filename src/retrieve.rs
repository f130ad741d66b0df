//! Retrieval façade over the three knowledge bases.
//!
//! [`KnowledgeRetriever`] owns the shared embedder, the collection manager
//! and the chunker. It fans one query out to the style, facts and
//! corrections collections of a tenant, isolating failures per knowledge
//! base, and derives a confidence score from the retrieved distances.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunking::{SourceDocument, TextChunker};
use crate::collection::{
    Collection, CollectionId, CollectionManager, Correction, DocumentRecord, FactDocument,
    KnowledgeBase, Metadata, SearchHit, StyleExample, TenantId,
};
use crate::config::{CollectionsConfig, Settings};
use crate::error::{RagError, RagResult};
use crate::vector::EmbeddingGenerator;

/// Confidence when no fact was retrieved.
pub const NO_FACTS_CONFIDENCE: f32 = 0.3;

const STYLE_WEIGHT: f32 = 0.3;
const FACTS_WEIGHT: f32 = 0.7;

/// Mean style distance assumed when no style example was retrieved.
const DEFAULT_STYLE_DISTANCE: f32 = 1.0;

/// Distances are taken to span roughly `[0, 2]`, as for unit-length
/// embeddings; the weighted mean is divided by this before being
/// subtracted from 1.
const DISTANCE_SCALE: f32 = 2.0;

/// Derives a `[0, 1]` confidence from style and fact search results.
///
/// No facts gives [`NO_FACTS_CONFIDENCE`]. Otherwise facts weigh 0.7 and
/// style 0.3 in a mean distance that is mapped onto `1 - d / 2`.
pub fn confidence(style: &[SearchHit], facts: &[SearchHit]) -> f32 {
    if facts.is_empty() {
        return NO_FACTS_CONFIDENCE;
    }

    let avg_style = mean_distance(style).unwrap_or(DEFAULT_STYLE_DISTANCE);
    let avg_facts = mean_distance(facts).unwrap_or(0.0);
    let weighted = STYLE_WEIGHT * avg_style + FACTS_WEIGHT * avg_facts;

    (1.0 - weighted / DISTANCE_SCALE).clamp(0.0, 1.0)
}

fn mean_distance(hits: &[SearchHit]) -> Option<f32> {
    if hits.is_empty() {
        return None;
    }
    let total: f32 = hits.iter().map(|hit| hit.distance.get()).sum();
    Some(total / hits.len() as f32)
}

/// Number of results wanted from each knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopK {
    pub style: usize,
    pub facts: usize,
    pub corrections: usize,
}

impl TopK {
    pub fn for_kb(&self, kb: KnowledgeBase) -> usize {
        match kb {
            KnowledgeBase::Style => self.style,
            KnowledgeBase::Facts => self.facts,
            KnowledgeBase::Corrections => self.corrections,
        }
    }
}

impl Default for TopK {
    fn default() -> Self {
        Self::from(&crate::config::RetrievalConfig::default())
    }
}

impl From<&crate::config::RetrievalConfig> for TopK {
    fn from(config: &crate::config::RetrievalConfig) -> Self {
        Self {
            style: config.top_k_style,
            facts: config.top_k_facts,
            corrections: config.top_k_corrections,
        }
    }
}

/// Labeled results of one query across the three knowledge bases.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub style: Vec<SearchHit>,
    pub facts: Vec<SearchHit>,
    pub corrections: Vec<SearchHit>,
    /// Knowledge bases whose search failed and were treated as empty.
    pub degraded: Vec<KnowledgeBase>,
}

impl RetrievalResult {
    pub fn hits(&self, kb: KnowledgeBase) -> &[SearchHit] {
        match kb {
            KnowledgeBase::Style => &self.style,
            KnowledgeBase::Facts => &self.facts,
            KnowledgeBase::Corrections => &self.corrections,
        }
    }

    fn hits_mut(&mut self, kb: KnowledgeBase) -> &mut Vec<SearchHit> {
        match kb {
            KnowledgeBase::Style => &mut self.style,
            KnowledgeBase::Facts => &mut self.facts,
            KnowledgeBase::Corrections => &mut self.corrections,
        }
    }

    pub fn confidence(&self) -> f32 {
        confidence(&self.style, &self.facts)
    }

    pub fn is_empty(&self) -> bool {
        self.style.is_empty() && self.facts.is_empty() && self.corrections.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionStats {
    pub knowledge_base: KnowledgeBase,
    pub collection: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrieverStats {
    pub tenant: Option<String>,
    pub collections: Vec<CollectionStats>,
    pub embedding_model: String,
    pub dimension: usize,
}

impl RetrieverStats {
    pub fn total(&self) -> usize {
        self.collections.iter().map(|c| c.count).sum()
    }
}

/// Per-tenant orchestration across the style, facts and corrections bases.
pub struct KnowledgeRetriever {
    embedder: Arc<dyn EmbeddingGenerator>,
    manager: CollectionManager,
    chunker: TextChunker,
    collections: CollectionsConfig,
}

impl std::fmt::Debug for KnowledgeRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeRetriever")
            .field("model", &self.embedder.model_name())
            .field("manager", &self.manager)
            .field("chunker", &self.chunker)
            .field("collections", &self.collections)
            .finish()
    }
}

impl KnowledgeRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingGenerator>,
        data_dir: impl Into<PathBuf>,
        chunker: TextChunker,
        collections: CollectionsConfig,
    ) -> RagResult<Self> {
        for kb in KnowledgeBase::ALL {
            CollectionId::for_kb(kb, &collections, None)?;
        }
        let manager = CollectionManager::new(data_dir, embedder.dimension())?;

        Ok(Self {
            embedder,
            manager,
            chunker,
            collections,
        })
    }

    /// Builds a retriever from validated settings and an already loaded embedder.
    pub fn from_settings(
        settings: &Settings,
        embedder: Arc<dyn EmbeddingGenerator>,
    ) -> RagResult<Self> {
        settings.validate()?;
        let chunker = TextChunker::from_config(&settings.chunking)?;
        Self::new(
            embedder,
            settings.storage.data_dir.clone(),
            chunker,
            settings.collections.clone(),
        )
    }

    /// The collection backing `kb` for `tenant` (global when `None`).
    pub fn collection(
        &self,
        kb: KnowledgeBase,
        tenant: Option<&TenantId>,
    ) -> RagResult<Arc<Collection>> {
        let id = self.collection_id(kb, tenant)?;
        Ok(self.manager.get_or_create(&id)?)
    }

    pub fn collection_id(
        &self,
        kb: KnowledgeBase,
        tenant: Option<&TenantId>,
    ) -> RagResult<CollectionId> {
        Ok(CollectionId::for_kb(kb, &self.collections, tenant)?)
    }

    /// Searches all three knowledge bases for `query`.
    ///
    /// Never fails: a knowledge base whose collection cannot be opened, or
    /// whose search fails, contributes no hits and is listed in
    /// [`RetrievalResult::degraded`]. The query is embedded at most once,
    /// and only if some collection has documents.
    pub fn retrieve(&self, query: &str, tenant: Option<&TenantId>, k: TopK) -> RetrievalResult {
        let mut result = RetrievalResult::default();
        let mut query_vector: Option<Result<Vec<f32>, String>> = None;

        for kb in KnowledgeBase::ALL {
            let wanted = k.for_kb(kb);
            if wanted == 0 {
                continue;
            }

            let collection = match self.collection(kb, tenant) {
                Ok(collection) => collection,
                Err(e) => {
                    warn!(knowledge_base = %kb, error = %e, "Knowledge base unavailable");
                    result.degraded.push(kb);
                    continue;
                }
            };
            if collection.is_empty() {
                continue;
            }

            let vector = query_vector
                .get_or_insert_with(|| self.embedder.embed_one(query).map_err(|e| e.to_string()));
            let vector = match vector {
                Ok(vector) => vector,
                Err(e) => {
                    warn!(knowledge_base = %kb, error = %e, "Query embedding failed");
                    result.degraded.push(kb);
                    continue;
                }
            };

            match collection.search(vector, wanted) {
                Ok(hits) => {
                    debug!(knowledge_base = %kb, hits = hits.len(), "Retrieved");
                    *result.hits_mut(kb) = hits;
                }
                Err(e) => {
                    warn!(knowledge_base = %kb, error = %e, "Knowledge base search failed");
                    result.degraded.push(kb);
                }
            }
        }

        result
    }

    /// Indexes one past question/answer pair. Returns the new collection size.
    pub fn index_style_example(
        &self,
        tenant: Option<&TenantId>,
        example: StyleExample,
    ) -> RagResult<usize> {
        self.append(KnowledgeBase::Style, tenant, vec![example.into_record()])
    }

    /// Chunks and indexes one enrollment document. Returns the chunks added.
    pub fn index_fact_document(
        &self,
        tenant: Option<&TenantId>,
        document: FactDocument,
    ) -> RagResult<usize> {
        let records = self
            .chunker
            .chunk_text(document.content(), &document.metadata());
        let added = records.len();
        self.append(KnowledgeBase::Facts, tenant, records)?;
        Ok(added)
    }

    /// Chunks and indexes plain-text files into the facts base.
    ///
    /// Every chunk carries its file's `filename` and `path` plus the entries
    /// of `metadata`. Returns the chunks added.
    pub fn index_source_documents(
        &self,
        tenant: Option<&TenantId>,
        documents: &[SourceDocument],
        metadata: &Metadata,
    ) -> RagResult<usize> {
        let mut records = self.chunker.chunk_documents(documents);
        for record in &mut records {
            for (key, value) in metadata {
                record
                    .metadata
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
            }
        }
        let added = records.len();
        self.append(KnowledgeBase::Facts, tenant, records)?;
        Ok(added)
    }

    /// Indexes one correction. Returns the new collection size.
    pub fn index_correction(
        &self,
        tenant: Option<&TenantId>,
        correction: Correction,
    ) -> RagResult<usize> {
        self.append(KnowledgeBase::Corrections, tenant, vec![correction.into_record()])
    }

    fn append(
        &self,
        kb: KnowledgeBase,
        tenant: Option<&TenantId>,
        records: Vec<DocumentRecord>,
    ) -> RagResult<usize> {
        if records.is_empty() {
            return Err(RagError::NothingToIndex {
                reason: format!("no non-blank text for the {kb} knowledge base"),
            });
        }

        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();
        let vectors = self.embedder.embed_many(&texts)?;
        let collection = self.collection(kb, tenant)?;
        let added = records.len();
        let count = collection.add_records(&vectors, records)?;

        info!(
            collection = %collection.id(),
            added,
            count,
            "Indexed documents"
        );
        Ok(count)
    }

    /// Document counts of the three knowledge bases.
    pub fn stats(&self, tenant: Option<&TenantId>) -> RagResult<RetrieverStats> {
        let mut collections = Vec::with_capacity(KnowledgeBase::ALL.len());
        for kb in KnowledgeBase::ALL {
            let collection = self.collection(kb, tenant)?;
            collections.push(CollectionStats {
                knowledge_base: kb,
                collection: collection.id().name().to_string(),
                count: collection.count(),
            });
        }

        Ok(RetrieverStats {
            tenant: tenant.map(|t| t.to_string()),
            collections,
            embedding_model: self.embedder.model_name().to_string(),
            dimension: self.embedder.dimension().get(),
        })
    }

    /// Empties all three knowledge bases of `tenant`.
    pub fn clear_all(&self, tenant: Option<&TenantId>) -> RagResult<()> {
        for kb in KnowledgeBase::ALL {
            self.collection(kb, tenant)?.clear()?;
        }
        info!(tenant = ?tenant.map(TenantId::as_str), "Cleared all knowledge bases");
        Ok(())
    }

    /// Removes every collection file of `tenant`. Returns how many
    /// collections had files on disk.
    pub fn delete_tenant(&self, tenant: &TenantId) -> RagResult<usize> {
        let mut deleted = 0;
        for kb in KnowledgeBase::ALL {
            let id = self.collection_id(kb, Some(tenant))?;
            if self.manager.delete_all_artifacts(&id)? {
                deleted += 1;
            }
        }
        info!(%tenant, deleted, "Deleted tenant collections");
        Ok(deleted)
    }

    /// Copies the collections of `source` to `target` without re-embedding.
    /// Returns how many collections were copied; empty ones are skipped.
    pub fn clone_tenant(&self, source: &TenantId, target: &TenantId) -> RagResult<usize> {
        let mut copied = 0;
        for kb in KnowledgeBase::ALL {
            let from = self.collection_id(kb, Some(source))?;
            let to = self.collection_id(kb, Some(target))?;
            if self.manager.duplicate_artifacts(&from, &to)? > 0 {
                copied += 1;
            }
        }
        info!(%source, %target, copied, "Cloned tenant collections");
        Ok(copied)
    }

    pub fn embedder(&self) -> &dyn EmbeddingGenerator {
        self.embedder.as_ref()
    }

    pub fn manager(&self) -> &CollectionManager {
        &self.manager
    }

    pub fn chunker(&self) -> &TextChunker {
        &self.chunker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{Distance, HashEmbeddingGenerator};
    use tempfile::TempDir;

    fn hit(distance: f32) -> SearchHit {
        SearchHit {
            document: "doc".to_string(),
            metadata: Metadata::new(),
            distance: Distance::new(distance).unwrap(),
        }
    }

    fn retriever(dir: &std::path::Path) -> KnowledgeRetriever {
        KnowledgeRetriever::new(
            Arc::new(HashEmbeddingGenerator::default()),
            dir,
            TextChunker::new(300, 50).unwrap(),
            CollectionsConfig::default(),
        )
        .unwrap()
    }

    const K: TopK = TopK {
        style: 2,
        facts: 3,
        corrections: 2,
    };

    #[test]
    fn test_confidence_without_facts_is_floor() {
        assert_eq!(confidence(&[], &[]), 0.3);
        assert_eq!(confidence(&[hit(0.0)], &[]), 0.3);
    }

    #[test]
    fn test_confidence_formula() {
        let value = confidence(&[hit(0.5)], &[hit(0.0)]);
        assert!((value - 0.925).abs() < 1e-6, "got {value}");

        // Missing style counts as distance 1.0
        let value = confidence(&[], &[hit(0.0)]);
        assert!((value - 0.85).abs() < 1e-6, "got {value}");

        // Averages, then clamps
        let value = confidence(&[hit(0.0), hit(1.0)], &[hit(1.0), hit(3.0)]);
        assert!((value - (1.0 - (0.3 * 0.5 + 0.7 * 2.0) / 2.0)).abs() < 1e-6);
        assert_eq!(confidence(&[hit(10.0)], &[hit(10.0)]), 0.0);
    }

    #[test]
    fn test_retrieve_on_empty_tenant() {
        let temp_dir = TempDir::new().unwrap();
        let retriever = retriever(temp_dir.path());

        let result = retriever.retrieve("anything", None, K);
        assert!(result.is_empty());
        assert!(result.degraded.is_empty());
        assert_eq!(result.confidence(), 0.3);
    }

    #[test]
    fn test_index_and_retrieve_each_kb() {
        let temp_dir = TempDir::new().unwrap();
        let retriever = retriever(temp_dir.path());

        retriever
            .index_style_example(
                None,
                StyleExample::new("When do classes start?", "Classes start in October.").unwrap(),
            )
            .unwrap();
        let chunks = retriever
            .index_fact_document(
                None,
                FactDocument::new("Enrollment closes on 30 September.")
                    .unwrap()
                    .with_title("Calendar"),
            )
            .unwrap();
        assert_eq!(chunks, 1);
        retriever
            .index_correction(
                None,
                Correction::new("Fee is 500 euro", "Fee is 450 euro").unwrap(),
            )
            .unwrap();

        let result = retriever.retrieve("When does enrollment close?", None, K);
        assert_eq!(result.style.len(), 1);
        assert_eq!(result.facts.len(), 1);
        assert_eq!(result.corrections.len(), 1);
        assert_eq!(result.facts[0].metadata["title"], "Calendar".into());
        assert_eq!(
            result.corrections[0].metadata["type"],
            "correction".into()
        );
        assert!(result.confidence() > 0.0 && result.confidence() <= 1.0);
    }

    #[test]
    fn test_zero_k_skips_kb() {
        let temp_dir = TempDir::new().unwrap();
        let retriever = retriever(temp_dir.path());
        retriever
            .index_correction(None, Correction::new("a wrong", "a right").unwrap())
            .unwrap();

        let result = retriever.retrieve(
            "a wrong",
            None,
            TopK {
                style: 2,
                facts: 3,
                corrections: 0,
            },
        );
        assert!(result.corrections.is_empty());
        assert!(result.degraded.is_empty());
    }

    #[test]
    fn test_blank_query_degrades_only_populated_kbs() {
        let temp_dir = TempDir::new().unwrap();
        let retriever = retriever(temp_dir.path());
        retriever
            .index_correction(None, Correction::new("a wrong", "a right").unwrap())
            .unwrap();

        let result = retriever.retrieve("   ", None, K);
        assert!(result.is_empty());
        assert_eq!(result.degraded, vec![KnowledgeBase::Corrections]);
    }

    #[test]
    fn test_index_blank_fact_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let retriever = retriever(temp_dir.path());
        assert!(FactDocument::new("   ").is_err());

        let documents = vec![SourceDocument {
            filename: "empty.txt".to_string(),
            path: PathBuf::from("empty.txt"),
            content: "   ".to_string(),
        }];
        assert!(matches!(
            retriever.index_source_documents(None, &documents, &Metadata::new()),
            Err(RagError::NothingToIndex { .. })
        ));
    }

    #[test]
    fn test_stats_and_clear_all() {
        let temp_dir = TempDir::new().unwrap();
        let retriever = retriever(temp_dir.path());
        let tenant = TenantId::new("9").unwrap();

        retriever
            .index_style_example(Some(&tenant), StyleExample::new("q", "r").unwrap())
            .unwrap();
        retriever
            .index_correction(Some(&tenant), Correction::new("w", "c").unwrap())
            .unwrap();

        let stats = retriever.stats(Some(&tenant)).unwrap();
        assert_eq!(stats.total(), 2);
        assert_eq!(stats.tenant.as_deref(), Some("9"));
        assert_eq!(stats.embedding_model, "hash");
        assert_eq!(stats.dimension, 384);
        assert_eq!(
            stats.collections[0].collection,
            "historical_emails_collection_ws9"
        );

        retriever.clear_all(Some(&tenant)).unwrap();
        assert_eq!(retriever.stats(Some(&tenant)).unwrap().total(), 0);
    }
}
