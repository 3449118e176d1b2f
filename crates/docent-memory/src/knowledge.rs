use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use docent_ingest::DocumentChunk;
use docent_llm::EmbedFuture;
use serde_json::Value;
use uuid::Uuid;

use crate::error::MemoryError;
use crate::in_memory_store::InMemoryVectorStore;
use crate::vector_store::{Payload, VectorFilter, VectorPoint, VectorStore};

pub const DEFAULT_COLLECTION: &str = "documents";

/// Payload key holding the originating file, used for per-source filtering.
const SOURCE_KEY: &str = "source";

pub type EmbedFn = Box<dyn Fn(&str) -> EmbedFuture + Send + Sync>;

/// A stored chunk returned by a similarity search.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedChunk {
    pub chunk: DocumentChunk,
    pub score: f32,
}

/// Embeds chunks into a vector collection and searches it.
pub struct KnowledgeBase {
    store: Arc<dyn VectorStore>,
    collection: String,
    embed_fn: EmbedFn,
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("collection", &self.collection)
            .finish_non_exhaustive()
    }
}

impl KnowledgeBase {
    #[must_use]
    pub fn new(store: Arc<dyn VectorStore>, collection: impl Into<String>, embed_fn: EmbedFn) -> Self {
        Self {
            store,
            collection: collection.into(),
            embed_fn,
        }
    }

    #[must_use]
    pub fn in_memory(embed_fn: EmbedFn) -> Self {
        Self::new(
            Arc::new(InMemoryVectorStore::new()),
            DEFAULT_COLLECTION,
            embed_fn,
        )
    }

    /// Knowledge base whose vectors are kept in `data_dir` across runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the store snapshot cannot be opened.
    pub async fn persistent(data_dir: &Path, embed_fn: EmbedFn) -> Result<Self, MemoryError> {
        let store = InMemoryVectorStore::with_persistence(data_dir).await?;
        Ok(Self::new(Arc::new(store), DEFAULT_COLLECTION, embed_fn))
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Embed and store `chunks`. Returns the number stored.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or storage fails; nothing is stored then.
    pub async fn add(&self, chunks: &[DocumentChunk]) -> Result<usize, MemoryError> {
        let Some(first) = chunks.first() else {
            return Ok(0);
        };

        let mut points = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let vector = (self.embed_fn)(&chunk.content).await?;
            points.push(VectorPoint {
                id: Uuid::new_v4().to_string(),
                vector,
                payload: chunk_payload(chunk)?,
            });
        }

        let dimensions = points.first().map_or(0, |p| p.vector.len());
        self.store
            .ensure_collection(&self.collection, dimensions)
            .await?;
        let count = points.len();
        self.store.upsert(&self.collection, points).await?;
        tracing::info!(
            "stored {count} chunks from {} in {}",
            first.source().unwrap_or("<unknown>"),
            self.collection
        );
        Ok(count)
    }

    /// The `top_k` stored chunks most similar to `query`, best first.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding the query or searching fails.
    pub async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, MemoryError> {
        if top_k == 0 || !self.store.collection_exists(&self.collection).await? {
            return Ok(Vec::new());
        }
        let vector = (self.embed_fn)(query).await?;
        let hits = self
            .store
            .search(&self.collection, vector, top_k, None)
            .await?;

        let results: Vec<RetrievedChunk> = hits
            .into_iter()
            .filter_map(|hit| match chunk_from_payload(hit.payload) {
                Ok(chunk) => Some(RetrievedChunk {
                    chunk,
                    score: hit.score,
                }),
                Err(e) => {
                    tracing::warn!("skipping unreadable point {}: {e}", hit.id);
                    None
                }
            })
            .collect();
        tracing::debug!("retrieved {} chunks for query", results.len());
        Ok(results)
    }

    /// Names of the files that currently have chunks stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn sources(&self) -> Result<BTreeSet<String>, MemoryError> {
        Ok(self
            .store
            .distinct_values(&self.collection, SOURCE_KEY)
            .await?)
    }

    /// Drop every chunk that came from `source`. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the deletion.
    pub async fn remove_source(&self, source: &str) -> Result<usize, MemoryError> {
        let removed = self
            .store
            .delete_by_filter(&self.collection, VectorFilter::text_eq(SOURCE_KEY, source))
            .await?;
        tracing::info!("removed {removed} chunks of {source}");
        Ok(removed)
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn chunk_count(&self) -> Result<usize, MemoryError> {
        Ok(self.store.count(&self.collection).await?)
    }

    /// Forget everything stored so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection cannot be deleted.
    pub async fn reset(&self) -> Result<(), MemoryError> {
        self.store.delete_collection(&self.collection).await?;
        tracing::info!("knowledge base {} cleared", self.collection);
        Ok(())
    }

    /// Retrieved contents joined by blank lines, in ranking order.
    #[must_use]
    pub fn build_context(results: &[RetrievedChunk]) -> String {
        results
            .iter()
            .map(|r| r.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn chunk_payload(chunk: &DocumentChunk) -> Result<Payload, MemoryError> {
    let Value::Object(map) = serde_json::to_value(chunk)? else {
        return Err(MemoryError::Other("chunk did not serialize to an object".into()));
    };
    let mut payload: Payload = map.into_iter().collect();
    if let Some(source) = chunk.source() {
        payload.insert(SOURCE_KEY.into(), Value::from(source));
    }
    Ok(payload)
}

fn chunk_from_payload(mut payload: Payload) -> Result<DocumentChunk, MemoryError> {
    payload.remove(SOURCE_KEY);
    let map: serde_json::Map<String, Value> = payload.into_iter().collect();
    Ok(serde_json::from_value(Value::Object(map))?)
}

#[cfg(test)]
mod tests {
    use docent_ingest::{ChunkType, Metadata};
    use docent_llm::AnyProvider;
    use docent_llm::mock::MockProvider;

    use super::*;

    fn knowledge_base() -> KnowledgeBase {
        let provider = AnyProvider::Mock(MockProvider::default());
        KnowledgeBase::in_memory(Box::new(provider.embed_fn()))
    }

    fn chunk(source: &str, id: &str, content: &str) -> DocumentChunk {
        let mut meta = Metadata::new();
        meta.insert("source".into(), Value::from(source));
        DocumentChunk::new(content, id, meta)
    }

    #[tokio::test]
    async fn add_then_search() {
        let kb = knowledge_base();
        let stored = kb
            .add(&[
                chunk("rust.txt", "text_chunk_0", "Rust ownership and borrowing rules"),
                chunk("cooking.txt", "text_chunk_0", "Bake bread with flour water and yeast"),
                chunk("rust.txt", "text_chunk_1", "Cargo builds Rust crates"),
            ])
            .await
            .unwrap();
        assert_eq!(stored, 3);
        assert_eq!(kb.chunk_count().await.unwrap(), 3);

        let results = kb.similarity_search("rust ownership borrowing rules", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk.content, "Rust ownership and borrowing rules");
        assert!(results[0].score >= results[1].score);
        assert_eq!(results[0].chunk.source(), Some("rust.txt"));
    }

    #[tokio::test]
    async fn chunk_fields_survive_storage() {
        let kb = knowledge_base();
        let original = chunk("deck.pptx", "text_3_table", "Quarter | Revenue")
            .with_page(2)
            .with_section_title(Some("Results".into()))
            .with_type(ChunkType::Table);
        kb.add(std::slice::from_ref(&original)).await.unwrap();

        let results = kb.similarity_search("revenue", 1).await.unwrap();
        assert_eq!(results[0].chunk, original);
    }

    #[tokio::test]
    async fn empty_store_and_zero_top_k() {
        let kb = knowledge_base();
        assert!(kb.similarity_search("anything", 4).await.unwrap().is_empty());
        assert_eq!(kb.add(&[]).await.unwrap(), 0);
        kb.add(&[chunk("a.txt", "c", "content")]).await.unwrap();
        assert!(kb.similarity_search("content", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sources_remove_and_reset() {
        let kb = knowledge_base();
        kb.add(&[chunk("a.txt", "c0", "alpha"), chunk("b.txt", "c0", "beta")])
            .await
            .unwrap();
        kb.add(&[chunk("b.txt", "c1", "beta again")]).await.unwrap();
        assert_eq!(kb.sources().await.unwrap().into_iter().collect::<Vec<_>>(), ["a.txt", "b.txt"]);

        assert_eq!(kb.remove_source("b.txt").await.unwrap(), 2);
        assert_eq!(kb.sources().await.unwrap().len(), 1);

        kb.reset().await.unwrap();
        assert_eq!(kb.chunk_count().await.unwrap(), 0);
        assert!(kb.similarity_search("alpha", 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn embedding_failure_stores_nothing() {
        let provider = AnyProvider::Mock(MockProvider::default().without_embeddings());
        let kb = KnowledgeBase::in_memory(Box::new(provider.embed_fn()));
        assert!(kb.add(&[chunk("a.txt", "c", "text")]).await.is_err());
        assert_eq!(kb.chunk_count().await.unwrap(), 0);
    }

    #[test]
    fn context_joins_with_blank_lines() {
        let results = vec![
            RetrievedChunk {
                chunk: chunk("a", "1", "first"),
                score: 0.9,
            },
            RetrievedChunk {
                chunk: chunk("a", "2", "second"),
                score: 0.5,
            },
        ];
        assert_eq!(KnowledgeBase::build_context(&results), "first\n\nsecond");
        assert_eq!(KnowledgeBase::build_context(&[]), "");
    }
}
