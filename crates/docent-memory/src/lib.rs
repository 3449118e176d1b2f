//! Embedding, vector storage and retrieval for extracted document chunks.

pub mod error;
pub mod in_memory_store;
pub mod knowledge;
pub mod pipeline;
pub mod vector_store;

pub use error::MemoryError;
pub use in_memory_store::InMemoryVectorStore;
pub use knowledge::{EmbedFn, KnowledgeBase, RetrievedChunk};
pub use pipeline::{IngestOutcome, IngestReport, IngestionPipeline};
pub use vector_store::{VectorStore, VectorStoreError};

/// Default maximum file size accepted for ingestion: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
