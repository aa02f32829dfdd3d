pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod indexer;
pub mod models;
pub mod modes;
pub mod providers;
pub mod rerank;
pub mod schema;
pub mod search;
pub mod store;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_document, normalize_whitespace, split_by_size, ChunkingConfig, TextChunker};
pub use config::{AzureOpenAiSettings, AzureSearchSettings};
pub use embeddings::{EmbeddingService, DEFAULT_BATCH_SIZE, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{Result, RetrievalError};
pub use extractor::{read_text_pages, split_pages};
pub use filter::{build_filter, Filter, FilterOp};
pub use indexer::DocumentIndexer;
pub use models::{
    ChunkingStrategy, DeletionReport, DocumentChunk, IndexRecord, IndexStats, IndexingFailure,
    IndexingReport, PageText, SearchMode, SearchQuery, SearchResponse, SearchResult,
};
pub use modes::RetrievalStrategy;
pub use providers::{AzureOpenAiEmbeddings, HashingEmbeddings};
pub use rerank::rerank;
pub use schema::{contract_index_schema, IndexField, IndexSchema, SearchIndexManager};
pub use search::SearchService;
pub use store::{IndexQuery, RawHit, RecordOutcome, VectorQuery};
pub use stores::{AzureSearchStore, InMemoryIndex};
pub use traits::{EmbeddingProvider, SearchIndexBackend};
