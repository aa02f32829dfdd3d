use crate::error::Result;
use crate::filter::Filter;
use crate::models::IndexRecord;
use crate::schema::IndexSchema;
use crate::store::{IndexQuery, RawHit, RecordOutcome};
use async_trait::async_trait;

/// External inference API that turns texts into vectors, one round trip per call.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn create_embeddings(&self, inputs: &[String], model: &str) -> Result<Vec<Vec<f32>>>;
}

/// External search service holding the vector index.
#[async_trait]
pub trait SearchIndexBackend: Send + Sync {
    async fn create_or_update_index(&self, schema: &IndexSchema) -> Result<IndexSchema>;

    async fn get_index(&self, name: &str) -> Result<IndexSchema>;

    async fn delete_index(&self, name: &str) -> Result<()>;

    async fn list_index_names(&self) -> Result<Vec<String>>;

    async fn upload_documents(&self, records: &[IndexRecord]) -> Result<Vec<RecordOutcome>>;

    async fn delete_documents(&self, ids: &[String]) -> Result<Vec<RecordOutcome>>;

    async fn search(&self, query: &IndexQuery) -> Result<Vec<RawHit>>;

    async fn count(&self, filter: &Filter) -> Result<u64>;
}
