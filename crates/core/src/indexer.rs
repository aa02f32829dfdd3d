use crate::embeddings::{EmbeddingService, DEFAULT_BATCH_SIZE};
use crate::error::{RetrievalError, Result};
use crate::filter::Filter;
use crate::models::{DeletionReport, DocumentChunk, IndexRecord, IndexingFailure, IndexingReport};
use crate::schema::IndexField;
use crate::store::IndexQuery;
use crate::traits::SearchIndexBackend;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Page size used when resolving the ids of a document's chunks.
const LOOKUP_PAGE_SIZE: usize = 1_000;

/// Embeds chunks and writes them to the index; deletes and counts them per
/// document within one tenant.
pub struct DocumentIndexer {
    embeddings: Arc<EmbeddingService>,
    backend: Arc<dyn SearchIndexBackend>,
    batch_size: usize,
}

impl DocumentIndexer {
    pub fn new(embeddings: Arc<EmbeddingService>, backend: Arc<dyn SearchIndexBackend>) -> Self {
        Self {
            embeddings,
            backend,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub async fn index_chunks(&self, chunks: &[DocumentChunk]) -> Result<IndexingReport> {
        if chunks.is_empty() {
            warn!("no chunks to index");
            return Ok(IndexingReport::default());
        }

        info!(total_chunks = chunks.len(), "indexing chunks");

        let contents: Vec<String> = chunks.iter().map(|chunk| chunk.content().to_string()).collect();
        let vectors = self.embeddings.embed_batch(&contents, self.batch_size).await?;

        let records: Vec<IndexRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexRecord::from_chunk(chunk, vector))
            .collect();

        let outcomes = self.backend.upload_documents(&records).await.map_err(|err| {
            error!(error = %err, records = records.len(), "upload failed");
            err
        })?;

        let mut report = IndexingReport::default();
        for outcome in outcomes {
            if outcome.succeeded {
                report.indexed_count += 1;
            } else {
                report.failed_count += 1;
                report.errors.push(IndexingFailure {
                    record_id: outcome.key,
                    error_message: outcome.error_message.unwrap_or_default(),
                });
            }
        }

        if report.failed_count > 0 {
            warn!(
                indexed = report.indexed_count,
                failed = report.failed_count,
                "some chunks were not indexed"
            );
        } else {
            info!(indexed = report.indexed_count, "chunks indexed");
        }

        Ok(report)
    }

    pub async fn index_single_chunk(&self, chunk: &DocumentChunk) -> Result<bool> {
        let report = self.index_chunks(std::slice::from_ref(chunk)).await?;
        Ok(report.indexed_count == 1)
    }

    /// Resolves every chunk id of the document inside the tenant, then deletes
    /// them by id. No matches is not an error.
    pub async fn delete_document_chunks(&self, document_id: &str, client_id: &str) -> Result<DeletionReport> {
        info!(document_id, client_id, "deleting document chunks");
        let ids = self.document_chunk_ids(document_id, client_id).await?;
        if ids.is_empty() {
            info!(document_id, "no chunks found for document");
            return Ok(DeletionReport::default());
        }

        let report = self.delete_chunk_ids(&ids).await?;
        info!(document_id, deleted_count = report.deleted_count, "document chunks deleted");
        Ok(report)
    }

    /// Indexes `chunks` as the new content of the document and only then
    /// removes the chunks it had before. A failed embedding or upload leaves
    /// the previous chunks in place.
    pub async fn replace_document_chunks(
        &self,
        document_id: &str,
        client_id: &str,
        chunks: &[DocumentChunk],
    ) -> Result<(IndexingReport, DeletionReport)> {
        let previous = self.document_chunk_ids(document_id, client_id).await?;
        let indexed = self.index_chunks(chunks).await?;

        let stale: Vec<String> = previous
            .into_iter()
            .filter(|id| !chunks.iter().any(|chunk| chunk.id.to_string() == *id))
            .collect();
        if stale.is_empty() {
            return Ok((indexed, DeletionReport::default()));
        }

        let replaced = self.delete_chunk_ids(&stale).await?;
        info!(document_id, replaced = replaced.deleted_count, "previous chunks replaced");
        Ok((indexed, replaced))
    }

    pub async fn document_chunk_ids(&self, document_id: &str, client_id: &str) -> Result<Vec<String>> {
        let filter = document_filter(document_id, client_id)?;

        let mut ids = Vec::new();
        loop {
            let query = IndexQuery::lookup(filter.clone(), vec![IndexField::Id], LOOKUP_PAGE_SIZE)
                .with_skip(ids.len());
            let page = self.backend.search(&query).await?;
            let fetched = page.len();
            ids.extend(
                page.iter()
                    .filter_map(|hit| hit.str_field(IndexField::Id))
                    .map(str::to_string),
            );
            if fetched < LOOKUP_PAGE_SIZE {
                break;
            }
        }
        Ok(ids)
    }

    async fn delete_chunk_ids(&self, ids: &[String]) -> Result<DeletionReport> {
        let outcomes = self.backend.delete_documents(ids).await?;
        let deleted_count = outcomes.iter().filter(|outcome| outcome.succeeded).count();
        if deleted_count < ids.len() {
            warn!(requested = ids.len(), deleted = deleted_count, "some chunks were not deleted");
        }
        Ok(DeletionReport { deleted_count })
    }

    pub async fn count_document_chunks(&self, document_id: &str, client_id: &str) -> Result<u64> {
        let filter = document_filter(document_id, client_id)?;
        self.backend.count(&filter).await
    }
}

fn document_filter(document_id: &str, client_id: &str) -> Result<Filter> {
    if document_id.trim().is_empty() {
        return Err(RetrievalError::validation("document_id must not be empty"));
    }
    Ok(Filter::for_tenant(client_id)?.and_eq(IndexField::DocumentId, document_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::HashingEmbeddings;
    use crate::schema::{contract_index_schema, IndexSchema};
    use crate::store::{RawHit, RecordOutcome};
    use crate::stores::InMemoryIndex;
    use crate::traits::EmbeddingProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const DIMENSIONS: usize = 16;

    #[derive(Default)]
    struct CountingProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn create_embeddings(&self, inputs: &[String], _model: &str) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(inputs.iter().map(|_| vec![0.5; DIMENSIONS]).collect())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn create_embeddings(&self, _inputs: &[String], _model: &str) -> Result<Vec<Vec<f32>>> {
            Err(RetrievalError::provider("failing", "service unavailable"))
        }
    }

    /// Fails uploads for the listed keys and records every call.
    #[derive(Default)]
    struct ScriptedBackend {
        reject: Vec<String>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl ScriptedBackend {
        fn record(&self, call: &'static str) {
            self.calls.lock().expect("calls lock").push(call);
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
        }
    }

    #[async_trait]
    impl SearchIndexBackend for ScriptedBackend {
        async fn create_or_update_index(&self, schema: &IndexSchema) -> Result<IndexSchema> {
            self.record("create_or_update_index");
            Ok(schema.clone())
        }

        async fn get_index(&self, name: &str) -> Result<IndexSchema> {
            self.record("get_index");
            Ok(contract_index_schema(name, DIMENSIONS))
        }

        async fn delete_index(&self, _name: &str) -> Result<()> {
            self.record("delete_index");
            Ok(())
        }

        async fn list_index_names(&self) -> Result<Vec<String>> {
            self.record("list_index_names");
            Ok(Vec::new())
        }

        async fn upload_documents(&self, records: &[IndexRecord]) -> Result<Vec<RecordOutcome>> {
            self.record("upload_documents");
            Ok(records
                .iter()
                .map(|record| {
                    if self.reject.contains(&record.id) {
                        RecordOutcome::failure(&record.id, "document rejected")
                    } else {
                        RecordOutcome::success(&record.id)
                    }
                })
                .collect())
        }

        async fn delete_documents(&self, ids: &[String]) -> Result<Vec<RecordOutcome>> {
            self.record("delete_documents");
            Ok(ids.iter().map(RecordOutcome::success).collect())
        }

        async fn search(&self, _query: &IndexQuery) -> Result<Vec<RawHit>> {
            self.record("search");
            Ok(Vec::new())
        }

        async fn count(&self, _filter: &Filter) -> Result<u64> {
            self.record("count");
            Ok(0)
        }
    }

    fn chunks(count: usize, document: &str) -> Result<Vec<DocumentChunk>> {
        (0..count)
            .map(|index| {
                Ok(DocumentChunk::new(document, "t1", format!("conteúdo {index}"))?
                    .with_chunk_index(index as u32))
            })
            .collect()
    }

    #[tokio::test]
    async fn empty_input_touches_no_backend() -> Result<()> {
        let provider = Arc::new(CountingProvider::default());
        let backend = Arc::new(ScriptedBackend::default());
        let embeddings = Arc::new(EmbeddingService::new(provider.clone(), "m", DIMENSIONS));
        let indexer = DocumentIndexer::new(embeddings, backend.clone());

        let report = indexer.index_chunks(&[]).await?;
        assert_eq!(report, IndexingReport::default());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert!(backend.calls().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn rejected_record_is_reported_not_raised() -> Result<()> {
        let chunk = chunks(1, "doc-1")?.remove(0);
        let backend = Arc::new(ScriptedBackend {
            reject: vec![chunk.id.to_string()],
            ..Default::default()
        });
        let embeddings = Arc::new(EmbeddingService::new(
            Arc::new(CountingProvider::default()),
            "m",
            DIMENSIONS,
        ));
        let indexer = DocumentIndexer::new(embeddings, backend.clone());

        let report = indexer.index_chunks(std::slice::from_ref(&chunk)).await?;
        assert_eq!(report.indexed_count, 0);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].record_id, chunk.id.to_string());
        assert_eq!(report.errors[0].error_message, "document rejected");

        assert!(!indexer.index_single_chunk(&chunk).await?);
        Ok(())
    }

    #[tokio::test]
    async fn embeddings_are_batched_by_configured_size() -> Result<()> {
        let provider = Arc::new(CountingProvider::default());
        let embeddings = Arc::new(EmbeddingService::new(provider.clone(), "m", DIMENSIONS));
        let indexer = DocumentIndexer::new(embeddings, Arc::new(ScriptedBackend::default())).with_batch_size(2);

        let report = indexer.index_chunks(&chunks(5, "doc-1")?).await?;
        assert_eq!(report.indexed_count, 5);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_unknown_document_skips_delete_call() -> Result<()> {
        let backend = Arc::new(ScriptedBackend::default());
        let embeddings = Arc::new(EmbeddingService::new(
            Arc::new(CountingProvider::default()),
            "m",
            DIMENSIONS,
        ));
        let indexer = DocumentIndexer::new(embeddings, backend.clone());

        let report = indexer.delete_document_chunks("doc-404", "t1").await?;
        assert_eq!(report.deleted_count, 0);
        assert_eq!(backend.calls(), vec!["search"]);
        Ok(())
    }

    #[tokio::test]
    async fn blank_document_or_tenant_is_rejected() {
        let indexer = DocumentIndexer::new(
            Arc::new(EmbeddingService::new(Arc::new(CountingProvider::default()), "m", DIMENSIONS)),
            Arc::new(ScriptedBackend::default()),
        );
        assert!(indexer
            .count_document_chunks("", "t1")
            .await
            .is_err_and(|err| err.is_validation()));
        assert!(indexer
            .delete_document_chunks("doc-1", " ")
            .await
            .is_err_and(|err| err.is_validation()));
    }

    #[tokio::test]
    async fn index_delete_and_count_round_trip() -> Result<()> {
        let index = Arc::new(InMemoryIndex::new("contracts"));
        index
            .create_or_update_index(&contract_index_schema("contracts", DIMENSIONS))
            .await?;
        let embeddings = Arc::new(EmbeddingService::new(
            Arc::new(HashingEmbeddings::new(DIMENSIONS)),
            "hashing",
            DIMENSIONS,
        ));
        let indexer = DocumentIndexer::new(embeddings, index.clone());

        let other_tenant = DocumentChunk::new("doc-1", "t2", "mesmo documento, outro cliente")?;

        let report = indexer.index_chunks(&chunks(3, "doc-1")?).await?;
        assert_eq!(report.indexed_count, 3);
        assert!(indexer.index_single_chunk(&other_tenant).await?);
        assert_eq!(indexer.count_document_chunks("doc-1", "t1").await?, 3);

        let deleted = indexer.delete_document_chunks("doc-1", "t1").await?;
        assert_eq!(deleted.deleted_count, 3);
        assert_eq!(indexer.count_document_chunks("doc-1", "t1").await?, 0);
        assert_eq!(indexer.count_document_chunks("doc-1", "t2").await?, 1);
        Ok(())
    }

    async fn local_index() -> Result<Arc<InMemoryIndex>> {
        let index = Arc::new(InMemoryIndex::new("contracts"));
        index
            .create_or_update_index(&contract_index_schema("contracts", DIMENSIONS))
            .await?;
        Ok(index)
    }

    fn hashing() -> Arc<EmbeddingService> {
        Arc::new(EmbeddingService::new(
            Arc::new(HashingEmbeddings::new(DIMENSIONS)),
            "hashing",
            DIMENSIONS,
        ))
    }

    #[tokio::test]
    async fn replacing_swaps_old_chunks_for_new_ones() -> Result<()> {
        let index = local_index().await?;
        let indexer = DocumentIndexer::new(hashing(), index.clone());
        let old = chunks(2, "doc-1")?;
        indexer.index_chunks(&old).await?;

        let new = chunks(3, "doc-1")?;
        let (indexed, replaced) = indexer.replace_document_chunks("doc-1", "t1", &new).await?;
        assert_eq!(indexed.indexed_count, 3);
        assert_eq!(replaced.deleted_count, 2);

        let mut remaining = indexer.document_chunk_ids("doc-1", "t1").await?;
        remaining.sort();
        let mut expected: Vec<String> = new.iter().map(|chunk| chunk.id.to_string()).collect();
        expected.sort();
        assert_eq!(remaining, expected);
        Ok(())
    }

    #[tokio::test]
    async fn failed_embedding_keeps_previous_chunks() -> Result<()> {
        let index = local_index().await?;
        DocumentIndexer::new(hashing(), index.clone())
            .index_chunks(&chunks(2, "doc-1")?)
            .await?;

        let failing = DocumentIndexer::new(
            Arc::new(EmbeddingService::new(Arc::new(FailingProvider), "m", DIMENSIONS)),
            index.clone(),
        );
        let result = failing
            .replace_document_chunks("doc-1", "t1", &chunks(3, "doc-1")?)
            .await;

        assert!(result.is_err_and(|err| err.is_provider()));
        assert_eq!(failing.count_document_chunks("doc-1", "t1").await?, 2);
        Ok(())
    }
}
