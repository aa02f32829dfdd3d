use crate::embeddings::{truncate_chars, EmbeddingService};
use crate::error::{RetrievalError, Result};
use crate::filter::{build_filter, Filter};
use crate::models::{SearchMode, SearchQuery, SearchResponse, SearchResult};
use crate::modes::RetrievalStrategy;
use crate::rerank::rerank;
use crate::schema::IndexField;
use crate::store::{IndexQuery, RawHit};
use crate::traits::SearchIndexBackend;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Tenant-scoped retrieval over the contract index.
pub struct SearchService {
    embeddings: Arc<EmbeddingService>,
    backend: Arc<dyn SearchIndexBackend>,
}

impl SearchService {
    pub fn new(embeddings: Arc<EmbeddingService>, backend: Arc<dyn SearchIndexBackend>) -> Self {
        Self { embeddings, backend }
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        validate(&query.text, &query.client_id, query.top)?;

        let started = Instant::now();
        let strategy = query.mode.strategy();
        let filter = build_filter(
            &query.client_id,
            query.document_id.as_deref(),
            query.section_type.as_deref(),
        )?;

        info!(
            mode = %query.mode,
            query = %truncate_chars(&query.text, 100),
            client_id = %query.client_id,
            top = query.top,
            filter = %filter,
            "search started"
        );

        let filters_applied: BTreeMap<String, String> = filter
            .clauses()
            .iter()
            .map(|clause| (clause.field.as_str().to_string(), clause.value.clone()))
            .collect();

        let min_score = strategy.applies_min_score().then_some(query.min_score);
        let results = self
            .retrieve(strategy, &query.text, filter, query.top, min_score)
            .await
            .map_err(|err| {
                error!(mode = %query.mode, error = %err, "search failed");
                err
            })?;
        let results = rerank(results, &query.text);

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(
            mode = %query.mode,
            results_count = results.len(),
            search_time_ms = elapsed_ms,
            "search finished"
        );

        Ok(SearchResponse::new(
            results,
            query.text.clone(),
            query.mode,
            filters_applied,
            elapsed_ms,
        ))
    }

    pub async fn vector_search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        self.search(&query.clone().with_mode(SearchMode::Vector)).await
    }

    pub async fn keyword_search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        self.search(&query.clone().with_mode(SearchMode::Keyword)).await
    }

    pub async fn hybrid_search(&self, query: &SearchQuery) -> Result<SearchResponse> {
        self.search(&query.clone().with_mode(SearchMode::Hybrid)).await
    }

    /// Chunks close to `chunk_id` in embedding space, within the same tenant,
    /// in index order. An unknown chunk yields an empty response.
    pub async fn find_similar(
        &self,
        chunk_id: &str,
        client_id: &str,
        top: usize,
        exclude_same_document: bool,
    ) -> Result<SearchResponse> {
        if chunk_id.trim().is_empty() {
            return Err(RetrievalError::validation("chunk_id must not be empty"));
        }
        if top == 0 {
            return Err(RetrievalError::validation("top must be positive"));
        }

        let started = Instant::now();
        let echoed_query = format!("similar_to:{chunk_id}");
        let mut filters_applied = BTreeMap::new();
        filters_applied.insert("client_id".to_string(), client_id.to_string());
        filters_applied.insert(
            "exclude_same_document".to_string(),
            exclude_same_document.to_string(),
        );

        let lookup = IndexQuery::lookup(
            Filter::for_tenant(client_id)?.and_eq(IndexField::Id, chunk_id),
            vec![IndexField::Id, IndexField::DocumentId, IndexField::Content],
            1,
        );
        let reference = self.backend.search(&lookup).await?.into_iter().next();

        let Some(reference) = reference else {
            warn!(chunk_id, client_id, "reference chunk not found");
            return Ok(SearchResponse::new(
                Vec::new(),
                echoed_query,
                SearchMode::Vector,
                filters_applied,
                started.elapsed().as_secs_f64() * 1000.0,
            ));
        };

        let content = reference.str_field(IndexField::Content).unwrap_or_default().to_string();
        let mut filter = Filter::for_tenant(client_id)?.and_ne(IndexField::Id, chunk_id);
        if exclude_same_document {
            if let Some(document_id) = reference.str_field(IndexField::DocumentId) {
                filter = filter.and_ne(IndexField::DocumentId, document_id);
            }
        }

        let strategy = SearchMode::Vector.strategy();
        let results = self.retrieve(strategy, &content, filter, top, None).await?;

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(chunk_id, results_count = results.len(), "similar chunks found");

        Ok(SearchResponse::new(
            results,
            echoed_query,
            SearchMode::Vector,
            filters_applied,
            elapsed_ms,
        ))
    }

    async fn retrieve(
        &self,
        strategy: &dyn RetrievalStrategy,
        text: &str,
        filter: Filter,
        top: usize,
        min_score: Option<f64>,
    ) -> Result<Vec<SearchResult>> {
        let vector = if strategy.embeds_query() {
            Some(self.embeddings.embed(text).await?)
        } else {
            None
        };

        let query = strategy.build_query(text, vector, filter, top)?;
        let hits = self.backend.search(&query).await?;

        Ok(hits
            .into_iter()
            .filter(|hit| min_score.map_or(true, |threshold| hit.score >= threshold))
            .map(|hit| parse_hit(strategy, hit))
            .collect())
    }
}

fn validate(text: &str, client_id: &str, top: usize) -> Result<()> {
    if text.trim().is_empty() {
        return Err(RetrievalError::validation("query text must not be empty"));
    }
    if client_id.trim().is_empty() {
        return Err(RetrievalError::validation("client_id is required for every query"));
    }
    if top == 0 {
        return Err(RetrievalError::validation("top must be positive"));
    }
    Ok(())
}

fn parse_hit(strategy: &dyn RetrievalStrategy, hit: RawHit) -> SearchResult {
    let (vector_score, keyword_score) = strategy.component_scores(&hit);
    let text = |field: IndexField| hit.str_field(field).map(str::to_string);

    SearchResult {
        id: text(IndexField::Id).unwrap_or_default(),
        document_id: text(IndexField::DocumentId).unwrap_or_default(),
        client_id: text(IndexField::ClientId).unwrap_or_default(),
        content: text(IndexField::Content).unwrap_or_default(),
        content_length: hit.u32_field(IndexField::ContentLength).unwrap_or_default(),
        page_number: hit.u32_field(IndexField::PageNumber),
        page_start: hit.u32_field(IndexField::PageStart),
        page_end: hit.u32_field(IndexField::PageEnd),
        section_title: text(IndexField::SectionTitle),
        section_number: text(IndexField::SectionNumber),
        section_type: text(IndexField::SectionType),
        chunk_index: hit.u32_field(IndexField::ChunkIndex).unwrap_or_default(),
        total_chunks: hit.u32_field(IndexField::TotalChunks),
        score: hit.score,
        vector_score,
        keyword_score,
        reranker_score: None,
        created_at: hit
            .str_field(IndexField::CreatedAt)
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
            .map(|value| value.with_timezone(&Utc)),
    }
}
