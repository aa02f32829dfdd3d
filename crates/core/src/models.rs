use crate::error::{RetrievalError, Result};
use crate::schema::IndexField;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChunkingStrategy {
    Page,
    Section,
    FixedSize,
    #[default]
    Hybrid,
}

impl ChunkingStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Section => "section",
            Self::FixedSize => "fixed_size",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChunkingStrategy {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "page" => Ok(Self::Page),
            "section" => Ok(Self::Section),
            "fixed_size" | "fixed-size" => Ok(Self::FixedSize),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown chunking strategy: {other}")),
        }
    }
}

/// Raw text of one page, as produced by the extraction stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

impl PageText {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeading {
    pub kind: String,
    pub number: String,
    pub title: String,
}

/// The atomic retrieval unit. `content`, `content_length` and `client_id`
/// are only reachable through accessors so the length always matches the
/// text and the tenant is never empty.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentChunk {
    pub id: Uuid,
    pub document_id: String,
    pub document_name: Option<String>,
    client_id: String,
    content: String,
    content_length: usize,
    pub page_number: Option<u32>,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    pub section_title: Option<String>,
    pub section_number: Option<String>,
    pub section_type: Option<String>,
    pub chunk_index: u32,
    pub total_chunks: Option<u32>,
    pub previous_chunk_id: Option<Uuid>,
    pub next_chunk_id: Option<Uuid>,
    pub strategy: ChunkingStrategy,
    pub created_at: DateTime<Utc>,
}

impl DocumentChunk {
    pub fn new(
        document_id: impl Into<String>,
        client_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<Self> {
        let client_id = client_id.into();
        if client_id.trim().is_empty() {
            return Err(RetrievalError::validation("chunk client_id must not be empty"));
        }

        let content = content.into();
        Ok(Self {
            id: Uuid::new_v4(),
            document_id: document_id.into(),
            document_name: None,
            client_id,
            content_length: content.chars().count(),
            content,
            page_number: None,
            page_start: None,
            page_end: None,
            section_title: None,
            section_number: None,
            section_type: None,
            chunk_index: 0,
            total_chunks: None,
            previous_chunk_id: None,
            next_chunk_id: None,
            strategy: ChunkingStrategy::default(),
            created_at: Utc::now(),
        })
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page_number = Some(page);
        self
    }

    pub fn with_page_range(mut self, start: u32, end: u32) -> Self {
        self.page_start = Some(start);
        self.page_end = Some(end);
        self
    }

    pub fn with_section(mut self, heading: Option<&SectionHeading>) -> Self {
        if let Some(heading) = heading {
            self.section_title = Some(heading.title.clone());
            self.section_number = Some(heading.number.clone());
            self.section_type = Some(heading.kind.clone());
        }
        self
    }

    pub fn with_strategy(mut self, strategy: ChunkingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_chunk_index(mut self, chunk_index: u32) -> Self {
        self.chunk_index = chunk_index;
        self
    }

    pub fn with_document_name(mut self, name: impl Into<String>) -> Self {
        self.document_name = Some(name.into());
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }
}

/// Flattened, index-ready projection of a chunk plus its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub document_id: String,
    pub document_name: Option<String>,
    pub client_id: String,
    pub content: String,
    pub content_vector: Vec<f32>,
    pub content_length: u32,
    pub page_number: Option<u32>,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    pub section_title: Option<String>,
    pub section_number: Option<String>,
    pub section_type: Option<String>,
    pub chunk_index: u32,
    pub total_chunks: Option<u32>,
    pub strategy: ChunkingStrategy,
    pub created_at: DateTime<Utc>,
}

impl IndexRecord {
    pub fn from_chunk(chunk: &DocumentChunk, content_vector: Vec<f32>) -> Self {
        Self {
            id: chunk.id.to_string(),
            document_id: chunk.document_id.clone(),
            document_name: chunk.document_name.clone(),
            client_id: chunk.client_id().to_string(),
            content: chunk.content().to_string(),
            content_vector,
            content_length: u32::try_from(chunk.content_length()).unwrap_or(u32::MAX),
            page_number: chunk.page_number,
            page_start: chunk.page_start,
            page_end: chunk.page_end,
            section_title: chunk.section_title.clone(),
            section_number: chunk.section_number.clone(),
            section_type: chunk.section_type.clone(),
            chunk_index: chunk.chunk_index,
            total_chunks: chunk.total_chunks,
            strategy: chunk.strategy,
            created_at: chunk.created_at,
        }
    }

    /// Textual value of a field as a filter expression would compare it.
    pub fn field_text(&self, field: IndexField) -> Option<String> {
        match field {
            IndexField::Id => Some(self.id.clone()),
            IndexField::DocumentId => Some(self.document_id.clone()),
            IndexField::DocumentName => self.document_name.clone(),
            IndexField::ClientId => Some(self.client_id.clone()),
            IndexField::Content => Some(self.content.clone()),
            IndexField::ContentVector => None,
            IndexField::ContentLength => Some(self.content_length.to_string()),
            IndexField::PageNumber => self.page_number.map(|value| value.to_string()),
            IndexField::PageStart => self.page_start.map(|value| value.to_string()),
            IndexField::PageEnd => self.page_end.map(|value| value.to_string()),
            IndexField::SectionTitle => self.section_title.clone(),
            IndexField::SectionNumber => self.section_number.clone(),
            IndexField::SectionType => self.section_type.clone(),
            IndexField::ChunkIndex => Some(self.chunk_index.to_string()),
            IndexField::TotalChunks => self.total_chunks.map(|value| value.to_string()),
            IndexField::Strategy => Some(self.strategy.as_str().to_string()),
            IndexField::CreatedAt => Some(self.created_at.to_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Vector,
    Keyword,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Keyword => "keyword",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "vector" => Ok(Self::Vector),
            "keyword" => Ok(Self::Keyword),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown search mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub client_id: String,
    pub document_id: Option<String>,
    pub section_type: Option<String>,
    pub mode: SearchMode,
    pub top: usize,
    pub min_score: f64,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            client_id: client_id.into(),
            document_id: None,
            section_type: None,
            mode: SearchMode::default(),
            top: crate::config::DEFAULT_TOP,
            min_score: crate::config::DEFAULT_MIN_SCORE,
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_top(mut self, top: usize) -> Self {
        self.top = top;
        self
    }

    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn with_document(mut self, document_id: impl Into<String>) -> Self {
        self.document_id = Some(document_id.into());
        self
    }

    pub fn with_section_type(mut self, section_type: impl Into<String>) -> Self {
        self.section_type = Some(section_type.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub document_id: String,
    pub client_id: String,
    pub content: String,
    pub content_length: u32,
    pub page_number: Option<u32>,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    pub section_title: Option<String>,
    pub section_number: Option<String>,
    pub section_type: Option<String>,
    pub chunk_index: u32,
    pub total_chunks: Option<u32>,
    pub score: f64,
    pub vector_score: Option<f64>,
    pub keyword_score: Option<f64>,
    pub reranker_score: Option<f64>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    results: Vec<SearchResult>,
    total_count: usize,
    query: String,
    mode: SearchMode,
    filters_applied: BTreeMap<String, String>,
    search_time_ms: f64,
}

impl SearchResponse {
    pub fn new(
        results: Vec<SearchResult>,
        query: impl Into<String>,
        mode: SearchMode,
        filters_applied: BTreeMap<String, String>,
        search_time_ms: f64,
    ) -> Self {
        Self {
            total_count: results.len(),
            results,
            query: query.into(),
            mode,
            filters_applied,
            search_time_ms,
        }
    }

    pub fn results(&self) -> &[SearchResult] {
        &self.results
    }

    pub fn into_results(self) -> Vec<SearchResult> {
        self.results
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn filters_applied(&self) -> &BTreeMap<String, String> {
        &self.filters_applied
    }

    pub fn search_time_ms(&self) -> f64 {
        self.search_time_ms
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexingFailure {
    pub record_id: String,
    pub error_message: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexingReport {
    pub indexed_count: usize,
    pub failed_count: usize,
    pub errors: Vec<IndexingFailure>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletionReport {
    pub deleted_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStats {
    pub name: String,
    pub field_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_length_counts_characters_not_bytes() -> Result<()> {
        let chunk = DocumentChunk::new("doc-1", "tenant-a", "Cláusula é válida")?;
        assert_eq!(chunk.content_length(), chunk.content().chars().count());
        assert_eq!(chunk.content_length(), 17);
        Ok(())
    }

    #[test]
    fn chunk_requires_tenant() {
        let result = DocumentChunk::new("doc-1", "  ", "text");
        assert!(matches!(result, Err(RetrievalError::Validation(_))));
    }

    #[test]
    fn index_record_maps_every_chunk_field() -> Result<()> {
        let heading = SectionHeading {
            kind: "clausula".to_string(),
            number: "5".to_string(),
            title: "CARÊNCIAS".to_string(),
        };
        let chunk = DocumentChunk::new("doc-1", "tenant-a", "Prazo de carência de 180 dias")?
            .with_page(3)
            .with_page_range(3, 4)
            .with_section(Some(&heading))
            .with_strategy(ChunkingStrategy::Section)
            .with_chunk_index(7)
            .with_document_name("plano.pdf");

        let record = IndexRecord::from_chunk(&chunk, vec![0.5, 0.5]);
        assert_eq!(record.id, chunk.id.to_string());
        assert_eq!(record.client_id, "tenant-a");
        assert_eq!(record.content_length, 29);
        assert_eq!(record.page_number, Some(3));
        assert_eq!(record.page_end, Some(4));
        assert_eq!(record.section_type.as_deref(), Some("clausula"));
        assert_eq!(record.chunk_index, 7);
        assert_eq!(record.document_name.as_deref(), Some("plano.pdf"));
        assert_eq!(record.content_vector, vec![0.5, 0.5]);

        let json = serde_json::to_value(&record)?;
        assert_eq!(json["strategy"], "section");
        assert!(json["created_at"].as_str().is_some_and(|value| value.ends_with('Z')));
        Ok(())
    }

    #[test]
    fn search_mode_parses_and_defaults_to_hybrid() {
        assert_eq!(SearchMode::default(), SearchMode::Hybrid);
        assert_eq!("Vector".parse::<SearchMode>(), Ok(SearchMode::Vector));
        assert!("semantic".parse::<SearchMode>().is_err());
    }

    #[test]
    fn response_total_count_tracks_results() {
        let response = SearchResponse::new(Vec::new(), "q", SearchMode::Keyword, BTreeMap::new(), 1.5);
        assert_eq!(response.total_count(), 0);
        assert_eq!(response.mode(), SearchMode::Keyword);
    }
}
