use crate::error::{RetrievalError, Result};
use crate::filter::Filter;
use crate::models::SearchMode;
use crate::schema::IndexField;
use crate::store::{IndexQuery, RawHit, VectorQuery};

/// Fields requested for every search hit.
pub const RESULT_FIELDS: [IndexField; 14] = [
    IndexField::Id,
    IndexField::DocumentId,
    IndexField::ClientId,
    IndexField::Content,
    IndexField::ContentLength,
    IndexField::PageNumber,
    IndexField::PageStart,
    IndexField::PageEnd,
    IndexField::SectionTitle,
    IndexField::SectionNumber,
    IndexField::SectionType,
    IndexField::ChunkIndex,
    IndexField::TotalChunks,
    IndexField::CreatedAt,
];

/// One retrieval mode. Every implementation receives the same tenant-scoped
/// filter; they differ in which channels end up in the [`IndexQuery`] and how
/// the raw score is attributed.
pub trait RetrievalStrategy: Send + Sync {
    fn mode(&self) -> SearchMode;

    fn embeds_query(&self) -> bool;

    fn applies_min_score(&self) -> bool;

    fn build_query(&self, text: &str, vector: Option<Vec<f32>>, filter: Filter, top: usize) -> Result<IndexQuery>;

    /// `(vector_score, keyword_score)` for a raw hit.
    fn component_scores(&self, hit: &RawHit) -> (Option<f64>, Option<f64>);
}

pub struct VectorRetrieval;
pub struct KeywordRetrieval;
pub struct HybridRetrieval;

fn query_vector(vector: Option<Vec<f32>>, k: usize, mode: SearchMode) -> Result<VectorQuery> {
    let vector = vector.ok_or_else(|| {
        RetrievalError::validation(format!("{mode} retrieval needs a query embedding"))
    })?;
    Ok(VectorQuery {
        vector,
        k,
        field: IndexField::ContentVector,
    })
}

fn base_query(search_text: Option<String>, vector: Option<VectorQuery>, filter: Filter, top: usize) -> IndexQuery {
    IndexQuery {
        search_text,
        vector,
        filter,
        select: RESULT_FIELDS.to_vec(),
        top,
        skip: 0,
    }
}

impl RetrievalStrategy for VectorRetrieval {
    fn mode(&self) -> SearchMode {
        SearchMode::Vector
    }

    fn embeds_query(&self) -> bool {
        true
    }

    fn applies_min_score(&self) -> bool {
        true
    }

    fn build_query(&self, _text: &str, vector: Option<Vec<f32>>, filter: Filter, top: usize) -> Result<IndexQuery> {
        let vector = query_vector(vector, top, self.mode())?;
        Ok(base_query(None, Some(vector), filter, top))
    }

    fn component_scores(&self, hit: &RawHit) -> (Option<f64>, Option<f64>) {
        (Some(hit.score), None)
    }
}

impl RetrievalStrategy for KeywordRetrieval {
    fn mode(&self) -> SearchMode {
        SearchMode::Keyword
    }

    fn embeds_query(&self) -> bool {
        false
    }

    fn applies_min_score(&self) -> bool {
        false
    }

    fn build_query(&self, text: &str, _vector: Option<Vec<f32>>, filter: Filter, top: usize) -> Result<IndexQuery> {
        Ok(base_query(Some(text.to_string()), None, filter, top))
    }

    fn component_scores(&self, hit: &RawHit) -> (Option<f64>, Option<f64>) {
        (None, Some(hit.score))
    }
}

impl RetrievalStrategy for HybridRetrieval {
    fn mode(&self) -> SearchMode {
        SearchMode::Hybrid
    }

    fn embeds_query(&self) -> bool {
        true
    }

    fn applies_min_score(&self) -> bool {
        true
    }

    fn build_query(&self, text: &str, vector: Option<Vec<f32>>, filter: Filter, top: usize) -> Result<IndexQuery> {
        // over-fetch vector candidates so fusion has headroom
        let vector = query_vector(vector, top.saturating_mul(2), self.mode())?;
        Ok(base_query(Some(text.to_string()), Some(vector), filter, top))
    }

    fn component_scores(&self, hit: &RawHit) -> (Option<f64>, Option<f64>) {
        (Some(hit.score), Some(hit.score))
    }
}

impl SearchMode {
    pub fn strategy(self) -> &'static dyn RetrievalStrategy {
        match self {
            Self::Vector => &VectorRetrieval,
            Self::Keyword => &KeywordRetrieval,
            Self::Hybrid => &HybridRetrieval,
        }
    }
}
