use crate::error::{RetrievalError, Result};
use crate::filter::Filter;
use crate::models::IndexRecord;
use crate::schema::{IndexField, IndexSchema};
use crate::store::{IndexQuery, RawHit, RecordOutcome, SCORE_FIELD};
use crate::traits::SearchIndexBackend;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Rank constant for reciprocal rank fusion of the keyword and vector lists.
const RRF_K: f64 = 60.0;

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    schemas: BTreeMap<String, IndexSchema>,
    records: Vec<IndexRecord>,
}

/// Process-local stand-in for the hosted search service. Scores keyword
/// matches by matched query terms, vectors by cosine similarity, and fuses
/// both channels with reciprocal rank fusion.
pub struct InMemoryIndex {
    index_name: String,
    state: Mutex<State>,
}

impl InMemoryIndex {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            state: Mutex::new(State::default()),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Restores a snapshot written by [`InMemoryIndex::save`]. A missing file
    /// yields an empty index.
    pub async fn load(index_name: impl Into<String>, path: &Path) -> Result<Self> {
        let index_name = index_name.into();
        let state = match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => State::default(),
            Err(err) => return Err(err.into()),
        };
        info!(
            path = %path.display(),
            index_name = %index_name,
            records = state.records.len(),
            "local index loaded"
        );
        Ok(Self {
            index_name,
            state: Mutex::new(state),
        })
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        let bytes = {
            let state = self.state("save")?;
            serde_json::to_vec_pretty(&*state)?
        };
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        debug!(path = %path.display(), "local index saved");
        Ok(())
    }

    fn state(&self, operation: &str) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| RetrievalError::index(operation, "index state lock poisoned"))
    }

    fn require_index<'a>(&self, state: &'a State, operation: &str) -> Result<&'a IndexSchema> {
        state
            .schemas
            .get(&self.index_name)
            .ok_or_else(|| RetrievalError::index(operation, format!("index {} not found", self.index_name)))
    }
}

#[async_trait]
impl SearchIndexBackend for InMemoryIndex {
    async fn create_or_update_index(&self, schema: &IndexSchema) -> Result<IndexSchema> {
        let mut state = self.state("create_or_update_index")?;
        state.schemas.insert(schema.name.clone(), schema.clone());
        Ok(schema.clone())
    }

    async fn get_index(&self, name: &str) -> Result<IndexSchema> {
        let state = self.state("get_index")?;
        state
            .schemas
            .get(name)
            .cloned()
            .ok_or_else(|| RetrievalError::index("get_index", format!("index {name} not found")))
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        let mut state = self.state("delete_index")?;
        if state.schemas.remove(name).is_none() {
            return Err(RetrievalError::index("delete_index", format!("index {name} not found")));
        }
        if name == self.index_name {
            state.records.clear();
        }
        Ok(())
    }

    async fn list_index_names(&self) -> Result<Vec<String>> {
        let state = self.state("list_index_names")?;
        Ok(state.schemas.keys().cloned().collect())
    }

    async fn upload_documents(&self, records: &[IndexRecord]) -> Result<Vec<RecordOutcome>> {
        let mut state = self.state("upload_documents")?;
        let dimensions = self.require_index(&state, "upload_documents")?.vector_dimensions();

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            if let Some(expected) = dimensions.filter(|expected| *expected != record.content_vector.len()) {
                outcomes.push(RecordOutcome::failure(
                    &record.id,
                    format!(
                        "content_vector has {} dimensions, index expects {expected}",
                        record.content_vector.len()
                    ),
                ));
                continue;
            }

            match state.records.iter_mut().find(|existing| existing.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => state.records.push(record.clone()),
            }
            outcomes.push(RecordOutcome::success(&record.id));
        }

        Ok(outcomes)
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<Vec<RecordOutcome>> {
        let mut state = self.state("delete_documents")?;
        self.require_index(&state, "delete_documents")?;

        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            let before = state.records.len();
            state.records.retain(|record| &record.id != id);
            if state.records.len() < before {
                outcomes.push(RecordOutcome::success(id));
            } else {
                outcomes.push(RecordOutcome::failure(id, "document not found"));
            }
        }
        Ok(outcomes)
    }

    async fn search(&self, query: &IndexQuery) -> Result<Vec<RawHit>> {
        let state = self.state("search")?;
        self.require_index(&state, "search")?;

        let candidates: Vec<&IndexRecord> = state
            .records
            .iter()
            .filter(|record| query.filter.matches(|field| record.field_text(field)))
            .collect();

        let keyword = query
            .search_text
            .as_deref()
            .map(|text| keyword_ranking(&candidates, text));
        let vector = query
            .vector
            .as_ref()
            .map(|vector| vector_ranking(&candidates, &vector.vector, vector.k));

        let mut scored: Vec<(usize, f64)> = match (keyword, vector) {
            (Some(keyword), Some(vector)) => reciprocal_rank_fusion(&[keyword, vector]),
            (Some(ranking), None) | (None, Some(ranking)) => ranking,
            (None, None) => (0..candidates.len()).map(|position| (position, 1.0)).collect(),
        };
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        scored
            .into_iter()
            .skip(query.skip)
            .take(query.top)
            .map(|(position, score)| hit_from_record(candidates[position], &query.select, score))
            .collect()
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        let state = self.state("count")?;
        self.require_index(&state, "count")?;
        let matched = state
            .records
            .iter()
            .filter(|record| filter.matches(|field| record.field_text(field)))
            .count();
        Ok(matched as u64)
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|term| !term.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn keyword_ranking(candidates: &[&IndexRecord], text: &str) -> Vec<(usize, f64)> {
    if text.trim() == "*" {
        return (0..candidates.len()).map(|position| (position, 1.0)).collect();
    }

    let query_terms = terms(text);
    let mut ranking: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .filter_map(|(position, record)| {
            let mut record_terms = terms(&record.content);
            for extra in [&record.section_title, &record.document_name].into_iter().flatten() {
                record_terms.extend(terms(extra));
            }
            let matched = query_terms.intersection(&record_terms).count();
            (matched > 0).then_some((position, matched as f64))
        })
        .collect();
    ranking.sort_by(|left, right| right.1.total_cmp(&left.1));
    ranking
}

fn vector_ranking(candidates: &[&IndexRecord], vector: &[f32], k: usize) -> Vec<(usize, f64)> {
    let mut ranking: Vec<(usize, f64)> = candidates
        .iter()
        .enumerate()
        .map(|(position, record)| (position, cosine_similarity(vector, &record.content_vector)))
        .collect();
    ranking.sort_by(|left, right| right.1.total_cmp(&left.1));
    ranking.truncate(k);
    ranking
}

fn reciprocal_rank_fusion(rankings: &[Vec<(usize, f64)>]) -> Vec<(usize, f64)> {
    let mut fused: BTreeMap<usize, f64> = BTreeMap::new();
    for ranking in rankings {
        for (rank, (position, _)) in ranking.iter().enumerate() {
            *fused.entry(*position).or_default() += 1.0 / (RRF_K + rank as f64 + 1.0);
        }
    }
    fused.into_iter().collect()
}

pub(crate) fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0f64;
    let mut left_norm = 0f64;
    let mut right_norm = 0f64;
    for (a, b) in left.iter().zip(right) {
        let (a, b) = (f64::from(*a), f64::from(*b));
        dot += a * b;
        left_norm += a * a;
        right_norm += b * b;
    }

    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

fn hit_from_record(record: &IndexRecord, select: &[IndexField], score: f64) -> Result<RawHit> {
    let mut fields = match serde_json::to_value(record)? {
        Value::Object(map) => map,
        _ => return Err(RetrievalError::index("search", "record did not serialize to an object")),
    };

    fields.remove(IndexField::ContentVector.as_str());
    if !select.is_empty() {
        fields.retain(|key, _| select.iter().any(|field| field.as_str() == key));
    }
    fields.insert(SCORE_FIELD.to_string(), Value::from(score));

    Ok(RawHit::from_json(Value::Object(fields)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentChunk;
    use crate::schema::contract_index_schema;
    use crate::store::VectorQuery;

    fn record(document: &str, tenant: &str, content: &str, vector: Vec<f32>) -> Result<IndexRecord> {
        let chunk = DocumentChunk::new(document, tenant, content)?;
        Ok(IndexRecord::from_chunk(&chunk, vector))
    }

    async fn seeded() -> Result<(InMemoryIndex, Vec<IndexRecord>)> {
        let index = InMemoryIndex::new("contracts");
        index.create_or_update_index(&contract_index_schema("contracts", 2)).await?;
        let records = vec![
            record("doc-1", "t1", "prazo de carência de 180 dias", vec![1.0, 0.0])?,
            record("doc-1", "t1", "cobertura hospitalar completa", vec![0.0, 1.0])?,
            record("doc-2", "t1", "carência para parto", vec![0.7, 0.7])?,
            record("doc-3", "t2", "carência de outro cliente", vec![1.0, 0.0])?,
        ];
        index.upload_documents(&records).await?;
        Ok((index, records))
    }

    fn keyword_query(text: &str, filter: Filter) -> IndexQuery {
        IndexQuery {
            search_text: Some(text.to_string()),
            vector: None,
            filter,
            select: vec![IndexField::Id, IndexField::Content],
            top: 10,
            skip: 0,
        }
    }

    #[tokio::test]
    async fn keyword_search_ranks_by_matched_terms_within_tenant() -> Result<()> {
        let (index, records) = seeded().await?;
        let hits = index
            .search(&keyword_query("carência 180 dias", Filter::for_tenant("t1")?))
            .await?;

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].str_field(IndexField::Id), Some(records[0].id.as_str()));
        assert_eq!(hits[0].score, 3.0);
        assert_eq!(hits[1].str_field(IndexField::Id), Some(records[2].id.as_str()));
        assert!(hits.iter().all(|hit| hit.fields.len() == 2));
        Ok(())
    }

    #[tokio::test]
    async fn vector_search_keeps_top_k_by_cosine() -> Result<()> {
        let (index, records) = seeded().await?;
        let query = IndexQuery {
            search_text: None,
            vector: Some(VectorQuery {
                vector: vec![1.0, 0.0],
                k: 2,
                field: IndexField::ContentVector,
            }),
            ..keyword_query("", Filter::for_tenant("t1")?)
        };

        let hits = index.search(&query).await?;
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].str_field(IndexField::Id), Some(records[0].id.as_str()));
        assert!((hits[0].score - 1.0).abs() < 1e-9);
        assert_eq!(hits[1].str_field(IndexField::Id), Some(records[2].id.as_str()));
        Ok(())
    }

    #[tokio::test]
    async fn hybrid_search_fuses_both_channels() -> Result<()> {
        let (index, records) = seeded().await?;
        let query = IndexQuery {
            vector: Some(VectorQuery {
                vector: vec![0.0, 1.0],
                k: 3,
                field: IndexField::ContentVector,
            }),
            ..keyword_query("carência parto", Filter::for_tenant("t1")?)
        };

        let hits = index.search(&query).await?;
        assert_eq!(hits.len(), 3);
        // first in keyword list and second in vector list
        assert_eq!(hits[0].str_field(IndexField::Id), Some(records[2].id.as_str()));
        let expected = 1.0 / 61.0 + 1.0 / 62.0;
        assert!((hits[0].score - expected).abs() < 1e-12);
        Ok(())
    }

    #[tokio::test]
    async fn skip_and_top_page_through_results() -> Result<()> {
        let (index, _) = seeded().await?;
        let all = IndexQuery::lookup(Filter::for_tenant("t1")?, vec![IndexField::Id], 2);
        assert_eq!(index.search(&all).await?.len(), 2);
        assert_eq!(index.search(&all.clone().with_skip(2)).await?.len(), 1);
        assert!(index.search(&all.with_skip(3)).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn ne_filter_excludes_records() -> Result<()> {
        let (index, records) = seeded().await?;
        let filter = Filter::for_tenant("t1")?.and_ne(IndexField::DocumentId, "doc-1");
        let hits = index
            .search(&IndexQuery::lookup(filter.clone(), vec![IndexField::Id], 10))
            .await?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].str_field(IndexField::Id), Some(records[2].id.as_str()));
        assert_eq!(index.count(&filter).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn upload_rejects_wrong_dimensions_and_upserts() -> Result<()> {
        let (index, mut records) = seeded().await?;
        let bad = record("doc-9", "t1", "vetor curto", vec![1.0])?;
        let outcomes = index.upload_documents(&[bad.clone()]).await?;
        assert_eq!(outcomes, vec![RecordOutcome::failure(&bad.id, "content_vector has 1 dimensions, index expects 2")]);

        records[0].content = "texto atualizado".to_string();
        index.upload_documents(&records[..1]).await?;
        assert_eq!(index.count(&Filter::for_tenant("t1")?).await?, 3);
        Ok(())
    }

    #[tokio::test]
    async fn delete_reports_missing_documents() -> Result<()> {
        let (index, records) = seeded().await?;
        let outcomes = index
            .delete_documents(&[records[0].id.clone(), "missing".to_string()])
            .await?;
        assert!(outcomes[0].succeeded);
        assert!(!outcomes[1].succeeded);
        assert_eq!(index.count(&Filter::for_tenant("t1")?).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn operations_require_existing_index() -> Result<()> {
        let index = InMemoryIndex::new("contracts");
        let result = index.count(&Filter::for_tenant("t1")?).await;
        assert!(result.is_err_and(|err| err.is_index()));
        assert!(index.get_index("contracts").await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_survives_save_and_load() -> Result<()> {
        let (index, records) = seeded().await?;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("store").join("index.json");

        index.save(&path).await?;
        let restored = InMemoryIndex::load("contracts", &path).await?;

        assert_eq!(restored.count(&Filter::for_tenant("t1")?).await?, 3);
        let hits = restored
            .search(&IndexQuery::lookup(
                Filter::for_tenant("t2")?,
                vec![IndexField::Id, IndexField::CreatedAt],
                10,
            ))
            .await?;
        assert_eq!(hits[0].str_field(IndexField::Id), Some(records[3].id.as_str()));
        Ok(())
    }

    #[tokio::test]
    async fn loading_missing_snapshot_starts_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let index = InMemoryIndex::load("contracts", &dir.path().join("absent.json")).await?;
        assert!(index.list_index_names().await?.is_empty());
        Ok(())
    }

    #[test]
    fn fused_ties_follow_candidate_position() {
        let keyword = vec![(7, 3.0), (2, 2.0), (4, 1.0)];
        let vector = vec![(4, 0.9), (2, 0.8), (7, 0.7)];

        for _ in 0..8 {
            let fused = reciprocal_rank_fusion(&[keyword.clone(), vector.clone()]);
            let positions: Vec<usize> = fused.iter().map(|(position, _)| *position).collect();
            assert_eq!(positions, vec![2, 4, 7]);
            assert_eq!(fused[1].1, fused[2].1);
        }
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[2.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-12);
    }
}
