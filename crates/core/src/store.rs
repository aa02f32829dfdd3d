use crate::filter::Filter;
use crate::schema::IndexField;
use serde_json::{Map, Value};

pub const SCORE_FIELD: &str = "@search.score";

#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub k: usize,
    pub field: IndexField,
}

/// One request against the external index. A query with `search_text` only is
/// a keyword query, with `vector` only a vector query, with both a hybrid one.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexQuery {
    pub search_text: Option<String>,
    pub vector: Option<VectorQuery>,
    pub filter: Filter,
    pub select: Vec<IndexField>,
    pub top: usize,
    pub skip: usize,
}

impl IndexQuery {
    /// Match-all lookup (`search = "*"`) used to resolve records by filter.
    pub fn lookup(filter: Filter, select: Vec<IndexField>, top: usize) -> Self {
        Self {
            search_text: Some("*".to_string()),
            vector: None,
            filter,
            select,
            top,
            skip: 0,
        }
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub fields: Map<String, Value>,
    pub score: f64,
}

impl RawHit {
    pub fn from_json(value: Value) -> Self {
        let mut fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let score = fields
            .remove(SCORE_FIELD)
            .and_then(|score| score.as_f64())
            .unwrap_or(0.0);
        fields.retain(|key, _| !key.starts_with("@search."));
        Self { fields, score }
    }

    pub fn str_field(&self, field: IndexField) -> Option<&str> {
        self.fields.get(field.as_str()).and_then(Value::as_str)
    }

    pub fn u32_field(&self, field: IndexField) -> Option<u32> {
        self.fields
            .get(field.as_str())
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOutcome {
    pub key: String,
    pub succeeded: bool,
    pub error_message: Option<String>,
}

impl RecordOutcome {
    pub fn success(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            succeeded: true,
            error_message: None,
        }
    }

    pub fn failure(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            succeeded: false,
            error_message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_hit_splits_score_from_fields() {
        let hit = RawHit::from_json(json!({
            "id": "c1",
            "chunk_index": 2,
            "@search.score": 0.75,
            "@search.rerankerScore": 2.1
        }));
        assert_eq!(hit.score, 0.75);
        assert_eq!(hit.str_field(IndexField::Id), Some("c1"));
        assert_eq!(hit.u32_field(IndexField::ChunkIndex), Some(2));
        assert_eq!(hit.fields.len(), 2);
    }

    #[test]
    fn raw_hit_without_score_defaults_to_zero() {
        let hit = RawHit::from_json(json!({"id": "c1"}));
        assert_eq!(hit.score, 0.0);
        assert_eq!(hit.str_field(IndexField::Content), None);
    }
}
