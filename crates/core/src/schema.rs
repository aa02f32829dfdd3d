use crate::error::Result;
use crate::models::IndexStats;
use crate::traits::SearchIndexBackend;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

pub const VECTOR_SEARCH_PROFILE: &str = "contracts-vector-profile";
pub const VECTOR_ALGORITHM_CONFIG: &str = "contracts-hnsw-config";
pub const CONTENT_ANALYZER: &str = "pt-Br.lucene";

/// Every field of the contract index. Filters, selects and records refer to
/// fields through this enum instead of string keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexField {
    Id,
    DocumentId,
    DocumentName,
    ClientId,
    Content,
    ContentVector,
    ContentLength,
    PageNumber,
    PageStart,
    PageEnd,
    SectionTitle,
    SectionNumber,
    SectionType,
    ChunkIndex,
    TotalChunks,
    Strategy,
    CreatedAt,
}

impl IndexField {
    pub const ALL: [IndexField; 17] = [
        Self::Id,
        Self::DocumentId,
        Self::DocumentName,
        Self::ClientId,
        Self::Content,
        Self::ContentVector,
        Self::ContentLength,
        Self::PageNumber,
        Self::PageStart,
        Self::PageEnd,
        Self::SectionTitle,
        Self::SectionNumber,
        Self::SectionType,
        Self::ChunkIndex,
        Self::TotalChunks,
        Self::Strategy,
        Self::CreatedAt,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::DocumentId => "document_id",
            Self::DocumentName => "document_name",
            Self::ClientId => "client_id",
            Self::Content => "content",
            Self::ContentVector => "content_vector",
            Self::ContentLength => "content_length",
            Self::PageNumber => "page_number",
            Self::PageStart => "page_start",
            Self::PageEnd => "page_end",
            Self::SectionTitle => "section_title",
            Self::SectionNumber => "section_number",
            Self::SectionType => "section_type",
            Self::ChunkIndex => "chunk_index",
            Self::TotalChunks => "total_chunks",
            Self::Strategy => "strategy",
            Self::CreatedAt => "created_at",
        }
    }
}

impl fmt::Display for IndexField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    #[serde(rename = "Edm.String")]
    String,
    #[serde(rename = "Edm.Int32")]
    Int32,
    #[serde(rename = "Edm.DateTimeOffset")]
    DateTimeOffset,
    #[serde(rename = "Collection(Edm.Single)")]
    SingleCollection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub key: bool,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub filterable: bool,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub facetable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_search_profile: Option<String>,
}

impl FieldDefinition {
    fn simple(field: IndexField, field_type: FieldType) -> Self {
        Self {
            name: field.as_str().to_string(),
            field_type,
            key: false,
            searchable: false,
            filterable: false,
            sortable: false,
            facetable: false,
            analyzer: None,
            dimensions: None,
            vector_search_profile: None,
        }
    }

    fn key(mut self) -> Self {
        self.key = true;
        self
    }

    fn searchable(mut self) -> Self {
        self.searchable = true;
        self
    }

    fn filterable(mut self) -> Self {
        self.filterable = true;
        self
    }

    fn sortable(mut self) -> Self {
        self.sortable = true;
        self
    }

    fn facetable(mut self) -> Self {
        self.facetable = true;
        self
    }

    fn analyzer(mut self, analyzer: &str) -> Self {
        self.analyzer = Some(analyzer.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HnswParameters {
    pub m: u32,
    pub ef_construction: u32,
    pub ef_search: u32,
    pub metric: String,
}

impl Default for HnswParameters {
    fn default() -> Self {
        Self {
            m: 4,
            ef_construction: 400,
            ef_search: 500,
            metric: "cosine".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorAlgorithm {
    pub name: String,
    pub kind: String,
    pub hnsw_parameters: HnswParameters,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorProfile {
    pub name: String,
    pub algorithm: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VectorSearchConfig {
    #[serde(default)]
    pub algorithms: Vec<VectorAlgorithm>,
    #[serde(default)]
    pub profiles: Vec<VectorProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSchema {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
    #[serde(default)]
    pub vector_search: VectorSearchConfig,
}

impl IndexSchema {
    pub fn field(&self, field: IndexField) -> Option<&FieldDefinition> {
        self.fields.iter().find(|definition| definition.name == field.as_str())
    }

    pub fn vector_dimensions(&self) -> Option<usize> {
        self.field(IndexField::ContentVector)
            .and_then(|definition| definition.dimensions)
    }
}

pub fn contract_index_schema(name: impl Into<String>, dimensions: usize) -> IndexSchema {
    use FieldType::{DateTimeOffset, Int32, SingleCollection, String as Text};
    use IndexField as F;

    let mut content_vector = FieldDefinition::simple(F::ContentVector, SingleCollection).searchable();
    content_vector.dimensions = Some(dimensions);
    content_vector.vector_search_profile = Some(VECTOR_SEARCH_PROFILE.to_string());

    let fields = vec![
        FieldDefinition::simple(F::Id, Text).key().filterable(),
        FieldDefinition::simple(F::DocumentId, Text).filterable(),
        FieldDefinition::simple(F::DocumentName, Text).searchable().filterable(),
        FieldDefinition::simple(F::ClientId, Text).filterable(),
        FieldDefinition::simple(F::Content, Text)
            .searchable()
            .analyzer(CONTENT_ANALYZER),
        content_vector,
        FieldDefinition::simple(F::ContentLength, Int32).filterable().sortable(),
        FieldDefinition::simple(F::PageNumber, Int32).filterable().sortable(),
        FieldDefinition::simple(F::PageStart, Int32).filterable(),
        FieldDefinition::simple(F::PageEnd, Int32).filterable(),
        FieldDefinition::simple(F::SectionTitle, Text).searchable().filterable(),
        FieldDefinition::simple(F::SectionNumber, Text).filterable(),
        FieldDefinition::simple(F::SectionType, Text).filterable().facetable(),
        FieldDefinition::simple(F::ChunkIndex, Int32).sortable(),
        FieldDefinition::simple(F::TotalChunks, Int32),
        FieldDefinition::simple(F::Strategy, Text).filterable().facetable(),
        FieldDefinition::simple(F::CreatedAt, DateTimeOffset).filterable().sortable(),
    ];

    IndexSchema {
        name: name.into(),
        fields,
        vector_search: VectorSearchConfig {
            algorithms: vec![VectorAlgorithm {
                name: VECTOR_ALGORITHM_CONFIG.to_string(),
                kind: "hnsw".to_string(),
                hnsw_parameters: HnswParameters::default(),
            }],
            profiles: vec![VectorProfile {
                name: VECTOR_SEARCH_PROFILE.to_string(),
                algorithm: VECTOR_ALGORITHM_CONFIG.to_string(),
            }],
        },
    }
}

/// Lifecycle operations for the contract index.
pub struct SearchIndexManager {
    backend: Arc<dyn SearchIndexBackend>,
    schema: IndexSchema,
}

impl SearchIndexManager {
    pub fn new(backend: Arc<dyn SearchIndexBackend>, schema: IndexSchema) -> Self {
        info!(index_name = %schema.name, "search index manager ready");
        Self { backend, schema }
    }

    pub fn schema(&self) -> &IndexSchema {
        &self.schema
    }

    pub async fn create_or_update(&self) -> Result<IndexSchema> {
        info!(index_name = %self.schema.name, "creating or updating index");

        match self.backend.create_or_update_index(&self.schema).await {
            Ok(created) => {
                info!(
                    index_name = %created.name,
                    fields_count = created.fields.len(),
                    "index created or updated"
                );
                Ok(created)
            }
            Err(err) => {
                error!(index_name = %self.schema.name, error = %err, "index create/update failed");
                Err(err)
            }
        }
    }

    pub async fn exists(&self) -> Result<bool> {
        let names = self.backend.list_index_names().await.map_err(|err| {
            error!(error = %err, "listing index names failed");
            err
        })?;
        Ok(names.iter().any(|name| name == &self.schema.name))
    }

    pub async fn delete(&self) -> Result<()> {
        warn!(index_name = %self.schema.name, "deleting index and all of its documents");

        self.backend
            .delete_index(&self.schema.name)
            .await
            .map_err(|err| {
                error!(index_name = %self.schema.name, error = %err, "index deletion failed");
                err
            })?;

        info!(index_name = %self.schema.name, "index deleted");
        Ok(())
    }

    pub async fn stats(&self) -> Result<IndexStats> {
        let index = self
            .backend
            .get_index(&self.schema.name)
            .await
            .map_err(|err| {
                error!(index_name = %self.schema.name, error = %err, "reading index failed");
                err
            })?;

        Ok(IndexStats {
            name: index.name,
            field_count: index.fields.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryIndex;

    #[test]
    fn schema_declares_every_field_once() {
        let schema = contract_index_schema("contracts", 1536);
        assert_eq!(schema.fields.len(), IndexField::ALL.len());
        for field in IndexField::ALL {
            assert!(schema.field(field).is_some(), "missing {field}");
        }
        let key_fields = schema.fields.iter().filter(|field| field.key).count();
        assert_eq!(key_fields, 1);
        assert!(schema.field(IndexField::Id).is_some_and(|field| field.key));
    }

    #[test]
    fn schema_wires_vector_field_to_hnsw_profile() {
        let schema = contract_index_schema("contracts", 8);
        assert_eq!(schema.vector_dimensions(), Some(8));

        let vector = schema.field(IndexField::ContentVector);
        assert_eq!(
            vector.and_then(|field| field.vector_search_profile.as_deref()),
            Some(VECTOR_SEARCH_PROFILE)
        );

        let profile = &schema.vector_search.profiles[0];
        let algorithm = &schema.vector_search.algorithms[0];
        assert_eq!(profile.algorithm, algorithm.name);
        assert_eq!(algorithm.hnsw_parameters.metric, "cosine");
        assert_eq!(algorithm.hnsw_parameters.m, 4);
        assert_eq!(algorithm.hnsw_parameters.ef_construction, 400);
        assert_eq!(algorithm.hnsw_parameters.ef_search, 500);
    }

    #[test]
    fn schema_marks_tenant_filterable_and_facets() {
        let schema = contract_index_schema("contracts", 8);
        assert!(schema.field(IndexField::ClientId).is_some_and(|field| field.filterable));
        assert!(schema.field(IndexField::SectionType).is_some_and(|field| field.facetable));
        assert!(schema.field(IndexField::Strategy).is_some_and(|field| field.facetable));
        assert_eq!(
            schema
                .field(IndexField::Content)
                .and_then(|field| field.analyzer.as_deref()),
            Some(CONTENT_ANALYZER)
        );
    }

    #[test]
    fn schema_serializes_to_rest_shape() -> Result<()> {
        let schema = contract_index_schema("contracts", 8);
        let json = serde_json::to_value(&schema)?;

        assert_eq!(json["name"], "contracts");
        assert_eq!(json["fields"][5]["type"], "Collection(Edm.Single)");
        assert_eq!(json["fields"][5]["dimensions"], 8);
        assert_eq!(json["fields"][5]["vectorSearchProfile"], VECTOR_SEARCH_PROFILE);
        assert_eq!(
            json["vectorSearch"]["algorithms"][0]["hnswParameters"]["efConstruction"],
            400
        );
        assert!(json["fields"][0].get("analyzer").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn manager_lifecycle_round_trip() -> Result<()> {
        let backend = Arc::new(InMemoryIndex::new("contracts"));
        let manager = SearchIndexManager::new(backend, contract_index_schema("contracts", 8));

        assert!(!manager.exists().await?);
        manager.create_or_update().await?;
        manager.create_or_update().await?;
        assert!(manager.exists().await?);

        let stats = manager.stats().await?;
        assert_eq!(stats.name, "contracts");
        assert_eq!(stats.field_count, 17);

        manager.delete().await?;
        assert!(!manager.exists().await?);
        assert!(manager.stats().await.is_err());
        Ok(())
    }
}
