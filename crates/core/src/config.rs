pub const DEFAULT_TOP: usize = 10;
pub const DEFAULT_MIN_SCORE: f64 = 0.0;
pub const DEFAULT_INDEX_NAME: &str = "contracts";
pub const DEFAULT_OPENAI_API_VERSION: &str = "2024-02-01";
pub const DEFAULT_SEARCH_API_VERSION: &str = "2023-11-01";
pub const DEFAULT_EMBEDDING_DEPLOYMENT: &str = "text-embedding-3-small";

#[derive(Debug, Clone)]
pub struct AzureSearchSettings {
    pub endpoint: String,
    pub api_key: String,
    pub index_name: String,
    pub api_version: String,
}

impl AzureSearchSettings {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            index_name: DEFAULT_INDEX_NAME.to_string(),
            api_version: DEFAULT_SEARCH_API_VERSION.to_string(),
        }
    }

    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = index_name.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct AzureOpenAiSettings {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub embedding_deployment: String,
    pub dimensions: usize,
}

impl AzureOpenAiSettings {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            api_version: DEFAULT_OPENAI_API_VERSION.to_string(),
            embedding_deployment: DEFAULT_EMBEDDING_DEPLOYMENT.to_string(),
            dimensions: crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}
