use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("embedding provider {provider} failed: {details}")]
    Provider { provider: String, details: String },

    #[error("index operation {operation} failed: {details}")]
    Index { operation: String, details: String },

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid endpoint url: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid section pattern: {0}")]
    Regex(#[from] regex::Error),
}

impl RetrievalError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn provider(provider: impl Into<String>, details: impl ToString) -> Self {
        Self::Provider {
            provider: provider.into(),
            details: details.to_string(),
        }
    }

    pub fn index(operation: impl Into<String>, details: impl ToString) -> Self {
        Self::Index {
            operation: operation.into(),
            details: details.to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_provider(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Self::Index { .. })
    }
}

pub type Result<T, E = RetrievalError> = std::result::Result<T, E>;
