use crate::config::AzureOpenAiSettings;
use crate::error::{RetrievalError, Result};
use crate::traits::EmbeddingProvider;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

const PROVIDER: &str = "azure-openai";

pub struct AzureOpenAiEmbeddings {
    client: Client,
    endpoint: Url,
    api_key: String,
    api_version: String,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl AzureOpenAiEmbeddings {
    pub fn new(settings: &AzureOpenAiSettings) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            endpoint: base_url(&settings.endpoint)?,
            api_key: settings.api_key.clone(),
            api_version: settings.api_version.clone(),
        })
    }

    fn embeddings_url(&self, deployment: &str) -> Result<Url> {
        let mut url = self
            .endpoint
            .join(&format!("openai/deployments/{deployment}/embeddings"))?;
        url.query_pairs_mut().append_pair("api-version", &self.api_version);
        Ok(url)
    }
}

#[async_trait]
impl EmbeddingProvider for AzureOpenAiEmbeddings {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn create_embeddings(&self, inputs: &[String], model: &str) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(self.embeddings_url(model)?)
            .header("api-key", &self.api_key)
            .json(&json!({ "input": inputs }))
            .send()
            .await
            .map_err(|err| RetrievalError::provider(PROVIDER, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::provider(PROVIDER, format!("{status}: {body}")));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|err| RetrievalError::provider(PROVIDER, err))?;
        parse_embedding_response(payload)
    }
}

/// Ensures the endpoint ends with `/` so relative joins append instead of replacing.
pub(crate) fn base_url(endpoint: &str) -> Result<Url> {
    let trimmed = endpoint.trim();
    if trimmed.ends_with('/') {
        Ok(Url::parse(trimmed)?)
    } else {
        Ok(Url::parse(&format!("{trimmed}/"))?)
    }
}

fn parse_embedding_response(payload: Value) -> Result<Vec<Vec<f32>>> {
    let mut response: EmbeddingResponse = serde_json::from_value(payload)
        .map_err(|err| RetrievalError::provider(PROVIDER, format!("malformed response: {err}")))?;
    response.data.sort_by_key(|datum| datum.index);
    Ok(response
        .data
        .into_iter()
        .map(|datum| datum.embedding)
        .collect())
}
