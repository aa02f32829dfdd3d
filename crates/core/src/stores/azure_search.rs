use crate::config::AzureSearchSettings;
use crate::error::{RetrievalError, Result};
use crate::filter::Filter;
use crate::models::IndexRecord;
use crate::providers::azure_openai::base_url;
use crate::schema::IndexSchema;
use crate::store::{IndexQuery, RawHit, RecordOutcome};
use crate::traits::SearchIndexBackend;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Map, Value};
use tracing::debug;
use url::Url;

/// REST client for an Azure AI Search service, bound to one index.
pub struct AzureSearchStore {
    client: Client,
    endpoint: Url,
    api_key: String,
    api_version: String,
    index_name: String,
}

impl AzureSearchStore {
    pub fn new(settings: &AzureSearchSettings) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            endpoint: base_url(&settings.endpoint)?,
            api_key: settings.api_key.clone(),
            api_version: settings.api_version.clone(),
            index_name: settings.index_name.clone(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    fn url(&self, path: &str) -> Result<Url> {
        let mut url = self.endpoint.join(path)?;
        url.query_pairs_mut().append_pair("api-version", &self.api_version);
        Ok(url)
    }

    fn docs_url(&self, action: &str) -> Result<Url> {
        self.url(&format!("indexes/{}/docs/{action}", self.index_name))
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Option<Value>> {
        let response = request
            .header("api-key", &self.api_key)
            .send()
            .await
            .map_err(|err| RetrievalError::index(operation, err))?;

        let status = response.status();
        // 207 carries per-record outcomes for partially failed batches
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::index(operation, format!("{status}: {body}")));
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let payload = response
            .json::<Value>()
            .await
            .map_err(|err| RetrievalError::index(operation, err))?;
        Ok(Some(payload))
    }

    async fn send_json(&self, operation: &str, request: RequestBuilder) -> Result<Value> {
        self.send(operation, request)
            .await?
            .ok_or_else(|| RetrievalError::index(operation, "empty response body"))
    }
}

#[async_trait]
impl SearchIndexBackend for AzureSearchStore {
    async fn create_or_update_index(&self, schema: &IndexSchema) -> Result<IndexSchema> {
        let url = self.url(&format!("indexes/{}", schema.name))?;
        let payload = self
            .send("create_or_update_index", self.client.put(url).json(schema))
            .await?;

        match payload {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(schema.clone()),
        }
    }

    async fn get_index(&self, name: &str) -> Result<IndexSchema> {
        let url = self.url(&format!("indexes/{name}"))?;
        let payload = self.send_json("get_index", self.client.get(url)).await?;
        Ok(serde_json::from_value(payload)?)
    }

    async fn delete_index(&self, name: &str) -> Result<()> {
        let url = self.url(&format!("indexes/{name}"))?;
        self.send("delete_index", self.client.delete(url)).await?;
        Ok(())
    }

    async fn list_index_names(&self) -> Result<Vec<String>> {
        let mut url = self.url("indexes")?;
        url.query_pairs_mut().append_pair("$select", "name");
        let payload = self.send_json("list_index_names", self.client.get(url)).await?;
        Ok(payload
            .get("value")
            .and_then(Value::as_array)
            .map(|indexes| {
                indexes
                    .iter()
                    .filter_map(|index| index.get("name").and_then(Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn upload_documents(&self, records: &[IndexRecord]) -> Result<Vec<RecordOutcome>> {
        let body = upload_body(records)?;
        let payload = self
            .send_json("upload_documents", self.client.post(self.docs_url("index")?).json(&body))
            .await?;
        parse_outcomes("upload_documents", &payload)
    }

    async fn delete_documents(&self, ids: &[String]) -> Result<Vec<RecordOutcome>> {
        let body = delete_body(ids);
        let payload = self
            .send_json("delete_documents", self.client.post(self.docs_url("index")?).json(&body))
            .await?;
        parse_outcomes("delete_documents", &payload)
    }

    async fn search(&self, query: &IndexQuery) -> Result<Vec<RawHit>> {
        let body = search_body(query);
        debug!(filter = %query.filter, top = query.top, "sending search request");
        let payload = self
            .send_json("search", self.client.post(self.docs_url("search")?).json(&body))
            .await?;
        parse_hits(&payload)
    }

    async fn count(&self, filter: &Filter) -> Result<u64> {
        let body = json!({
            "search": "*",
            "filter": filter.to_string(),
            "top": 0,
            "count": true,
        });
        let payload = self
            .send_json("count", self.client.post(self.docs_url("search")?).json(&body))
            .await?;
        payload
            .get("@odata.count")
            .and_then(Value::as_u64)
            .ok_or_else(|| RetrievalError::index("count", "response has no @odata.count"))
    }
}

pub(crate) fn search_body(query: &IndexQuery) -> Value {
    let mut body = Map::new();
    // Vector-only requests carry no text channel; "*" would turn them hybrid.
    if let Some(text) = &query.search_text {
        body.insert("search".to_string(), Value::from(text.as_str()));
        body.insert("queryType".to_string(), Value::from("simple"));
    }
    body.insert("filter".to_string(), Value::from(query.filter.to_string()));
    body.insert("top".to_string(), Value::from(query.top));

    if query.skip > 0 {
        body.insert("skip".to_string(), Value::from(query.skip));
    }
    if !query.select.is_empty() {
        let select = query
            .select
            .iter()
            .map(|field| field.as_str())
            .collect::<Vec<_>>()
            .join(",");
        body.insert("select".to_string(), Value::from(select));
    }
    if let Some(vector) = &query.vector {
        body.insert(
            "vectorQueries".to_string(),
            json!([{
                "kind": "vector",
                "vector": vector.vector,
                "k": vector.k,
                "fields": vector.field.as_str(),
            }]),
        );
    }

    Value::Object(body)
}

pub(crate) fn upload_body(records: &[IndexRecord]) -> Result<Value> {
    let actions = records
        .iter()
        .map(|record| {
            let mut document = match serde_json::to_value(record)? {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            document.insert("@search.action".to_string(), Value::from("upload"));
            Ok(Value::Object(document))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(json!({ "value": actions }))
}

pub(crate) fn delete_body(ids: &[String]) -> Value {
    let actions: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "@search.action": "delete", "id": id }))
        .collect();
    json!({ "value": actions })
}

pub(crate) fn parse_outcomes(operation: &str, payload: &Value) -> Result<Vec<RecordOutcome>> {
    let entries = payload
        .get("value")
        .and_then(Value::as_array)
        .ok_or_else(|| RetrievalError::index(operation, "response has no value array"))?;

    Ok(entries
        .iter()
        .map(|entry| {
            let key = entry.get("key").and_then(Value::as_str).unwrap_or_default();
            let succeeded = entry.get("status").and_then(Value::as_bool).unwrap_or(false);
            if succeeded {
                RecordOutcome::success(key)
            } else {
                let message = entry
                    .get("errorMessage")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        let code = entry.get("statusCode").and_then(Value::as_u64).unwrap_or_default();
                        format!("status code {code}")
                    });
                RecordOutcome::failure(key, message)
            }
        })
        .collect())
}

pub(crate) fn parse_hits(payload: &Value) -> Result<Vec<RawHit>> {
    let hits = payload
        .get("value")
        .and_then(Value::as_array)
        .ok_or_else(|| RetrievalError::index("search", "response has no value array"))?;
    Ok(hits.iter().cloned().map(RawHit::from_json).collect())
}
