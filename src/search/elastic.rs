use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::json;
use url::Url;

use super::{BulkOperation, BulkResponse, SearchStore};

/// Elasticsearch over its REST API.
///
/// Key endpoints:
/// - HEAD /{index} - existence check (200 / 404)
/// - PUT /{index} - create with default settings
/// - POST /_bulk - NDJSON action/document pairs
#[derive(Debug, Clone)]
pub struct ElasticsearchStore {
    base_url: String,
    http: Client,
}

impl ElasticsearchStore {
    pub fn new(base_url: &str, api_key: Option<&str>, timeout_secs: Option<u64>) -> Result<Self> {
        let parsed = Url::parse(base_url).with_context(|| format!("invalid ELASTIC_URL {base_url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow!("ELASTIC_URL must be http(s), got {}", parsed.scheme()));
        }
        let mut headers = HeaderMap::new();
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            let mut value = HeaderValue::from_str(&format!("ApiKey {}", key.trim()))
                .context("ELASTIC_KEY is not a valid header value")?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        let http = Client::builder()
            .user_agent("mtg-indexer/0.1")
            .default_headers(headers)
            .timeout(Duration::from_secs(timeout_secs.unwrap_or(60)))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Render operations as the `_bulk` NDJSON body: one action line and one source
/// line per document, newline-terminated.
pub fn bulk_body(ops: &[BulkOperation]) -> Result<String> {
    let mut body = String::new();
    for op in ops {
        let action = match &op.id {
            Some(id) => json!({"index": {"_index": op.index, "_id": id}}),
            None => json!({"index": {"_index": op.index}}),
        };
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&op.document)?);
        body.push('\n');
    }
    Ok(body)
}

#[async_trait::async_trait]
impl SearchStore for ElasticsearchStore {
    async fn index_exists(&self, index: &str) -> Result<bool> {
        let url = format!("{}/{}", self.base_url, index);
        let resp = self
            .http
            .head(&url)
            .send()
            .await
            .with_context(|| format!("checking index {index}"))?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(anyhow!("index check for {index} failed (status={status})")),
        }
    }

    async fn create_index(&self, index: &str) -> Result<()> {
        let url = format!("{}/{}", self.base_url, index);
        let resp = self
            .http
            .put(&url)
            .send()
            .await
            .with_context(|| format!("creating index {index}"))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("create index {index} failed (status={status}): {text}"));
        }
        Ok(())
    }

    async fn bulk(&self, ops: &[BulkOperation]) -> Result<BulkResponse> {
        let url = format!("{}/_bulk", self.base_url);
        let resp = self
            .http
            .post(&url)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(bulk_body(ops)?)
            .send()
            .await
            .context("sending bulk request")?;
        let status = resp.status();
        if !status.is_success() {
            let text: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(512)
                .collect();
            return Err(anyhow!("bulk request failed (status={status}): {text}"));
        }
        resp.json::<BulkResponse>()
            .await
            .context("decoding bulk response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn bulk_body_pairs_actions_with_documents() {
        let ops = vec![
            BulkOperation {
                index: "mtg_cards".into(),
                id: Some("uuid-1".into()),
                document: json!({"name": "Forest"}),
            },
            BulkOperation {
                index: "mtg_cards".into(),
                id: None,
                document: json!({"name": "Island"}),
            },
        ];
        let body = bulk_body(&ops).unwrap();
        assert!(body.ends_with('\n'));
        let lines: Vec<Value> = body
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], json!({"index": {"_index": "mtg_cards", "_id": "uuid-1"}}));
        assert_eq!(lines[1], json!({"name": "Forest"}));
        assert_eq!(lines[2], json!({"index": {"_index": "mtg_cards"}}));
        assert_eq!(lines[3], json!({"name": "Island"}));
    }

    #[tokio::test]
    async fn test_store_initialization() {
        let store = ElasticsearchStore::new("http://localhost:9200/", Some("abc=="), None).unwrap();
        assert_eq!(store.base_url(), "http://localhost:9200");
        assert!(ElasticsearchStore::new("http://localhost:9200", Some("bad\nkey"), None).is_err());
        assert!(ElasticsearchStore::new("localhost:9200", None, None).is_err());
        assert!(ElasticsearchStore::new("not a url", None, None).is_err());
    }
}
