//! Document store seam: the two operations the indexer needs from a search
//! backend, plus the bulk response shape it reconciles against.

pub mod bulk_writer;
pub mod elastic;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use bulk_writer::{BulkIngestWriter, DocumentBuild, IndexReport, IngestOutcome};
pub use elastic::ElasticsearchStore;

/// One `index` action paired with its document.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub index: String,
    pub id: Option<String>,
    pub document: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<BulkItem>,
}

/// One entry of `items`, keyed by action name (`index`, `create`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<BulkItemResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<BulkItemResult>,
}

impl BulkItem {
    pub fn result(&self) -> Option<&BulkItemResult> {
        self.index.as_ref().or(self.create.as_ref())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkItemResult {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<BulkItemError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkItemError {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[async_trait::async_trait]
pub trait SearchStore: Send + Sync {
    async fn index_exists(&self, index: &str) -> Result<bool>;
    async fn create_index(&self, index: &str) -> Result<()>;
    /// Submit one batch; `Err` means the whole request was rejected.
    async fn bulk(&self, ops: &[BulkOperation]) -> Result<BulkResponse>;

    async fn ensure_index(&self, index: &str) -> Result<bool> {
        if self.index_exists(index).await? {
            return Ok(false);
        }
        tracing::info!(index, "index does not exist; creating");
        self.create_index(index).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_elasticsearch_bulk_response_with_item_errors() {
        let raw = json!({
            "took": 30,
            "errors": true,
            "items": [
                {"index": {"_index": "mtg_cards", "_id": "u1", "status": 201, "result": "created"}},
                {"index": {"_index": "mtg_cards", "_id": "u2", "status": 400,
                    "error": {"type": "mapper_parsing_exception", "reason": "failed to parse field [power]"}}}
            ]
        });
        let resp: BulkResponse = serde_json::from_value(raw).unwrap();
        assert!(resp.errors);
        assert_eq!(resp.items.len(), 2);
        assert!(resp.items[0].result().unwrap().error.is_none());
        let failed = resp.items[1].result().unwrap();
        assert_eq!(failed.id.as_deref(), Some("u2"));
        let err = failed.error.as_ref().unwrap();
        assert_eq!(err.kind.as_deref(), Some("mapper_parsing_exception"));
        assert_eq!(err.reason.as_deref(), Some("failed to parse field [power]"));
    }
}
