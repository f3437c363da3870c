use std::ops::AddAssign;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::{error, info, warn};

use super::{BulkOperation, SearchStore};
use crate::cache::UrlCache;
use crate::normalization::fields::{card_schema, FieldSchema};
use crate::providers::mtgjson::{scryfall_id, SetFile};

pub const IMAGE_URL_FIELD: &str = "imageUrl";
pub const SET_INFO_FIELD: &str = "set_info";

/// Per-document construction result; a rejected record is counted, not thrown.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentBuild {
    Ready(BulkOperation),
    Rejected { id: String, reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    pub succeeded: usize,
    pub failed: usize,
}

impl IngestOutcome {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

impl AddAssign for IngestOutcome {
    fn add_assign(&mut self, rhs: Self) {
        self.succeeded += rhs.succeeded;
        self.failed += rhs.failed;
    }
}

/// Totals for a multi-file indexing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub documents: IngestOutcome,
    pub files_indexed: usize,
    /// Set files that could not be read or parsed; none of their records were sent.
    pub files_skipped: usize,
}

/// Projects MTGJSON records into documents and writes them in fixed-size batches,
/// one outstanding request at a time.
pub struct BulkIngestWriter {
    store: Arc<dyn SearchStore>,
    index: String,
    batch_docs: usize,
    schema: FieldSchema,
}

impl BulkIngestWriter {
    pub fn new(store: Arc<dyn SearchStore>, index: impl Into<String>, batch_docs: usize) -> Self {
        Self {
            store,
            index: index.into(),
            batch_docs: batch_docs.max(1),
            schema: card_schema(),
        }
    }

    pub fn build_document(
        &self,
        record: &Value,
        set_info: &Value,
        cache: &UrlCache,
        position: usize,
    ) -> DocumentBuild {
        let label = record
            .get("uuid")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| format!("#{position}"));
        if !record.is_object() {
            return DocumentBuild::Rejected {
                id: label,
                reason: "record is not a JSON object".into(),
            };
        }
        let Value::Object(mut doc) = self.schema.project(record) else {
            return DocumentBuild::Rejected {
                id: label,
                reason: "projection did not yield an object".into(),
            };
        };
        if let Some(url) = scryfall_id(record).and_then(|id| cache.get(id)) {
            doc.insert(IMAGE_URL_FIELD.into(), Value::String(url.to_string()));
        }
        doc.insert(SET_INFO_FIELD.into(), set_info.clone());

        DocumentBuild::Ready(BulkOperation {
            index: self.index.clone(),
            id: record.get("uuid").and_then(|v| v.as_str()).map(str::to_string),
            document: Value::Object(doc),
        })
    }

    /// Index every card and token of one set file.
    pub async fn index_set(&self, set: &SetFile, cache: &UrlCache) -> IngestOutcome {
        let set_info = set.set_info();
        let mut outcome = IngestOutcome::default();
        let mut pending: Vec<BulkOperation> = Vec::with_capacity(self.batch_docs);

        for (position, record) in set.records().enumerate() {
            match self.build_document(record, &set_info, cache, position) {
                DocumentBuild::Ready(op) => pending.push(op),
                DocumentBuild::Rejected { id, reason } => {
                    warn!(doc_id = %id, reason = %reason, "failed to build document");
                    outcome.failed += 1;
                }
            }
            if pending.len() >= self.batch_docs {
                outcome += self.submit(&pending).await;
                pending.clear();
            }
        }
        if !pending.is_empty() {
            outcome += self.submit(&pending).await;
        }
        outcome
    }

    /// Submit one batch and reconcile per-document results.
    pub async fn submit(&self, ops: &[BulkOperation]) -> IngestOutcome {
        let mut outcome = IngestOutcome {
            succeeded: ops.len(),
            failed: 0,
        };
        let resp = match self.store.bulk(ops).await {
            Ok(resp) => resp,
            Err(err) => {
                error!(error = %err, docs = ops.len(), "bulk request rejected; counting batch as failed");
                return IngestOutcome {
                    succeeded: 0,
                    failed: ops.len(),
                };
            }
        };
        if !resp.errors {
            return outcome;
        }
        for item in &resp.items {
            let Some(result) = item.result() else { continue };
            let Some(err) = &result.error else { continue };
            outcome.succeeded = outcome.succeeded.saturating_sub(1);
            outcome.failed += 1;
            warn!(
                doc_id = result.id.as_deref().unwrap_or("?"),
                error_type = err.kind.as_deref().unwrap_or("?"),
                reason = err.reason.as_deref().unwrap_or("?"),
                "failed to index document"
            );
        }
        outcome
    }

    /// Make sure the index exists, then index each file in turn.
    /// Only the index check/create can fail the call.
    pub async fn index_files(&self, paths: &[PathBuf], cache: &UrlCache) -> Result<IndexReport> {
        if self.store.ensure_index(&self.index).await? {
            info!(index = %self.index, "created index");
        }
        let mut report = IndexReport::default();
        for (idx, path) in paths.iter().enumerate() {
            let set = match SetFile::load(path) {
                Ok(set) => set,
                Err(err) => {
                    warn!(file = %path.display(), error = %err, "skipping unreadable set file");
                    report.files_skipped += 1;
                    continue;
                }
            };
            let outcome = self.index_set(&set, cache).await;
            info!(
                file = %path.display(),
                set = set.code().unwrap_or("?"),
                succeeded = outcome.succeeded,
                failed = outcome.failed,
                progress = %format!("{}/{}", idx + 1, paths.len()),
                "indexed set file"
            );
            report.documents += outcome;
            report.files_indexed += 1;
        }
        Ok(report)
    }
}
