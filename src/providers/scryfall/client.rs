use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::info;

use super::ScryfallCard;
use crate::util::download::download_to_file;

pub const SCRYFALL_API_BASE: &str = "https://api.scryfall.com";
pub const DEFAULT_BULK_TYPE: &str = "default_cards";

/// Result of one point lookup. Failures are values, not errors: the caller logs
/// them and leaves the id unresolved.
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    Found(ScryfallCard),
    Throttled,
    Failed(String),
}

/// Per-id card lookup against the remote catalog.
#[async_trait::async_trait]
pub trait CardLookup: Send + Sync {
    async fn lookup(&self, scryfall_id: &str) -> LookupOutcome;
}

#[derive(Debug, Deserialize)]
struct BulkDataList {
    data: Vec<BulkDataItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkDataItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub download_uri: String,
    pub updated_at: Option<String>,
    pub size: Option<u64>,
}

/// Scryfall REST client.
/// Public API (base): https://api.scryfall.com/
///
/// Endpoints used:
/// - GET /cards/{id} - single card by Scryfall id
/// - GET /bulk-data - listing of bulk snapshot files
///
/// Scryfall asks every caller to identify itself via User-Agent.
#[derive(Debug, Clone)]
pub struct ScryfallClient {
    base_url: String,
    http: Client,
}

/// User-Agent sent with every Scryfall request.
pub fn user_agent(contact_email: &str) -> String {
    format!("MTG-Elastic-Indexer (contact: {contact_email})")
}

impl ScryfallClient {
    pub fn new(contact_email: &str, base_url: Option<&str>, timeout_secs: Option<u64>) -> Result<Self> {
        let base_url = base_url
            .unwrap_or(SCRYFALL_API_BASE)
            .trim_end_matches('/')
            .to_string();
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent(contact_email))
                .context("contact email is not a valid header value")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let mut builder = Client::builder().default_headers(headers);
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            base_url,
            http: builder.build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Locate the download URI of a bulk snapshot (e.g. `default_cards`).
    pub async fn bulk_data_item(&self, kind: &str) -> Result<BulkDataItem> {
        let url = format!("{}/bulk-data", self.base_url);
        let listing: BulkDataList = self
            .http
            .get(&url)
            .send()
            .await
            .context("requesting scryfall bulk-data listing")?
            .error_for_status()?
            .json()
            .await
            .context("decoding scryfall bulk-data listing")?;
        listing
            .data
            .into_iter()
            .find(|item| item.kind == kind)
            .ok_or_else(|| anyhow!("scryfall bulk-data listing has no '{kind}' entry"))
    }

    /// Download `url` to `dest`, returning bytes written. `dest` is replaced only
    /// once the whole body has arrived.
    pub async fn download_to(&self, url: &str, dest: &Path) -> Result<u64> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("requesting {url}"))?
            .error_for_status()?;
        let written = download_to_file(response, dest).await?;
        info!(bytes = written, path = %dest.display(), "scryfall bulk file downloaded");
        Ok(written)
    }
}

#[async_trait::async_trait]
impl CardLookup for ScryfallClient {
    async fn lookup(&self, scryfall_id: &str) -> LookupOutcome {
        let url = format!("{}/cards/{}", self.base_url, scryfall_id);
        let resp = match self.http.get(&url).send().await {
            Ok(resp) => resp,
            Err(err) => return LookupOutcome::Failed(format!("request error: {err}")),
        };
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return LookupOutcome::Throttled;
        }
        if !status.is_success() {
            return LookupOutcome::Failed(format!("status {status}"));
        }
        match resp.json::<ScryfallCard>().await {
            Ok(card) => LookupOutcome::Found(card),
            Err(err) => LookupOutcome::Failed(format!("decode error: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_client_initialization() {
        let client = ScryfallClient::new("me@example.com", None, Some(15)).unwrap();
        assert_eq!(client.base_url(), "https://api.scryfall.com");

        let client =
            ScryfallClient::new("me@example.com", Some("http://localhost:8080/"), None).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn user_agent_names_the_contact() {
        assert_eq!(
            user_agent("me@example.com"),
            "MTG-Elastic-Indexer (contact: me@example.com)"
        );
    }

    #[test]
    fn rejects_contact_that_cannot_be_a_header() {
        assert!(ScryfallClient::new("bad\nemail", None, None).is_err());
    }
}
