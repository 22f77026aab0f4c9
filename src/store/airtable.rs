//! Airtable-backed record store
//!
//! Lists every record of a table, following the `offset` cursor page by page.
//! One attempt per fetch; retry policy belongs to the caller.

use crate::config::AirtableConfig;
use crate::error::{FetchError, ValuationError};
use crate::records::FinancialRecord;
use crate::store::{RecordStore, Table};
use crate::Result;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Default upper bound on cursor pages per table
const MAX_PAGES: usize = 500;

#[derive(Debug, Deserialize)]
struct ListRecordsPage {
    #[serde(default)]
    records: Vec<Value>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Clone)]
pub struct AirtableStore {
    client: Client,
    api_url: String,
    base_id: String,
    api_key: String,
    max_pages: usize,
}

impl AirtableStore {
    pub fn new(config: &AirtableConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ValuationError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            base_id: config.base_id.clone(),
            api_key: config.api_key.clone(),
            max_pages: MAX_PAGES,
        })
    }

    /// Fail a fetch that needs more than `max_pages` cursor pages
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/v0/{}/{}", self.api_url, self.base_id, table)
    }

    async fn fetch_page(
        &self,
        table: Table,
        offset: Option<&str>,
    ) -> std::result::Result<ListRecordsPage, FetchError> {
        let mut request = self
            .client
            .get(self.table_url(table))
            .bearer_auth(&self.api_key);
        if let Some(offset) = offset {
            request = request.query(&[("offset", offset)]);
        }

        let response = request.send().await.map_err(|e| FetchError::Request {
            table: table.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%table, status = status.as_u16(), "Record store rejected request");
            return Err(FetchError::Status {
                table: table.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<ListRecordsPage>()
            .await
            .map_err(|e| FetchError::Decode {
                table: table.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait::async_trait]
impl RecordStore for AirtableStore {
    async fn fetch_table(&self, table: Table) -> std::result::Result<Vec<FinancialRecord>, FetchError> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        for page_number in 1..=self.max_pages {
            let page = self.fetch_page(table, offset.as_deref()).await?;
            records.extend(page.records.into_iter().map(FinancialRecord::from_value));

            debug!(%table, page_number, total = records.len(), "Fetched record page");

            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => return Ok(records),
            }
        }

        // A partial table would silently skew record selection
        warn!(%table, pages = self.max_pages, fetched = records.len(), "Page limit reached before the last page");
        Err(FetchError::PageLimit {
            table: table.to_string(),
            pages: self.max_pages,
        })
    }
}
