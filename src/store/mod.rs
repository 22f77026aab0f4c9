//! Record store layer
//!
//! Source of the record collections the calculators fall back to.
//! In-memory for development and tests; `AirtableStore` for the hosted base.

use crate::error::FetchError;
use crate::records::FinancialRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod airtable;
pub use airtable::AirtableStore;

/// Tables of the valuation base
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Companies,
    FinancialStatements,
    MarketData,
    Transactions,
    DiscountRates,
    IndustryMultiples,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Companies,
        Table::FinancialStatements,
        Table::MarketData,
        Table::Transactions,
        Table::DiscountRates,
        Table::IndustryMultiples,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Companies => "companies",
            Table::FinancialStatements => "financial_statements",
            Table::MarketData => "market_data",
            Table::Transactions => "transactions",
            Table::DiscountRates => "discount_rates",
            Table::IndustryMultiples => "industry_multiples",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        Table::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unknown table '{}'", s))
    }
}

/// Trait for record collection access (single-shot, no retries)
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_table(&self, table: Table) -> Result<Vec<FinancialRecord>, FetchError>;

    async fn fetch_financial_statements(&self) -> Result<Vec<FinancialRecord>, FetchError> {
        self.fetch_table(Table::FinancialStatements).await
    }

    async fn fetch_industry_multiples(&self) -> Result<Vec<FinancialRecord>, FetchError> {
        self.fetch_table(Table::IndustryMultiples).await
    }
}

/// In-memory record store for development and tests
pub struct InMemoryRecordStore {
    tables: Arc<RwLock<HashMap<Table, Vec<FinancialRecord>>>>,
    failures: Arc<RwLock<HashMap<Table, FetchError>>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn with_table(table: Table, records: Vec<FinancialRecord>) -> Self {
        let mut tables = HashMap::new();
        tables.insert(table, records);
        Self {
            tables: Arc::new(RwLock::new(tables)),
            failures: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn insert(&self, table: Table, records: Vec<FinancialRecord>) {
        let mut tables = self.tables.write().await;
        tables.insert(table, records);
    }

    /// Make every later fetch of `table` fail with `error`
    pub async fn fail_table(&self, table: Table, error: FetchError) {
        let mut failures = self.failures.write().await;
        failures.insert(table, error);
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn fetch_table(&self, table: Table) -> Result<Vec<FinancialRecord>, FetchError> {
        {
            let failures = self.failures.read().await;
            if let Some(error) = failures.get(&table) {
                return Err(error.clone());
            }
        }

        let tables = self.tables.read().await;
        Ok(tables.get(&table).cloned().unwrap_or_default())
    }
}
