//! Valuation calculators
//!
//! Six independent calculators grouped the way valuation reports group them:
//! asset-based (book value, liquidation value), market-based (market cap,
//! comparable multiples) and earning-based (DCF, earnings multiple).
//!
//! Every calculator prefers explicit inputs, falls back to one financial
//! statement record (caller-supplied or fetched from the store), and always
//! answers with a [`CalculationResult`]. Errors never escape a calculator.

use crate::error::{FetchError, ValuationError};
use crate::models::{CalculationResult, ValuationTool};
use crate::records::{extract_fields, get_number, select_record, Fields, FinancialRecord};
use crate::store::RecordStore;
use crate::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

pub mod asset;
pub mod defaults;
pub mod earnings;
pub mod market;

pub use asset::{
    calculate_book_value, estimate_liquidation_value, BookValueRequest, LiquidationValueRequest,
};
pub use earnings::{calculate_dcf, calculate_earnings_multiple, DcfRequest, EarningsMultipleRequest};
pub use market::{
    calculate_comparable_multiples, calculate_market_cap, ComparableMultiplesRequest,
    MarketCapRequest,
};

/// Lookup context shared by every calculator request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default, deserialize_with = "optional_text")]
    pub company: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub period: Option<String>,
    /// Pre-supplied statement records; when absent the store is queried
    #[serde(default)]
    pub records: Option<Vec<FinancialRecord>>,
}

impl RequestContext {
    pub fn new(company: Option<&str>, period: Option<&str>) -> Self {
        Self {
            company: company.map(str::to_string),
            period: period.map(str::to_string),
            records: None,
        }
    }

    pub fn with_records(mut self, records: Vec<FinancialRecord>) -> Self {
        self.records = Some(records);
        self
    }

    /// Resolve the single statement record this request refers to.
    ///
    /// Supplied records win over the store; the store is hit at most once.
    pub(crate) async fn resolve(&self, store: &dyn RecordStore) -> Result<Fields> {
        let fetched;
        let records: &[FinancialRecord] = match &self.records {
            Some(records) => records,
            None => {
                fetched = store.fetch_financial_statements().await.map_err(|e| {
                    warn!(error = %e, "Financial statements fetch failed");
                    ValuationError::from(e)
                })?;
                &fetched
            }
        };

        select_record(records, self.company.as_deref(), self.period.as_deref())
            .map(extract_fields)
            .ok_or(ValuationError::NoDataAvailable)
    }

    pub(crate) fn success<I: Serialize, R: Serialize>(
        &self,
        tool: ValuationTool,
        inputs: &I,
        result: &R,
        confidence: f64,
        notes: &[String],
    ) -> CalculationResult {
        CalculationResult::success(
            tool,
            self.company.clone(),
            self.period.clone(),
            inputs,
            result,
            confidence,
            notes,
        )
    }

    pub(crate) fn failure(&self, tool: ValuationTool, error: &ValuationError) -> CalculationResult {
        CalculationResult::failure(tool, self.company.clone(), self.period.clone(), error)
    }
}

/// Accept `"2024"` and `2024` alike for company / period
fn optional_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

/// Industry multiple by name, with the aliases it may be stored under
pub(crate) struct MultipleSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub default: f64,
}

fn default_multiples(specs: &[MultipleSpec]) -> BTreeMap<String, f64> {
    specs
        .iter()
        .map(|spec| (spec.name.to_string(), spec.default))
        .collect()
}

async fn fetched_multiples(
    store: &dyn RecordStore,
    specs: &[MultipleSpec],
) -> std::result::Result<BTreeMap<String, f64>, FetchError> {
    let records = store.fetch_industry_multiples().await?;
    let Some(fields) = records.first().map(extract_fields) else {
        return Ok(default_multiples(specs));
    };

    Ok(specs
        .iter()
        .map(|spec| {
            (
                spec.name.to_string(),
                get_number(&fields, spec.aliases, spec.default),
            )
        })
        .collect())
}

/// Multiples to apply, in precedence order: per-multiple overrides, the caller's
/// table, the first industry multiples record, built-in defaults.
///
/// `overrides` is aligned with `specs`. The store is only queried when some
/// multiple is neither overridden nor covered by a caller table. A failed
/// fetch degrades to the defaults and leaves a note.
pub(crate) async fn resolve_multiples(
    store: &dyn RecordStore,
    table: Option<&BTreeMap<String, f64>>,
    specs: &[MultipleSpec],
    overrides: &[Option<f64>],
    notes: &mut Vec<String>,
) -> BTreeMap<String, f64> {
    let mut multiples = match table {
        Some(table) => table
            .iter()
            .map(|(k, v)| (k.to_lowercase(), *v))
            .collect(),
        None if overrides.iter().all(Option::is_some) => BTreeMap::new(),
        None => match fetched_multiples(store, specs).await {
            Ok(multiples) => multiples,
            Err(e) => {
                warn!(error = %e, "Industry multiples fetch failed; using defaults");
                notes.push(format!(
                    "Industry multiples unavailable ({}); default multiples used.",
                    e
                ));
                default_multiples(specs)
            }
        },
    };

    for (spec, value) in specs.iter().zip(overrides) {
        if let Some(value) = value {
            multiples.insert(spec.name.to_string(), *value);
        }
    }

    multiples
}

/// Apply each multiple to its base figure. A pair counts only when the base
/// is strictly positive and the multiple is present and non-zero.
pub(crate) fn apply_multiples(
    bases: &[(&str, f64)],
    multiples: &BTreeMap<String, f64>,
) -> BTreeMap<String, f64> {
    bases
        .iter()
        .filter_map(|(name, base)| {
            let multiple = multiples.get(*name).copied().filter(|m| *m != 0.0)?;
            (*base > 0.0).then(|| (name.to_string(), base * multiple))
        })
        .collect()
}

pub(crate) fn average(values: &BTreeMap<String, f64>) -> f64 {
    values.values().sum::<f64>() / values.len() as f64
}

/// Parse tool parameters into the matching request and run the calculator
pub async fn calculate(
    store: &dyn RecordStore,
    tool: ValuationTool,
    parameters: Value,
) -> Result<CalculationResult> {
    let parameters = match parameters {
        Value::Null => Value::Object(Default::default()),
        Value::Object(_) => parameters,
        _ => {
            return Err(ValuationError::InvalidToolInput(
                "parameters must be a JSON object".to_string(),
            ))
        }
    };

    fn parse<T: serde::de::DeserializeOwned>(tool: ValuationTool, value: Value) -> Result<T> {
        serde_json::from_value(value)
            .map_err(|e| ValuationError::InvalidToolInput(format!("{}: {}", tool, e)))
    }

    let result = match tool {
        ValuationTool::BookValue => calculate_book_value(store, &parse(tool, parameters)?).await,
        ValuationTool::LiquidationValue => {
            estimate_liquidation_value(store, &parse(tool, parameters)?).await
        }
        ValuationTool::MarketCap => calculate_market_cap(store, &parse(tool, parameters)?).await,
        ValuationTool::ComparableMultiples => {
            calculate_comparable_multiples(store, &parse(tool, parameters)?).await
        }
        ValuationTool::Dcf => calculate_dcf(store, &parse(tool, parameters)?).await,
        ValuationTool::EarningsMultiple => {
            calculate_earnings_multiple(store, &parse(tool, parameters)?).await
        }
    };

    Ok(result)
}
