//! Asset-based valuation: book value and liquidation value

use super::defaults::{
    BLANKET_TOTAL_ASSETS_DISCOUNT, CANONICAL_ASSET_CATEGORIES, DEFAULT_CATEGORY_DISCOUNT,
    DEFAULT_LIQUIDATION_DISCOUNTS, TOTAL_ASSETS_CATEGORY,
};
use super::RequestContext;
use crate::error::ValuationError;
use crate::models::{CalculationResult, ValuationTool};
use crate::records::{get_number, Fields};
use crate::store::RecordStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

//
// ================= Book Value =================
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookValueRequest {
    #[serde(flatten)]
    pub context: RequestContext,
    #[serde(default)]
    pub total_assets: Option<f64>,
    #[serde(default)]
    pub total_liabilities: Option<f64>,
}

#[derive(Debug, Serialize)]
struct BookValueInputs {
    total_assets: f64,
    total_liabilities: f64,
}

#[derive(Debug, Serialize)]
struct BookValueOutput {
    book_value: f64,
}

/// Book Value = Total Assets - Total Liabilities
pub async fn calculate_book_value(
    store: &dyn RecordStore,
    request: &BookValueRequest,
) -> CalculationResult {
    let tool = ValuationTool::BookValue;
    debug!(%tool, company = ?request.context.company, period = ?request.context.period, "Running calculator");

    book_value(store, request)
        .await
        .unwrap_or_else(|e| request.context.failure(tool, &e))
}

async fn book_value(store: &dyn RecordStore, request: &BookValueRequest) -> Result<CalculationResult> {
    let ctx = &request.context;

    let (total_assets, total_liabilities, explicit) =
        match (request.total_assets, request.total_liabilities) {
            (Some(assets), Some(liabilities)) => (assets, liabilities, true),
            (assets, liabilities) => {
                let fields = ctx.resolve(store).await?;
                (
                    assets.unwrap_or_else(|| get_number(&fields, &["total_assets", "assets"], 0.0)),
                    liabilities.unwrap_or_else(|| {
                        get_number(&fields, &["total_liabilities", "liabilities"], 0.0)
                    }),
                    false,
                )
            }
        };

    let book_value = total_assets - total_liabilities;

    let mut notes = Vec::new();
    if book_value < 0.0 {
        notes.push("Negative equity; liabilities exceed assets.".to_string());
    }
    notes.push("Book value may undervalue intangibles and going-concern value.".to_string());

    let confidence = if explicit { 0.90 } else { 0.75 };

    Ok(ctx.success(
        ValuationTool::BookValue,
        &BookValueInputs {
            total_assets,
            total_liabilities,
        },
        &BookValueOutput { book_value },
        confidence,
        &notes,
    ))
}

//
// ================= Liquidation Value =================
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiquidationValueRequest {
    #[serde(flatten)]
    pub context: RequestContext,
    /// Asset category → book amount, used verbatim when given
    #[serde(default)]
    pub asset_breakdown: Option<BTreeMap<String, f64>>,
    #[serde(default)]
    pub total_liabilities: Option<f64>,
    /// Per-category recovery rate overrides, merged over the default table
    #[serde(default)]
    pub discounts: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Serialize)]
struct LiquidationInputs {
    asset_breakdown: BTreeMap<String, f64>,
    total_liabilities: f64,
    discounts: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize)]
struct LiquidationOutput {
    discounted_asset_value: f64,
    liquidation_value: f64,
}

/// Liquidation Value = Σ(category amount × recovery rate) - Total Liabilities
///
/// Best effort: missing data never fails the call. With nothing known the
/// result is `0 - liabilities` at reduced confidence.
pub async fn estimate_liquidation_value(
    store: &dyn RecordStore,
    request: &LiquidationValueRequest,
) -> CalculationResult {
    let tool = ValuationTool::LiquidationValue;
    debug!(%tool, company = ?request.context.company, period = ?request.context.period, "Running calculator");

    liquidation_value(store, request)
        .await
        .unwrap_or_else(|e| request.context.failure(tool, &e))
}

/// Default table with the caller's overrides merged in (keys lower-cased)
fn discount_table(overrides: Option<&BTreeMap<String, f64>>) -> Result<BTreeMap<String, f64>> {
    let mut table: BTreeMap<String, f64> = DEFAULT_LIQUIDATION_DISCOUNTS
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect();

    for (category, rate) in overrides.into_iter().flatten() {
        if !rate.is_finite() || !(0.0..=1.0).contains(rate) {
            return Err(ValuationError::InvalidInput(format!(
                "discount for '{}' must be within [0, 1], got {}",
                category, rate
            )));
        }
        table.insert(category.to_lowercase(), *rate);
    }

    Ok(table)
}

/// Per-category amounts found in a record, plus the aggregate total if present
fn infer_breakdown(
    fields: &Fields,
    discounts: &BTreeMap<String, f64>,
) -> (BTreeMap<String, f64>, Option<f64>) {
    let candidates: BTreeSet<&str> = discounts
        .keys()
        .map(String::as_str)
        .chain(CANONICAL_ASSET_CATEGORIES.iter().copied())
        .collect();

    let mut breakdown = BTreeMap::new();
    let mut total_assets = None;
    let mut assets = None;

    for key in candidates {
        let Some(amount) = fields.number(&[key]) else {
            continue;
        };
        match key {
            TOTAL_ASSETS_CATEGORY => total_assets = Some(amount),
            "assets" => assets = Some(amount),
            _ => {
                breakdown.insert(key.to_string(), amount);
            }
        }
    }

    (breakdown, total_assets.or(assets))
}

/// Discounted sum over categories; returns the total and the rate applied to each
fn discounted_assets(
    breakdown: &BTreeMap<String, f64>,
    discounts: &BTreeMap<String, f64>,
) -> (f64, BTreeMap<String, f64>) {
    let mut applied = BTreeMap::new();
    let mut total = 0.0;

    for (category, amount) in breakdown {
        let rate = discounts
            .get(category)
            .copied()
            .unwrap_or(DEFAULT_CATEGORY_DISCOUNT);
        applied.insert(category.clone(), rate);
        total += amount * rate;
    }

    (total, applied)
}

async fn liquidation_value(
    store: &dyn RecordStore,
    request: &LiquidationValueRequest,
) -> Result<CalculationResult> {
    let ctx = &request.context;
    let mut discounts = discount_table(request.discounts.as_ref())?;
    let mut notes = Vec::new();

    let fields = if request.asset_breakdown.is_none() || request.total_liabilities.is_none() {
        match ctx.resolve(store).await {
            Ok(fields) => fields,
            Err(ValuationError::NoDataAvailable) => Fields::default(),
            Err(e) => {
                warn!(error = %e, "Continuing liquidation estimate without statement data");
                notes.push(format!(
                    "Financial statements unavailable ({}); estimate uses explicit inputs only.",
                    e
                ));
                Fields::default()
            }
        }
    } else {
        Fields::default()
    };

    let total_liabilities = request.total_liabilities.unwrap_or_else(|| {
        get_number(&fields, &["total_liabilities", "liabilities"], 0.0)
    });

    let breakdown = match &request.asset_breakdown {
        Some(explicit) => explicit
            .iter()
            .map(|(k, v)| (k.to_lowercase(), *v))
            .collect(),
        None => {
            let (inferred, total_assets) = infer_breakdown(&fields, &discounts);
            match total_assets {
                Some(total) if inferred.is_empty() => {
                    discounts
                        .entry(TOTAL_ASSETS_CATEGORY.to_string())
                        .or_insert(BLANKET_TOTAL_ASSETS_DISCOUNT);
                    BTreeMap::from([(TOTAL_ASSETS_CATEGORY.to_string(), total)])
                }
                _ => inferred,
            }
        }
    };

    let (discounted_asset_value, applied) = discounted_assets(&breakdown, &discounts);
    let liquidation_value = discounted_asset_value - total_liabilities;

    let has_breakdown = breakdown.len() > 1
        || (breakdown.len() == 1 && !breakdown.contains_key(TOTAL_ASSETS_CATEGORY));
    let confidence = if has_breakdown { 0.85 } else { 0.65 };

    if breakdown.is_empty() {
        notes.push("No asset data found; liquidation value reflects liabilities only.".to_string());
    } else if !has_breakdown {
        notes.push("Used blanket discount due to missing asset breakdown.".to_string());
    }
    notes.push(
        "Liquidation discounts approximate forced-sale conditions and vary by sector.".to_string(),
    );

    let inputs = LiquidationInputs {
        asset_breakdown: breakdown,
        total_liabilities,
        discounts: if applied.is_empty() { discounts } else { applied },
    };

    Ok(ctx.success(
        ValuationTool::LiquidationValue,
        &inputs,
        &LiquidationOutput {
            discounted_asset_value,
            liquidation_value,
        },
        confidence,
        &notes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::records::FinancialRecord;
    use crate::store::{InMemoryRecordStore, Table};
    use serde_json::json;

    fn statements(values: Vec<serde_json::Value>) -> InMemoryRecordStore {
        InMemoryRecordStore::with_table(
            Table::FinancialStatements,
            values.into_iter().map(FinancialRecord::from_value).collect(),
        )
    }

    #[tokio::test]
    async fn test_book_value_explicit_inputs() {
        let store = InMemoryRecordStore::new();
        for (assets, liabilities) in [(0.0, 0.0), (1000.0, 400.0), (12.5, 0.25), (3.0, 7.0)] {
            let request = BookValueRequest {
                total_assets: Some(assets),
                total_liabilities: Some(liabilities),
                ..Default::default()
            };
            let result = calculate_book_value(&store, &request).await;

            assert!(result.success);
            assert_eq!(result.output("book_value"), Some(assets - liabilities));
            assert_eq!(result.confidence, Some(0.90));
        }
    }

    #[tokio::test]
    async fn test_book_value_negative_equity_note() {
        let store = InMemoryRecordStore::new();
        let request = BookValueRequest {
            total_assets: Some(100.0),
            total_liabilities: Some(250.0),
            ..Default::default()
        };
        let result = calculate_book_value(&store, &request).await;

        assert_eq!(result.output("book_value"), Some(-150.0));
        let notes = result.notes.unwrap();
        assert!(notes.starts_with("Negative equity"));
        assert!(notes.contains("going-concern"));
    }

    #[tokio::test]
    async fn test_book_value_from_records() {
        let store = statements(vec![
            json!({"company": "Acme", "period": "2023", "total_assets": 900, "total_liabilities": 300}),
            json!({"fields": {"Company": "Acme", "Period": "2024", "Assets": 1200, "Liabilities": 500}}),
        ]);
        let request = BookValueRequest {
            context: RequestContext::new(Some("acme"), Some("2024")),
            ..Default::default()
        };
        let result = calculate_book_value(&store, &request).await;

        assert!(result.success);
        assert_eq!(result.output("book_value"), Some(700.0));
        assert_eq!(result.confidence, Some(0.75));
        assert_eq!(result.company.as_deref(), Some("acme"));
    }

    #[tokio::test]
    async fn test_book_value_partial_override_uses_lookup() {
        let store = statements(vec![json!({"total_assets": 900, "total_liabilities": 300})]);
        let request = BookValueRequest {
            total_assets: Some(1000.0),
            ..Default::default()
        };
        let result = calculate_book_value(&store, &request).await;

        assert_eq!(result.output("book_value"), Some(700.0));
        assert_eq!(result.confidence, Some(0.75));
    }

    #[tokio::test]
    async fn test_book_value_without_data_fails() {
        let store = InMemoryRecordStore::new();
        let result = calculate_book_value(&store, &BookValueRequest::default()).await;

        assert!(!result.success);
        assert!(result.result.is_none());
        assert_eq!(
            result.message.as_deref(),
            Some("No financial statement records available.")
        );

        let request = BookValueRequest {
            context: RequestContext::default().with_records(vec![]),
            ..Default::default()
        };
        assert!(!calculate_book_value(&store, &request).await.success);
    }

    #[tokio::test]
    async fn test_book_value_fetch_failure_is_result_not_panic() {
        let store = InMemoryRecordStore::new();
        store
            .fail_table(
                Table::FinancialStatements,
                FetchError::Request {
                    table: "financial_statements".to_string(),
                    message: "connection refused".to_string(),
                },
            )
            .await;

        let result = calculate_book_value(&store, &BookValueRequest::default()).await;
        assert!(!result.success);
        assert!(result.message.unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_liquidation_explicit_breakdown() {
        let store = InMemoryRecordStore::new();
        let request = LiquidationValueRequest {
            asset_breakdown: Some(BTreeMap::from([
                ("cash".to_string(), 100.0),
                ("inventory".to_string(), 200.0),
            ])),
            total_liabilities: Some(50.0),
            ..Default::default()
        };
        let result = estimate_liquidation_value(&store, &request).await;

        assert!(result.success);
        assert_eq!(result.output("discounted_asset_value"), Some(200.0));
        assert_eq!(result.output("liquidation_value"), Some(150.0));
        assert_eq!(result.confidence, Some(0.85));

        let inputs = result.inputs.clone().unwrap();
        assert_eq!(inputs["discounts"], json!({"cash": 1.0, "inventory": 0.5}));
    }

    #[tokio::test]
    async fn test_liquidation_single_category_counts_as_breakdown() {
        let store = InMemoryRecordStore::new();
        let request = LiquidationValueRequest {
            asset_breakdown: Some(BTreeMap::from([("inventory".to_string(), 200.0)])),
            total_liabilities: Some(20.0),
            ..Default::default()
        };
        let result = estimate_liquidation_value(&store, &request).await;

        assert_eq!(result.output("liquidation_value"), Some(80.0));
        assert_eq!(result.confidence, Some(0.85));
        assert!(!result.notes.unwrap().contains("blanket discount"));
    }

    #[tokio::test]
    async fn test_liquidation_explicit_total_assets_only() {
        let store = InMemoryRecordStore::new();
        let request = LiquidationValueRequest {
            asset_breakdown: Some(BTreeMap::from([("Total_Assets".to_string(), 1000.0)])),
            total_liabilities: Some(100.0),
            ..Default::default()
        };
        let result = estimate_liquidation_value(&store, &request).await;

        // an explicit aggregate takes the unknown-category rate, not the blanket one
        assert_eq!(result.output("discounted_asset_value"), Some(500.0));
        assert_eq!(result.output("liquidation_value"), Some(400.0));
        assert_eq!(result.confidence, Some(0.65));
        assert!(result.notes.unwrap().contains("blanket discount"));
    }

    #[tokio::test]
    async fn test_liquidation_unknown_category_and_overrides() {
        let store = InMemoryRecordStore::new();
        let request = LiquidationValueRequest {
            asset_breakdown: Some(BTreeMap::from([
                ("Inventory".to_string(), 100.0),
                ("crypto".to_string(), 100.0),
            ])),
            total_liabilities: Some(0.0),
            discounts: Some(BTreeMap::from([("INVENTORY".to_string(), 0.8)])),
            ..Default::default()
        };
        let result = estimate_liquidation_value(&store, &request).await;

        // inventory overridden to 0.8, crypto falls back to 0.5
        assert_eq!(result.output("discounted_asset_value"), Some(130.0));
        assert_eq!(result.confidence, Some(0.85));
    }

    #[tokio::test]
    async fn test_liquidation_rejects_out_of_range_discount() {
        let store = InMemoryRecordStore::new();
        let request = LiquidationValueRequest {
            asset_breakdown: Some(BTreeMap::new()),
            total_liabilities: Some(0.0),
            discounts: Some(BTreeMap::from([("cash".to_string(), 1.5)])),
            ..Default::default()
        };
        let result = estimate_liquidation_value(&store, &request).await;

        assert!(!result.success);
        assert!(result.message.unwrap().starts_with("Invalid input"));
    }

    #[tokio::test]
    async fn test_liquidation_infers_breakdown_from_record() {
        let store = statements(vec![json!({
            "fields": {
                "Company": "Acme",
                "Cash": 50,
                "Accounts_Receivable": 100,
                "PP&E": 500,
                "Total_Assets": 650,
                "Total_Liabilities": 200,
                "Goodwill": "n/a"
            }
        })]);
        let request = LiquidationValueRequest {
            context: RequestContext::new(Some("Acme"), None),
            ..Default::default()
        };
        let result = estimate_liquidation_value(&store, &request).await;

        // 50*1.0 + 100*0.7 + 500*0.4 = 320
        assert_eq!(result.output("discounted_asset_value"), Some(320.0));
        assert_eq!(result.output("liquidation_value"), Some(120.0));
        assert_eq!(result.confidence, Some(0.85));

        let inputs = result.inputs.clone().unwrap();
        assert!(inputs["asset_breakdown"].get("total_assets").is_none());
        assert!(inputs["asset_breakdown"].get("goodwill").is_none());
    }

    #[tokio::test]
    async fn test_liquidation_blanket_discount_on_total_assets() {
        let store = statements(vec![json!({"assets": 1000, "liabilities": 300})]);
        let result =
            estimate_liquidation_value(&store, &LiquidationValueRequest::default()).await;

        assert_eq!(result.output("discounted_asset_value"), Some(700.0));
        assert_eq!(result.output("liquidation_value"), Some(400.0));
        assert_eq!(result.confidence, Some(0.65));
        assert!(result.notes.unwrap().contains("blanket discount"));
    }

    #[tokio::test]
    async fn test_liquidation_caller_total_assets_discount_wins() {
        let store = statements(vec![json!({"total_assets": 1000})]);
        let request = LiquidationValueRequest {
            discounts: Some(BTreeMap::from([("total_assets".to_string(), 0.5)])),
            ..Default::default()
        };
        let result = estimate_liquidation_value(&store, &request).await;

        assert_eq!(result.output("discounted_asset_value"), Some(500.0));
        assert_eq!(result.confidence, Some(0.65));
    }

    // Documented policy: no data at all still yields a number (0 - liabilities)
    #[tokio::test]
    async fn test_liquidation_never_fails_without_data() {
        let store = InMemoryRecordStore::new();
        let result =
            estimate_liquidation_value(&store, &LiquidationValueRequest::default()).await;

        assert!(result.success);
        assert_eq!(result.output("liquidation_value"), Some(0.0));
        assert_eq!(result.confidence, Some(0.65));

        let request = LiquidationValueRequest {
            total_liabilities: Some(75.0),
            ..Default::default()
        };
        let result = estimate_liquidation_value(&store, &request).await;
        assert!(result.success);
        assert_eq!(result.output("liquidation_value"), Some(-75.0));
        assert!(result.notes.unwrap().contains("No asset data found"));
    }

    #[tokio::test]
    async fn test_asset_calculators_are_idempotent() {
        let store = statements(vec![json!({
            "fields": {"Company": "Acme", "Total_Assets": 1000, "Total_Liabilities": 400,
                       "Cash": 150, "Inventory": 300}
        })]);
        let context = RequestContext::new(Some("Acme"), None);

        let request = BookValueRequest {
            context: context.clone(),
            ..Default::default()
        };
        assert_eq!(
            calculate_book_value(&store, &request).await,
            calculate_book_value(&store, &request).await
        );

        let request = LiquidationValueRequest {
            context,
            discounts: Some(BTreeMap::from([("inventory".to_string(), 0.6)])),
            ..Default::default()
        };
        let first = estimate_liquidation_value(&store, &request).await;
        let second = estimate_liquidation_value(&store, &request).await;
        assert!(first.success);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_liquidation_fetch_failure_degrades() {
        let store = InMemoryRecordStore::new();
        store
            .fail_table(
                Table::FinancialStatements,
                FetchError::Unavailable("financial_statements".to_string()),
            )
            .await;

        let request = LiquidationValueRequest {
            asset_breakdown: Some(BTreeMap::from([("cash".to_string(), 10.0)])),
            ..Default::default()
        };
        let result = estimate_liquidation_value(&store, &request).await;

        assert!(result.success);
        assert_eq!(result.output("liquidation_value"), Some(10.0));
        assert!(result.notes.unwrap().contains("Financial statements unavailable"));
    }
}
