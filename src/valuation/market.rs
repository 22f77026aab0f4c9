//! Market-based valuation: market capitalization and comparable multiples

use super::defaults::{DEFAULT_EV_EBITDA_MULTIPLE, DEFAULT_EV_SALES_MULTIPLE, DEFAULT_PE_MULTIPLE};
use super::{apply_multiples, average, resolve_multiples, MultipleSpec, RequestContext};
use crate::error::ValuationError;
use crate::models::{CalculationResult, ValuationTool};
use crate::records::get_number;
use crate::store::RecordStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

//
// ================= Market Capitalization =================
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketCapRequest {
    #[serde(flatten)]
    pub context: RequestContext,
    #[serde(default)]
    pub share_price: Option<f64>,
    #[serde(default)]
    pub shares_outstanding: Option<f64>,
}

#[derive(Debug, Serialize)]
struct MarketCapInputs {
    share_price: f64,
    shares_outstanding: f64,
}

#[derive(Debug, Serialize)]
struct MarketCapOutput {
    market_cap: f64,
}

/// Market Cap = Share Price × Shares Outstanding
///
/// Strict: a missing, zero or negative price or share count is rejected.
pub async fn calculate_market_cap(
    store: &dyn RecordStore,
    request: &MarketCapRequest,
) -> CalculationResult {
    let tool = ValuationTool::MarketCap;
    debug!(%tool, company = ?request.context.company, period = ?request.context.period, "Running calculator");

    market_cap(store, request)
        .await
        .unwrap_or_else(|e| request.context.failure(tool, &e))
}

async fn market_cap(store: &dyn RecordStore, request: &MarketCapRequest) -> Result<CalculationResult> {
    let ctx = &request.context;

    let (share_price, shares_outstanding, explicit) =
        match (request.share_price, request.shares_outstanding) {
            (Some(price), Some(shares)) => (Some(price), Some(shares), true),
            (price, shares) => {
                let fields = ctx.resolve(store).await?;
                (
                    price.or_else(|| fields.number(&["share_price", "price"])),
                    shares.or_else(|| fields.number(&["shares_outstanding", "shares"])),
                    false,
                )
            }
        };

    let (Some(share_price), Some(shares_outstanding)) = (share_price, shares_outstanding) else {
        return Err(ValuationError::InvalidInput(
            "share price or shares outstanding unavailable".to_string(),
        ));
    };

    let valid = |v: f64| v.is_finite() && v > 0.0;
    if !valid(share_price) || !valid(shares_outstanding) {
        return Err(ValuationError::InvalidInput(format!(
            "share price and shares outstanding must be positive (price {}, shares {})",
            share_price, shares_outstanding
        )));
    }

    let market_cap = share_price * shares_outstanding;
    let notes = vec!["Market cap reflects current market sentiment and may be volatile.".to_string()];
    let confidence = if explicit { 0.90 } else { 0.75 };

    Ok(ctx.success(
        ValuationTool::MarketCap,
        &MarketCapInputs {
            share_price,
            shares_outstanding,
        },
        &MarketCapOutput { market_cap },
        confidence,
        &notes,
    ))
}

//
// ================= Comparable Multiples =================
//

const COMPARABLE_MULTIPLES: [MultipleSpec; 3] = [
    MultipleSpec {
        name: "ev_ebitda",
        aliases: &["ev_ebitda", "ev_ebitda_multiple"],
        default: DEFAULT_EV_EBITDA_MULTIPLE,
    },
    MultipleSpec {
        name: "pe",
        aliases: &["pe", "pe_multiple"],
        default: DEFAULT_PE_MULTIPLE,
    },
    MultipleSpec {
        name: "ev_sales",
        aliases: &["ev_sales", "ev_sales_multiple"],
        default: DEFAULT_EV_SALES_MULTIPLE,
    },
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparableMultiplesRequest {
    #[serde(flatten)]
    pub context: RequestContext,
    #[serde(default)]
    pub revenue: Option<f64>,
    #[serde(default)]
    pub ebitda: Option<f64>,
    #[serde(default)]
    pub net_income: Option<f64>,
    #[serde(default)]
    pub ev_ebitda_multiple: Option<f64>,
    #[serde(default)]
    pub pe_multiple: Option<f64>,
    #[serde(default)]
    pub ev_sales_multiple: Option<f64>,
    /// Full multiples table (`ev_ebitda`, `pe`, `ev_sales`); skips the industry lookup
    #[serde(default)]
    pub industry_multiples: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Serialize)]
struct ComparableInputs {
    revenue: f64,
    ebitda: f64,
    net_income: f64,
    industry_multiples: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MultiplesOutput {
    pub valuations: BTreeMap<String, f64>,
    pub average_valuation: f64,
}

/// EV/EBITDA, P/E and EV/Sales valuations plus their mean
pub async fn calculate_comparable_multiples(
    store: &dyn RecordStore,
    request: &ComparableMultiplesRequest,
) -> CalculationResult {
    let tool = ValuationTool::ComparableMultiples;
    debug!(%tool, company = ?request.context.company, period = ?request.context.period, "Running calculator");

    comparable_multiples(store, request)
        .await
        .unwrap_or_else(|e| request.context.failure(tool, &e))
}

async fn comparable_multiples(
    store: &dyn RecordStore,
    request: &ComparableMultiplesRequest,
) -> Result<CalculationResult> {
    let ctx = &request.context;

    let (revenue, ebitda, net_income) =
        match (request.revenue, request.ebitda, request.net_income) {
            (Some(revenue), Some(ebitda), Some(net_income)) => (revenue, ebitda, net_income),
            (revenue, ebitda, net_income) => {
                let fields = ctx.resolve(store).await?;
                (
                    revenue.unwrap_or_else(|| get_number(&fields, &["revenue", "total_revenue"], 0.0)),
                    ebitda.unwrap_or_else(|| get_number(&fields, &["ebitda", "operating_income"], 0.0)),
                    net_income
                        .unwrap_or_else(|| get_number(&fields, &["net_income", "net_profit"], 0.0)),
                )
            }
        };

    let mut notes = Vec::new();
    let multiples = resolve_multiples(
        store,
        request.industry_multiples.as_ref(),
        &COMPARABLE_MULTIPLES,
        &[
            request.ev_ebitda_multiple,
            request.pe_multiple,
            request.ev_sales_multiple,
        ],
        &mut notes,
    )
    .await;

    let valuations = apply_multiples(
        &[("ev_ebitda", ebitda), ("pe", net_income), ("ev_sales", revenue)],
        &multiples,
    );
    if valuations.is_empty() {
        return Err(ValuationError::InsufficientComputableOutputs);
    }

    let average_valuation = average(&valuations);

    if valuations.len() < COMPARABLE_MULTIPLES.len() {
        notes.push(format!(
            "Only {} multiple(s) calculated due to missing data.",
            valuations.len()
        ));
    }
    notes.push("Multiples should be adjusted for company-specific risk factors.".to_string());

    let confidence = if valuations.len() >= 2 { 0.8 } else { 0.6 };

    Ok(ctx.success(
        ValuationTool::ComparableMultiples,
        &ComparableInputs {
            revenue,
            ebitda,
            net_income,
            industry_multiples: multiples,
        },
        &MultiplesOutput {
            valuations,
            average_valuation,
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

    fn records(values: Vec<serde_json::Value>) -> Vec<FinancialRecord> {
        values.into_iter().map(FinancialRecord::from_value).collect()
    }

    #[tokio::test]
    async fn test_market_cap_explicit() {
        let store = InMemoryRecordStore::new();
        let request = MarketCapRequest {
            share_price: Some(25.0),
            shares_outstanding: Some(1_000_000.0),
            ..Default::default()
        };
        let result = calculate_market_cap(&store, &request).await;

        assert!(result.success);
        assert_eq!(result.output("market_cap"), Some(25_000_000.0));
        assert_eq!(result.confidence, Some(0.90));
    }

    #[tokio::test]
    async fn test_market_cap_rejects_non_positive() {
        let store = InMemoryRecordStore::new();
        for (price, shares) in [(0.0, 100.0), (10.0, 0.0), (-5.0, 100.0), (10.0, -1.0)] {
            let request = MarketCapRequest {
                share_price: Some(price),
                shares_outstanding: Some(shares),
                ..Default::default()
            };
            let result = calculate_market_cap(&store, &request).await;

            assert!(!result.success, "price {price} shares {shares}");
            assert!(result.message.unwrap().starts_with("Invalid input"));
        }
    }

    #[tokio::test]
    async fn test_market_cap_from_record_aliases() {
        let store = InMemoryRecordStore::new();
        let request = MarketCapRequest {
            context: RequestContext::new(Some("Beta"), None).with_records(records(vec![
                json!({"company": "Alpha", "price": 1, "shares": 1}),
                json!({"fields": {"Company": "Beta", "Price": 12.5, "Shares": 400}}),
            ])),
            ..Default::default()
        };
        let result = calculate_market_cap(&store, &request).await;

        assert_eq!(result.output("market_cap"), Some(5000.0));
        assert_eq!(result.confidence, Some(0.75));
    }

    #[tokio::test]
    async fn test_market_cap_missing_field_is_invalid_not_no_data() {
        let store = InMemoryRecordStore::with_table(
            Table::FinancialStatements,
            records(vec![json!({"share_price": 10, "shares_outstanding": "pending"})]),
        );
        let result = calculate_market_cap(&store, &MarketCapRequest::default()).await;

        assert!(!result.success);
        assert!(result.message.unwrap().contains("unavailable"));

        let empty = InMemoryRecordStore::new();
        let result = calculate_market_cap(&empty, &MarketCapRequest::default()).await;
        assert_eq!(
            result.message.as_deref(),
            Some("No financial statement records available.")
        );
    }

    #[tokio::test]
    async fn test_market_calculators_are_idempotent() {
        let store = InMemoryRecordStore::with_table(
            Table::FinancialStatements,
            records(vec![json!({"fields": {"Company": "Acme", "Share_Price": 12.5, "Shares_Outstanding": 400}})]),
        );
        store
            .insert(
                Table::IndustryMultiples,
                records(vec![json!({"fields": {"Industry": "Telecom", "EV_EBITDA": 6, "PE": 12}})]),
            )
            .await;

        let request = MarketCapRequest {
            context: RequestContext::new(Some("Acme"), None),
            ..Default::default()
        };
        let first = calculate_market_cap(&store, &request).await;
        assert!(first.success);
        assert_eq!(first, calculate_market_cap(&store, &request).await);

        let request = ComparableMultiplesRequest {
            revenue: Some(100.0),
            ebitda: Some(50.0),
            net_income: Some(10.0),
            ..Default::default()
        };
        let first = calculate_comparable_multiples(&store, &request).await;
        let second = calculate_comparable_multiples(&store, &request).await;
        assert!(first.success);
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[tokio::test]
    async fn test_comparable_multiples_explicit() {
        let store = InMemoryRecordStore::new();
        let request = ComparableMultiplesRequest {
            revenue: Some(1000.0),
            ebitda: Some(200.0),
            net_income: Some(100.0),
            ev_ebitda_multiple: Some(8.0),
            pe_multiple: Some(15.0),
            ev_sales_multiple: Some(2.0),
            ..Default::default()
        };
        let result = calculate_comparable_multiples(&store, &request).await;

        assert!(result.success);
        let output = result.result.clone().unwrap();
        assert_eq!(output["valuations"]["ev_ebitda"], json!(1600.0));
        assert_eq!(output["valuations"]["pe"], json!(1500.0));
        assert_eq!(output["valuations"]["ev_sales"], json!(2000.0));
        assert_eq!(result.output("average_valuation"), Some(1700.0));
        assert_eq!(result.confidence, Some(0.8));
    }

    #[tokio::test]
    async fn test_comparable_multiples_uses_industry_record() {
        let store = InMemoryRecordStore::with_table(
            Table::IndustryMultiples,
            records(vec![
                json!({"fields": {"Industry": "Telecom", "EV_EBITDA_Multiple": 6, "PE": 12}}),
                json!({"fields": {"Industry": "Retail", "EV_EBITDA": 99}}),
            ]),
        );
        let request = ComparableMultiplesRequest {
            revenue: Some(100.0),
            ebitda: Some(50.0),
            net_income: Some(10.0),
            ..Default::default()
        };
        let result = calculate_comparable_multiples(&store, &request).await;

        let inputs = result.inputs.clone().unwrap();
        assert_eq!(
            inputs["industry_multiples"],
            json!({"ev_ebitda": 6.0, "pe": 12.0, "ev_sales": 2.0})
        );
        // 300 + 120 + 200
        assert_eq!(result.output("average_valuation"), Some(620.0 / 3.0));
    }

    #[tokio::test]
    async fn test_comparable_multiples_fetch_failure_uses_defaults() {
        let store = InMemoryRecordStore::new();
        store
            .fail_table(
                Table::IndustryMultiples,
                FetchError::Unavailable("industry_multiples".to_string()),
            )
            .await;
        let request = ComparableMultiplesRequest {
            revenue: Some(100.0),
            ebitda: Some(10.0),
            net_income: Some(0.0),
            ..Default::default()
        };
        let result = calculate_comparable_multiples(&store, &request).await;

        assert!(result.success);
        // ev_ebitda 10*8 and ev_sales 100*2; P/E skipped for zero income
        assert_eq!(result.output("average_valuation"), Some(140.0));
        assert_eq!(result.confidence, Some(0.8));
        let notes = result.notes.unwrap();
        assert!(notes.contains("Industry multiples unavailable"));
        assert!(notes.contains("Only 2 multiple(s)"));
    }

    #[tokio::test]
    async fn test_comparable_multiples_explicit_table_and_zero_multiple() {
        let store = InMemoryRecordStore::new();
        let request = ComparableMultiplesRequest {
            revenue: Some(100.0),
            ebitda: Some(10.0),
            net_income: Some(5.0),
            industry_multiples: Some(BTreeMap::from([
                ("PE".to_string(), 20.0),
                ("ev_sales".to_string(), 0.0),
            ])),
            ..Default::default()
        };
        let result = calculate_comparable_multiples(&store, &request).await;

        let output = result.result.clone().unwrap();
        assert_eq!(output["valuations"], json!({"pe": 100.0}));
        assert_eq!(result.confidence, Some(0.6));
    }

    #[tokio::test]
    async fn test_comparable_multiples_insufficient_data() {
        let store = InMemoryRecordStore::new();
        let request = ComparableMultiplesRequest {
            revenue: Some(0.0),
            ebitda: Some(-5.0),
            net_income: Some(0.0),
            ..Default::default()
        };
        let result = calculate_comparable_multiples(&store, &request).await;

        assert!(!result.success);
        assert_eq!(
            result.message.as_deref(),
            Some("Insufficient data for multiple calculations.")
        );
    }

    #[tokio::test]
    async fn test_comparable_multiples_from_statement_aliases() {
        let store = InMemoryRecordStore::with_table(
            Table::FinancialStatements,
            records(vec![json!({"total_revenue": 500, "operating_income": 100, "net_profit": 40})]),
        );
        let result =
            calculate_comparable_multiples(&store, &ComparableMultiplesRequest::default()).await;

        let inputs = result.inputs.clone().unwrap();
        assert_eq!(inputs["revenue"], json!(500.0));
        assert_eq!(inputs["ebitda"], json!(100.0));
        assert_eq!(inputs["net_income"], json!(40.0));
        // 800 + 600 + 1000
        assert_eq!(result.output("average_valuation"), Some(800.0));
    }
}
