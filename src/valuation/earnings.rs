//! Earning-based valuation: discounted cash flow and earnings multiples

use super::defaults::{
    DEFAULT_EBITDA_MULTIPLE, DEFAULT_FORECAST_YEARS, DEFAULT_REVENUE_MULTIPLE,
    DEFAULT_TERMINAL_GROWTH, DEFAULT_WACC, FCF_PROJECTION_GROWTH,
};
use super::market::MultiplesOutput;
use super::{apply_multiples, average, resolve_multiples, MultipleSpec, RequestContext};
use crate::error::ValuationError;
use crate::models::{CalculationResult, ValuationTool};
use crate::records::{get_number, Fields};
use crate::store::RecordStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Longest explicit forecast horizon accepted
const MAX_FORECAST_YEARS: usize = 100;

//
// ================= Discounted Cash Flow =================
//

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DcfRequest {
    #[serde(flatten)]
    pub context: RequestContext,
    #[serde(default)]
    pub free_cash_flows: Option<Vec<f64>>,
    #[serde(default)]
    pub wacc: Option<f64>,
    #[serde(default)]
    pub terminal_growth_rate: Option<f64>,
    /// Horizon in years, 5 when absent
    #[serde(default)]
    pub forecast_years: Option<usize>,
}

#[derive(Debug, Serialize)]
struct DcfInputs {
    free_cash_flows: Vec<f64>,
    wacc: f64,
    terminal_growth_rate: f64,
    forecast_years: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DcfBreakdown {
    pub dcf_value: f64,
    pub terminal_value: f64,
    pub pv_cash_flows: f64,
    pub pv_terminal_value: f64,
}

/// Project `seed` forward at the fixed annual growth, `years` values starting at the seed
fn project(seed: f64, years: usize) -> Vec<f64> {
    (0..years)
        .map(|i| seed * (1.0 + FCF_PROJECTION_GROWTH).powi(i as i32))
        .collect()
}

/// Cash flow series implied by a statement record: direct FCF, else OCF - CapEx, else zeros
fn seed_cash_flows(fields: &Fields, years: usize) -> (Vec<f64>, bool) {
    let mut fcf = get_number(fields, &["free_cash_flow", "fcf"], 0.0);
    if fcf == 0.0 {
        let ocf = get_number(fields, &["operating_cash_flow", "ocf"], 0.0);
        let capex = get_number(fields, &["capital_expenditures", "capex"], 0.0);
        fcf = ocf - capex;
    }

    if fcf != 0.0 {
        (project(fcf, years), true)
    } else {
        (vec![0.0; years], false)
    }
}

/// Grow the last known cash flow until the horizon is covered
fn extend_to_horizon(mut flows: Vec<f64>, years: usize) -> Vec<f64> {
    while flows.len() < years {
        let Some(last) = flows.last().copied() else {
            break;
        };
        flows.push(last * (1.0 + FCF_PROJECTION_GROWTH));
    }
    flows.truncate(years);
    flows
}

/// DCF = Σ FCF_t / (1+WACC)^t + TV / (1+WACC)^n, TV = FCF_n × (1+g) / (WACC - g)
///
/// `flows` must be non-empty. When WACC equals g the perpetuity is undefined
/// and the terminal value is reported as zero.
pub fn discount_cash_flows(flows: &[f64], wacc: f64, terminal_growth_rate: f64) -> DcfBreakdown {
    let n = flows.len();
    let growth = 1.0 + wacc;

    let pv_cash_flows: f64 = flows
        .iter()
        .enumerate()
        .map(|(i, fcf)| fcf / growth.powi(i as i32 + 1))
        .sum();

    let spread = wacc - terminal_growth_rate;
    let final_fcf = flows.last().copied().unwrap_or(0.0);
    let terminal_value = if spread == 0.0 {
        0.0
    } else {
        final_fcf * (1.0 + terminal_growth_rate) / spread
    };
    let pv_terminal_value = terminal_value / growth.powi(n as i32);

    DcfBreakdown {
        dcf_value: pv_cash_flows + pv_terminal_value,
        terminal_value,
        pv_cash_flows,
        pv_terminal_value,
    }
}

pub async fn calculate_dcf(store: &dyn RecordStore, request: &DcfRequest) -> CalculationResult {
    let tool = ValuationTool::Dcf;
    debug!(%tool, company = ?request.context.company, period = ?request.context.period, "Running calculator");

    dcf(store, request)
        .await
        .unwrap_or_else(|e| request.context.failure(tool, &e))
}

async fn dcf(store: &dyn RecordStore, request: &DcfRequest) -> Result<CalculationResult> {
    let ctx = &request.context;
    let forecast_years = request.forecast_years.unwrap_or(DEFAULT_FORECAST_YEARS);
    if !(1..=MAX_FORECAST_YEARS).contains(&forecast_years) {
        return Err(ValuationError::InvalidInput(format!(
            "forecast_years must be between 1 and {}, got {}",
            MAX_FORECAST_YEARS, forecast_years
        )));
    }

    let mut notes = Vec::new();

    let (flows, wacc) = match (&request.free_cash_flows, request.wacc) {
        (Some(flows), Some(wacc)) => (flows.clone(), wacc),
        (Some(flows), None) => {
            // Cash flows are explicit; a record only refines the discount rate
            let wacc = match ctx.resolve(store).await {
                Ok(fields) => get_number(&fields, &["wacc", "discount_rate"], DEFAULT_WACC),
                Err(e) => {
                    warn!(error = %e, "No statement record for WACC; using default");
                    notes.push(format!(
                        "WACC defaulted to {:.0}% ({}).",
                        DEFAULT_WACC * 100.0,
                        e
                    ));
                    DEFAULT_WACC
                }
            };
            (flows.clone(), wacc)
        }
        (None, wacc) => {
            let fields = ctx.resolve(store).await?;
            let (flows, found) = seed_cash_flows(&fields, forecast_years);
            if !found {
                notes.push("No free cash flow found in record; projected zero cash flows.".to_string());
            }
            (
                flows,
                wacc.unwrap_or_else(|| get_number(&fields, &["wacc", "discount_rate"], DEFAULT_WACC)),
            )
        }
    };

    let terminal_growth_rate = request
        .terminal_growth_rate
        .unwrap_or(DEFAULT_TERMINAL_GROWTH);

    if flows.is_empty() {
        return Err(ValuationError::NoCashFlowData);
    }
    if !wacc.is_finite() || 1.0 + wacc <= 0.0 || !terminal_growth_rate.is_finite() {
        return Err(ValuationError::InvalidInput(format!(
            "discount rate {} / terminal growth {} cannot discount cash flows",
            wacc, terminal_growth_rate
        )));
    }

    let flows = extend_to_horizon(flows, forecast_years);
    let breakdown = discount_cash_flows(&flows, wacc, terminal_growth_rate);

    if !breakdown.dcf_value.is_finite() {
        return Err(ValuationError::InvalidInput(
            "cash flows and rates produce a non-finite valuation".to_string(),
        ));
    }

    if wacc <= terminal_growth_rate {
        notes.push("WACC should be greater than terminal growth rate for valid DCF.".to_string());
    }
    if wacc == terminal_growth_rate {
        notes.push(
            "Terminal value is undefined when WACC equals terminal growth; excluded.".to_string(),
        );
    }
    notes.push("DCF is sensitive to growth and discount rate assumptions.".to_string());

    let confidence = if wacc > terminal_growth_rate { 0.8 } else { 0.4 };

    Ok(ctx.success(
        ValuationTool::Dcf,
        &DcfInputs {
            free_cash_flows: flows,
            wacc,
            terminal_growth_rate,
            forecast_years,
        },
        &breakdown,
        confidence,
        &notes,
    ))
}

//
// ================= Earnings Multiple =================
//

const EARNINGS_MULTIPLES: [MultipleSpec; 2] = [
    MultipleSpec {
        name: "ebitda",
        aliases: &["ebitda_multiple", "ev_ebitda"],
        default: DEFAULT_EBITDA_MULTIPLE,
    },
    MultipleSpec {
        name: "revenue",
        aliases: &["revenue_multiple", "ev_sales"],
        default: DEFAULT_REVENUE_MULTIPLE,
    },
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EarningsMultipleRequest {
    #[serde(flatten)]
    pub context: RequestContext,
    #[serde(default)]
    pub ebitda: Option<f64>,
    #[serde(default)]
    pub revenue: Option<f64>,
    #[serde(default)]
    pub ebitda_multiple: Option<f64>,
    #[serde(default)]
    pub revenue_multiple: Option<f64>,
    /// Full multiples table (`ebitda`, `revenue`); skips the industry lookup
    #[serde(default)]
    pub industry_multiples: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Serialize)]
struct EarningsInputs {
    ebitda: f64,
    revenue: f64,
    industry_multiples: BTreeMap<String, f64>,
}

/// EBITDA and revenue multiple valuations plus their mean
pub async fn calculate_earnings_multiple(
    store: &dyn RecordStore,
    request: &EarningsMultipleRequest,
) -> CalculationResult {
    let tool = ValuationTool::EarningsMultiple;
    debug!(%tool, company = ?request.context.company, period = ?request.context.period, "Running calculator");

    earnings_multiple(store, request)
        .await
        .unwrap_or_else(|e| request.context.failure(tool, &e))
}

async fn earnings_multiple(
    store: &dyn RecordStore,
    request: &EarningsMultipleRequest,
) -> Result<CalculationResult> {
    let ctx = &request.context;

    let (ebitda, revenue) = match (request.ebitda, request.revenue) {
        (Some(ebitda), Some(revenue)) => (ebitda, revenue),
        (ebitda, revenue) => {
            let fields = ctx.resolve(store).await?;
            (
                ebitda.unwrap_or_else(|| get_number(&fields, &["ebitda", "operating_income"], 0.0)),
                revenue.unwrap_or_else(|| get_number(&fields, &["revenue", "total_revenue"], 0.0)),
            )
        }
    };

    let mut notes = Vec::new();
    let multiples = resolve_multiples(
        store,
        request.industry_multiples.as_ref(),
        &EARNINGS_MULTIPLES,
        &[request.ebitda_multiple, request.revenue_multiple],
        &mut notes,
    )
    .await;

    let valuations = apply_multiples(&[("ebitda", ebitda), ("revenue", revenue)], &multiples);
    if valuations.is_empty() {
        return Err(ValuationError::InsufficientComputableOutputs);
    }

    let average_valuation = average(&valuations);

    if valuations.len() < EARNINGS_MULTIPLES.len() {
        notes.push(format!(
            "Only {} multiple(s) calculated due to missing data.",
            valuations.len()
        ));
    }
    notes.push(
        "Multiples should be adjusted for company-specific factors and growth prospects."
            .to_string(),
    );

    let confidence = if valuations.len() >= 2 { 0.8 } else { 0.6 };

    Ok(ctx.success(
        ValuationTool::EarningsMultiple,
        &EarningsInputs {
            ebitda,
            revenue,
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
