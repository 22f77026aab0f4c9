//! Core data models for the valuation toolkit

use crate::error::ValuationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

//
// ================= Calculators =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValuationTool {
    #[serde(rename = "calculate_book_value")]
    BookValue,
    #[serde(rename = "estimate_liquidation_value")]
    LiquidationValue,
    #[serde(rename = "calculate_market_cap")]
    MarketCap,
    #[serde(rename = "calculate_comparable_multiples")]
    ComparableMultiples,
    #[serde(rename = "calculate_dcf")]
    Dcf,
    #[serde(rename = "calculate_earnings_multiple")]
    EarningsMultiple,
}

impl ValuationTool {
    pub const ALL: [ValuationTool; 6] = [
        ValuationTool::BookValue,
        ValuationTool::LiquidationValue,
        ValuationTool::MarketCap,
        ValuationTool::ComparableMultiples,
        ValuationTool::Dcf,
        ValuationTool::EarningsMultiple,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValuationTool::BookValue => "calculate_book_value",
            ValuationTool::LiquidationValue => "estimate_liquidation_value",
            ValuationTool::MarketCap => "calculate_market_cap",
            ValuationTool::ComparableMultiples => "calculate_comparable_multiples",
            ValuationTool::Dcf => "calculate_dcf",
            ValuationTool::EarningsMultiple => "calculate_earnings_multiple",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ValuationTool::BookValue => "Book value = total assets - total liabilities",
            ValuationTool::LiquidationValue => {
                "Liquidation value = discounted asset categories - total liabilities"
            }
            ValuationTool::MarketCap => "Market capitalization = share price x shares outstanding",
            ValuationTool::ComparableMultiples => {
                "Valuation from EV/EBITDA, P/E and EV/Sales industry multiples"
            }
            ValuationTool::Dcf => "Two-stage discounted cash flow with perpetuity terminal value",
            ValuationTool::EarningsMultiple => "Valuation from EBITDA and revenue multiples",
        }
    }
}

impl fmt::Display for ValuationTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValuationTool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ValuationTool::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| format!("unknown valuation tool '{}'", s))
    }
}

/// Calculator groupings used in valuation reports
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ValuationApproach {
    AssetBased,
    MarketBased,
    EarningBased,
}

impl ValuationApproach {
    pub const ALL: [ValuationApproach; 3] = [
        ValuationApproach::AssetBased,
        ValuationApproach::MarketBased,
        ValuationApproach::EarningBased,
    ];

    pub fn tools(&self) -> [ValuationTool; 2] {
        match self {
            ValuationApproach::AssetBased => {
                [ValuationTool::BookValue, ValuationTool::LiquidationValue]
            }
            ValuationApproach::MarketBased => {
                [ValuationTool::MarketCap, ValuationTool::ComparableMultiples]
            }
            ValuationApproach::EarningBased => {
                [ValuationTool::Dcf, ValuationTool::EarningsMultiple]
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValuationApproach::AssetBased => "asset_based",
            ValuationApproach::MarketBased => "market_based",
            ValuationApproach::EarningBased => "earning_based",
        }
    }
}

impl fmt::Display for ValuationApproach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValuationApproach::AssetBased => "Asset-Based",
            ValuationApproach::MarketBased => "Market-Based",
            ValuationApproach::EarningBased => "Earning-Based",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ValuationApproach {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "asset_based" | "asset" => Ok(ValuationApproach::AssetBased),
            "market_based" | "market" => Ok(ValuationApproach::MarketBased),
            "earning_based" | "earnings_based" | "earning" | "earnings" => {
                Ok(ValuationApproach::EarningBased)
            }
            _ => Err(format!("unknown valuation approach '{}'", s)),
        }
    }
}

//
// ================= Calculation Result =================
//

/// Uniform envelope returned by every calculator.
///
/// Successful results carry `inputs`, `result`, `confidence` and `notes`;
/// failures carry only `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationResult {
    pub tool: ValuationTool,
    pub company: Option<String>,
    pub period: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CalculationResult {
    pub fn success<I: Serialize, R: Serialize>(
        tool: ValuationTool,
        company: Option<String>,
        period: Option<String>,
        inputs: &I,
        result: &R,
        confidence: f64,
        notes: &[String],
    ) -> Self {
        Self {
            tool,
            company,
            period,
            success: true,
            inputs: Some(serde_json::to_value(inputs).unwrap_or(Value::Null)),
            result: Some(serde_json::to_value(result).unwrap_or(Value::Null)),
            confidence: Some(confidence),
            notes: Some(notes.join("; ")),
            message: None,
        }
    }

    pub fn failure(
        tool: ValuationTool,
        company: Option<String>,
        period: Option<String>,
        error: &ValuationError,
    ) -> Self {
        Self {
            tool,
            company,
            period,
            success: false,
            inputs: None,
            result: None,
            confidence: None,
            notes: None,
            message: Some(error.to_string()),
        }
    }

    /// Named numeric output, e.g. `output("book_value")`
    pub fn output(&self, key: &str) -> Option<f64> {
        self.result.as_ref()?.get(key)?.as_f64()
    }

    /// Numeric input actually used, e.g. `input("wacc")`
    pub fn input(&self, key: &str) -> Option<f64> {
        self.inputs.as_ref()?.get(key)?.as_f64()
    }
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
}

//
// ================= Execution =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    pub tool_name: String,
    pub tool_output: Value,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
    pub status: ExecutionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_names() {
        for tool in ValuationTool::ALL {
            assert_eq!(tool.as_str().parse::<ValuationTool>().unwrap(), tool);
            assert_eq!(
                serde_json::to_value(tool).unwrap(),
                json!(tool.as_str())
            );
        }
        assert!("calculate_ev".parse::<ValuationTool>().is_err());
    }

    #[test]
    fn test_approach_parsing() {
        assert_eq!(
            "Asset-Based".parse::<ValuationApproach>().unwrap(),
            ValuationApproach::AssetBased
        );
        assert_eq!(
            "earnings".parse::<ValuationApproach>().unwrap(),
            ValuationApproach::EarningBased
        );
        assert!("income".parse::<ValuationApproach>().is_err());
        assert_eq!(
            ValuationApproach::MarketBased.tools(),
            [ValuationTool::MarketCap, ValuationTool::ComparableMultiples]
        );
    }

    #[test]
    fn test_failure_envelope_serialization() {
        let result = CalculationResult::failure(
            ValuationTool::MarketCap,
            Some("Acme".to_string()),
            None,
            &ValuationError::NoDataAvailable,
        );
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["tool"], json!("calculate_market_cap"));
        assert_eq!(value["success"], json!(false));
        assert_eq!(value["period"], Value::Null);
        assert!(value.get("result").is_none());
        assert_eq!(
            value["message"],
            json!("No financial statement records available.")
        );
    }

    #[test]
    fn test_success_envelope_accessors() {
        let result = CalculationResult::success(
            ValuationTool::BookValue,
            None,
            None,
            &json!({"total_assets": 10.0}),
            &json!({"book_value": 4.0}),
            0.9,
            &["first".to_string(), "second".to_string()],
        );
        assert_eq!(result.output("book_value"), Some(4.0));
        assert_eq!(result.input("total_assets"), Some(10.0));
        assert_eq!(result.notes.as_deref(), Some("first; second"));
        assert!(result.message.is_none());
    }
}
