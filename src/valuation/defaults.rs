//! Built-in valuation tables
//!
//! Immutable. Callers override entries per call; nothing here is mutated.

use lazy_static::lazy_static;
use std::collections::BTreeMap;

/// Recovery rate for asset categories missing from the discount table
pub const DEFAULT_CATEGORY_DISCOUNT: f64 = 0.50;

/// Recovery rate applied when only aggregate total assets are known
pub const BLANKET_TOTAL_ASSETS_DISCOUNT: f64 = 0.70;

/// Pseudo-category holding aggregate assets on the blanket-discount path
pub const TOTAL_ASSETS_CATEGORY: &str = "total_assets";

pub const DEFAULT_FORECAST_YEARS: usize = 5;
pub const DEFAULT_WACC: f64 = 0.10;
pub const DEFAULT_TERMINAL_GROWTH: f64 = 0.03;

/// Annual growth used to project a seed cash flow across the horizon
pub const FCF_PROJECTION_GROWTH: f64 = 0.05;

pub const DEFAULT_EV_EBITDA_MULTIPLE: f64 = 8.0;
pub const DEFAULT_PE_MULTIPLE: f64 = 15.0;
pub const DEFAULT_EV_SALES_MULTIPLE: f64 = 2.0;

pub const DEFAULT_EBITDA_MULTIPLE: f64 = 8.0;
pub const DEFAULT_REVENUE_MULTIPLE: f64 = 2.0;

/// Canonical asset category names looked up in a record when no breakdown is given
pub const CANONICAL_ASSET_CATEGORIES: &[&str] = &[
    "assets",
    "total_assets",
    "cash",
    "cash_and_equivalents",
    "marketable_securities",
    "accounts_receivable",
    "receivables",
    "inventory",
    "prepaid_expenses",
    "pp&e",
    "ppe",
    "property_plant_equipment",
    "intangibles",
    "goodwill",
    "other_assets",
];

lazy_static! {
    /// Forced-sale recovery rates by asset category
    pub static ref DEFAULT_LIQUIDATION_DISCOUNTS: BTreeMap<&'static str, f64> = {
        let mut m = BTreeMap::new();
        m.insert("cash", 1.00);
        m.insert("cash_and_equivalents", 1.00);
        m.insert("marketable_securities", 0.95);
        m.insert("accounts_receivable", 0.70);
        m.insert("receivables", 0.70);
        m.insert("inventory", 0.50);
        m.insert("prepaid_expenses", 0.10);
        m.insert("pp&e", 0.40);
        m.insert("ppe", 0.40);
        m.insert("property_plant_equipment", 0.40);
        m.insert("intangibles", 0.10);
        m.insert("goodwill", 0.00);
        m.insert("other_assets", 0.30);
        m
    };
}
