//! Company Valuation
//!
//! Six deterministic valuation calculators over financial statement records:
//! - Asset-based: book value, liquidation value
//! - Market-based: market capitalization, comparable multiples
//! - Earning-based: discounted cash flow, earnings multiple
//!
//! Calculators read explicit inputs first and fall back to a single record
//! from a [`store::RecordStore`]. They never fail outright: every call ends in a
//! [`models::CalculationResult`] envelope.
//!
//! FLOW:
//! REQUEST → RESOLVE RECORD → EXTRACT FIELDS → CALCULATE → RESULT ENVELOPE

pub mod api;
pub mod config;
pub mod error;
pub mod execution;
pub mod models;
pub mod records;
pub mod store;
pub mod tools;
pub mod valuation;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use records::{extract_fields, get_number, select_record, Fields, FinancialRecord};
pub use store::{InMemoryRecordStore, RecordStore, Table};
pub use valuation::RequestContext;
