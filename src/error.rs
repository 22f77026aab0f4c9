//! Error types for the valuation toolkit

use thiserror::Error;

/// Result type alias for toolkit operations
pub type Result<T> = std::result::Result<T, ValuationError>;

#[derive(Error, Debug)]
pub enum ValuationError {

    // =============================
    // Calculator Outcomes
    // =============================

    #[error("No financial statement records available.")]
    NoDataAvailable,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Insufficient data for multiple calculations.")]
    InsufficientComputableOutputs,

    #[error("No free cash flow data available.")]
    NoCashFlowData,

    #[error("Record store error: {0}")]
    Fetch(#[from] FetchError),

    // =============================
    // Tool / Service Errors
    // =============================

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Failure of an external record-collection fetch.
///
/// Kept separate from [`ValuationError`] so calculators can decide per call
/// whether a failed fetch fails the calculation or degrades to defaults.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("request to {table} failed: {message}")]
    Request { table: String, message: String },

    #[error("record store returned {status} for {table}: {body}")]
    Status {
        table: String,
        status: u16,
        body: String,
    },

    #[error("invalid record payload from {table}: {message}")]
    Decode { table: String, message: String },

    #[error("{table} has more than {pages} pages; refusing a partial listing")]
    PageLimit { table: String, pages: usize },

    #[error("table {0} is unavailable")]
    Unavailable(String),
}
