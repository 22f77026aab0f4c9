//! Service configuration
//!
//! Read from the environment (after `dotenv` has loaded `.env`).

use crate::error::ValuationError;
use crate::Result;
use std::env;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_AIRTABLE_URL: &str = "https://api.airtable.com";
const DEFAULT_CORS_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
    "http://localhost:8080",
];

#[derive(Debug, Clone, PartialEq)]
pub struct AirtableConfig {
    pub api_key: String,
    pub base_id: String,
    pub api_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub port: u16,
    /// `None` when credentials are missing; the service then runs on an empty in-memory store
    pub airtable: Option<AirtableConfig>,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("PORT").or_else(|| get("API_PORT")) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                ValuationError::Config(format!("invalid port '{}': {}", raw, e))
            })?,
            None => DEFAULT_PORT,
        };

        let airtable = match (get("AIRTABLE_API_KEY"), get("AIRTABLE_BASE_ID")) {
            (Some(api_key), Some(base_id)) => Some(AirtableConfig {
                api_key,
                base_id,
                api_url: get("AIRTABLE_API_URL")
                    .unwrap_or_else(|| DEFAULT_AIRTABLE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            }),
            _ => None,
        };

        let cors_origins = match get("CORS_ALLOWED_ORIGINS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        Ok(Self {
            port,
            airtable,
            cors_origins,
        })
    }
}
