use company_valuation::{
    api::start_server,
    config::AppConfig,
    store::{AirtableStore, InMemoryRecordStore, RecordStore},
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    info!("Company Valuation - API Server");
    info!("Port: {}", config.port);

    let store: Arc<dyn RecordStore> = match &config.airtable {
        Some(airtable) => {
            info!(base_id = %airtable.base_id, api_url = %airtable.api_url, "Using Airtable record store");
            Arc::new(AirtableStore::new(airtable)?)
        }
        None => {
            warn!("AIRTABLE_API_KEY / AIRTABLE_BASE_ID not set; serving an empty in-memory store");
            Arc::new(InMemoryRecordStore::new())
        }
    };

    info!(cors_origins = ?config.cors_origins, "Starting API server");

    start_server(&config, store).await?;

    Ok(())
}
