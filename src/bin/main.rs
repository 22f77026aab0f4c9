use company_valuation::{
    execution::ApproachRunner,
    models::{CalculationResult, ValuationApproach},
    records::FinancialRecord,
    store::{InMemoryRecordStore, RecordStore, Table},
    tools::create_default_registry,
    valuation::{
        calculate_book_value, calculate_comparable_multiples, calculate_dcf,
        calculate_earnings_multiple, calculate_market_cap, estimate_liquidation_value,
        BookValueRequest, ComparableMultiplesRequest, DcfRequest, EarningsMultipleRequest,
        LiquidationValueRequest, MarketCapRequest, RequestContext,
    },
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

async fn sample_store() -> InMemoryRecordStore {
    let statements = vec![
        json!({
            "id": "recAcme2023",
            "fields": {
                "Company": "Acme Corp", "Period": "2023",
                "Total_Assets": 4_200_000, "Total_Liabilities": 1_900_000,
                "Cash": 600_000, "Accounts_Receivable": 800_000, "Inventory": 900_000,
                "PPE": 1_500_000, "Intangible_Assets": 400_000,
                "Revenue": 5_000_000, "EBITDA": 900_000, "Net_Income": 450_000,
                "Operating_Cash_Flow": 700_000, "CapEx": 250_000,
                "Share_Price": 42.5, "Shares_Outstanding": 100_000
            }
        }),
        json!({
            "id": "recAcme2024",
            "fields": {
                "Company": "Acme Corp", "Period": "2024",
                "Total_Assets": 4_600_000, "Total_Liabilities": 2_000_000,
                "Cash": 700_000, "Accounts_Receivable": 850_000, "Inventory": 950_000,
                "PPE": 1_600_000, "Intangible_Assets": 500_000,
                "Revenue": 5_600_000, "EBITDA": 1_050_000, "Net_Income": 520_000,
                "Free_Cash_Flow": 480_000, "WACC": 0.095,
                "Share_Price": 47.0, "Shares_Outstanding": 100_000
            }
        }),
    ];
    let multiples = vec![json!({
        "id": "recManufacturing",
        "fields": {"Industry": "Manufacturing", "EV_EBITDA": 7.5, "PE": 14, "EV_Sales": 1.4}
    })];

    let store = InMemoryRecordStore::with_table(
        Table::FinancialStatements,
        statements.into_iter().map(FinancialRecord::from_value).collect(),
    );
    store
        .insert(
            Table::IndustryMultiples,
            multiples.into_iter().map(FinancialRecord::from_value).collect(),
        )
        .await;
    store
}

fn print_result(result: &CalculationResult) {
    match serde_json::to_string_pretty(result) {
        Ok(text) => println!("{}\n", text),
        Err(e) => eprintln!("Could not render {}: {}", result.tool, e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Company valuation demo starting");

    let store = Arc::new(sample_store().await);
    let context = RequestContext::new(Some("Acme Corp"), Some("2024"));
    let backend: &dyn RecordStore = store.as_ref();

    println!("\n=== INDIVIDUAL CALCULATORS (Acme Corp, 2024) ===\n");

    let results = vec![
        calculate_book_value(
            backend,
            &BookValueRequest {
                context: context.clone(),
                ..Default::default()
            },
        )
        .await,
        estimate_liquidation_value(
            backend,
            &LiquidationValueRequest {
                context: context.clone(),
                ..Default::default()
            },
        )
        .await,
        calculate_market_cap(
            backend,
            &MarketCapRequest {
                context: context.clone(),
                ..Default::default()
            },
        )
        .await,
        calculate_comparable_multiples(
            backend,
            &ComparableMultiplesRequest {
                context: context.clone(),
                ..Default::default()
            },
        )
        .await,
        calculate_dcf(
            backend,
            &DcfRequest {
                context: context.clone(),
                terminal_growth_rate: Some(0.025),
                ..Default::default()
            },
        )
        .await,
        calculate_earnings_multiple(
            backend,
            &EarningsMultipleRequest {
                context: context.clone(),
                ..Default::default()
            },
        )
        .await,
    ];

    for result in &results {
        print_result(result);
    }

    println!("=== VALUATION APPROACHES (Acme Corp, 2023) ===\n");

    let runner = ApproachRunner::new(Arc::new(create_default_registry(store.clone())));
    let parameters = json!({"company": "Acme Corp", "period": "2023"});

    for approach in ValuationApproach::ALL {
        println!("--- {} ---", approach);
        for observation in runner.run(approach, &parameters).await {
            println!(
                "{:<32} {:?} ({} ms)",
                observation.tool_name, observation.status, observation.execution_time_ms
            );
            println!("{}", serde_json::to_string_pretty(&observation.tool_output)?);
        }
        println!();
    }

    let failed = results.iter().filter(|r| !r.success).count();
    info!(
        calculators = results.len(),
        failed, "Company valuation demo finished"
    );

    Ok(())
}
