//! Tool trait and registry
//!
//! Every calculator and every record table is exposed as a tool so callers
//! (HTTP handlers, the approach runner, an agent) can drive them by name
//! with a JSON parameter object.

use crate::error::ValuationError;
use crate::models::{ToolInput, ToolOutput, ValuationTool};
use crate::records::FinancialRecord;
use crate::store::{RecordStore, Table};
use crate::valuation;
use crate::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Trait for a single tool (deterministic execution)
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered tool names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up `name` and run it, `ToolNotFound` when unregistered
    pub async fn execute(&self, name: &str, parameters: Value) -> Result<ToolOutput> {
        let tool = self
            .get(name)
            .ok_or_else(|| ValuationError::ToolNotFound(name.to_string()))?;

        tool.execute(&ToolInput {
            tool_name: name.to_string(),
            parameters,
        })
        .await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// One valuation calculator.
///
/// Malformed parameters are an `Err`; a calculation that could not be
/// completed is still `Ok` with `success: false` and the calculator's message.
pub struct CalculatorTool {
    tool: ValuationTool,
    store: Arc<dyn RecordStore>,
}

impl CalculatorTool {
    pub fn new(tool: ValuationTool, store: Arc<dyn RecordStore>) -> Self {
        Self { tool, store }
    }
}

#[async_trait::async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &'static str {
        self.tool.as_str()
    }

    fn description(&self) -> &'static str {
        self.tool.description()
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let result =
            valuation::calculate(self.store.as_ref(), self.tool, input.parameters.clone()).await?;

        Ok(ToolOutput {
            success: result.success,
            error: result.message.clone(),
            data: serde_json::to_value(&result)?,
        })
    }
}

/// Raw record listing for one store table
pub struct TableTool {
    table: Table,
    store: Arc<dyn RecordStore>,
}

impl TableTool {
    pub fn new(table: Table, store: Arc<dyn RecordStore>) -> Self {
        Self { table, store }
    }

    pub fn tool_name(table: Table) -> &'static str {
        match table {
            Table::Companies => "get_companies",
            Table::FinancialStatements => "get_financial_statements",
            Table::MarketData => "get_market_data",
            Table::Transactions => "get_transactions",
            Table::DiscountRates => "get_discount_rates",
            Table::IndustryMultiples => "get_industry_multiples",
        }
    }
}

#[async_trait::async_trait]
impl Tool for TableTool {
    fn name(&self) -> &'static str {
        Self::tool_name(self.table)
    }

    fn description(&self) -> &'static str {
        match self.table {
            Table::Companies => "List company records",
            Table::FinancialStatements => "List financial statement records",
            Table::MarketData => "List market data records",
            Table::Transactions => "List transaction records",
            Table::DiscountRates => "List discount rate records",
            Table::IndustryMultiples => "List industry multiple records",
        }
    }

    async fn execute(&self, _input: &ToolInput) -> Result<ToolOutput> {
        let records = self.store.fetch_table(self.table).await?;

        Ok(ToolOutput {
            success: true,
            data: Value::Array(records.iter().map(FinancialRecord::to_value).collect()),
            error: None,
        })
    }
}

/// Registry with every calculator and table tool bound to `store`
pub fn create_default_registry(store: Arc<dyn RecordStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    for tool in ValuationTool::ALL {
        registry.register(Arc::new(CalculatorTool::new(tool, store.clone())));
    }
    for table in Table::ALL {
        registry.register(Arc::new(TableTool::new(table, store.clone())));
    }

    registry
}
