//! Approach runner
//!
//! Runs the calculator pair behind a valuation approach through the tool
//! registry. Calculators are independent: one failing never stops the other.

use crate::models::{ExecutionStatus, Observation, ToolInput, ValuationApproach};
use crate::tools::ToolRegistry;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct ApproachRunner {
    tool_registry: Arc<ToolRegistry>,
}

impl ApproachRunner {
    pub fn new(tool_registry: Arc<ToolRegistry>) -> Self {
        Self { tool_registry }
    }

    /// Execute every tool of `approach` in order with the same parameters
    pub async fn run(&self, approach: ValuationApproach, parameters: &Value) -> Vec<Observation> {
        let tools = approach.tools();
        let mut observations = Vec::with_capacity(tools.len());

        debug!(%approach, "Starting approach");

        for tool in tools {
            let tool_name = tool.as_str().to_string();
            let start = Instant::now();

            let (status, tool_output) = match self.tool_registry.get(&tool_name) {
                Some(registered) => {
                    let input = ToolInput {
                        tool_name: tool_name.clone(),
                        parameters: parameters.clone(),
                    };
                    match registered.execute(&input).await {
                        Ok(output) if output.success => (ExecutionStatus::Success, output.data),
                        Ok(output) => {
                            warn!(
                                tool_name = %tool_name,
                                error = ?output.error,
                                "Calculator returned no valuation"
                            );
                            (ExecutionStatus::Failed, output.data)
                        }
                        Err(e) => {
                            warn!(tool_name = %tool_name, error = %e, "Tool execution failed");
                            (ExecutionStatus::Failed, json!({ "error": e.to_string() }))
                        }
                    }
                }
                None => {
                    warn!(tool_name = %tool_name, "Tool not registered");
                    (
                        ExecutionStatus::Skipped,
                        json!({ "error": "Tool not registered" }),
                    )
                }
            };

            observations.push(Observation {
                tool_name,
                tool_output,
                execution_time_ms: start.elapsed().as_millis() as u64,
                created_at: Utc::now(),
                status,
            });
        }

        debug!(
            %approach,
            observation_count = observations.len(),
            "Approach completed"
        );

        observations
    }
}
