//! Tool that saves the finished daily trading plan
//!
//! Every outcome, including bad input and a failed database write, comes
//! back as a structured payload so the calling model can report the status
//! instead of the pipeline dying.

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::adapters::tool_handler::FunctionTool;
use crate::domain::{Tool, ToolError};
use crate::persistence::PlanSink;

/// Market bias carried by a daily plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bias::Bullish => write!(f, "BULLISH"),
            Bias::Bearish => write!(f, "BEARISH"),
            Bias::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Input accepted by `save_daily_plan`
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SaveDailyPlanArgs {
    /// Market bias for the day
    pub bias: Bias,
    /// Key support/resistance price levels
    pub levels: Vec<f64>,
    /// Reasoning behind the bias and levels
    pub reasoning: String,
}

/// Persists the generated trading plan
pub struct SaveDailyPlanTool {
    sink: Arc<dyn PlanSink>,
}

impl SaveDailyPlanTool {
    /// Tool name as advertised to agents
    pub const NAME: &'static str = "save_daily_plan";

    /// Create the tool over a plan sink
    pub fn new(sink: Arc<dyn PlanSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl FunctionTool for SaveDailyPlanTool {
    fn definition(&self) -> Tool {
        let schema = serde_json::to_value(schema_for!(SaveDailyPlanArgs))
            .unwrap_or_else(|_| json!({"type": "object"}));
        Tool {
            name: Self::NAME.to_string(),
            description: "Saves the generated trading plan to the PostgreSQL database."
                .to_string(),
            input_schema: schema,
        }
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: SaveDailyPlanArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(e) => {
                return Ok(json!({
                    "status": "error",
                    "error_message": format!("Invalid plan payload: {}", e),
                }));
            }
        };

        match self
            .sink
            .save(&args.bias.to_string(), &args.levels, &args.reasoning)
            .await
        {
            Ok(id) => {
                info!(id, bias = %args.bias, "Daily plan saved");
                Ok(json!({
                    "status": "success",
                    "message": format!("Plan saved with ID: {}", id),
                    "id": id,
                }))
            }
            Err(e) => {
                warn!("Failed to save daily plan: {}", e);
                Ok(json!({
                    "status": "error",
                    "error_message": e.to_string(),
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedSink {
        result: Result<i64, String>,
    }

    #[async_trait]
    impl PlanSink for ScriptedSink {
        async fn save(&self, _bias: &str, _levels: &[f64], _reasoning: &str) -> anyhow::Result<i64> {
            match &self.result {
                Ok(id) => Ok(*id),
                Err(msg) => anyhow::bail!("{}", msg),
            }
        }
    }

    #[tokio::test]
    async fn successful_save_returns_identifier() {
        let tool = SaveDailyPlanTool::new(Arc::new(ScriptedSink { result: Ok(42) }));
        let result = tool
            .execute(json!({
                "bias": "BULLISH",
                "levels": [1.0850, 1.0900, 1.0955],
                "reasoning": "Higher highs above the daily pivot"
            }))
            .await
            .unwrap();
        assert_eq!(result["status"], "success");
        assert_eq!(result["id"], 42);
    }

    #[tokio::test]
    async fn failed_write_becomes_a_failure_payload() {
        let tool = SaveDailyPlanTool::new(Arc::new(ScriptedSink {
            result: Err("connection refused".to_string()),
        }));
        let result = tool
            .execute(json!({
                "bias": "NEUTRAL",
                "levels": [1.1],
                "reasoning": "Range-bound"
            }))
            .await
            .unwrap();
        assert_eq!(result["status"], "error");
        assert!(result["error_message"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn invalid_bias_is_rejected_without_a_write() {
        let tool = SaveDailyPlanTool::new(Arc::new(ScriptedSink { result: Ok(1) }));
        let result = tool
            .execute(json!({
                "bias": "SIDEWAYS",
                "levels": [1.1],
                "reasoning": "?"
            }))
            .await
            .unwrap();
        assert_eq!(result["status"], "error");
        assert!(!result["error_message"].as_str().unwrap().is_empty());
    }
}
