//! calculate 工具：受限算术求值（见 calculator crate），不执行任何代码

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::Tool;

pub struct CalculateTool;

#[async_trait]
impl Tool for CalculateTool {
    fn name(&self) -> &str {
        "calculate"
    }

    fn description(&self) -> &str {
        "Perform mathematical calculations (+ - * / % **, parentheses). Args: {\"expression\": \"2 * (3 + 4)\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": { "type": "string", "description": "Arithmetic expression" }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let expression = args
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "Missing expression".to_string())?;
        calculator::evaluate_to_string(expression).map_err(|e| e.to_string())
    }
}
