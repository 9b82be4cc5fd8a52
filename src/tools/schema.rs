//! 结构化输出 JSON Schema 生成（schemars）
//!
//! 将「合法 tool call」与各节点期望的 JSON 结构注入 prompt，减少 LLM 输出格式错误。

use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use std::collections::HashMap;

/// 工具调用请求格式：与解析的 `{"tool": "...", "args": {...}}` 一致（仅用于 Schema 生成）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolCallFormat {
    /// 工具名，如 search_web、save_to_notes、calculate
    pub tool: String,
    /// 工具参数，依工具不同而不同（query、content、topic、expression 等）
    pub args: HashMap<String, String>,
}

/// Router 输出
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RoutingOutput {
    /// quick / research / explain
    pub mode: String,
}

/// Planner 输出
#[derive(Debug, Deserialize, JsonSchema)]
pub struct PlanningOutput {
    /// 3-5 个可执行的研究步骤
    pub steps: Vec<String>,
}

/// Validator 输出
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReviewOutput {
    /// pass / fail
    pub status: String,
    #[serde(default)]
    pub feedback: String,
}

fn schema_json<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

/// 返回工具调用的 JSON Schema 字符串，可拼入 system prompt
pub fn tool_call_schema_json() -> String {
    schema_json::<ToolCallFormat>()
}

pub fn routing_schema_json() -> String {
    schema_json::<RoutingOutput>()
}

pub fn planning_schema_json() -> String {
    schema_json::<PlanningOutput>()
}

pub fn review_schema_json() -> String {
    schema_json::<ReviewOutput>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schemas_name_required_fields() {
        assert!(tool_call_schema_json().contains("\"tool\""));
        assert!(routing_schema_json().contains("\"mode\""));
        assert!(planning_schema_json().contains("\"steps\""));
        let review = review_schema_json();
        assert!(review.contains("\"status\""));
        assert!(review.contains("\"feedback\""));
    }
}
