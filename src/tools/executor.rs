//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(tool_name, args) 在超时内调用 registry.execute；
//! 工具声明了更长的自身时长（如 search_web 的内部重试）时以其为准，
//! 超时或失败时转为 AgentError（ToolTimeout / ToolExecutionFailed）；每次调用输出结构化审计日志（JSON）。
//! run(call) 供图中的 Tool Runner 使用：错误一律转为描述性结果文本，不向图内抛出。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::memory::ToolCall;
use crate::tools::{Tool, ToolRegistry};

/// 工具执行器：对每次调用施加超时，并将结果映射为 AgentError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self::with_timeout(registry, Duration::from_secs(timeout_secs))
    }

    pub fn with_timeout(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    /// 执行指定工具；超时返回 ToolTimeout，工具返回 Err 则转为 ToolExecutionFailed；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: serde_json::Value) -> Result<String, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(
            self.timeout_for(tool_name),
            self.registry.execute(tool_name, args),
        )
        .await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    /// 执行一次工具调用，结果或错误都以文本返回
    pub async fn run(&self, call: &ToolCall) -> String {
        match self.execute(&call.tool, call.args.clone()).await {
            Ok(content) => content,
            Err(AgentError::ToolTimeout(tool)) => {
                let secs = self.timeout_for(&tool).as_secs_f64();
                format!("Error: tool '{}' timed out after {}s", tool, secs)
            }
            Err(e) => format!("Error: {}", e),
        }
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.registry.get(name)
    }

    /// 某个工具的实际超时：全局超时与工具自身时长取大者
    pub fn timeout_for(&self, name: &str) -> Duration {
        self.get_tool(name)
            .and_then(|tool| tool.timeout())
            .map_or(self.timeout, |own| own.max(self.timeout))
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn tool_descriptions(&self) -> Vec<(String, String)> {
        self.registry.tool_descriptions()
    }

    pub fn sensitive_tools(&self) -> HashSet<String> {
        self.registry.sensitive_tools()
    }

    pub fn schema_json(&self) -> String {
        self.registry.to_schema_json()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::SearchWebTool;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("late".into())
        }
    }

    fn executor() -> ToolExecutor {
        let mut reg = ToolRegistry::new();
        reg.register(SlowTool);
        reg.register(crate::tools::CalculateTool);
        ToolExecutor::with_timeout(reg, Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_timeout_maps_to_error() {
        let err = executor().execute("slow", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolTimeout(t) if t == "slow"));
    }

    #[tokio::test]
    async fn test_run_converts_errors_to_text() {
        let ex = executor();
        let out = ex
            .run(&ToolCall::new("calculate", json!({"expression": "1/0"})))
            .await;
        assert!(out.starts_with("Error:"), "{out}");
        assert!(out.contains("division by zero"));

        let out = ex.run(&ToolCall::new("missing", json!({}))).await;
        assert!(out.contains("Unknown tool: missing"));

        let out = ex
            .run(&ToolCall::new("calculate", json!({"expression": "2**10"})))
            .await;
        assert_eq!(out, "1024");
    }

    #[tokio::test]
    async fn test_search_retries_outlast_tight_global_timeout() {
        let mut reg = ToolRegistry::new();
        reg.register(
            SearchWebTool::new(Some("k".into()), 5, 1, 3)
                .with_endpoint("http://127.0.0.1:9/search")
                .with_retry_delay(Duration::from_millis(40)),
        );
        let ex = ToolExecutor::with_timeout(reg, Duration::from_millis(50));
        assert_eq!(
            ex.timeout_for("search_web"),
            Duration::from_secs(3) + Duration::from_millis(80) + Duration::from_secs(1)
        );
        assert_eq!(ex.timeout_for("calculate"), Duration::from_millis(50));

        let out = ex
            .run(&ToolCall::new("search_web", json!({"query": "rust"})))
            .await;
        assert!(out.contains("Error after 3 retries"), "{out}");
        assert!(!out.contains("timed out"), "{out}");
    }
}
