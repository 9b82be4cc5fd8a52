//! search_web 工具：调用 Tavily 搜索 API
//!
//! POST https://api.tavily.com/search，拼接各条结果的 content 字段；
//! 请求带超时，失败时按固定间隔重试（默认 3 次、1 秒），最终失败返回错误文本。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::Tool;

pub const TAVILY_SEARCH_URL: &str = "https://api.tavily.com/search";

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    #[serde(default)]
    content: String,
}

/// Web 搜索工具
pub struct SearchWebTool {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    max_results: usize,
    request_timeout: Duration,
    retries: u32,
    retry_delay: Duration,
}

impl SearchWebTool {
    /// api_key 为空时读取环境变量 TAVILY_API_KEY
    pub fn new(api_key: Option<String>, max_results: usize, timeout_secs: u64, retries: u32) -> Self {
        let request_timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: TAVILY_SEARCH_URL.to_string(),
            api_key: api_key.or_else(|| std::env::var("TAVILY_API_KEY").ok()),
            max_results,
            request_timeout,
            retries: retries.max(1),
            retry_delay: Duration::from_secs(1),
        }
    }

    /// 替换端点（测试或自建代理）
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn search_once(&self, api_key: &str, query: &str) -> Result<String, String> {
        let body = serde_json::json!({
            "api_key": api_key,
            "query": query,
            "max_results": self.max_results,
        });
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let parsed: TavilyResponse = resp
            .json()
            .await
            .map_err(|e| format!("Invalid response: {}", e))?;
        Ok(join_results(&parsed))
    }
}

fn join_results(resp: &TavilyResponse) -> String {
    resp.results
        .iter()
        .map(|r| r.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl Tool for SearchWebTool {
    fn name(&self) -> &str {
        "search_web"
    }

    fn description(&self) -> &str {
        "Search the web for up-to-date information. Handles retries automatically. Args: {\"query\": \"...\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" }
            },
            "required": ["query"]
        })
    }

    /// 全部重试跑满所需的时长，外加 1 秒余量
    fn timeout(&self) -> Option<Duration> {
        let attempts = self.request_timeout * self.retries;
        let waits = self.retry_delay * (self.retries - 1);
        Some(attempts + waits + Duration::from_secs(1))
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = args
            .get("query")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        if query.is_empty() {
            return Err("Missing query".to_string());
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| "TAVILY_API_KEY is not set".to_string())?;
        tracing::info!(query = %query, "search_web");

        let mut last_err = String::new();
        for attempt in 1..=self.retries {
            match self.search_once(api_key, query).await {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!(attempt, retries = self.retries, "search_web failed: {}", e);
                    last_err = e;
                    if attempt < self.retries {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        Err(format!("Error after {} retries: {}", self.retries, last_err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_results_skips_empty() {
        let resp: TavilyResponse = serde_json::from_value(serde_json::json!({
            "results": [
                {"content": "first", "url": "a"},
                {"content": "  "},
                {"content": "second"}
            ]
        }))
        .unwrap();
        assert_eq!(join_results(&resp), "first\nsecond");
    }

    #[tokio::test]
    async fn test_missing_query_and_key() {
        let tool = SearchWebTool::new(Some("k".into()), 5, 1, 1);
        assert_eq!(
            tool.execute(serde_json::json!({})).await.unwrap_err(),
            "Missing query"
        );

        let mut no_key = SearchWebTool::new(None, 5, 1, 1);
        no_key.api_key = None;
        assert!(no_key
            .execute(serde_json::json!({"query": "rust"}))
            .await
            .unwrap_err()
            .contains("TAVILY_API_KEY"));
    }

    #[test]
    fn test_timeout_covers_every_attempt() {
        let tool = SearchWebTool::new(Some("k".into()), 5, 15, 3);
        assert_eq!(tool.timeout(), Some(Duration::from_secs(3 * 15 + 2 + 1)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_reports_retries() {
        let tool = SearchWebTool::new(Some("k".into()), 5, 1, 2)
            .with_endpoint("http://127.0.0.1:9/search")
            .with_retry_delay(Duration::from_millis(1));
        let err = tool
            .execute(serde_json::json!({"query": "rust"}))
            .await
            .unwrap_err();
        assert!(err.starts_with("Error after 2 retries"), "{err}");
    }
}
