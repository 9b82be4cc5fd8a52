//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock / Scripted）实现 LlmClient::complete；
//! 错误统一为 LlmError，携带可读消息，供重试层判断是否为瞬时错误。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;

/// 模型调用错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// 后端返回的错误（消息原文保留，用于分类）
    #[error("{0}")]
    Api(String),

    /// 明确的限流错误
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// 瞬时错误重试耗尽
    #[error("max retries reached after {attempts} attempts, last error: {last}")]
    RetriesExhausted { attempts: u32, last: Box<LlmError> },
}

/// 瞬时错误特征（小写子串匹配）
const TRANSIENT_SIGNATURES: &[&str] = &[
    "429",
    "rate limit",
    "too many requests",
    "quota",
    "resource exhausted",
    "resourceexhausted",
    "503",
    "unavailable",
    "contents are required",
];

impl LlmError {
    /// 是否为可重试的瞬时错误（限流、配额、服务不可用、空请求内容）
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::RateLimited(_) => true,
            LlmError::RetriesExhausted { .. } => false,
            LlmError::Api(msg) => {
                let msg = msg.to_lowercase();
                TRANSIENT_SIGNATURES.iter().any(|sig| msg.contains(sig))
            }
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回首个候选的文本
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        for msg in [
            "HTTP 429 Too Many Requests",
            "ResourceExhausted: quota exceeded",
            "503 Service Unavailable",
            "contents are required",
            "Rate limit reached for model",
        ] {
            assert!(LlmError::Api(msg.to_string()).is_transient(), "{msg}");
        }
        assert!(!LlmError::Api("invalid api key".into()).is_transient());
        assert!(!LlmError::Api("400 bad request".into()).is_transient());
        assert!(LlmError::RateLimited("slow down".into()).is_transient());
    }

    #[test]
    fn test_exhausted_is_terminal() {
        let err = LlmError::RetriesExhausted {
            attempts: 3,
            last: Box::new(LlmError::Api("429".into())),
        };
        assert!(!err.is_transient());
        assert!(err.to_string().contains("429"));
    }
}
