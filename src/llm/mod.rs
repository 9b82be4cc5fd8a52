//! LLM 层：客户端抽象、重试装饰器与实现（OpenAI 兼容 / DeepSeek / Mock）

pub mod mock;
pub mod openai;
pub mod provider;
pub mod retry;
pub mod traits;

pub use mock::{MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use provider::{
    create_deepseek_client, create_llm_from_config, retry_config_from, DEEPSEEK_BASE_URL,
    DEEPSEEK_CHAT, DEEPSEEK_REASONER,
};
pub use retry::{
    retry_with_backoff, RecordingSleeper, RetryConfig, RetryingLlmClient, Sleeper, TokioSleeper,
};
pub use traits::{LlmClient, LlmError};
