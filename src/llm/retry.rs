//! 模型调用的有界重试与指数退避
//!
//! 瞬时错误（见 `LlmError::is_transient`）在第 n 次失败后等待 `unit * 2^n`（n 从 1 计：2、4、8 个单位）再试；
//! 非瞬时错误立即返回；最后一次尝试失败后不再等待，直接返回 RetriesExhausted。
//! RetryingLlmClient 以装饰器方式包住任意 LlmClient，所有节点调用点统一受此策略约束。

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError};
use crate::memory::Message;

/// 重试配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 退避时间单位
    pub unit: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            unit: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            unit,
        }
    }

    /// 第 attempt 次（1 起）失败后的等待时长
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// 可注入的休眠实现（测试中记录时长而不真正等待）
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// 基于 tokio::time::sleep 的默认实现
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// 记录每次休眠时长，立即返回
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        if let Ok(mut v) = self.slept.lock() {
            v.push(duration);
        }
    }
}

/// 以重试策略执行 op：成功立即返回；非瞬时错误立即返回；瞬时错误退避后重试直至耗尽
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    sleeper: &dyn Sleeper,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        if !err.is_transient() {
            return Err(err);
        }
        if attempt >= max_attempts {
            tracing::warn!(attempts = attempt, "LLM retries exhausted: {}", err);
            return Err(LlmError::RetriesExhausted {
                attempts: attempt,
                last: Box::new(err),
            });
        }
        let wait = config.backoff(attempt);
        tracing::warn!(
            attempt,
            max_attempts,
            wait_ms = wait.as_millis() as u64,
            "transient LLM error, backing off: {}",
            err
        );
        sleeper.sleep(wait).await;
    }
}

/// 为任意 LlmClient 加上有界重试
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self {
            inner,
            config,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// 替换休眠实现（测试用）
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        retry_with_backoff(&self.config, self.sleeper.as_ref(), || {
            self.inner.complete(messages)
        })
        .await
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;

    fn transient() -> LlmError {
        LlmError::Api("429 Too Many Requests".into())
    }

    #[test]
    fn test_backoff_doubles() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.backoff(1), Duration::from_secs(2));
        assert_eq!(cfg.backoff(2), Duration::from_secs(4));
        assert_eq!(cfg.backoff(3), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_two_transient_then_success() {
        let scripted = Arc::new(ScriptedLlmClient::new(vec![
            Err(transient()),
            Err(LlmError::Api("503 unavailable".into())),
            Ok("done".into()),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = RetryingLlmClient::new(scripted.clone(), RetryConfig::default())
            .with_sleeper(sleeper.clone());

        let out = client.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(out, "done");
        assert_eq!(scripted.calls(), 3);
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn test_non_transient_fails_immediately() {
        let scripted = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::Api("invalid api key".into())),
            Ok("never".into()),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = RetryingLlmClient::new(scripted.clone(), RetryConfig::default())
            .with_sleeper(sleeper.clone());

        let err = client.complete(&[Message::user("hi")]).await.unwrap_err();
        assert_eq!(err, LlmError::Api("invalid api key".into()));
        assert_eq!(scripted.calls(), 1);
        assert!(sleeper.recorded().is_empty());
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_error_without_final_sleep() {
        let scripted = Arc::new(ScriptedLlmClient::new(vec![
            Err(transient()),
            Err(transient()),
            Err(LlmError::Api("quota exceeded".into())),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let client = RetryingLlmClient::new(scripted.clone(), RetryConfig::default())
            .with_sleeper(sleeper.clone());

        let err = client.complete(&[Message::user("hi")]).await.unwrap_err();
        match err {
            LlmError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert_eq!(*last, LlmError::Api("quota exceeded".into()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sleeper.recorded().len(), 2);
    }
}
