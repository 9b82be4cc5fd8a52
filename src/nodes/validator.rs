//! Validator：审阅最近一次回答，不合格时追加反馈消息打回

use std::sync::Arc;

use async_trait::async_trait;

use super::parse::parse_json;
use super::prompts::reviewer_prompt;
use crate::core::{AgentError, AgentState, StateUpdate};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::ReviewOutput;
use crate::workflow::{Node, NodeId};

/// 默认审阅轮数上限
pub const DEFAULT_MAX_REVIEWS: u32 = 3;

/// 审阅结论
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail(String),
}

/// 解析审阅结果：优先 JSON；非 JSON 时以 `FAIL` 开头视为不通过，其余放行
pub fn parse_verdict(reply: &str) -> Verdict {
    if let Ok(review) = parse_json::<ReviewOutput>(reply) {
        return match review.status.trim().to_lowercase().as_str() {
            "fail" => Verdict::Fail(non_empty_feedback(&review.feedback)),
            "pass" => Verdict::Pass,
            other => {
                tracing::warn!(status = %other, "unknown review status, passing");
                Verdict::Pass
            }
        };
    }

    let trimmed = reply.trim();
    let starts_with = |word: &str| {
        trimmed
            .get(..word.len())
            .is_some_and(|p| p.eq_ignore_ascii_case(word))
    };
    if starts_with("fail") {
        let rest = trimmed[4..].trim_start_matches(|c: char| c == ':' || c == '-' || c.is_whitespace());
        return Verdict::Fail(non_empty_feedback(rest));
    }
    if !starts_with("pass") {
        tracing::warn!(reply = %trimmed, "review reply not understood, passing");
    }
    Verdict::Pass
}

fn non_empty_feedback(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        "The answer did not pass review.".to_string()
    } else {
        text.to_string()
    }
}

pub struct ValidatorNode {
    llm: Arc<dyn LlmClient>,
    max_reviews: u32,
}

impl ValidatorNode {
    pub fn new(llm: Arc<dyn LlmClient>, max_reviews: u32) -> Self {
        Self {
            llm,
            max_reviews: max_reviews.max(1),
        }
    }
}

#[async_trait]
impl Node for ValidatorNode {
    fn id(&self) -> NodeId {
        NodeId::Validator
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate, AgentError> {
        let answer = state
            .last_assistant_message()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let messages = vec![
            Message::system(reviewer_prompt()),
            Message::user(format!("Answer: {}", answer)),
        ];
        let reply = self.llm.complete(&messages).await?;

        let count = state.review_count + 1;
        let update = StateUpdate::new().review_count(count);
        match parse_verdict(&reply) {
            Verdict::Pass => {
                tracing::info!(review = count, "review passed");
                Ok(update)
            }
            Verdict::Fail(feedback) if count >= self.max_reviews => {
                tracing::warn!(review = count, feedback = %feedback, "review limit reached");
                Ok(update.message(Message::system(format!(
                    "Review limit reached after {} reviews; keeping the last answer. Last feedback: {}",
                    count, feedback
                ))))
            }
            Verdict::Fail(feedback) => {
                tracing::info!(review = count, feedback = %feedback, "review failed");
                Ok(update.message(Message::feedback(&feedback)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_verdict_json() {
        assert_eq!(parse_verdict(r#"{"status": "pass"}"#), Verdict::Pass);
        assert_eq!(
            parse_verdict(r#"{"status": "FAIL", "feedback": "too vague"}"#),
            Verdict::Fail("too vague".into())
        );
    }

    #[test]
    fn test_parse_verdict_lenient() {
        assert_eq!(
            parse_verdict("FAIL: missing sources"),
            Verdict::Fail("missing sources".into())
        );
        assert_eq!(parse_verdict("Pass. Looks good."), Verdict::Pass);
        assert_eq!(parse_verdict("looks fine to me"), Verdict::Pass);
    }
}
