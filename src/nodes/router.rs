//! Router：判定本轮意图（quick / research / explain）

use std::sync::Arc;

use async_trait::async_trait;

use super::parse::parse_json;
use super::prompts::router_prompt;
use crate::core::{AgentError, AgentState, Mode, StateUpdate};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::RoutingOutput;
use crate::workflow::{Node, NodeId};

/// 快速通道：小写后按非字母数字切词，含 `explain` 且不含 `me`
pub fn wants_explanation(text: &str) -> bool {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    tokens.contains(&"explain") && !tokens.contains(&"me")
}

/// 从模型回复中读出模式标签：优先 `{"mode": ...}`，其次整段文本
fn classify(reply: &str) -> Option<Mode> {
    parse_json::<RoutingOutput>(reply)
        .ok()
        .and_then(|out| Mode::parse(&out.mode))
        .or_else(|| Mode::parse(reply))
}

pub struct RouterNode {
    llm: Arc<dyn LlmClient>,
}

impl RouterNode {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Node for RouterNode {
    fn id(&self) -> NodeId {
        NodeId::Router
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate, AgentError> {
        let latest = state
            .last_user_message()
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        if wants_explanation(latest) {
            tracing::info!(mode = %Mode::Explain, "routed by keyword");
            return Ok(StateUpdate::new().mode(Mode::Explain));
        }

        let mut messages = vec![Message::system(router_prompt())];
        messages.extend(state.messages.iter().cloned());
        let reply = self.llm.complete(&messages).await?;

        let mode = classify(&reply).unwrap_or_else(|| {
            tracing::warn!(reply = %reply.trim(), "router reply unusable, defaulting to quick");
            Mode::Quick
        });
        tracing::info!(mode = %mode, "routed");
        Ok(StateUpdate::new().mode(mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_fast_path() {
        assert!(wants_explanation("Explain your graph"));
        assert!(wants_explanation("can you explain?"));
        assert!(!wants_explanation("explain quantum computing to me"));
        assert!(!wants_explanation("explanation please"));
        assert!(!wants_explanation("what is rust"));
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(r#"{"mode": "research"}"#), Some(Mode::Research));
        assert_eq!(classify("quick"), Some(Mode::Quick));
        assert_eq!(classify(r#"{"mode": "deep"}"#), None);
        assert_eq!(classify(""), None);
    }
}
