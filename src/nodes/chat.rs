//! Chat：quick 模式下直接回答，必要时调用工具

use std::sync::Arc;

use async_trait::async_trait;

use super::executor::reply_message;
use super::prompts::{chat_prompt, tools_block};
use crate::core::{AgentError, AgentState, StateUpdate};
use crate::llm::LlmClient;
use crate::memory::{Message, Preferences};
use crate::tools::ToolExecutor;
use crate::workflow::{Node, NodeId};

pub struct ChatNode {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolExecutor>,
    prefs: Arc<Preferences>,
}

impl ChatNode {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<ToolExecutor>, prefs: Arc<Preferences>) -> Self {
        Self { llm, tools, prefs }
    }
}

#[async_trait]
impl Node for ChatNode {
    fn id(&self) -> NodeId {
        NodeId::Chat
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate, AgentError> {
        let prompt = chat_prompt(
            &state.request,
            &self.prefs.context_line(),
            &tools_block(&self.tools),
        );
        let mut messages = vec![Message::system(prompt)];
        messages.extend(state.messages.iter().cloned());
        let reply = self.llm.complete(&messages).await?;
        Ok(StateUpdate::new().message(reply_message(&reply)))
    }
}
