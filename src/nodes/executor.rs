//! Executor：执行当前计划步骤，给出步骤结果或工具调用

use std::sync::Arc;

use async_trait::async_trait;

use super::parse::{parse_llm_output, ModelReply};
use super::prompts::{executor_prompt, tools_block};
use crate::core::{AgentError, AgentState, StateUpdate};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::ToolExecutor;
use crate::workflow::{Node, NodeId};

/// 把模型回复转成 Assistant 消息（工具调用或纯文本）
pub(crate) fn reply_message(reply: &str) -> Message {
    match parse_llm_output(reply) {
        ModelReply::ToolCall { call, reasoning } => {
            tracing::info!(tool = %call.tool, "tool requested");
            Message::assistant_tool_call(reasoning, call)
        }
        ModelReply::Answer(text) => Message::assistant(text),
    }
}

pub struct ExecutorNode {
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolExecutor>,
}

impl ExecutorNode {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<ToolExecutor>) -> Self {
        Self { llm, tools }
    }
}

#[async_trait]
impl Node for ExecutorNode {
    fn id(&self) -> NodeId {
        NodeId::Executor
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate, AgentError> {
        let step = state.current_step_text().ok_or_else(|| {
            AgentError::InvalidState(format!(
                "no plan step at index {} (plan has {})",
                state.current_step,
                state.plan.len()
            ))
        })?;
        tracing::debug!(step = state.current_step + 1, "executing step");

        let prompt = executor_prompt(step, &state.research_notes, &tools_block(&self.tools));
        let mut messages = vec![Message::system(prompt)];
        messages.extend(state.messages.iter().cloned());
        let reply = self.llm.complete(&messages).await?;
        Ok(StateUpdate::new().message(reply_message(&reply)))
    }
}
