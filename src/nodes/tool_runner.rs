//! Tool Runner：执行最后一条 Assistant 消息携带的工具调用

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentError, AgentState, StateUpdate};
use crate::memory::Message;
use crate::tools::ToolExecutor;
use crate::workflow::{Node, NodeId};

pub struct ToolRunnerNode {
    tools: Arc<ToolExecutor>,
}

impl ToolRunnerNode {
    pub fn new(tools: Arc<ToolExecutor>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Node for ToolRunnerNode {
    fn id(&self) -> NodeId {
        NodeId::Tools
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate, AgentError> {
        let call = state
            .pending_tool_call()
            .ok_or_else(|| AgentError::InvalidState("no tool call to run".to_string()))?;
        let observation = self.tools.run(call).await;
        Ok(StateUpdate::new().message(Message::tool(&call.tool, observation)))
    }
}
