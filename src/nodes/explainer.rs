//! Explainer：固定的自我介绍，不调用模型

use async_trait::async_trait;

use super::prompts::EXPLAIN_TEXT;
use crate::core::{AgentError, AgentState, StateUpdate};
use crate::memory::Message;
use crate::workflow::{Node, NodeId};

pub struct ExplainerNode;

#[async_trait]
impl Node for ExplainerNode {
    fn id(&self) -> NodeId {
        NodeId::Explainer
    }

    async fn run(&self, _state: &AgentState) -> Result<StateUpdate, AgentError> {
        Ok(StateUpdate::new().message(Message::assistant(EXPLAIN_TEXT)))
    }
}
