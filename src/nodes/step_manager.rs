//! Step-Manager：记录步骤结果并推进 current_step（不调用模型）

use async_trait::async_trait;

use crate::core::{AgentError, AgentState, StateUpdate};
use crate::workflow::{Node, NodeId};

/// 追加到 research_notes 的步骤记录
pub fn step_note(step: usize, content: &str) -> String {
    format!("\n\nStep {} Result:\n{}", step, content)
}

pub struct StepManagerNode;

#[async_trait]
impl Node for StepManagerNode {
    fn id(&self) -> NodeId {
        NodeId::StepManager
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate, AgentError> {
        match state.last_message() {
            Some(m) if m.is_plain_assistant() && !state.research_complete() => {
                let next = state.current_step + 1;
                tracing::debug!(step = next, total = state.plan.len(), "step recorded");
                Ok(StateUpdate::new()
                    .append_notes(step_note(next, &m.content))
                    .current_step(next))
            }
            _ => Ok(StateUpdate::new()),
        }
    }
}
