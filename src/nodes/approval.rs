//! Approval Gate：敏感工具调用的人工审批点
//!
//! 引擎在进入本节点前挂起；恢复后本节点读取 approval_decision：
//! 批准时仅清除待审批标志，拒绝时不执行工具并回写一条 Tool 消息，研究模式下当前步骤记为跳过。

use async_trait::async_trait;

use super::step_manager::step_note;
use crate::core::{AgentError, AgentState, ApprovalDecision, ApprovalUpdate, Mode, StateUpdate};
use crate::memory::Message;
use crate::workflow::{Node, NodeId};

pub struct ApprovalNode;

#[async_trait]
impl Node for ApprovalNode {
    fn id(&self) -> NodeId {
        NodeId::Approval
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate, AgentError> {
        let decision = state.approval_decision.ok_or_else(|| {
            AgentError::InvalidState("approval gate entered without a decision".to_string())
        })?;
        let update = StateUpdate::new().approval(ApprovalUpdate::Resolved);

        match decision {
            ApprovalDecision::Approved => {
                tracing::info!(action = ?state.approval_action, "approved");
                Ok(update)
            }
            ApprovalDecision::Denied => {
                let tool = state
                    .pending_tool_call()
                    .map(|c| c.tool.clone())
                    .unwrap_or_else(|| "action".to_string());
                tracing::info!(tool = %tool, "denied by user");

                let mut update = update.message(Message::tool(
                    &tool,
                    format!("Denied by user: {} was not executed", tool),
                ));
                if state.mode == Some(Mode::Research) && !state.research_complete() {
                    let next = state.current_step + 1;
                    update = update
                        .append_notes(step_note(next, &format!("skipped (user denied {})", tool)))
                        .current_step(next);
                }
                Ok(update)
            }
        }
    }
}
