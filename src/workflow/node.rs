//! 节点抽象：读状态、返回部分更新

use async_trait::async_trait;

use crate::core::{AgentError, AgentState, StateUpdate};
use crate::workflow::NodeId;

/// 图节点：只读当前状态，产出 StateUpdate，由引擎合并
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;

    async fn run(&self, state: &AgentState) -> Result<StateUpdate, AgentError>;
}
