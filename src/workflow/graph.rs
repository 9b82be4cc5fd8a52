//! 执行图
//!
//! 节点表 + 出边表（NodeId → Edge）+ 入口 + 挂起点；由 GraphBuilder 构建并校验。
//! 运行时 next() 计算下一目标，条件边选出的目标必须在声明集合内。

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::AgentState;
use crate::workflow::node::Node;
use crate::workflow::types::*;

/// 已校验的执行图
pub struct StateGraph {
    pub(crate) nodes: HashMap<NodeId, Arc<dyn Node>>,
    pub(crate) edges: HashMap<NodeId, Edge>,
    pub(crate) entry: NodeId,
    pub(crate) interrupts: HashMap<NodeId, SignalKind>,
}

impl StateGraph {
    pub fn entry(&self) -> NodeId {
        self.entry
    }

    pub fn node(&self, id: NodeId) -> Result<&Arc<dyn Node>, WorkflowError> {
        self.nodes.get(&id).ok_or(WorkflowError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// 若 id 是声明的挂起点，返回其等待的信号类型
    pub fn interrupt_before(&self, id: NodeId) -> Option<SignalKind> {
        self.interrupts.get(&id).copied()
    }

    /// 节点 from 执行并合并更新后，根据状态选择下一目标
    pub fn next(&self, from: NodeId, state: &AgentState) -> Result<Target, WorkflowError> {
        let edge = self.edges.get(&from).ok_or(WorkflowError::MissingEdge(from))?;
        match edge {
            Edge::Direct(target) => Ok(*target),
            Edge::Conditional { route, targets } => {
                let target = route(state);
                if targets.contains(&target) {
                    Ok(target)
                } else {
                    Err(WorkflowError::UndeclaredTarget { from, target })
                }
            }
        }
    }

    /// 按 NodeId 排序的节点列表
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort();
        ids
    }
}
