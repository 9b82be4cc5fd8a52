//! 执行图类型定义
//!
//! 节点标识、边与目标、挂起点信号、运行事件与结果、图错误类型

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{AgentState, Mode, StateUpdate};

/// 图中的节点（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeId {
    Router,
    Planner,
    Executor,
    StepManager,
    Tools,
    #[serde(rename = "human_approval")]
    Approval,
    Validator,
    Reporter,
    Chat,
    Explainer,
}

impl NodeId {
    pub const ALL: [NodeId; 10] = [
        NodeId::Router,
        NodeId::Planner,
        NodeId::Executor,
        NodeId::StepManager,
        NodeId::Tools,
        NodeId::Approval,
        NodeId::Validator,
        NodeId::Reporter,
        NodeId::Chat,
        NodeId::Explainer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::Router => "router",
            NodeId::Planner => "planner",
            NodeId::Executor => "executor",
            NodeId::StepManager => "step_manager",
            NodeId::Tools => "tools",
            NodeId::Approval => "human_approval",
            NodeId::Validator => "validator",
            NodeId::Reporter => "reporter",
            NodeId::Chat => "chat",
            NodeId::Explainer => "explainer",
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 边的目标：某个节点或结束
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    Node(NodeId),
    End,
}

impl Target {
    pub fn node(&self) -> Option<NodeId> {
        match self {
            Target::Node(id) => Some(*id),
            Target::End => None,
        }
    }
}

impl From<NodeId> for Target {
    fn from(id: NodeId) -> Self {
        Target::Node(id)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Node(id) => write!(f, "{}", id),
            Target::End => f.write_str("END"),
        }
    }
}

/// 条件路由函数：读取合并后的状态，给出下一目标
pub type RouteFn = Arc<dyn Fn(&AgentState) -> Target + Send + Sync>;

/// 出边：直接边或条件边（条件边须声明全部可能目标）
#[derive(Clone)]
pub enum Edge {
    Direct(Target),
    Conditional { route: RouteFn, targets: Vec<Target> },
}

impl Edge {
    /// 该边可能到达的全部目标
    pub fn targets(&self) -> Vec<Target> {
        match self {
            Edge::Direct(t) => vec![*t],
            Edge::Conditional { targets, .. } => targets.clone(),
        }
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Edge::Direct(t) => f.debug_tuple("Direct").field(t).finish(),
            Edge::Conditional { targets, .. } => f
                .debug_struct("Conditional")
                .field("targets", targets)
                .finish_non_exhaustive(),
        }
    }
}

/// 挂起点所等待的恢复信号类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// 人工审批待执行的工具调用
    Approval,
}

impl SignalKind {
    /// 挂起时对待处理动作的描述
    pub fn describe(&self, state: &AgentState) -> String {
        match self {
            SignalKind::Approval => match state.pending_tool_call() {
                Some(call) => format!("{} {}", call.tool, call.args),
                None => "pending action".to_string(),
            },
        }
    }
}

/// 外部恢复信号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResumeSignal {
    Approval { approved: bool },
}

impl ResumeSignal {
    pub fn kind(&self) -> SignalKind {
        match self {
            ResumeSignal::Approval { .. } => SignalKind::Approval,
        }
    }
}

/// 运行过程事件（可序列化为 JSON 行推给前端）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    /// 某节点执行完毕及其产出的更新
    Node { node: NodeId, update: StateUpdate },
    /// 运行在挂起点前暂停，等待外部信号
    Suspended { node: NodeId, action: String },
    /// 运行结束
    Finished {
        mode: Option<Mode>,
        reply: Option<String>,
        review_count: u32,
    },
    /// 运行因错误中止
    Error { message: String },
}

/// 一次运行（或恢复）的结果
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed {
        state: AgentState,
    },
    Suspended {
        node: NodeId,
        action: String,
        state: AgentState,
    },
}

impl RunOutcome {
    pub fn state(&self) -> &AgentState {
        match self {
            RunOutcome::Completed { state } | RunOutcome::Suspended { state, .. } => state,
        }
    }

    pub fn is_suspended(&self) -> bool {
        matches!(self, RunOutcome::Suspended { .. })
    }

    /// 最终回复：最后一条 Assistant 消息
    pub fn reply(&self) -> Option<&str> {
        self.state()
            .last_assistant_message()
            .map(|m| m.content.as_str())
    }
}

/// 图构建与运行时的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Entry point is not set")]
    MissingEntry,
    #[error("Node registered twice: {0}")]
    DuplicateNode(NodeId),
    #[error("Node is not registered: {0}")]
    UnknownNode(NodeId),
    #[error("Node has more than one outgoing edge: {0}")]
    DuplicateEdge(NodeId),
    #[error("Node has no outgoing edge: {0}")]
    MissingEdge(NodeId),
    #[error("Conditional edge from {0} declares no targets")]
    EmptyTargets(NodeId),
    #[error("Route from {from} chose undeclared target {target}")]
    UndeclaredTarget { from: NodeId, target: Target },
    #[error("Resume signal {got:?} does not match suspend point {node} ({expected:?})")]
    SignalMismatch {
        node: NodeId,
        expected: SignalKind,
        got: SignalKind,
    },
    #[error("Run exceeded {0} node executions")]
    StepLimitExceeded(usize),
}
