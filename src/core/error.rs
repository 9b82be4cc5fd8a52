//! Agent 运行时错误类型
//!
//! LLM 层的 LlmError 与图层的 WorkflowError 经 `#[from]` 汇入 AgentError，在引擎边界统一上抛。

use thiserror::Error;

use crate::llm::LlmError;
use crate::workflow::WorkflowError;

/// Agent 运行过程中可能出现的错误（模型、解析、状态、图、会话、工具等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    /// Planner 未能给出可用计划
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    /// 节点产出的更新违反状态不变量
    #[error("Invalid state update: {0}")]
    InvalidState(String),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("No pending approval found for session {0}")]
    NoPendingApproval(String),

    /// 会话正等待审批，不接受新消息
    #[error("Session {0} is awaiting approval")]
    AwaitingApproval(String),

    #[error("Nothing to resume for session {0}")]
    NothingToResume(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Checkpoint store error: {0}")]
    Store(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),
}
