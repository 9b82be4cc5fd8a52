//! 会话状态：AgentState 与节点产出的 StateUpdate
//!
//! 节点只读 AgentState、返回 StateUpdate；由 `AgentState::apply` 统一合并并校验不变量：
//! - messages 只追加
//! - mode 一次运行内不被改写为其它值
//! - plan 设定后不可变，current_step ∈ [0, len(plan)] 且不回退
//! - review_count 不回退
//! - 同一时刻至多一个待审批动作

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::memory::{Message, Role, ToolCall};

/// 行为模式，由 Router 设定
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Quick,
    Research,
    Explain,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Quick => "quick",
            Mode::Research => "research",
            Mode::Explain => "explain",
        }
    }

    /// 解析模式标签（忽略大小写与首尾空白、引号）
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().trim_matches(|c: char| c == '"' || c == '\'').to_lowercase().as_str() {
            "quick" => Some(Mode::Quick),
            "research" => Some(Mode::Research),
            "explain" => Some(Mode::Explain),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 恢复信号携带的审批结论
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approved,
    Denied,
}

/// 贯穿所有节点的会话状态
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentState {
    pub messages: Vec<Message>,
    pub mode: Option<Mode>,
    pub plan: Vec<String>,
    pub current_step: usize,
    pub research_notes: String,
    pub review_count: u32,
    pub user_approval_needed: bool,
    pub approval_action: Option<String>,
    pub approval_decision: Option<ApprovalDecision>,
    /// 触发本次运行的用户原始请求
    pub request: String,
}

/// research_notes 的更新方式
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotesUpdate {
    Reset,
    Append(String),
}

/// 审批标志的更新方式
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ApprovalUpdate {
    /// 进入待审批：记录动作描述
    Pending { action: String },
    /// 审批已处理：清除待审批标志（保留结论）
    Resolved,
}

/// 节点产出的部分更新：messages 追加，其余字段为覆盖
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_step: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_notes: Option<NotesUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<ApprovalUpdate>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn plan(mut self, plan: Vec<String>) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn current_step(mut self, step: usize) -> Self {
        self.current_step = Some(step);
        self
    }

    pub fn reset_notes(mut self) -> Self {
        self.research_notes = Some(NotesUpdate::Reset);
        self
    }

    pub fn append_notes(mut self, text: impl Into<String>) -> Self {
        self.research_notes = Some(NotesUpdate::Append(text.into()));
        self
    }

    pub fn review_count(mut self, count: u32) -> Self {
        self.review_count = Some(count);
        self
    }

    pub fn approval(mut self, approval: ApprovalUpdate) -> Self {
        self.approval = Some(approval);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始一次新运行：追加用户消息、记录请求，并重置本次运行相关字段（messages 跨运行保留）
    pub fn begin_run(&mut self, text: &str) {
        self.messages.push(Message::user(text));
        self.request = text.to_string();
        self.mode = None;
        self.plan.clear();
        self.current_step = 0;
        self.research_notes.clear();
        self.review_count = 0;
        self.user_approval_needed = false;
        self.approval_action = None;
        self.approval_decision = None;
    }

    /// 记录恢复信号中的审批结论（供 Approval Gate 读取）
    pub fn record_decision(&mut self, decision: ApprovalDecision) {
        self.approval_decision = Some(decision);
    }

    /// 合并节点更新；任何一项违反不变量时整体拒绝，状态保持不变
    pub fn apply(&mut self, update: StateUpdate) -> Result<(), AgentError> {
        self.validate(&update)?;

        self.messages.extend(update.messages);
        if let Some(mode) = update.mode {
            self.mode = Some(mode);
        }
        if let Some(plan) = update.plan {
            self.plan = plan;
        }
        if let Some(step) = update.current_step {
            self.current_step = step;
        }
        match update.research_notes {
            Some(NotesUpdate::Reset) => self.research_notes.clear(),
            Some(NotesUpdate::Append(text)) => self.research_notes.push_str(&text),
            None => {}
        }
        if let Some(count) = update.review_count {
            self.review_count = count;
        }
        match update.approval {
            Some(ApprovalUpdate::Pending { action }) => {
                self.user_approval_needed = true;
                self.approval_action = Some(action);
                self.approval_decision = None;
            }
            Some(ApprovalUpdate::Resolved) => {
                self.user_approval_needed = false;
                self.approval_action = None;
            }
            None => {}
        }
        Ok(())
    }

    fn validate(&self, update: &StateUpdate) -> Result<(), AgentError> {
        if let (Some(current), Some(new)) = (self.mode, update.mode) {
            if current != new {
                return Err(AgentError::InvalidState(format!(
                    "mode already set to {}, refusing {}",
                    current, new
                )));
            }
        }

        let plan_len = match &update.plan {
            Some(plan) => {
                if !self.plan.is_empty() && &self.plan != plan {
                    return Err(AgentError::InvalidState(
                        "plan is immutable once set".to_string(),
                    ));
                }
                plan.len()
            }
            None => self.plan.len(),
        };

        if let Some(step) = update.current_step {
            if step > plan_len {
                return Err(AgentError::InvalidState(format!(
                    "current_step {} exceeds plan length {}",
                    step, plan_len
                )));
            }
            if step < self.current_step {
                return Err(AgentError::InvalidState(format!(
                    "current_step may not decrease ({} -> {})",
                    self.current_step, step
                )));
            }
        }

        if let Some(count) = update.review_count {
            if count < self.review_count {
                return Err(AgentError::InvalidState(format!(
                    "review_count may not decrease ({} -> {})",
                    self.review_count, count
                )));
            }
        }

        if let Some(ApprovalUpdate::Pending { .. }) = update.approval {
            if self.user_approval_needed {
                return Err(AgentError::InvalidState(
                    "an approval is already pending".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::User)
    }

    pub fn last_assistant_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// 最后一条消息若为 Assistant 工具调用，返回该调用
    pub fn pending_tool_call(&self) -> Option<&ToolCall> {
        self.messages
            .last()
            .filter(|m| m.role == Role::Assistant)
            .and_then(|m| m.tool_call.as_ref())
    }

    /// 当前计划步骤描述
    pub fn current_step_text(&self) -> Option<&str> {
        self.plan.get(self.current_step).map(String::as_str)
    }

    pub fn research_complete(&self) -> bool {
        !self.plan.is_empty() && self.current_step >= self.plan.len()
    }
}
