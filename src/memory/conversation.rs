//! 对话消息：角色、工具调用与消息体
//!
//! 消息在一次会话内只追加不删改；工具调用请求挂在 Assistant 消息上，工具结果以 Tool 角色消息回写。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Validator 打回时追加的反馈消息前缀
pub const FEEDBACK_TAG: &str = "Reviewer Feedback:";

/// 消息角色（与 LLM API 一致，另加 Tool 表示工具返回）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// 工具调用：与模型输出的 `{"tool": "...", "args": {...}}` 一致
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Assistant 发起的工具调用请求
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<ToolCall>,
    /// Tool 消息对应的工具名
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_call: None,
            tool_name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// Assistant 工具调用消息：content 为模型给出的推理说明（可为空）
    pub fn assistant_tool_call(reasoning: impl Into<String>, call: ToolCall) -> Self {
        Self {
            role: Role::Assistant,
            content: reasoning.into(),
            tool_call: Some(call),
            tool_name: None,
        }
    }

    /// 工具结果消息
    pub fn tool(tool_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_call: None,
            tool_name: Some(tool_name.into()),
        }
    }

    /// Validator 反馈消息（User 角色，带 FEEDBACK_TAG 前缀）
    pub fn feedback(feedback: &str) -> Self {
        Self::user(format!("{} {}", FEEDBACK_TAG, feedback))
    }

    pub fn is_feedback(&self) -> bool {
        self.role == Role::User && self.content.starts_with(FEEDBACK_TAG)
    }

    /// 不带工具调用的 Assistant 消息，即一次「纯文本结果」
    pub fn is_plain_assistant(&self) -> bool {
        self.role == Role::Assistant && self.tool_call.is_none()
    }
}
