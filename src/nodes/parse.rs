//! 模型输出解析：提取 JSON 块，区分工具调用与直接回答

use serde::de::DeserializeOwned;

use crate::core::AgentError;
use crate::memory::ToolCall;

/// 一次模型回复的解读
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// 直接回答
    Answer(String),
    /// 工具调用；reasoning 为 JSON 之前的推理说明
    ToolCall { call: ToolCall, reasoning: String },
}

/// 定位 JSON 块：返回（块在原文中的起点，JSON 文本）
fn locate_json(text: &str) -> Option<(usize, &str)> {
    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        let body_start = after.find('\n').unwrap_or(0);
        let body = &after[body_start..];
        let body = body.find("```").map(|end| &body[..end]).unwrap_or(body).trim();
        if body.starts_with('{') || body.starts_with('[') {
            return Some((start, body));
        }
    }

    let start = text.find(|c: char| c == '{' || c == '[')?;
    let close = if text[start..].starts_with('{') { '}' } else { ']' };
    let end = text.rfind(close)?;
    (end > start).then(|| (start, &text[start..=end]))
}

/// 提取回复中的 JSON 文本（```json 围栏或首个 `{`/`[` 到最后一个对应括号）
pub fn extract_json(text: &str) -> Option<&str> {
    locate_json(text).map(|(_, json)| json)
}

/// 将回复解析为 T；无 JSON 或结构不符时返回 JsonParseError
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, AgentError> {
    let json = extract_json(text)
        .ok_or_else(|| AgentError::JsonParseError(format!("no JSON found in: {}", text.trim())))?;
    serde_json::from_str(json).map_err(|e| AgentError::JsonParseError(format!("{}: {}", e, json)))
}

/// 解析模型输出：含有效 `{"tool": ...}` 且 tool 非空则为工具调用，否则整段为回答
pub fn parse_llm_output(output: &str) -> ModelReply {
    let trimmed = output.trim();
    if let Some((start, json)) = locate_json(trimmed) {
        if let Ok(call) = serde_json::from_str::<ToolCall>(json) {
            if !call.tool.trim().is_empty() {
                return ModelReply::ToolCall {
                    call,
                    reasoning: trimmed[..start].trim().to_string(),
                };
            }
        }
    }
    ModelReply::Answer(trimmed.to_string())
}
