//! 记忆层：会话消息与用户偏好

pub mod conversation;
pub mod preferences;

pub use conversation::{Message, Role, ToolCall, FEEDBACK_TAG};
pub use preferences::Preferences;
