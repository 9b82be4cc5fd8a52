//! 核心层：错误类型与会话状态

pub mod error;
pub mod state;

pub use error::AgentError;
pub use state::{AgentState, ApprovalDecision, ApprovalUpdate, Mode, NotesUpdate, StateUpdate};
