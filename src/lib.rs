//! Forager - 对话式研究智能体
//!
//! 模块划分：
//! - **agent**: 无头 Agent 运行时（供 CLI / HTTP 调用）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、会话状态与状态合并
//! - **llm**: LLM 客户端抽象、重试装饰器与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话消息与用户偏好
//! - **nodes**: Router、Planner、Executor、Validator 等节点与执行图装配
//! - **session**: 会话检查点存储（内存 / SQLite）
//! - **tools**: 工具箱（search_web、save_to_notes、calculate）与执行器
//! - **workflow**: 执行图构建、挂起点与引擎

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod nodes;
pub mod observability;
pub mod session;
pub mod tools;
pub mod workflow;

pub use agent::AgentRuntime;
