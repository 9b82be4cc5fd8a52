//! 执行图：节点、边、挂起点与引擎

pub mod builder;
pub mod engine;
pub mod graph;
pub mod node;
pub mod types;

pub use builder::GraphBuilder;
pub use engine::{GraphEngine, DEFAULT_MAX_STEPS};
pub use graph::StateGraph;
pub use node::Node;
pub use types::*;
