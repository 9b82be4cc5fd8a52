//! 工具箱：search_web、save_to_notes（敏感）、calculate 与执行器

pub mod calculate;
pub mod executor;
pub mod notes;
pub mod registry;
pub mod schema;
pub mod search;

pub use calculate::CalculateTool;
pub use executor::ToolExecutor;
pub use notes::{sanitize_topic, NotesTool};
pub use registry::{Tool, ToolRegistry};
pub use schema::{
    planning_schema_json, review_schema_json, routing_schema_json, tool_call_schema_json,
    PlanningOutput, ReviewOutput, RoutingOutput,
};
pub use search::SearchWebTool;
