//! 研究智能体的节点与执行图装配
//!
//! Router 分流后进入三条路径：
//! - research：Planner → Executor ⇄ (Tools | Approval) → Step-Manager → … → Reporter → Validator
//! - quick：Chat ⇄ (Tools | Approval) → Validator
//! - explain：Explainer → END
//!
//! 敏感工具（requires_approval）的调用一律先经过 Approval Gate 挂起点。

pub mod approval;
pub mod chat;
pub mod executor;
pub mod explainer;
pub mod parse;
pub mod planner;
pub mod prompts;
pub mod reporter;
pub mod router;
pub mod step_manager;
pub mod tool_runner;
pub mod validator;

use std::collections::HashSet;
use std::sync::Arc;

pub use approval::ApprovalNode;
pub use chat::ChatNode;
pub use executor::ExecutorNode;
pub use explainer::ExplainerNode;
pub use parse::{extract_json, parse_json, parse_llm_output, ModelReply};
pub use planner::{parse_plan, PlannerNode, MAX_PLAN_STEPS};
pub use reporter::ReporterNode;
pub use router::{wants_explanation, RouterNode};
pub use step_manager::StepManagerNode;
pub use tool_runner::ToolRunnerNode;
pub use validator::{parse_verdict, ValidatorNode, Verdict, DEFAULT_MAX_REVIEWS};

use crate::core::{AgentState, ApprovalDecision, Mode};
use crate::llm::LlmClient;
use crate::memory::Preferences;
use crate::tools::ToolExecutor;
use crate::workflow::{GraphBuilder, NodeId, SignalKind, StateGraph, Target, WorkflowError};

/// 最后一条消息为工具调用时：敏感工具去审批，其余去 Tool Runner；否则走 otherwise
fn route_tool_call(state: &AgentState, sensitive: &HashSet<String>, otherwise: NodeId) -> Target {
    match state.pending_tool_call() {
        Some(call) if sensitive.contains(&call.tool) => NodeId::Approval.into(),
        Some(_) => NodeId::Tools.into(),
        None => otherwise.into(),
    }
}

fn is_research(state: &AgentState) -> bool {
    state.mode == Some(Mode::Research)
}

/// 研究模式下计划未完成回 Executor，否则去 Reporter
fn next_step_or_report(state: &AgentState) -> Target {
    if state.research_complete() {
        NodeId::Reporter.into()
    } else {
        NodeId::Executor.into()
    }
}

fn route_router(state: &AgentState) -> Target {
    match state.mode {
        Some(Mode::Research) => NodeId::Planner.into(),
        Some(Mode::Explain) => NodeId::Explainer.into(),
        Some(Mode::Quick) | None => NodeId::Chat.into(),
    }
}

fn route_tools(state: &AgentState) -> Target {
    if is_research(state) {
        NodeId::Executor.into()
    } else {
        NodeId::Chat.into()
    }
}

fn route_approval(state: &AgentState) -> Target {
    match state.approval_decision {
        Some(ApprovalDecision::Approved) => NodeId::Tools.into(),
        _ if is_research(state) => next_step_or_report(state),
        _ => NodeId::Chat.into(),
    }
}

fn route_validator(state: &AgentState) -> Target {
    match state.last_message() {
        Some(m) if m.is_feedback() && is_research(state) => NodeId::Reporter.into(),
        Some(m) if m.is_feedback() => NodeId::Chat.into(),
        _ => Target::End,
    }
}

/// 装配完整的研究智能体执行图
pub fn build_agent_graph(
    llm: Arc<dyn LlmClient>,
    tools: Arc<ToolExecutor>,
    prefs: Arc<Preferences>,
    max_reviews: u32,
) -> Result<StateGraph, WorkflowError> {
    let sensitive = Arc::new(tools.sensitive_tools());
    let executor_sensitive = Arc::clone(&sensitive);
    let chat_sensitive = sensitive;

    GraphBuilder::new()
        .node(RouterNode::new(llm.clone()))
        .node(PlannerNode::new(llm.clone(), prefs.clone()))
        .node(ExecutorNode::new(llm.clone(), tools.clone()))
        .node(StepManagerNode)
        .node(ToolRunnerNode::new(tools.clone()))
        .node(ApprovalNode)
        .node(ValidatorNode::new(llm.clone(), max_reviews))
        .node(ReporterNode::new(llm.clone(), prefs.clone()))
        .node(ChatNode::new(llm, tools, prefs))
        .node(ExplainerNode)
        .entry(NodeId::Router)
        .conditional_edge(
            NodeId::Router,
            vec![
                NodeId::Chat.into(),
                NodeId::Planner.into(),
                NodeId::Explainer.into(),
            ],
            route_router,
        )
        .edge(NodeId::Planner, NodeId::Executor)
        .conditional_edge(
            NodeId::Executor,
            vec![
                NodeId::Approval.into(),
                NodeId::Tools.into(),
                NodeId::StepManager.into(),
            ],
            move |state| route_tool_call(state, &executor_sensitive, NodeId::StepManager),
        )
        .conditional_edge(
            NodeId::StepManager,
            vec![NodeId::Executor.into(), NodeId::Reporter.into()],
            next_step_or_report,
        )
        .conditional_edge(
            NodeId::Tools,
            vec![NodeId::Executor.into(), NodeId::Chat.into()],
            route_tools,
        )
        .conditional_edge(
            NodeId::Approval,
            vec![
                NodeId::Tools.into(),
                NodeId::Executor.into(),
                NodeId::Reporter.into(),
                NodeId::Chat.into(),
            ],
            route_approval,
        )
        .conditional_edge(
            NodeId::Chat,
            vec![
                NodeId::Approval.into(),
                NodeId::Tools.into(),
                NodeId::Validator.into(),
            ],
            move |state| route_tool_call(state, &chat_sensitive, NodeId::Validator),
        )
        .edge(NodeId::Reporter, NodeId::Validator)
        .conditional_edge(
            NodeId::Validator,
            vec![NodeId::Chat.into(), NodeId::Reporter.into(), Target::End],
            route_validator,
        )
        .edge(NodeId::Explainer, Target::End)
        .interrupt_before(NodeId::Approval, SignalKind::Approval)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StateUpdate;
    use crate::llm::MockLlmClient;
    use crate::memory::{Message, ToolCall};
    use crate::tools::{CalculateTool, NotesTool, ToolRegistry};
    use serde_json::json;

    fn sensitive() -> HashSet<String> {
        let mut registry = ToolRegistry::new();
        registry.register(CalculateTool);
        registry.register(NotesTool::new("notes"));
        registry.sensitive_tools()
    }

    fn with_call(tool: &str) -> AgentState {
        let mut state = AgentState::new();
        state.begin_run("hi");
        state
            .apply(StateUpdate::new().message(Message::assistant_tool_call(
                "",
                ToolCall::new(tool, json!({})),
            )))
            .unwrap();
        state
    }

    #[test]
    fn test_sensitive_calls_go_through_the_gate() {
        let sensitive = sensitive();
        assert_eq!(
            route_tool_call(&with_call("save_to_notes"), &sensitive, NodeId::Validator),
            Target::Node(NodeId::Approval)
        );
        assert_eq!(
            route_tool_call(&with_call("calculate"), &sensitive, NodeId::Validator),
            Target::Node(NodeId::Tools)
        );
        let mut state = AgentState::new();
        state.begin_run("hi");
        assert_eq!(
            route_tool_call(&state, &sensitive, NodeId::StepManager),
            Target::Node(NodeId::StepManager)
        );
    }

    #[test]
    fn test_validator_routing() {
        let mut state = AgentState::new();
        state.begin_run("hi");
        state
            .apply(
                StateUpdate::new()
                    .mode(Mode::Quick)
                    .message(Message::assistant("answer")),
            )
            .unwrap();
        assert_eq!(route_validator(&state), Target::End);
        state
            .apply(StateUpdate::new().message(Message::feedback("too vague")))
            .unwrap();
        assert_eq!(route_validator(&state), Target::Node(NodeId::Chat));
    }

    #[test]
    fn test_agent_graph_builds() {
        let mut registry = ToolRegistry::new();
        registry.register(CalculateTool);
        registry.register(NotesTool::new("notes"));
        let graph = build_agent_graph(
            Arc::new(MockLlmClient),
            Arc::new(ToolExecutor::new(registry, 5)),
            Arc::new(Preferences::new()),
            DEFAULT_MAX_REVIEWS,
        )
        .unwrap();
        assert_eq!(graph.entry(), NodeId::Router);
        assert_eq!(graph.node_ids().len(), NodeId::ALL.len());
        assert_eq!(graph.interrupt_before(NodeId::Approval), Some(SignalKind::Approval));
        assert_eq!(graph.interrupt_before(NodeId::Tools), None);
    }
}
