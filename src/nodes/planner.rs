//! Planner：把研究请求拆成 3-5 个步骤

use std::sync::Arc;

use async_trait::async_trait;

use super::parse::parse_json;
use super::prompts::planner_prompt;
use crate::core::{AgentError, AgentState, StateUpdate};
use crate::llm::LlmClient;
use crate::memory::{Message, Preferences};
use crate::tools::PlanningOutput;
use crate::workflow::{Node, NodeId};

/// 计划步骤下限（不足时仅告警）
pub const MIN_PLAN_STEPS: usize = 3;
/// 计划步骤上限
pub const MAX_PLAN_STEPS: usize = 5;

/// 解析计划：接受 `{"steps": [...]}` 或裸 JSON 列表；超过上限截断，少于下限告警后照用，为空报错
pub fn parse_plan(reply: &str) -> Result<Vec<String>, AgentError> {
    let steps = parse_json::<PlanningOutput>(reply)
        .map(|out| out.steps)
        .or_else(|_| parse_json::<Vec<String>>(reply))
        .map_err(|e| AgentError::InvalidPlan(e.to_string()))?;

    let mut steps: Vec<String> = steps
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if steps.is_empty() {
        return Err(AgentError::InvalidPlan(format!("empty plan: {}", reply.trim())));
    }
    if steps.len() > MAX_PLAN_STEPS {
        tracing::warn!(steps = steps.len(), "plan too long, truncating");
        steps.truncate(MAX_PLAN_STEPS);
    } else if steps.len() < MIN_PLAN_STEPS {
        tracing::warn!(
            steps = steps.len(),
            min = MIN_PLAN_STEPS,
            "plan shorter than expected, using it as is"
        );
    }
    Ok(steps)
}

pub struct PlannerNode {
    llm: Arc<dyn LlmClient>,
    prefs: Arc<Preferences>,
}

impl PlannerNode {
    pub fn new(llm: Arc<dyn LlmClient>, prefs: Arc<Preferences>) -> Self {
        Self { llm, prefs }
    }
}

#[async_trait]
impl Node for PlannerNode {
    fn id(&self) -> NodeId {
        NodeId::Planner
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate, AgentError> {
        let mut messages = vec![Message::system(planner_prompt(&self.prefs.context_line()))];
        messages.extend(state.messages.iter().cloned());
        let reply = self.llm.complete(&messages).await?;
        let plan = parse_plan(&reply)?;
        tracing::info!(steps = plan.len(), "plan ready");
        Ok(StateUpdate::new().plan(plan).current_step(0).reset_notes())
    }
}
