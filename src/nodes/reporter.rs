//! Reporter：根据研究笔记撰写最终报告

use std::sync::Arc;

use async_trait::async_trait;

use super::prompts::reporter_prompt;
use crate::core::{AgentError, AgentState, StateUpdate};
use crate::llm::LlmClient;
use crate::memory::{Message, Preferences};
use crate::workflow::{Node, NodeId};

pub struct ReporterNode {
    llm: Arc<dyn LlmClient>,
    prefs: Arc<Preferences>,
}

impl ReporterNode {
    pub fn new(llm: Arc<dyn LlmClient>, prefs: Arc<Preferences>) -> Self {
        Self { llm, prefs }
    }
}

#[async_trait]
impl Node for ReporterNode {
    fn id(&self) -> NodeId {
        NodeId::Reporter
    }

    async fn run(&self, state: &AgentState) -> Result<StateUpdate, AgentError> {
        // 修订轮：上一条为 Validator 的反馈
        let feedback = state
            .last_message()
            .filter(|m| m.is_feedback())
            .map(|m| m.content.as_str());
        let prompt = reporter_prompt(
            &state.research_notes,
            &self.prefs.context_line(),
            &state.request,
            feedback,
        );
        let messages = vec![Message::system(prompt), Message::user(state.request.clone())];
        let report = self.llm.complete(&messages).await?;
        tracing::info!(revision = feedback.is_some(), "report written");
        Ok(StateUpdate::new().message(Message::assistant(report.trim())))
    }
}
