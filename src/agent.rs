//! Headless Agent 运行时
//!
//! 供 CLI 与 HTTP 前端调用：按配置装配 LLM、工具、偏好、检查点存储与执行图，
//! process_message 跑一轮对话，approve 恢复挂起在审批点的会话，retry 从出错节点重跑。

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::core::AgentError;
use crate::llm::{create_llm_from_config, LlmClient};
use crate::memory::Preferences;
use crate::nodes::build_agent_graph;
use crate::session::{create_checkpoint_store, Checkpoint, CheckpointStore};
use crate::tools::{CalculateTool, NotesTool, SearchWebTool, ToolExecutor, ToolRegistry};
use crate::workflow::{GraphEngine, GraphEvent, ResumeSignal, RunOutcome};

/// 相对路径挂到 workspace_root 下（未配置时按当前目录）
fn resolve(cfg: &AppConfig, path: &Path) -> PathBuf {
    match &cfg.app.workspace_root {
        Some(root) if path.is_relative() => root.join(path),
        _ => path.to_path_buf(),
    }
}

/// 注册工具：search_web、save_to_notes（敏感）、calculate
pub fn build_tool_registry(cfg: &AppConfig) -> ToolRegistry {
    let search = &cfg.tools.search;
    let mut tools = ToolRegistry::new();
    tools.register(SearchWebTool::new(
        None,
        search.max_results,
        search.timeout_secs,
        search.retries,
    ));
    tools.register(NotesTool::new(resolve(cfg, &cfg.tools.notes_dir)));
    tools.register(CalculateTool);
    tools
}

/// 预构建的运行时，可多会话共享
pub struct AgentRuntime {
    engine: GraphEngine,
    prefs: Arc<Preferences>,
    prefs_path: PathBuf,
    config: AppConfig,
}

impl AgentRuntime {
    /// 按配置创建：LLM 由 provider 选择并带重试，存储按 session.db_path 选择
    pub async fn new(cfg: AppConfig) -> Result<Self, AgentError> {
        let llm = create_llm_from_config(&cfg);
        Self::with_llm(cfg, llm).await
    }

    /// 使用给定的 LLM 客户端创建
    pub async fn with_llm(cfg: AppConfig, llm: Arc<dyn LlmClient>) -> Result<Self, AgentError> {
        let store = create_checkpoint_store(cfg.session.db_path.as_deref()).await?;
        Self::from_parts(cfg, llm, store)
    }

    /// 由现成部件装配；偏好在此一次性加载
    pub fn from_parts(
        cfg: AppConfig,
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn CheckpointStore>,
    ) -> Result<Self, AgentError> {
        let prefs_path = resolve(&cfg, &cfg.app.prefs_path);
        let prefs = Arc::new(Preferences::load(&prefs_path));
        let tools = Arc::new(ToolExecutor::new(
            build_tool_registry(&cfg),
            cfg.tools.tool_timeout_secs,
        ));
        tracing::info!(
            tools = ?tools.tool_names(),
            prefs = prefs.len(),
            max_reviews = cfg.graph.max_reviews,
            "agent runtime ready"
        );

        let graph = build_agent_graph(llm, tools, Arc::clone(&prefs), cfg.graph.max_reviews)?;
        let engine = GraphEngine::new(graph, store).with_max_steps(cfg.graph.max_node_steps);
        Ok(Self {
            engine,
            prefs,
            prefs_path,
            config: cfg,
        })
    }

    pub fn prefs(&self) -> &Preferences {
        &self.prefs
    }

    /// 处理一条用户消息；events 逐节点推送过程事件
    pub async fn process_message(
        &self,
        session_id: &str,
        text: &str,
        events: Option<&mpsc::UnboundedSender<GraphEvent>>,
    ) -> Result<RunOutcome, AgentError> {
        self.engine.run(session_id, text, events).await
    }

    /// 审批挂起的工具调用并继续运行
    pub async fn approve(
        &self,
        session_id: &str,
        approved: bool,
        events: Option<&mpsc::UnboundedSender<GraphEvent>>,
    ) -> Result<RunOutcome, AgentError> {
        self.engine
            .resume(session_id, ResumeSignal::Approval { approved }, events)
            .await
    }

    /// 从上次出错的节点重跑
    pub async fn retry(
        &self,
        session_id: &str,
        events: Option<&mpsc::UnboundedSender<GraphEvent>>,
    ) -> Result<RunOutcome, AgentError> {
        self.engine.retry(session_id, events).await
    }

    pub async fn checkpoint(&self, session_id: &str) -> Result<Option<Checkpoint>, AgentError> {
        self.engine.checkpoint(session_id).await
    }

    /// 记录一条偏好到文件（下次启动生效），返回分配的键
    pub fn remember(&self, value: &str) -> anyhow::Result<String> {
        let mut prefs = Preferences::load(&self.prefs_path);
        prefs.save_pref(&self.prefs_path, value)
    }

    /// 清理空闲超过 session.ttl_secs 的会话；暂停等待审批的会话保留
    pub async fn cleanup_expired(&self) -> Result<usize, AgentError> {
        let ttl = Duration::from_secs(self.config.session.ttl_secs);
        self.engine.cleanup_expired(ttl).await
    }
}
