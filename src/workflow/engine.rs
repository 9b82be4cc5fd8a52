//! 执行图引擎
//!
//! 逐个顺序执行节点：合并更新 → 计算下一目标 → 写检查点 → 推送事件。
//! 进入声明的挂起点前：置待审批标志、写检查点（next 为挂起节点）、推送 Suspended 后返回；
//! 外部以 resume 携带信号恢复。节点出错时运行中止，最后一个检查点（next 为出错节点）保持不变，可用 retry 重跑。
//! 同一会话的 run / resume / retry 持有会话锁串行执行，检查点的读-改-写不会交错。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};

use crate::core::{AgentError, AgentState, ApprovalDecision, ApprovalUpdate, StateUpdate};
use crate::session::{Checkpoint, CheckpointStore};
use crate::workflow::graph::StateGraph;
use crate::workflow::types::*;

/// 单次运行默认的节点执行上限
pub const DEFAULT_MAX_STEPS: usize = 100;

type EventSender<'a> = Option<&'a mpsc::UnboundedSender<GraphEvent>>;

fn emit(events: EventSender<'_>, event: GraphEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// 执行图引擎：持有图与检查点存储，可多会话共享
pub struct GraphEngine {
    graph: StateGraph,
    store: Arc<dyn CheckpointStore>,
    max_steps: usize,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GraphEngine {
    pub fn new(graph: StateGraph, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            graph,
            store,
            max_steps: DEFAULT_MAX_STEPS,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// 取得会话锁；持有期间同一会话的其它运行等待
    async fn lock_session(&self, session_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.session_locks.lock().await;
            Arc::clone(locks.entry(session_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// 清理空闲会话（暂停中的除外），并释放无人持有的会话锁
    pub async fn cleanup_expired(&self, max_idle: Duration) -> Result<usize, AgentError> {
        let removed = self.store.cleanup_expired(max_idle).await?;
        self.session_locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        Ok(removed)
    }

    /// 读取会话检查点
    pub async fn checkpoint(&self, session_id: &str) -> Result<Option<Checkpoint>, AgentError> {
        self.store.get(session_id).await
    }

    /// 以一条新用户消息开始一次运行；会话正等待审批时拒绝
    pub async fn run(
        &self,
        session_id: &str,
        text: &str,
        events: EventSender<'_>,
    ) -> Result<RunOutcome, AgentError> {
        let _guard = self.lock_session(session_id).await;
        let result = self.start_run(session_id, text, events).await;
        report(result, events)
    }

    /// 以恢复信号继续一个暂停的会话；未暂停时返回 NoPendingApproval
    pub async fn resume(
        &self,
        session_id: &str,
        signal: ResumeSignal,
        events: EventSender<'_>,
    ) -> Result<RunOutcome, AgentError> {
        let _guard = self.lock_session(session_id).await;
        let result = self.resume_run(session_id, signal, events).await;
        report(result, events)
    }

    /// 从上次出错的节点重跑
    pub async fn retry(
        &self,
        session_id: &str,
        events: EventSender<'_>,
    ) -> Result<RunOutcome, AgentError> {
        let _guard = self.lock_session(session_id).await;
        let result = self.retry_run(session_id, events).await;
        report(result, events)
    }

    async fn start_run(
        &self,
        session_id: &str,
        text: &str,
        events: EventSender<'_>,
    ) -> Result<RunOutcome, AgentError> {
        let existing = self.store.get(session_id).await?;
        if existing.as_ref().is_some_and(Checkpoint::is_paused) {
            return Err(AgentError::AwaitingApproval(session_id.to_string()));
        }
        let mut state = existing.map(|cp| cp.state).unwrap_or_default();
        state.begin_run(text);

        let entry = self.graph.entry();
        tracing::info!(session = %session_id, "run started");
        self.store
            .put(session_id, Checkpoint::new(state.clone(), Some(entry)))
            .await?;
        self.execute(session_id, state, entry, false, events).await
    }

    async fn resume_run(
        &self,
        session_id: &str,
        signal: ResumeSignal,
        events: EventSender<'_>,
    ) -> Result<RunOutcome, AgentError> {
        let checkpoint = self
            .store
            .get(session_id)
            .await?
            .filter(Checkpoint::is_paused)
            .ok_or_else(|| AgentError::NoPendingApproval(session_id.to_string()))?;
        let node = checkpoint
            .next
            .ok_or_else(|| AgentError::NoPendingApproval(session_id.to_string()))?;
        let expected = self
            .graph
            .interrupt_before(node)
            .ok_or_else(|| AgentError::NoPendingApproval(session_id.to_string()))?;
        if expected != signal.kind() {
            return Err(WorkflowError::SignalMismatch {
                node,
                expected,
                got: signal.kind(),
            }
            .into());
        }

        let mut state = checkpoint.state;
        match signal {
            ResumeSignal::Approval { approved } => {
                let decision = if approved {
                    ApprovalDecision::Approved
                } else {
                    ApprovalDecision::Denied
                };
                tracing::info!(session = %session_id, node = %node, ?decision, "resuming");
                state.record_decision(decision);
            }
        }
        self.execute(session_id, state, node, true, events).await
    }

    async fn retry_run(
        &self,
        session_id: &str,
        events: EventSender<'_>,
    ) -> Result<RunOutcome, AgentError> {
        let checkpoint = self
            .store
            .get(session_id)
            .await?
            .ok_or_else(|| AgentError::SessionNotFound(session_id.to_string()))?;
        if checkpoint.is_paused() {
            return Err(AgentError::AwaitingApproval(session_id.to_string()));
        }
        let node = checkpoint
            .next
            .ok_or_else(|| AgentError::NothingToResume(session_id.to_string()))?;
        tracing::info!(session = %session_id, node = %node, "retrying from last checkpoint");
        self.execute(session_id, checkpoint.state, node, false, events)
            .await
    }

    /// 主循环：从 start 开始执行直到 END 或挂起点
    async fn execute(
        &self,
        session_id: &str,
        mut state: AgentState,
        start: NodeId,
        resuming: bool,
        events: EventSender<'_>,
    ) -> Result<RunOutcome, AgentError> {
        let mut current = Target::Node(start);
        let mut resumed_at = resuming.then_some(start);
        let mut steps = 0usize;

        while let Target::Node(node_id) = current {
            if let Some(signal) = self.graph.interrupt_before(node_id) {
                if resumed_at != Some(node_id) {
                    return self.suspend(session_id, state, node_id, signal, events).await;
                }
            }
            resumed_at = None;

            steps += 1;
            if steps > self.max_steps {
                // 不留 next，避免 retry 绕过上限继续循环
                self.store
                    .put(session_id, Checkpoint::new(state, None))
                    .await?;
                return Err(WorkflowError::StepLimitExceeded(self.max_steps).into());
            }

            let node = self.graph.node(node_id)?;
            tracing::debug!(session = %session_id, node = %node_id, "node start");
            let update = node.run(&state).await?;
            state.apply(update.clone())?;

            let next = self.graph.next(node_id, &state)?;
            tracing::debug!(session = %session_id, node = %node_id, next = %next, "node done");
            self.store
                .put(session_id, Checkpoint::new(state.clone(), next.node()))
                .await?;
            emit(events, GraphEvent::Node { node: node_id, update });
            current = next;
        }

        tracing::info!(
            session = %session_id,
            mode = ?state.mode,
            review_count = state.review_count,
            "run finished"
        );
        emit(
            events,
            GraphEvent::Finished {
                mode: state.mode,
                reply: state.last_assistant_message().map(|m| m.content.clone()),
                review_count: state.review_count,
            },
        );
        Ok(RunOutcome::Completed { state })
    }

    async fn suspend(
        &self,
        session_id: &str,
        mut state: AgentState,
        node: NodeId,
        signal: SignalKind,
        events: EventSender<'_>,
    ) -> Result<RunOutcome, AgentError> {
        let action = signal.describe(&state);
        state.apply(StateUpdate::new().approval(ApprovalUpdate::Pending {
            action: action.clone(),
        }))?;
        self.store
            .put(session_id, Checkpoint::new(state.clone(), Some(node)))
            .await?;
        tracing::info!(session = %session_id, node = %node, action = %action, "suspended");
        emit(
            events,
            GraphEvent::Suspended {
                node,
                action: action.clone(),
            },
        );
        Ok(RunOutcome::Suspended {
            node,
            action,
            state,
        })
    }
}

/// 运行出错时推送 Error 事件
fn report(
    result: Result<RunOutcome, AgentError>,
    events: EventSender<'_>,
) -> Result<RunOutcome, AgentError> {
    if let Err(e) = &result {
        tracing::warn!("run aborted: {}", e);
        emit(
            events,
            GraphEvent::Error {
                message: e.to_string(),
            },
        );
    }
    result
}
