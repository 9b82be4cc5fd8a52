//! 检查点存储抽象层
//!
//! 每个会话一个槽位：最新的 AgentState 与下一个待执行节点。
//! 支持内存与 SQLite（feature async-sqlite）两种实现，由 create_checkpoint_store 按配置选择。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::core::{AgentError, AgentState};
use crate::workflow::NodeId;

#[cfg(feature = "async-sqlite")]
use super::sqlite::SqliteCheckpointStore;

/// 会话检查点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub state: AgentState,
    /// 下一个待执行节点；None 表示上次运行已结束
    pub next: Option<NodeId>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(state: AgentState, next: Option<NodeId>) -> Self {
        Self {
            state,
            next,
            updated_at: Utc::now(),
        }
    }

    /// 是否停在挂起点等待审批
    pub fn is_paused(&self) -> bool {
        self.state.user_approval_needed && self.next.is_some()
    }
}

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 读取会话检查点
    async fn get(&self, session_id: &str) -> Result<Option<Checkpoint>, AgentError>;

    /// 写入（覆盖）会话检查点
    async fn put(&self, session_id: &str, checkpoint: Checkpoint) -> Result<(), AgentError>;

    /// 删除会话
    async fn remove(&self, session_id: &str) -> Result<bool, AgentError>;

    /// 清理空闲超过 max_idle 的会话，返回清理数量；暂停等待审批的会话不清理
    async fn cleanup_expired(&self, max_idle: Duration) -> Result<usize, AgentError>;

    /// 会话数
    async fn len(&self) -> Result<usize, AgentError>;
}

/// 空闲阈值对应的截止时间
pub(crate) fn expiry_cutoff(max_idle: Duration) -> DateTime<Utc> {
    let idle = chrono::Duration::from_std(max_idle)
        .unwrap_or_else(|_| chrono::Duration::seconds(i64::from(u32::MAX)));
    Utc::now()
        .checked_sub_signed(idle)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// 内存检查点存储
#[derive(Default)]
pub struct MemoryCheckpointStore {
    slots: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, session_id: &str) -> Result<Option<Checkpoint>, AgentError> {
        Ok(self.slots.read().await.get(session_id).cloned())
    }

    async fn put(&self, session_id: &str, checkpoint: Checkpoint) -> Result<(), AgentError> {
        self.slots
            .write()
            .await
            .insert(session_id.to_string(), checkpoint);
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<bool, AgentError> {
        Ok(self.slots.write().await.remove(session_id).is_some())
    }

    async fn cleanup_expired(&self, max_idle: Duration) -> Result<usize, AgentError> {
        let cutoff = expiry_cutoff(max_idle);
        let mut slots = self.slots.write().await;
        let before = slots.len();
        slots.retain(|_, cp| cp.is_paused() || cp.updated_at >= cutoff);
        let removed = before - slots.len();
        if removed > 0 {
            tracing::info!(removed, "expired sessions cleaned up");
        }
        Ok(removed)
    }

    async fn len(&self) -> Result<usize, AgentError> {
        Ok(self.slots.read().await.len())
    }
}

/// 按配置创建存储：给出 db_path 且启用 async-sqlite 时用 SQLite，否则用内存
pub async fn create_checkpoint_store(
    db_path: Option<&Path>,
) -> Result<Arc<dyn CheckpointStore>, AgentError> {
    #[cfg(feature = "async-sqlite")]
    if let Some(path) = db_path {
        tracing::info!(path = %path.display(), "Using SQLite checkpoint store");
        let store = SqliteCheckpointStore::new(path).await?;
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "async-sqlite"))]
    if let Some(path) = db_path {
        tracing::warn!(
            path = %path.display(),
            "session.db_path set but async-sqlite feature is disabled, using memory store"
        );
    }

    Ok(Arc::new(MemoryCheckpointStore::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryCheckpointStore::new();
        assert!(store.get("s1").await.unwrap().is_none());

        let mut state = AgentState::new();
        state.begin_run("hi");
        store
            .put("s1", Checkpoint::new(state.clone(), Some(NodeId::Router)))
            .await
            .unwrap();
        let cp = store.get("s1").await.unwrap().unwrap();
        assert_eq!(cp.state, state);
        assert_eq!(cp.next, Some(NodeId::Router));
        assert!(!cp.is_paused());
        assert_eq!(store.len().await.unwrap(), 1);

        assert!(store.remove("s1").await.unwrap());
        assert!(!store.remove("s1").await.unwrap());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let store = MemoryCheckpointStore::new();
        let mut old = Checkpoint::new(AgentState::new(), None);
        old.updated_at = Utc::now() - chrono::Duration::hours(2);
        store.put("old", old).await.unwrap();
        let mut waiting = AgentState::new();
        waiting.user_approval_needed = true;
        let mut paused = Checkpoint::new(waiting, Some(NodeId::Approval));
        paused.updated_at = Utc::now() - chrono::Duration::hours(2);
        store.put("paused", paused).await.unwrap();
        store
            .put("fresh", Checkpoint::new(AgentState::new(), None))
            .await
            .unwrap();

        let removed = store
            .cleanup_expired(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("fresh").await.unwrap().is_some());
        assert!(store.get("paused").await.unwrap().unwrap().is_paused());
    }

    #[tokio::test]
    async fn test_paused_checkpoint() {
        let mut state = AgentState::new();
        state.user_approval_needed = true;
        assert!(Checkpoint::new(state.clone(), Some(NodeId::Approval)).is_paused());
        assert!(!Checkpoint::new(state, None).is_paused());
    }
}
