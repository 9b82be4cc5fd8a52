//! SQLite 检查点存储
//!
//! 每个会话一行：state 为 JSON 序列化的 AgentState，next 为节点名，updated_at 为 RFC 3339 时间，服务重启后可恢复暂停的会话。

#![cfg(feature = "async-sqlite")]

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use super::store::{expiry_cutoff, Checkpoint, CheckpointStore};
use crate::core::{AgentError, AgentState};
use crate::workflow::NodeId;

/// SQLite 检查点存储
pub struct SqliteCheckpointStore {
    pool: sqlx::sqlite::SqlitePool,
}

fn store_err(e: impl std::fmt::Display) -> AgentError {
    AgentError::Store(e.to_string())
}

impl SqliteCheckpointStore {
    /// 打开（必要时创建）数据库并建表
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(store_err)?;

        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    /// 初始化数据库表
    async fn init_tables(&self) -> Result<(), AgentError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                session_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                next_node TEXT,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_checkpoints_updated ON checkpoints(updated_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(())
    }
}

fn encode_node(node: Option<NodeId>) -> Result<Option<String>, AgentError> {
    node.map(|n| {
        serde_json::to_value(n)
            .map_err(store_err)
            .and_then(|v| v.as_str().map(String::from).ok_or_else(|| store_err("node id")))
    })
    .transpose()
}

fn decode_node(raw: Option<String>) -> Result<Option<NodeId>, AgentError> {
    raw.map(|s| serde_json::from_value(serde_json::Value::String(s)).map_err(store_err))
        .transpose()
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn get(&self, session_id: &str) -> Result<Option<Checkpoint>, AgentError> {
        let row = sqlx::query(
            "SELECT state, next_node, updated_at FROM checkpoints WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let state_json: String = row.get("state");
        let next_raw: Option<String> = row.get("next_node");
        let updated_raw: String = row.get("updated_at");

        let state: AgentState = serde_json::from_str(&state_json).map_err(store_err)?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_raw)
            .map_err(store_err)?
            .with_timezone(&Utc);
        Ok(Some(Checkpoint {
            state,
            next: decode_node(next_raw)?,
            updated_at,
        }))
    }

    async fn put(&self, session_id: &str, checkpoint: Checkpoint) -> Result<(), AgentError> {
        let state_json = serde_json::to_string(&checkpoint.state).map_err(store_err)?;
        sqlx::query(
            "INSERT INTO checkpoints (session_id, state, next_node, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
                state = excluded.state,
                next_node = excluded.next_node,
                updated_at = excluded.updated_at",
        )
        .bind(session_id)
        .bind(state_json)
        .bind(encode_node(checkpoint.next)?)
        .bind(checkpoint.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<bool, AgentError> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE session_id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(store_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn cleanup_expired(&self, max_idle: Duration) -> Result<usize, AgentError> {
        let cutoff = expiry_cutoff(max_idle).to_rfc3339();
        let result = sqlx::query(
            "DELETE FROM checkpoints WHERE updated_at < ?
             AND NOT (next_node IS NOT NULL
                      AND COALESCE(json_extract(state, '$.user_approval_needed'), 0) = 1)",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(store_err)?;
        Ok(result.rows_affected() as usize)
    }

    async fn len(&self) -> Result<usize, AgentError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM checkpoints")
            .fetch_one(&self.pool)
            .await
            .map_err(store_err)?;
        let n: i64 = row.get("n");
        Ok(n as usize)
    }
}
