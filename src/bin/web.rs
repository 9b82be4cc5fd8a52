//! Forager Web API
//!
//! 启动: cargo run --bin forager-web --features web
//! 接口均返回 NDJSON（每行一个 JSON 事件），首行携带 session_id。

#![cfg(feature = "web")]

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use forager::config::load_config_or_default;
use forager::core::Mode;
use forager::observability;
use forager::workflow::{GraphEvent, NodeId};
use forager::AgentRuntime;

/// 会话清理周期
const CLEANUP_INTERVAL_SECS: u64 = 600;

struct AppState {
    runtime: AgentRuntime,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApproveRequest {
    session_id: String,
    approved: bool,
}

/// GET /api/session/:id 的返回
#[derive(Debug, Serialize)]
struct SessionSummary {
    session_id: String,
    paused: bool,
    next: Option<NodeId>,
    mode: Option<Mode>,
    approval_action: Option<String>,
    plan: Vec<String>,
    current_step: usize,
    review_count: u32,
    messages: usize,
    last_reply: Option<String>,
    updated_at: String,
}

fn json_line(value: &impl Serialize) -> String {
    let line = serde_json::to_string(value).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "message": e.to_string() }).to_string()
    });
    format!("{}\n", line)
}

fn session_line(session_id: &str) -> String {
    json_line(&serde_json::json!({
        "type": "session_id",
        "session_id": session_id
    }))
}

fn ndjson(body: Body) -> Response {
    let mut res = Response::new(body);
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/x-ndjson; charset=utf-8"),
    );
    res
}

/// 单行（或几行）固定内容的 NDJSON 响应
fn ndjson_lines(lines: String) -> Response {
    ndjson(Body::from(lines))
}

/// 事件流：先发 first_line，之后每个 GraphEvent 一行，发送端关闭即结束
fn ndjson_stream(first_line: String, event_rx: mpsc::UnboundedReceiver<GraphEvent>) -> Response {
    let stream = stream::try_unfold(
        (event_rx, Some(first_line)),
        |(mut event_rx, first_line_opt)| async move {
            if let Some(line) = first_line_opt {
                return Ok::<_, std::convert::Infallible>(Some((
                    Bytes::from(line),
                    (event_rx, None),
                )));
            }
            match event_rx.recv().await {
                Some(ev) => Ok(Some((Bytes::from(json_line(&ev)), (event_rx, None)))),
                None => Ok(None),
            }
        },
    );
    ndjson(Body::from_stream(stream))
}

/// POST /api/chat/stream：跑一轮对话；会话正等待审批时只返回一行 paused
async fn api_chat_stream(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, (StatusCode, String)> {
    let message = req.message.trim().to_string();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is required".to_string()));
    }
    let session_id = req
        .session_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let checkpoint = state
        .runtime
        .checkpoint(&session_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    if let Some(cp) = checkpoint.filter(|cp| cp.is_paused()) {
        return Ok(ndjson_lines(json_line(&serde_json::json!({
            "type": "paused",
            "session_id": session_id,
            "action": cp.state.approval_action,
        }))));
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel::<GraphEvent>();
    let state_spawn = Arc::clone(&state);
    let session_spawn = session_id.clone();
    tokio::spawn(async move {
        // 出错时引擎已推送 Error 事件
        let _ = state_spawn
            .runtime
            .process_message(&session_spawn, &message, Some(&event_tx))
            .await;
    });

    Ok(ndjson_stream(session_line(&session_id), event_rx))
}

/// POST /api/approve：批准 / 拒绝挂起的工具调用并继续
async fn api_approve(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ApproveRequest>,
) -> Result<Response, (StatusCode, String)> {
    let paused = state
        .runtime
        .checkpoint(&req.session_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .is_some_and(|cp| cp.is_paused());
    if !paused {
        return Ok(ndjson_lines(format!(
            "{}{}",
            session_line(&req.session_id),
            json_line(&serde_json::json!({
                "type": "error",
                "message": "No pending approval found."
            }))
        )));
    }

    let (event_tx, event_rx) = mpsc::unbounded_channel::<GraphEvent>();
    let state_spawn = Arc::clone(&state);
    let session_spawn = req.session_id.clone();
    let approved = req.approved;
    tokio::spawn(async move {
        let _ = state_spawn
            .runtime
            .approve(&session_spawn, approved, Some(&event_tx))
            .await;
    });

    Ok(ndjson_stream(session_line(&req.session_id), event_rx))
}

/// GET /api/session/:id：检查点摘要
async fn api_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSummary>, (StatusCode, String)> {
    let cp = state
        .runtime
        .checkpoint(&session_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "session not found".to_string()))?;

    let paused = cp.is_paused();
    let s = cp.state;
    Ok(Json(SessionSummary {
        session_id,
        paused,
        next: cp.next,
        mode: s.mode,
        last_reply: s.last_assistant_message().map(|m| m.content.clone()),
        approval_action: s.approval_action,
        plan: s.plan,
        current_step: s.current_step,
        review_count: s.review_count,
        messages: s.messages.len(),
        updated_at: cp.updated_at.to_rfc3339(),
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config_or_default(config_path);
    let port = cfg.web.port;
    let runtime = AgentRuntime::new(cfg).await?;
    let state = Arc::new(AppState { runtime });

    let app = Router::new()
        .route("/api/chat/stream", post(api_chat_stream))
        .route("/api/approve", post(api_approve))
        .route("/api/session/:id", get(api_session))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(Arc::clone(&state));

    // 定期清理空闲会话
    let cleanup_state = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(CLEANUP_INTERVAL_SECS));
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = cleanup_state.runtime.cleanup_expired().await {
                tracing::warn!("session cleanup failed: {}", e);
            }
        }
    });

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Forager Web API: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
