//! Forager CLI
//!
//! 入口：初始化日志、加载配置与偏好、创建 Agent 运行时，并运行基于 stdin 的对话循环。
//! 每个节点完成时打印一行；遇到审批点时询问 `Approve? (y/n)`。

use std::path::PathBuf;

use anyhow::Context;
use forager::config::load_config_or_default;
use forager::core::{AgentError, StateUpdate};
use forager::memory::Role;
use forager::observability;
use forager::workflow::{GraphEvent, RunOutcome};
use forager::AgentRuntime;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

type InputLines = Lines<BufReader<Stdin>>;

/// 一次驱动图的动作
enum Step<'a> {
    Message(&'a str),
    Approve(bool),
    Retry,
}

fn preview(text: &str, max: usize) -> String {
    let line = text.replace('\n', " ");
    if line.chars().count() > max {
        format!("{}…", line.chars().take(max).collect::<String>())
    } else {
        line
    }
}

/// 节点更新的一行摘要
fn describe_update(update: &StateUpdate) -> String {
    let mut parts = Vec::new();
    if let Some(mode) = update.mode {
        parts.push(format!("mode={}", mode));
    }
    if let Some(plan) = &update.plan {
        parts.push(format!("plan: {}", plan.join(" | ")));
    }
    if let Some(step) = update.current_step {
        parts.push(format!("step={}", step));
    }
    if let Some(count) = update.review_count {
        parts.push(format!("review #{}", count));
    }
    if let Some(m) = update.messages.last() {
        let text = match (&m.tool_call, m.role) {
            (Some(call), _) => format!("call {} {}", call.tool, call.args),
            (None, Role::Tool) => format!("result: {}", preview(&m.content, 120)),
            (None, _) => preview(&m.content, 120),
        };
        parts.push(text);
    }
    if parts.is_empty() {
        "done".to_string()
    } else {
        parts.join("; ")
    }
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<GraphEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            GraphEvent::Node { node, update } => println!("[{}] {}", node, describe_update(&update)),
            GraphEvent::Suspended { node, action } => {
                println!("[{}] paused: approval needed for {}", node, action)
            }
            GraphEvent::Finished {
                mode,
                reply,
                review_count,
            } => {
                let mode = mode.map(|m| m.to_string()).unwrap_or_else(|| "-".to_string());
                println!("--- {} (reviews: {}) ---", mode, review_count);
                println!("{}\n", reply.unwrap_or_default());
            }
            GraphEvent::Error { message } => println!("[error] {}", message),
        }
    }
}

async fn drive(
    runtime: &AgentRuntime,
    session_id: &str,
    step: Step<'_>,
) -> Result<RunOutcome, AgentError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let printer = tokio::spawn(print_events(rx));
    let result = match step {
        Step::Message(text) => runtime.process_message(session_id, text, Some(&tx)).await,
        Step::Approve(approved) => runtime.approve(session_id, approved, Some(&tx)).await,
        Step::Retry => runtime.retry(session_id, Some(&tx)).await,
    };
    drop(tx);
    let _ = printer.await;
    result
}

async fn prompt(text: &str) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

/// 挂起时循环询问审批，直到运行结束或出错；EOF 视为拒绝
async fn settle(
    runtime: &AgentRuntime,
    session_id: &str,
    lines: &mut InputLines,
    mut result: Result<RunOutcome, AgentError>,
) -> anyhow::Result<()> {
    while result.as_ref().is_ok_and(RunOutcome::is_suspended) {
        prompt("Approve? (y/n) ").await?;
        let answer = lines.next_line().await?.unwrap_or_default();
        let approved = matches!(answer.trim().to_lowercase().as_str(), "y" | "yes");
        result = drive(runtime, session_id, Step::Approve(approved)).await;
    }
    if let Err(e) = result {
        println!("Run failed: {}", e);
        if !matches!(e, AgentError::AwaitingApproval(_)) {
            println!("Type 'retry' to re-run the failed step.");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config_or_default(config_path);
    let runtime = AgentRuntime::new(cfg)
        .await
        .context("Failed to create agent runtime")?;

    let session_id = uuid::Uuid::new_v4().to_string();
    println!(
        "Forager ready (session {}, {} preferences). 'remember: <text>' saves a preference, 'quit' exits.",
        session_id,
        runtime.prefs().len()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt("> ").await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        match input.to_lowercase().as_str() {
            "quit" | "exit" => break,
            "retry" => {
                let result = drive(&runtime, &session_id, Step::Retry).await;
                settle(&runtime, &session_id, &mut lines, result).await?;
                continue;
            }
            _ => {}
        }
        if let Some(value) = input.strip_prefix("remember:") {
            match runtime.remember(value.trim()) {
                Ok(key) => println!("Saved preference {} (applies from next start)", key),
                Err(e) => println!("Failed to save preference: {:#}", e),
            }
            continue;
        }

        let result = drive(&runtime, &session_id, Step::Message(input)).await;
        settle(&runtime, &session_id, &mut lines, result).await?;
    }

    Ok(())
}
