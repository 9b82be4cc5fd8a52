//! 执行图端到端场景测试（脚本化 LLM）

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use forager::config::AppConfig;
    use forager::core::{AgentError, Mode};
    use forager::llm::{LlmClient, LlmError, RecordingSleeper, RetryConfig, RetryingLlmClient, ScriptedLlmClient};
    use forager::memory::Role;
    use forager::nodes::prompts::EXPLAIN_TEXT;
    use async_trait::async_trait;
    use forager::session::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
    use forager::workflow::{GraphEvent, NodeId, RunOutcome};
    use forager::AgentRuntime;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    const SESSION: &str = "test-session";

    fn test_config(dir: &Path) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.tools.notes_dir = dir.join("notes");
        cfg.app.prefs_path = dir.join("user_prefs.json");
        cfg
    }

    fn runtime_with(dir: &TempDir, llm: Arc<dyn LlmClient>) -> AgentRuntime {
        AgentRuntime::from_parts(
            test_config(dir.path()),
            llm,
            Arc::new(MemoryCheckpointStore::new()),
        )
        .unwrap()
    }

    /// 读取带延迟的存储，模拟数据库 I/O
    struct SlowReadStore {
        inner: MemoryCheckpointStore,
        delay: Duration,
    }

    #[async_trait]
    impl CheckpointStore for SlowReadStore {
        async fn get(&self, session_id: &str) -> Result<Option<Checkpoint>, AgentError> {
            tokio::time::sleep(self.delay).await;
            self.inner.get(session_id).await
        }
        async fn put(&self, session_id: &str, checkpoint: Checkpoint) -> Result<(), AgentError> {
            self.inner.put(session_id, checkpoint).await
        }
        async fn remove(&self, session_id: &str) -> Result<bool, AgentError> {
            self.inner.remove(session_id).await
        }
        async fn cleanup_expired(&self, max_idle: Duration) -> Result<usize, AgentError> {
            self.inner.cleanup_expired(max_idle).await
        }
        async fn len(&self) -> Result<usize, AgentError> {
            self.inner.len().await
        }
    }

    fn scripted(replies: &[&str]) -> Arc<ScriptedLlmClient> {
        Arc::new(ScriptedLlmClient::from_texts(replies.iter().copied()))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<GraphEvent>) -> Vec<GraphEvent> {
        let mut events = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            events.push(ev);
        }
        events
    }

    fn node_order(events: &[GraphEvent]) -> Vec<NodeId> {
        events
            .iter()
            .filter_map(|ev| match ev {
                GraphEvent::Node { node, .. } => Some(*node),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_research_run_ends_with_single_report() {
        let dir = tempfile::tempdir().unwrap();
        let llm = scripted(&[
            r#"{"mode": "research"}"#,
            r#"["Find what Rust is", "Compute a figure", "Summarise adoption"]"#,
            "Rust is a systems language.",
            r#"Need arithmetic. {"tool": "calculate", "args": {"expression": "2 + 3 * 4"}}"#,
            "The figure is 14.",
            "Adoption is growing.",
            "Final report: Rust is a systems language; the figure is 14.",
            r#"{"status": "pass", "feedback": ""}"#,
        ]);
        let runtime = runtime_with(&dir, llm.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = runtime
            .process_message(SESSION, "Research Rust for me", Some(&tx))
            .await
            .unwrap();
        assert!(!outcome.is_suspended());
        assert_eq!(
            outcome.reply(),
            Some("Final report: Rust is a systems language; the figure is 14.")
        );
        assert_eq!(llm.calls(), 8);
        assert_eq!(llm.remaining(), 0);

        let state = outcome.state();
        assert_eq!(state.mode, Some(Mode::Research));
        assert_eq!(state.plan.len(), 3);
        assert_eq!(state.current_step, 3);
        assert_eq!(state.review_count, 1);
        assert!(state
            .research_notes
            .contains("Step 1 Result:\nRust is a systems language."));
        assert!(state.research_notes.contains("Step 2 Result:\nThe figure is 14."));
        assert!(state.research_notes.contains("Step 3 Result:\nAdoption is growing."));
        let reports = state
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant && m.content.starts_with("Final report"))
            .count();
        assert_eq!(reports, 1);
        let observation = state
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert_eq!(observation.tool_name.as_deref(), Some("calculate"));
        assert!(observation.content.contains("14"));

        let events = drain(&mut rx);
        assert_eq!(
            node_order(&events),
            vec![
                NodeId::Router,
                NodeId::Planner,
                NodeId::Executor,
                NodeId::StepManager,
                NodeId::Executor,
                NodeId::Tools,
                NodeId::Executor,
                NodeId::StepManager,
                NodeId::Executor,
                NodeId::StepManager,
                NodeId::Reporter,
                NodeId::Validator,
            ]
        );
        assert!(matches!(events.last(), Some(GraphEvent::Finished { .. })));
    }

    #[tokio::test]
    async fn test_explain_fast_path_skips_model() {
        let dir = tempfile::tempdir().unwrap();
        let llm = scripted(&[]);
        let runtime = runtime_with(&dir, llm.clone());

        let outcome = runtime
            .process_message(SESSION, "Explain your graph", None)
            .await
            .unwrap();
        assert_eq!(outcome.reply(), Some(EXPLAIN_TEXT));
        assert_eq!(outcome.state().mode, Some(Mode::Explain));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_save_to_notes_pauses_then_approve_writes_note() {
        let dir = tempfile::tempdir().unwrap();
        let llm = scripted(&[
            r#"{"mode": "research"}"#,
            r#"{"steps": ["Record the key fact"]}"#,
            "I should record this.\n```json\n{\"tool\": \"save_to_notes\", \"args\": {\"content\": \"Rust is fast\", \"topic\": \"rust facts\"}}\n```",
            "Saved the key fact.",
            "Report: Rust is fast.",
            r#"{"status": "pass"}"#,
        ]);
        let runtime = runtime_with(&dir, llm.clone());
        let note_path = dir.path().join("notes").join("rust_facts.txt");
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = runtime
            .process_message(SESSION, "Research Rust speed and save notes", Some(&tx))
            .await
            .unwrap();
        match &outcome {
            RunOutcome::Suspended { node, action, .. } => {
                assert_eq!(*node, NodeId::Approval);
                assert!(action.starts_with("save_to_notes"));
            }
            other => panic!("expected suspension, got {other:?}"),
        }
        assert!(matches!(
            drain(&mut rx).last(),
            Some(GraphEvent::Suspended { .. })
        ));
        assert!(!note_path.exists());

        let cp = runtime.checkpoint(SESSION).await.unwrap().unwrap();
        assert!(cp.is_paused());
        assert_eq!(cp.next, Some(NodeId::Approval));
        assert!(cp.state.user_approval_needed);

        // 暂停期间新消息被拒绝
        assert!(matches!(
            runtime.process_message(SESSION, "hello?", None).await,
            Err(AgentError::AwaitingApproval(_))
        ));

        let outcome = runtime.approve(SESSION, true, Some(&tx)).await.unwrap();
        assert_eq!(outcome.reply(), Some("Report: Rust is fast."));
        let note = std::fs::read_to_string(&note_path).unwrap();
        assert!(note.contains("Rust is fast"));
        assert!(note.starts_with("\n\n--- "));

        let state = outcome.state();
        assert!(!state.user_approval_needed);
        assert_eq!(state.current_step, 1);
        assert!(state.research_notes.contains("Step 1 Result:\nSaved the key fact."));
        assert_eq!(
            node_order(&drain(&mut rx)),
            vec![
                NodeId::Approval,
                NodeId::Tools,
                NodeId::Executor,
                NodeId::StepManager,
                NodeId::Reporter,
                NodeId::Validator,
            ]
        );
    }

    #[tokio::test]
    async fn test_concurrent_approvals_run_tool_once() {
        let dir = tempfile::tempdir().unwrap();
        let llm = scripted(&[
            r#"{"mode": "quick"}"#,
            r#"{"tool": "save_to_notes", "args": {"content": "only once", "topic": "once"}}"#,
            "Saved it.",
            r#"{"status": "pass"}"#,
        ]);
        let store = Arc::new(SlowReadStore {
            inner: MemoryCheckpointStore::new(),
            delay: Duration::from_millis(30),
        });
        let runtime = AgentRuntime::from_parts(test_config(dir.path()), llm.clone(), store).unwrap();

        let outcome = runtime
            .process_message(SESSION, "Note this down", None)
            .await
            .unwrap();
        assert!(outcome.is_suspended());

        let (first, second) = tokio::join!(
            runtime.approve(SESSION, true, None),
            runtime.approve(SESSION, true, None)
        );
        let (ok, rejected): (Vec<_>, Vec<_>) = [first, second].into_iter().partition(Result::is_ok);
        assert_eq!(ok.len(), 1);
        assert!(matches!(
            rejected.as_slice(),
            [Err(AgentError::NoPendingApproval(_))]
        ));

        let note = std::fs::read_to_string(dir.path().join("notes").join("once.txt")).unwrap();
        assert_eq!(note.matches("only once").count(), 1);
        assert_eq!(llm.remaining(), 0);
    }

    #[tokio::test]
    async fn test_denied_approval_skips_tool_and_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let llm = scripted(&[
            r#"{"mode": "research"}"#,
            r#"["Record the key fact"]"#,
            r#"{"tool": "save_to_notes", "args": {"content": "secret"}}"#,
            "Report without saved notes.",
            r#"{"status": "pass"}"#,
        ]);
        let runtime = runtime_with(&dir, llm.clone());

        let outcome = runtime
            .process_message(SESSION, "Research and save", None)
            .await
            .unwrap();
        assert!(outcome.is_suspended());

        let outcome = runtime.approve(SESSION, false, None).await.unwrap();
        assert_eq!(outcome.reply(), Some("Report without saved notes."));
        assert!(!dir.path().join("notes").join("general.txt").exists());

        let state = outcome.state();
        let denial = state
            .messages
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        assert_eq!(
            denial.content,
            "Denied by user: save_to_notes was not executed"
        );
        assert!(state
            .research_notes
            .contains("Step 1 Result:\nskipped (user denied save_to_notes)"));
        assert_eq!(llm.remaining(), 0);
    }

    #[tokio::test]
    async fn test_quick_feedback_loop() {
        let dir = tempfile::tempdir().unwrap();
        let llm = scripted(&[
            r#"{"mode": "quick"}"#,
            "Rust is a language.",
            r#"{"status": "fail", "feedback": "too vague"}"#,
            "Rust is a systems programming language focused on memory safety.",
            r#"{"status": "pass"}"#,
        ]);
        let runtime = runtime_with(&dir, llm.clone());

        let outcome = runtime
            .process_message(SESSION, "What is Rust?", None)
            .await
            .unwrap();
        assert_eq!(
            outcome.reply(),
            Some("Rust is a systems programming language focused on memory safety.")
        );
        let state = outcome.state();
        assert_eq!(state.mode, Some(Mode::Quick));
        assert_eq!(state.review_count, 2);
        assert!(state
            .messages
            .iter()
            .any(|m| m.content == "Reviewer Feedback: too vague"));
        assert_eq!(llm.calls(), 5);
    }

    #[tokio::test]
    async fn test_review_limit_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let fail = r#"{"status": "fail", "feedback": "still wrong"}"#;
        let llm = scripted(&[
            r#"{"mode": "quick"}"#,
            "answer 1",
            fail,
            "answer 2",
            fail,
            "answer 3",
            fail,
        ]);
        let runtime = runtime_with(&dir, llm.clone());

        let outcome = runtime
            .process_message(SESSION, "Tell me something", None)
            .await
            .unwrap();
        let state = outcome.state();
        assert_eq!(state.review_count, 3);
        assert_eq!(outcome.reply(), Some("answer 3"));
        let last = state.last_message().unwrap();
        assert_eq!(last.role, Role::System);
        assert!(last.content.starts_with("Review limit reached"));
        assert_eq!(llm.remaining(), 0);
    }

    #[tokio::test]
    async fn test_quick_sensitive_call_goes_through_gate() {
        let dir = tempfile::tempdir().unwrap();
        let llm = scripted(&[
            r#"{"mode": "quick"}"#,
            r#"{"tool": "save_to_notes", "args": {"content": "remember this"}}"#,
            "Okay, I did not save it.",
            r#"{"status": "pass"}"#,
        ]);
        let runtime = runtime_with(&dir, llm.clone());

        let outcome = runtime
            .process_message(SESSION, "Note this down", None)
            .await
            .unwrap();
        assert!(outcome.is_suspended());
        let outcome = runtime.approve(SESSION, false, None).await.unwrap();
        assert_eq!(outcome.reply(), Some("Okay, I did not save it."));
        assert_eq!(outcome.state().review_count, 1);
    }

    #[tokio::test]
    async fn test_resume_without_pending_approval() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = runtime_with(&dir, scripted(&[]));
        assert!(matches!(
            runtime.approve("nobody", true, None).await,
            Err(AgentError::NoPendingApproval(_))
        ));

        runtime
            .process_message(SESSION, "explain yourself", None)
            .await
            .unwrap();
        assert!(matches!(
            runtime.approve(SESSION, true, None).await,
            Err(AgentError::NoPendingApproval(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_node_can_be_retried() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Ok(r#"{"mode": "quick"}"#.to_string()),
            Err(LlmError::Api("400 bad request".to_string())),
        ]));
        let runtime = runtime_with(&dir, llm.clone());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let err = runtime
            .process_message(SESSION, "hi", Some(&tx))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Llm(LlmError::Api(_))));
        assert!(matches!(
            drain(&mut rx).last(),
            Some(GraphEvent::Error { .. })
        ));
        let cp = runtime.checkpoint(SESSION).await.unwrap().unwrap();
        assert_eq!(cp.next, Some(NodeId::Chat));

        llm.push(Ok("Hello!".to_string()));
        llm.push(Ok(r#"{"status": "pass"}"#.to_string()));
        let outcome = runtime.retry(SESSION, None).await.unwrap();
        assert_eq!(outcome.reply(), Some("Hello!"));
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried_with_backoff() {
        let dir = tempfile::tempdir().unwrap();
        let inner = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::RateLimited("429 Too Many Requests".to_string())),
            Err(LlmError::Api("503 Service Unavailable".to_string())),
            Ok(r#"{"mode": "quick"}"#.to_string()),
            Ok("Hi there.".to_string()),
            Ok(r#"{"status": "pass"}"#.to_string()),
        ]));
        let sleeper = Arc::new(RecordingSleeper::new());
        let llm = RetryingLlmClient::new(
            inner.clone(),
            RetryConfig::new(3, Duration::from_secs(1)),
        )
        .with_sleeper(sleeper.clone());
        let runtime = runtime_with(&dir, Arc::new(llm));

        let outcome = runtime.process_message(SESSION, "hello", None).await.unwrap();
        assert_eq!(outcome.reply(), Some("Hi there."));
        assert_eq!(inner.calls(), 5);
        assert_eq!(
            sleeper.recorded(),
            vec![Duration::from_secs(2), Duration::from_secs(4)]
        );
    }

    #[tokio::test]
    async fn test_messages_accumulate_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let llm = scripted(&[
            r#"{"mode": "quick"}"#,
            "First answer.",
            r#"{"status": "pass"}"#,
            r#"{"mode": "quick"}"#,
            "Second answer.",
            r#"{"status": "pass"}"#,
        ]);
        let runtime = runtime_with(&dir, llm.clone());

        let first = runtime.process_message(SESSION, "one", None).await.unwrap();
        let before = first.state().messages.len();
        let second = runtime.process_message(SESSION, "two", None).await.unwrap();
        assert!(second.state().messages.len() > before);
        assert_eq!(second.state().review_count, 1);
        assert_eq!(second.reply(), Some("Second answer."));
    }
}
