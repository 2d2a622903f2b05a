//! Integration tests for ThinkFlow
//!
//! These drive the dispatcher end to end over the SQLite store: full flow
//! runs, fan-out ordering and restart resume, quality gating, format
//! rejection, session recovery, and cross-session independence.

use std::path::Path;
use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::TempDir;

use thinkflow::flow::{FlowRegistry, StepResolver};
use thinkflow::prompts::PromptLoader;
use thinkflow::state::{SessionMutation, SessionStore, SqliteSessionStore, StateError};
use thinkflow::tools::{NextAction, ToolContext, ToolDispatcher, ToolEnvelope};

fn context_at(store_dir: &Path) -> ToolContext {
    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::open(store_dir).expect("store opens"));
    ToolContext::new(
        Arc::new(FlowRegistry::builtin().expect("builtin flows load")),
        store,
        Arc::new(PromptLoader::embedded_only()),
        StepResolver::default(),
    )
}

async fn start(dispatcher: &ToolDispatcher, ctx: &ToolContext, flow_type: &str, topic: &str) -> ToolEnvelope {
    dispatcher
        .execute("start_thinking", json!({"topic": topic, "flow_type": flow_type}), ctx)
        .await
        .expect("start_thinking succeeds")
}

async fn advance(dispatcher: &ToolDispatcher, ctx: &ToolContext, session_id: &str, result: Value) -> ToolEnvelope {
    dispatcher
        .execute(
            "advance_thinking",
            json!({"session_id": session_id, "step_result": result}),
            ctx,
        )
        .await
        .expect("advance_thinking succeeds")
}

// =============================================================================
// Flow completion
// =============================================================================

#[tokio::test]
async fn test_linear_flow_completes_exactly_once() {
    let temp = TempDir::new().unwrap();
    let ctx = context_at(temp.path());
    let dispatcher = ToolDispatcher::standard();

    let envelope = start(&dispatcher, &ctx, "quick_analysis", "why is the sky blue").await;
    let session_id = envelope.session_id.clone();
    assert_eq!(envelope.step, "clarify");

    let mut completions = 0;
    for result in ["clarified", "analyzed", "concluded"] {
        let envelope = advance(&dispatcher, &ctx, &session_id, json!(result)).await;
        if envelope.next_action == NextAction::SessionComplete {
            completions += 1;
        }
    }
    assert_eq!(completions, 1);

    let stored = ctx.store.get(&session_id).unwrap().unwrap();
    assert!(stored.state.is_completed());
    assert_eq!(stored.state.step_results.len(), 3);
}

// =============================================================================
// Fan-out over comprehensive_analysis sub-questions
// =============================================================================

#[tokio::test]
async fn test_fan_out_seven_items_in_order_then_advance() {
    let temp = TempDir::new().unwrap();
    let ctx = context_at(temp.path());
    let dispatcher = ToolDispatcher::standard();

    let envelope = start(&dispatcher, &ctx, "comprehensive_analysis", "topic-X").await;
    let session_id = envelope.session_id.clone();
    assert_eq!(envelope.step, "decompose");

    let sub_questions: Vec<Value> = (1..=7).map(|i| json!({"id": format!("SQ{i}")})).collect();
    let envelope = advance(&dispatcher, &ctx, &session_id, json!({"sub_questions": sub_questions})).await;

    // First fan-out directive serves item 0
    assert_eq!(envelope.step, "collect_evidence");
    assert!(envelope.prompt_text.contains("SQ1"));
    assert!(envelope.prompt_text.contains("1 of 7"));

    // The remaining items are served in order, one per call, no skips
    for i in 2..=7 {
        let envelope = advance(&dispatcher, &ctx, &session_id, json!(format!("evidence {}", i - 1))).await;
        assert_eq!(envelope.step, "collect_evidence");
        assert!(
            envelope.prompt_text.contains(&format!("SQ{i}")),
            "expected SQ{i} in: {}",
            envelope.prompt_text
        );
        assert!(envelope.prompt_text.contains(&format!("{i} of 7")));
    }

    // Only the 7th item result moves the flow to evaluate
    let envelope = advance(&dispatcher, &ctx, &session_id, json!("evidence 7")).await;
    assert_eq!(envelope.step, "evaluate");

    let stored = ctx.store.get(&session_id).unwrap().unwrap();
    assert!(stored.state.fan_out_cursor.is_none());
}

#[tokio::test]
async fn test_fan_out_resumes_after_process_restart() {
    let temp = TempDir::new().unwrap();
    let dispatcher = ToolDispatcher::standard();

    let session_id = {
        let ctx = context_at(temp.path());
        let envelope = start(&dispatcher, &ctx, "comprehensive_analysis", "restart test").await;
        let session_id = envelope.session_id.clone();

        let sub_questions: Vec<Value> = (1..=4).map(|i| json!({"id": format!("SQ{i}")})).collect();
        advance(&dispatcher, &ctx, &session_id, json!({"sub_questions": sub_questions})).await;
        advance(&dispatcher, &ctx, &session_id, json!("evidence 1")).await;
        // Cursor now persisted mid-iteration at index 1; drop everything
        session_id
    };

    // Fresh store handle over the same directory, as after a restart
    let ctx = context_at(temp.path());
    let stored = ctx.store.get(&session_id).unwrap().unwrap();
    let cursor = stored.state.fan_out_cursor.as_ref().expect("cursor survived restart");
    assert_eq!(cursor.next_index, 1);

    // Resumes at the persisted index, not index 0
    let envelope = advance(&dispatcher, &ctx, &session_id, json!("evidence 2")).await;
    assert!(envelope.prompt_text.contains("SQ3"));
    assert!(envelope.prompt_text.contains("3 of 4"));

    advance(&dispatcher, &ctx, &session_id, json!("evidence 3")).await;
    let envelope = advance(&dispatcher, &ctx, &session_id, json!("evidence 4")).await;
    assert_eq!(envelope.step, "evaluate");
}

// =============================================================================
// Quality gate
// =============================================================================

#[tokio::test]
async fn test_quality_gate_blocks_then_passes() {
    let temp = TempDir::new().unwrap();
    let ctx = context_at(temp.path());
    let dispatcher = ToolDispatcher::standard();

    let envelope = start(&dispatcher, &ctx, "quick_analysis", "gate test").await;
    let session_id = envelope.session_id.clone();

    let envelope = dispatcher
        .execute(
            "advance_thinking",
            json!({
                "session_id": session_id,
                "step_result": "shallow",
                "quality_feedback": {"score": 0.3, "feedback": "dig deeper"}
            }),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(envelope.next_action, NextAction::ImproveResult);
    assert_eq!(envelope.step, "clarify");
    assert!(!envelope.metadata.quality_gate_passed);

    // current_step never moved, but the rejected result is visible
    let stored = ctx.store.get(&session_id).unwrap().unwrap();
    assert_eq!(stored.state.current_step, "clarify");
    assert_eq!(stored.state.result("clarify"), Some(&json!("shallow")));

    let envelope = dispatcher
        .execute(
            "advance_thinking",
            json!({
                "session_id": session_id,
                "step_result": "much deeper",
                "quality_feedback": {"score": 0.9}
            }),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(envelope.next_action, NextAction::ContinueThinking);
    assert_eq!(envelope.step, "analyze");
    assert!(envelope.metadata.quality_gate_passed);
}

// =============================================================================
// Format validation
// =============================================================================

#[tokio::test]
async fn test_unparseable_structured_payload_never_persists() {
    let temp = TempDir::new().unwrap();
    let ctx = context_at(temp.path());
    let dispatcher = ToolDispatcher::standard();

    let envelope = start(&dispatcher, &ctx, "comprehensive_analysis", "format test").await;
    let session_id = envelope.session_id.clone();
    let version_before = ctx.store.get(&session_id).unwrap().unwrap().version;

    let envelope = advance(&dispatcher, &ctx, &session_id, json!("not structured at all")).await;
    assert_eq!(envelope.next_action, NextAction::FixFormat);
    assert_eq!(envelope.step, "decompose");

    let stored = ctx.store.get(&session_id).unwrap().unwrap();
    assert_eq!(stored.version, version_before);
    assert!(!stored.state.has_result("decompose"));

    // A string that parses as a JSON object is accepted
    let envelope = advance(
        &dispatcher,
        &ctx,
        &session_id,
        json!("{\"sub_questions\": [{\"id\": \"SQ1\"}]}"),
    )
    .await;
    assert_eq!(envelope.step, "collect_evidence");
}

// =============================================================================
// Session recovery
// =============================================================================

#[tokio::test]
async fn test_nonexistent_session_always_recovers() {
    let temp = TempDir::new().unwrap();
    let ctx = context_at(temp.path());
    let dispatcher = ToolDispatcher::standard();

    for payload in [json!("text"), json!({"structured": true}), json!(null)] {
        let envelope = dispatcher
            .execute(
                "advance_thinking",
                json!({"session_id": "never-created", "step_result": payload}),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(envelope.next_action, NextAction::RestartRequired);
        assert_eq!(envelope.step, "session_recovery");
    }
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test]
async fn test_concurrent_sessions_do_not_interfere() {
    let temp = TempDir::new().unwrap();
    let ctx = Arc::new(context_at(temp.path()));
    let dispatcher = Arc::new(ToolDispatcher::standard());

    let n = 8;
    let mut handles = Vec::new();
    for worker in 0..n {
        let ctx = Arc::clone(&ctx);
        let dispatcher = Arc::clone(&dispatcher);
        handles.push(tokio::spawn(async move {
            let topic = format!("worker {worker}");
            let envelope = start(&dispatcher, &ctx, "quick_analysis", &topic).await;
            let session_id = envelope.session_id.clone();

            for step in ["clarify", "analyze", "conclude"] {
                advance(&dispatcher, &ctx, &session_id, json!(format!("{topic}: {step}"))).await;
            }
            session_id
        }));
    }

    let mut session_ids = Vec::new();
    for handle in handles {
        session_ids.push(handle.await.unwrap());
    }

    // Every session completed independently with its own results
    let all = ctx.store.list(&[]).unwrap();
    assert_eq!(all.len(), n);
    for (worker, session_id) in session_ids.iter().enumerate() {
        let stored = ctx.store.get(session_id).unwrap().unwrap();
        assert!(stored.state.is_completed());
        assert_eq!(
            stored.state.result("clarify"),
            Some(&json!(format!("worker {worker}: clarify")))
        );
    }
}

#[tokio::test]
async fn test_conflicting_writers_one_wins() {
    let temp = TempDir::new().unwrap();
    let ctx = context_at(temp.path());
    let dispatcher = ToolDispatcher::standard();

    let envelope = start(&dispatcher, &ctx, "quick_analysis", "conflict test").await;
    let session_id = envelope.session_id.clone();

    // Two writers computed from the same read
    let read = ctx.store.get(&session_id).unwrap().unwrap();

    let mut first = SessionMutation::new(read.version);
    first.record_result("clarify", json!("first writer"));
    ctx.store.apply(&session_id, &first).unwrap();

    let mut second = SessionMutation::new(read.version);
    second.record_result("clarify", json!("second writer"));
    let err = ctx.store.apply(&session_id, &second).unwrap_err();
    assert!(matches!(err, StateError::Conflict(_)));

    let stored = ctx.store.get(&session_id).unwrap().unwrap();
    assert_eq!(stored.state.result("clarify"), Some(&json!("first writer")));
}

// =============================================================================
// Early completion
// =============================================================================

#[tokio::test]
async fn test_complete_thinking_mid_flow() {
    let temp = TempDir::new().unwrap();
    let ctx = context_at(temp.path());
    let dispatcher = ToolDispatcher::standard();

    let envelope = start(&dispatcher, &ctx, "comprehensive_analysis", "early exit").await;
    let session_id = envelope.session_id.clone();

    let envelope = dispatcher
        .execute(
            "complete_thinking",
            json!({"session_id": session_id, "final_insights": "answered after one step"}),
            &ctx,
        )
        .await
        .unwrap();
    assert_eq!(envelope.next_action, NextAction::SessionComplete);

    let stored = ctx.store.get(&session_id).unwrap().unwrap();
    assert!(stored.state.is_completed());
    assert_eq!(
        stored.state.result("final_insights"),
        Some(&json!("answered after one step"))
    );

    // A late advance gets the stable completion envelope, not an error
    let envelope = advance(&dispatcher, &ctx, &session_id, json!("too late")).await;
    assert_eq!(envelope.next_action, NextAction::SessionComplete);
}
