//! Integration tests for the turn orchestrator: tool folding, loop bounds,
//! retries, cancellation, and artifact propagation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use nutriagent_agent::{
    Orchestrator, OrchestratorConfig, Reasoning, ReasoningEngine, RetryPolicy, StreamEvent,
};
use nutriagent_core::{AgentError, AgentResult, Message, Role, ToolCall, ToolOutcome};
use nutriagent_session::{MemorySessionStore, SessionStore};
use nutriagent_tools::{Tool, ToolDescriptor, ToolRegistry};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// --- Scripted engines ---

/// Replays a fixed list of step results, counting calls.
struct ScriptedEngine {
    steps: tokio::sync::Mutex<VecDeque<AgentResult<Reasoning>>>,
    calls: AtomicU32,
}

impl ScriptedEngine {
    fn new(steps: Vec<AgentResult<Reasoning>>) -> Self {
        Self {
            steps: tokio::sync::Mutex::new(steps.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn next(&self) -> AgentResult<Reasoning> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.steps
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::ModelUnavailable("script exhausted".to_string())))
    }
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn reason(
        &self,
        _system_prompt: Option<&str>,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> AgentResult<Reasoning> {
        self.next().await
    }

    async fn reason_stream(
        &self,
        _system_prompt: Option<&str>,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> AgentResult<(mpsc::Receiver<String>, JoinHandle<AgentResult<Reasoning>>)> {
        Ok(stream_step(self.next().await?))
    }
}

/// Requests the same tool on every step, forever.
struct LoopingEngine {
    calls: AtomicU32,
}

impl LoopingEngine {
    fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }

    fn step(&self) -> Reasoning {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Reasoning::ToolRequests(vec![ToolCall {
            id: "loop".to_string(),
            name: "search_food".to_string(),
            arguments: json!({"query": "avocado"}),
        }])
    }
}

#[async_trait]
impl ReasoningEngine for LoopingEngine {
    async fn reason(
        &self,
        _system_prompt: Option<&str>,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> AgentResult<Reasoning> {
        Ok(self.step())
    }

    async fn reason_stream(
        &self,
        _system_prompt: Option<&str>,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> AgentResult<(mpsc::Receiver<String>, JoinHandle<AgentResult<Reasoning>>)> {
        Ok(stream_step(self.step()))
    }
}

/// Answers after a fixed delay.
struct SlowEngine {
    delay: Duration,
    text: String,
}

#[async_trait]
impl ReasoningEngine for SlowEngine {
    async fn reason(
        &self,
        _system_prompt: Option<&str>,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> AgentResult<Reasoning> {
        tokio::time::sleep(self.delay).await;
        Ok(Reasoning::Final {
            text: self.text.clone(),
        })
    }

    async fn reason_stream(
        &self,
        _system_prompt: Option<&str>,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> AgentResult<(mpsc::Receiver<String>, JoinHandle<AgentResult<Reasoning>>)> {
        tokio::time::sleep(self.delay).await;
        Ok(stream_step(Reasoning::Final {
            text: self.text.clone(),
        }))
    }
}

/// Streams one fragment, pauses, streams another, then finishes.
struct PausingEngine;

#[async_trait]
impl ReasoningEngine for PausingEngine {
    async fn reason(
        &self,
        _system_prompt: Option<&str>,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> AgentResult<Reasoning> {
        Ok(Reasoning::Final {
            text: "Hello world".to_string(),
        })
    }

    async fn reason_stream(
        &self,
        _system_prompt: Option<&str>,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> AgentResult<(mpsc::Receiver<String>, JoinHandle<AgentResult<Reasoning>>)> {
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            let _ = tx.send("Hello ".to_string()).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send("world".to_string()).await;
            drop(tx);
            Ok(Reasoning::Final {
                text: "Hello world".to_string(),
            })
        });
        Ok((rx, handle))
    }
}

/// Streams one fragment and then fails the step.
struct PartialFailEngine;

#[async_trait]
impl ReasoningEngine for PartialFailEngine {
    async fn reason(
        &self,
        _system_prompt: Option<&str>,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> AgentResult<Reasoning> {
        Err(AgentError::ModelUnavailable("upstream died".to_string()))
    }

    async fn reason_stream(
        &self,
        _system_prompt: Option<&str>,
        _history: &[Message],
        _tools: &[ToolDescriptor],
    ) -> AgentResult<(mpsc::Receiver<String>, JoinHandle<AgentResult<Reasoning>>)> {
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(async move {
            let _ = tx.send("Oops ".to_string()).await;
            drop(tx);
            Err(AgentError::ModelUnavailable("upstream died".to_string()))
        });
        Ok((rx, handle))
    }
}

/// Streams a step's final text word by word, then resolves to the step.
fn stream_step(step: Reasoning) -> (mpsc::Receiver<String>, JoinHandle<AgentResult<Reasoning>>) {
    let (tx, rx) = mpsc::channel(8);
    let handle = tokio::spawn(async move {
        if let Reasoning::Final { text } = &step {
            for chunk in text.split_inclusive(' ') {
                if tx.send(chunk.to_string()).await.is_err() {
                    break;
                }
            }
        }
        drop(tx);
        Ok(step)
    });
    (rx, handle)
}

fn final_step(text: &str) -> AgentResult<Reasoning> {
    Ok(Reasoning::Final {
        text: text.to_string(),
    })
}

fn tool_step(name: &str, arguments: serde_json::Value) -> AgentResult<Reasoning> {
    Ok(Reasoning::ToolRequests(vec![ToolCall {
        id: format!("call-{name}"),
        name: name.to_string(),
        arguments,
    }]))
}

// --- Stub tools ---

struct StubTool {
    descriptor: ToolDescriptor,
    response: String,
    artifact: Option<String>,
    transient_failures: AtomicU32,
    delay: Option<Duration>,
    invocations: AtomicU32,
}

impl StubTool {
    fn named(name: &str) -> Self {
        Self {
            descriptor: ToolDescriptor::new(
                name,
                "Stub tool",
                json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"]
                }),
            ),
            response: format!("{name} ok"),
            artifact: None,
            transient_failures: AtomicU32::new(0),
            delay: None,
            invocations: AtomicU32::new(0),
        }
    }

    fn with_artifact(mut self, locator: &str) -> Self {
        self.artifact = Some(locator.to_string());
        self
    }

    fn with_transient_failures(self, count: u32) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for StubTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, call: ToolCall) -> AgentResult<ToolOutcome> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.transient_failures.load(Ordering::SeqCst) > 0 {
            self.transient_failures.fetch_sub(1, Ordering::SeqCst);
            return Err(AgentError::ToolExecution {
                tool: call.name,
                reason: "upstream flake".to_string(),
                transient: true,
            });
        }
        let mut outcome = ToolOutcome::success(&call.id, &self.response);
        if let Some(locator) = &self.artifact {
            outcome = outcome.with_artifact(locator);
        }
        Ok(outcome)
    }
}

// --- Harness ---

fn instant_retry(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        backoff_base_ms: 0,
        backoff_max_ms: 0,
    }
}

fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        system_prompt: None,
        retry: instant_retry(2),
        ..OrchestratorConfig::default()
    }
}

fn build(
    engine: Arc<dyn ReasoningEngine>,
    registry: ToolRegistry,
    config: OrchestratorConfig,
) -> (Orchestrator, Arc<MemorySessionStore>) {
    let sessions = Arc::new(MemorySessionStore::new());
    let orchestrator = Orchestrator::new(engine, Arc::new(registry), sessions.clone(), config);
    (orchestrator, sessions)
}

async fn collect_events(stream: &mut nutriagent_agent::TurnStream) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    while let Some(event) = stream.events.recv().await {
        events.push(event);
    }
    events
}

// --- Turn shape ---

#[tokio::test]
async fn single_tool_turn_folds_history_in_order() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        tool_step("search_food", json!({"query": "avocado"})),
        final_step("Avocados have roughly 160 kcal per 100g."),
    ]));
    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(StubTool::named("search_food")))
        .unwrap();
    let (orchestrator, sessions) = build(engine, registry, test_config());

    let output = orchestrator.run(Some("s1"), "find avocado").await.unwrap();
    assert_eq!(output.thread_id, "s1");
    assert!(output.response.contains("160 kcal"));

    let history = sessions.history("s1").await.unwrap();
    assert_eq!(history.len(), 3, "expected user, tool, assistant");
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "find avocado");
    assert_eq!(history[1].role, Role::Tool);
    assert!(history[1].content.contains("search_food"));
    assert_eq!(history[2].role, Role::Assistant);
}

#[tokio::test]
async fn multiple_requests_in_one_step_dispatch_in_request_order() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        Ok(Reasoning::ToolRequests(vec![
            ToolCall {
                id: "call-a".to_string(),
                name: "search_food".to_string(),
                arguments: json!({"query": "lentils"}),
            },
            ToolCall {
                id: "call-b".to_string(),
                name: "get_nutrition".to_string(),
                arguments: json!({"query": "lentils"}),
            },
        ])),
        final_step("Lentils looked up."),
    ]));
    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(StubTool::named("search_food")))
        .unwrap();
    registry
        .register(Arc::new(StubTool::named("get_nutrition")))
        .unwrap();
    let (orchestrator, sessions) = build(engine, registry, test_config());

    let mut stream = orchestrator
        .open_stream(Some("s1"), "lentils please")
        .await
        .unwrap();
    let events = collect_events(&mut stream).await;

    // Each result follows its call before the next call starts.
    assert!(matches!(&events[0], StreamEvent::ToolCall { name, .. } if name == "search_food"));
    assert!(matches!(&events[1], StreamEvent::ToolResult { name, .. } if name == "search_food"));
    assert!(matches!(&events[2], StreamEvent::ToolCall { name, .. } if name == "get_nutrition"));
    assert!(matches!(&events[3], StreamEvent::ToolResult { name, .. } if name == "get_nutrition"));
    assert!(matches!(events.last().unwrap(), StreamEvent::Done { .. }));

    let history = sessions.history("s1").await.unwrap();
    assert_eq!(history.len(), 4, "user, two tool folds, assistant");
    assert!(history[1].content.contains("search_food"));
    assert!(history[2].content.contains("get_nutrition"));
    assert_eq!(history[3].role, Role::Assistant);
}

#[tokio::test]
async fn plain_turn_appends_user_and_assistant() {
    let engine = Arc::new(ScriptedEngine::new(vec![final_step("Hi there!")]));
    let (orchestrator, sessions) = build(engine, ToolRegistry::new(), test_config());

    orchestrator.run(Some("s1"), "hello").await.unwrap();

    let roles: Vec<Role> = sessions
        .history("s1")
        .await
        .unwrap()
        .iter()
        .map(|m| m.role)
        .collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant]);
}

#[tokio::test]
async fn turns_alternate_user_and_assistant_across_runs() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        final_step("first answer"),
        final_step("second answer"),
    ]));
    let (orchestrator, sessions) = build(engine, ToolRegistry::new(), test_config());

    orchestrator.run(Some("s1"), "one").await.unwrap();
    orchestrator.run(Some("s1"), "two").await.unwrap();

    let history = sessions.history("s1").await.unwrap();
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
    );
    for pair in history.windows(2) {
        assert!(pair[1].timestamp >= pair[0].timestamp);
    }
}

#[tokio::test]
async fn generated_thread_ids_are_reused_across_turns() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        final_step("first"),
        final_step("second"),
    ]));
    let (orchestrator, sessions) = build(engine, ToolRegistry::new(), test_config());

    let first = orchestrator.run(None, "hello").await.unwrap();
    assert!(!first.thread_id.is_empty());

    let second = orchestrator
        .run(Some(&first.thread_id), "again")
        .await
        .unwrap();
    assert_eq!(second.thread_id, first.thread_id);
    assert_eq!(sessions.history(&first.thread_id).await.unwrap().len(), 4);
}

// --- Failure semantics ---

#[tokio::test]
async fn unknown_tool_errors_without_assistant_message() {
    let engine = Arc::new(ScriptedEngine::new(vec![tool_step(
        "ghost",
        json!({"query": "x"}),
    )]));
    let (orchestrator, sessions) = build(engine, ToolRegistry::new(), test_config());

    let err = orchestrator.run(Some("s1"), "do it").await.unwrap_err();
    assert!(matches!(err, AgentError::UnknownTool(name) if name == "ghost"));

    let history = sessions.history("s1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);
}

#[tokio::test]
async fn tool_loop_bound_errors_on_the_fourth_step() {
    let engine = Arc::new(LoopingEngine::new());
    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(StubTool::named("search_food")))
        .unwrap();
    let config = OrchestratorConfig {
        max_tool_cycles: 3,
        ..test_config()
    };
    let (orchestrator, sessions) = build(engine.clone(), registry, config);

    let err = orchestrator.run(Some("s1"), "loop").await.unwrap_err();
    assert!(matches!(err, AgentError::ToolLoopExceeded(3)));
    assert_eq!(
        engine.calls.load(Ordering::SeqCst),
        4,
        "bound must trip on exactly the fourth reasoning step"
    );

    // Three dispatched cycles left their tool messages; no assistant.
    let history = sessions.history("s1").await.unwrap();
    assert_eq!(history.len(), 4);
    assert!(history.iter().all(|m| m.role != Role::Assistant));
}

#[tokio::test]
async fn invalid_arguments_fail_without_invoking_the_tool() {
    let engine = Arc::new(ScriptedEngine::new(vec![tool_step(
        "search_food",
        json!({"query": 42}),
    )]));
    let tool = Arc::new(StubTool::named("search_food"));
    let mut registry = ToolRegistry::new();
    registry.register(tool.clone()).unwrap();
    let (orchestrator, sessions) = build(engine.clone(), registry, test_config());

    let err = orchestrator.run(Some("s1"), "bad args").await.unwrap_err();
    assert!(matches!(err, AgentError::InvalidToolArguments { .. }));
    assert_eq!(tool.invocations(), 0, "validation failures are not retried");
    assert_eq!(engine.calls(), 1);
    assert_eq!(sessions.history("s1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn transient_tool_failures_are_retried() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        tool_step("search_food", json!({"query": "kale"})),
        final_step("Kale found."),
    ]));
    let tool = Arc::new(StubTool::named("search_food").with_transient_failures(1));
    let mut registry = ToolRegistry::new();
    registry.register(tool.clone()).unwrap();
    let (orchestrator, sessions) = build(engine, registry, test_config());

    orchestrator.run(Some("s1"), "find kale").await.unwrap();
    assert_eq!(tool.invocations(), 2);
    assert_eq!(sessions.history("s1").await.unwrap().len(), 3);
}

#[tokio::test]
async fn transient_engine_failures_are_retried() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        Err(AgentError::ModelUnavailable("blip".to_string())),
        final_step("recovered"),
    ]));
    let (orchestrator, _sessions) = build(engine.clone(), ToolRegistry::new(), test_config());

    let output = orchestrator.run(Some("s1"), "hello").await.unwrap();
    assert_eq!(output.response, "recovered");
    assert_eq!(engine.calls(), 2);
}

#[tokio::test]
async fn engine_failures_surface_after_retries_exhausted() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        Err(AgentError::ModelUnavailable("down".to_string())),
        Err(AgentError::ModelUnavailable("down".to_string())),
        Err(AgentError::ModelUnavailable("down".to_string())),
    ]));
    let (orchestrator, sessions) = build(engine.clone(), ToolRegistry::new(), test_config());

    let err = orchestrator.run(Some("s1"), "hello").await.unwrap_err();
    assert!(matches!(err, AgentError::ModelUnavailable(_)));
    assert_eq!(engine.calls(), 3, "initial attempt plus two retries");
    assert_eq!(sessions.history("s1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn engine_timeout_is_a_transient_failure() {
    let engine = Arc::new(SlowEngine {
        delay: Duration::from_millis(100),
        text: "too late".to_string(),
    });
    let config = OrchestratorConfig {
        engine_timeout_ms: 10,
        retry: instant_retry(0),
        ..test_config()
    };
    let (orchestrator, _sessions) = build(engine, ToolRegistry::new(), config);

    let err = orchestrator.run(Some("s1"), "hello").await.unwrap_err();
    assert!(matches!(err, AgentError::ModelUnavailable(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn tool_timeout_is_a_transient_failure() {
    let engine = Arc::new(ScriptedEngine::new(vec![tool_step(
        "search_food",
        json!({"query": "slow"}),
    )]));
    let tool = Arc::new(StubTool::named("search_food").with_delay(Duration::from_millis(100)));
    let mut registry = ToolRegistry::new();
    registry.register(tool).unwrap();
    let config = OrchestratorConfig {
        tool_timeout_ms: 10,
        retry: instant_retry(0),
        ..test_config()
    };
    let (orchestrator, _sessions) = build(engine, registry, config);

    let err = orchestrator.run(Some("s1"), "hello").await.unwrap_err();
    assert!(matches!(err, AgentError::ToolExecution { transient: true, .. }));
    assert!(err.is_transient());
}

// --- Artifacts ---

#[tokio::test]
async fn artifact_locator_propagates_from_tool_outcome() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        tool_step("generate_label", json!({"query": "avocado"})),
        final_step("Here is your label!"),
    ]));
    let tool =
        Arc::new(StubTool::named("generate_label").with_artifact("/labels/stub-label.txt"));
    let mut registry = ToolRegistry::new();
    registry.register(tool).unwrap();
    let (orchestrator, sessions) = build(engine, registry, test_config());

    let output = orchestrator.run(Some("s1"), "make a label").await.unwrap();
    assert_eq!(output.artifact.as_deref(), Some("/labels/stub-label.txt"));

    let history = sessions.history("s1").await.unwrap();
    let last = history.last().unwrap();
    assert_eq!(last.artifact.as_deref(), Some("/labels/stub-label.txt"));
}

#[tokio::test]
async fn artifact_locator_falls_back_to_final_text() {
    let engine = Arc::new(ScriptedEngine::new(vec![final_step(
        "Saved your label to /labels/abc-123.txt for download.",
    )]));
    let (orchestrator, _sessions) = build(engine, ToolRegistry::new(), test_config());

    let output = orchestrator.run(Some("s1"), "label please").await.unwrap();
    assert_eq!(output.artifact.as_deref(), Some("/labels/abc-123.txt"));
}

// --- Streaming ---

#[tokio::test]
async fn stream_emits_tokens_then_done() {
    let engine = Arc::new(ScriptedEngine::new(vec![final_step(
        "Hello streaming world",
    )]));
    let (orchestrator, _sessions) = build(engine, ToolRegistry::new(), test_config());

    let mut stream = orchestrator.open_stream(Some("s1"), "hi").await.unwrap();
    let events = collect_events(&mut stream).await;

    let terminal_count = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminal_count, 1);

    let mut assembled = String::new();
    for event in &events[..events.len() - 1] {
        match event {
            StreamEvent::Token { text } => assembled.push_str(text),
            other => panic!("unexpected non-token event before done: {other:?}"),
        }
    }
    assert_eq!(assembled, "Hello streaming world");

    match events.last().unwrap() {
        StreamEvent::Done { response, .. } => assert_eq!(response, "Hello streaming world"),
        other => panic!("expected done, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_orders_tool_events_before_final_tokens() {
    let engine = Arc::new(ScriptedEngine::new(vec![
        tool_step("search_food", json!({"query": "avocado"})),
        final_step("Found it"),
    ]));
    let mut registry = ToolRegistry::new();
    registry
        .register(Arc::new(StubTool::named("search_food")))
        .unwrap();
    let (orchestrator, _sessions) = build(engine, registry, test_config());

    let mut stream = orchestrator
        .open_stream(Some("s1"), "find avocado")
        .await
        .unwrap();
    let events = collect_events(&mut stream).await;

    assert!(matches!(&events[0], StreamEvent::ToolCall { name, .. } if name == "search_food"));
    assert!(matches!(&events[1], StreamEvent::ToolResult { name, .. } if name == "search_food"));
    assert!(matches!(&events[2], StreamEvent::Token { .. }));
    assert!(matches!(events.last().unwrap(), StreamEvent::Done { .. }));
}

#[tokio::test]
async fn busy_session_is_rejected_before_any_stream_event() {
    let engine = Arc::new(ScriptedEngine::new(vec![final_step("unused")]));
    let sessions = Arc::new(MemorySessionStore::new());
    let orchestrator = Orchestrator::new(
        engine,
        Arc::new(ToolRegistry::new()),
        sessions.clone(),
        test_config(),
    );

    // A busy session surfaces as an error from open_stream itself.
    sessions.ensure(Some("busy")).await.unwrap();
    let _guard = sessions.begin_turn("busy").await.unwrap();
    let err = orchestrator
        .open_stream(Some("busy"), "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::SessionBusy(_)));
}

#[tokio::test]
async fn dropping_the_stream_cancels_the_turn() {
    let engine = Arc::new(PausingEngine);
    let (orchestrator, sessions) = build(engine, ToolRegistry::new(), test_config());

    let mut stream = orchestrator.open_stream(Some("s1"), "hi").await.unwrap();
    let first = stream.events.recv().await.unwrap();
    assert!(matches!(first, StreamEvent::Token { .. }));

    drop(stream);
    tokio::time::sleep(Duration::from_millis(150)).await;

    // The turn stopped without committing an assistant message; the
    // partial text is discarded on cancellation.
    let history = sessions.history("s1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);

    // The turn permit was released, so a new turn may start.
    let _guard = sessions.begin_turn("s1").await.unwrap();
}

#[tokio::test]
async fn partial_text_is_retained_when_a_turn_errors() {
    let engine = Arc::new(PartialFailEngine);
    let (orchestrator, sessions) = build(engine, ToolRegistry::new(), test_config());

    let mut stream = orchestrator.open_stream(Some("s1"), "hi").await.unwrap();
    let events = collect_events(&mut stream).await;

    assert!(matches!(&events[0], StreamEvent::Token { text } if text == "Oops "));
    match events.last().unwrap() {
        StreamEvent::Error { kind, .. } => assert_eq!(kind, "model_unavailable"),
        other => panic!("expected error, got {other:?}"),
    }
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);

    let history = sessions.history("s1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].role, Role::Assistant);
    assert_eq!(history[1].content, "Oops ");
}

// --- Concurrency ---

#[tokio::test]
async fn concurrent_turns_on_one_session_fail_fast() {
    let engine = Arc::new(SlowEngine {
        delay: Duration::from_millis(100),
        text: "slow answer".to_string(),
    });
    let (orchestrator, sessions) = build(engine, ToolRegistry::new(), test_config());

    let racing = orchestrator.clone();
    let first = tokio::spawn(async move { racing.run(Some("race"), "first").await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = orchestrator.run(Some("race"), "second").await;
    assert!(matches!(second.unwrap_err(), AgentError::SessionBusy(_)));

    let output = first.await.unwrap().unwrap();
    assert_eq!(output.response, "slow answer");

    // Only the winning turn touched the history.
    let history = sessions.history("race").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "first");
}

#[tokio::test]
async fn turns_on_distinct_sessions_run_concurrently() {
    let engine = Arc::new(SlowEngine {
        delay: Duration::from_millis(50),
        text: "ok".to_string(),
    });
    let (orchestrator, _sessions) = build(engine, ToolRegistry::new(), test_config());

    let a = orchestrator.clone();
    let b = orchestrator.clone();
    let (ra, rb) = tokio::join!(
        tokio::spawn(async move { a.run(Some("a"), "hi").await }),
        tokio::spawn(async move { b.run(Some("b"), "hi").await }),
    );
    assert!(ra.unwrap().is_ok());
    assert!(rb.unwrap().is_ok());
}
