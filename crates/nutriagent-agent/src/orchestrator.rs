use crate::config::OrchestratorConfig;
use crate::context::ContextWindow;
use crate::engine::{Reasoning, ReasoningEngine};
use crate::events::StreamEvent;
use crate::retry::compute_backoff;
use nutriagent_core::{AgentError, AgentResult, Message, ToolCall, ToolOutcome};
use nutriagent_session::SessionStore;
use nutriagent_tools::{ToolDescriptor, ToolRegistry};
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

/// Character bound on tool-result summaries in stream events.
const SUMMARY_MAX_CHARS: usize = 200;

/// Matches artifact locators mentioned in assistant text.
const ARTIFACT_PATTERN: &str = r"/labels/[A-Za-z0-9_-]+\.[A-Za-z0-9]+";

/// Final payload of a completed turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutput {
    /// Canonical identifier of the session the turn ran against.
    pub thread_id: String,
    /// The final assistant response.
    pub response: String,
    /// Locator of an artifact produced during the turn, if any.
    pub artifact: Option<String>,
}

/// Handle to an in-flight streaming turn.
///
/// Dropping the handle cancels the turn: the orchestrator stops before the
/// next sub-step, appends no assistant message, and emits nothing further.
#[derive(Debug)]
pub struct TurnStream {
    /// Canonical identifier of the session the turn runs against.
    pub thread_id: String,
    /// Ordered turn events, ending in exactly one `done` or `error`.
    pub events: mpsc::Receiver<StreamEvent>,
    /// Cancels the turn when dropped.
    pub guard: DropGuard,
}

/// Drives one conversational turn at a time against a session.
///
/// A turn is a sequential pipeline: consult the reasoning engine, dispatch
/// any requested tools in order, fold results back into context, repeat
/// until the engine answers, then append the assistant message. There is no
/// parallel fan-out within a turn, so context-fold order is deterministic.
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn ReasoningEngine>,
    tools: Arc<ToolRegistry>,
    sessions: Arc<dyn SessionStore>,
    config: OrchestratorConfig,
    artifact_pattern: Option<Regex>,
}

impl Orchestrator {
    /// Creates an orchestrator over the given collaborators.
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        tools: Arc<ToolRegistry>,
        sessions: Arc<dyn SessionStore>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            engine,
            tools,
            sessions,
            config,
            artifact_pattern: Regex::new(ARTIFACT_PATTERN).ok(),
        }
    }

    /// Runs one full turn and returns the final response.
    ///
    /// Drains the turn server-side: no events are exposed, but semantics
    /// (session mutations, retries, loop bound) are identical to
    /// [`Orchestrator::open_stream`].
    pub async fn run(&self, thread_id: Option<&str>, user_text: &str) -> AgentResult<TurnOutput> {
        let thread_id = self.sessions.ensure(thread_id).await?;
        let guard = self.sessions.begin_turn(&thread_id).await?;

        let cancel = CancellationToken::new();
        let result = self
            .execute_turn(&thread_id, user_text, &Emitter::silent(), &cancel)
            .await;
        drop(guard);

        result.map(|(response, artifact)| TurnOutput {
            thread_id,
            response,
            artifact,
        })
    }

    /// Starts one turn and exposes its progress as an event stream.
    ///
    /// Session resolution and the turn permit are acquired up front, so
    /// `UnknownSession` and `SessionBusy` surface here rather than on the
    /// stream. Everything after that arrives as [`StreamEvent`]s.
    pub async fn open_stream(
        &self,
        thread_id: Option<&str>,
        user_text: &str,
    ) -> AgentResult<TurnStream> {
        let thread_id = self.sessions.ensure(thread_id).await?;
        let turn_guard = self.sessions.begin_turn(&thread_id).await?;

        let (tx, rx) = mpsc::channel(self.config.stream_buffer.max(1));
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let orchestrator = self.clone();
        let id = thread_id.clone();
        let text = user_text.to_string();

        tokio::spawn(async move {
            let _turn = turn_guard;
            let emitter = Emitter::channel(tx.clone());
            match orchestrator
                .execute_turn(&id, &text, &emitter, &task_cancel)
                .await
            {
                Ok((response, artifact)) => {
                    let _ = tx.send(StreamEvent::Done { response, artifact }).await;
                }
                Err(AgentError::StreamCancelled) => {
                    debug!(thread_id = %id, "Turn cancelled by stream consumer");
                }
                Err(err) => {
                    let _ = tx
                        .send(StreamEvent::Error {
                            kind: err.kind().to_string(),
                            message: err.to_string(),
                        })
                        .await;
                }
            }
        });

        Ok(TurnStream {
            thread_id,
            events: rx,
            guard: cancel.drop_guard(),
        })
    }

    /// The sequential turn pipeline shared by both entry points.
    async fn execute_turn(
        &self,
        thread_id: &str,
        user_text: &str,
        emitter: &Emitter,
        cancel: &CancellationToken,
    ) -> AgentResult<(String, Option<String>)> {
        info!(thread_id = %thread_id, "Starting turn");

        self.sessions
            .append(thread_id, Message::user(user_text, thread_id))
            .await?;

        let mut context = ContextWindow::new(self.config.max_context_messages);
        if let Some(prompt) = &self.config.system_prompt {
            context.set_system_prompt(prompt);
        }
        for msg in self.sessions.history(thread_id).await? {
            context.push(msg);
        }
        debug!(
            thread_id = %thread_id,
            messages = context.len(),
            tokens = context.estimated_tokens(),
            "Context prepared"
        );

        let descriptors = self.tools.descriptors();
        let mut streamed = String::new();
        let mut artifact: Option<String> = None;
        let mut cycles: u32 = 0;

        loop {
            let reasoning = match self
                .reason_step(&context, &descriptors, emitter, &mut streamed)
                .await
            {
                Ok(reasoning) => reasoning,
                Err(err) => {
                    self.retain_partial(thread_id, &streamed, &err).await;
                    return Err(err);
                }
            };

            if cancel.is_cancelled() {
                debug!(thread_id = %thread_id, "Cancellation observed after reasoning step");
                return Err(AgentError::StreamCancelled);
            }

            match reasoning {
                Reasoning::Final { text } => {
                    // Latest tool-produced locator wins; scanning the final
                    // text is the fallback for engines that only mention
                    // the locator inline.
                    let located = artifact.or_else(|| self.locate_artifact(&text));
                    let mut message = Message::assistant(&text, thread_id);
                    if let Some(locator) = &located {
                        message = message.with_artifact(locator);
                    }
                    self.sessions.append(thread_id, message).await?;
                    info!(thread_id = %thread_id, cycles, "Turn complete");
                    return Ok((text, located));
                }

                Reasoning::ToolRequests(calls) => {
                    if cycles >= self.config.max_tool_cycles {
                        warn!(
                            thread_id = %thread_id,
                            max_tool_cycles = self.config.max_tool_cycles,
                            "Turn exceeded tool loop bound"
                        );
                        let err = AgentError::ToolLoopExceeded(self.config.max_tool_cycles);
                        self.retain_partial(thread_id, &streamed, &err).await;
                        return Err(err);
                    }
                    cycles += 1;

                    // Sequential, in request order; results fold into
                    // context deterministically.
                    for call in calls {
                        emitter
                            .emit(StreamEvent::ToolCall {
                                name: call.name.clone(),
                                arguments: call.arguments.clone(),
                            })
                            .await?;

                        let outcome = match self.dispatch_step(&call).await {
                            Ok(outcome) => outcome,
                            Err(err) => {
                                self.retain_partial(thread_id, &streamed, &err).await;
                                return Err(err);
                            }
                        };

                        if let Some(locator) = &outcome.artifact {
                            artifact = Some(locator.clone());
                        }

                        let record = serde_json::json!({
                            "tool": call.name,
                            "arguments": call.arguments,
                            "result": outcome.content,
                            "is_error": outcome.is_error,
                        });
                        let tool_msg = Message::tool(record.to_string(), thread_id);
                        self.sessions.append(thread_id, tool_msg.clone()).await?;
                        context.push(tool_msg);

                        emitter
                            .emit(StreamEvent::ToolResult {
                                name: call.name.clone(),
                                summary: summarize(&outcome.content),
                            })
                            .await?;

                        if cancel.is_cancelled() {
                            debug!(thread_id = %thread_id, "Cancellation observed after tool dispatch");
                            return Err(AgentError::StreamCancelled);
                        }
                    }
                }
            }
        }
    }

    /// One reasoning step with timeout and transient-failure retries.
    async fn reason_step(
        &self,
        context: &ContextWindow,
        descriptors: &[ToolDescriptor],
        emitter: &Emitter,
        streamed: &mut String,
    ) -> AgentResult<Reasoning> {
        let timeout = Duration::from_millis(self.config.engine_timeout_ms);
        let mut attempt: u32 = 0;

        loop {
            let streamed_before = streamed.len();
            let result = if emitter.is_streaming() {
                self.reason_streaming(context, descriptors, emitter, streamed, timeout)
                    .await
            } else {
                match tokio::time::timeout(
                    timeout,
                    self.engine
                        .reason(context.system_prompt(), context.messages(), descriptors),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(AgentError::ModelUnavailable(format!(
                        "reasoning timed out after {}ms",
                        self.config.engine_timeout_ms
                    ))),
                }
            };

            match result {
                Ok(reasoning) => return Ok(reasoning),
                Err(err) => {
                    // Once tokens have reached the consumer a retry would
                    // duplicate them; surface the failure instead.
                    let delivered_this_attempt = streamed.len() > streamed_before;
                    if err.is_transient()
                        && !delivered_this_attempt
                        && attempt < self.config.retry.max_retries
                    {
                        let delay = compute_backoff(&self.config.retry, attempt);
                        info!(
                            attempt,
                            delay_ms = delay,
                            error = %err,
                            "Transient reasoning failure, backing off"
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    /// One streaming reasoning step: forwards fragments as `token` events
    /// while accumulating them for partial retention.
    async fn reason_streaming(
        &self,
        context: &ContextWindow,
        descriptors: &[ToolDescriptor],
        emitter: &Emitter,
        streamed: &mut String,
        timeout: Duration,
    ) -> AgentResult<Reasoning> {
        let stalled = || {
            AgentError::ModelUnavailable(format!(
                "reasoning timed out after {}ms",
                self.config.engine_timeout_ms
            ))
        };

        let (mut deltas, handle) = match tokio::time::timeout(
            timeout,
            self.engine
                .reason_stream(context.system_prompt(), context.messages(), descriptors),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(stalled()),
        };

        let mut consumer_gone = false;
        loop {
            let delta = match tokio::time::timeout(timeout, deltas.recv()).await {
                Ok(Some(delta)) => delta,
                Ok(None) => break,
                Err(_) => {
                    handle.abort();
                    return Err(stalled());
                }
            };
            streamed.push_str(&delta);
            if !consumer_gone
                && emitter
                    .emit(StreamEvent::Token { text: delta })
                    .await
                    .is_err()
            {
                // The consumer went away. The current step still runs to
                // completion; the turn stops at the next cancellation
                // check rather than mid-call.
                consumer_gone = true;
            }
        }

        let reasoning = match tokio::time::timeout(timeout, handle).await {
            Ok(joined) => joined
                .map_err(|err| AgentError::ModelUnavailable(format!("reasoning task failed: {err}")))??,
            Err(_) => return Err(stalled()),
        };

        if consumer_gone {
            return Err(AgentError::StreamCancelled);
        }
        Ok(reasoning)
    }

    /// One tool dispatch with timeout and transient-failure retries.
    async fn dispatch_step(&self, call: &ToolCall) -> AgentResult<ToolOutcome> {
        let timeout = Duration::from_millis(self.config.tool_timeout_ms);
        let mut attempt: u32 = 0;

        loop {
            let result = match tokio::time::timeout(timeout, self.tools.dispatch(call.clone()))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(AgentError::ToolExecution {
                    tool: call.name.clone(),
                    reason: format!("timed out after {}ms", self.config.tool_timeout_ms),
                    transient: true,
                }),
            };

            match result {
                Ok(outcome) => {
                    if outcome.is_error {
                        debug!(tool = %call.name, "Tool reported a domain error");
                    }
                    return Ok(outcome);
                }
                Err(err) => {
                    if err.is_transient() && attempt < self.config.retry.max_retries {
                        let delay = compute_backoff(&self.config.retry, attempt);
                        info!(
                            tool = %call.name,
                            attempt,
                            delay_ms = delay,
                            error = %err,
                            "Transient tool failure, backing off"
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }
                    error!(tool = %call.name, error = %err, "Tool dispatch failed");
                    return Err(err);
                }
            }
        }
    }

    /// Retains partial streamed text in the session when a turn errors.
    /// Cancellation discards the partial instead.
    async fn retain_partial(&self, thread_id: &str, streamed: &str, err: &AgentError) {
        if streamed.is_empty() || matches!(err, AgentError::StreamCancelled) {
            return;
        }
        let partial = Message::assistant(streamed, thread_id);
        if let Err(append_err) = self.sessions.append(thread_id, partial).await {
            warn!(
                thread_id = %thread_id,
                error = %append_err,
                "Failed to retain partial response"
            );
        }
    }

    fn locate_artifact(&self, text: &str) -> Option<String> {
        self.artifact_pattern
            .as_ref()
            .and_then(|pattern| pattern.find(text))
            .map(|found| found.as_str().to_string())
    }
}

/// Per-turn event sink. `run` uses the silent variant; `open_stream` feeds
/// the channel whose receiver the caller holds.
struct Emitter {
    tx: Option<mpsc::Sender<StreamEvent>>,
}

impl Emitter {
    fn silent() -> Self {
        Self { tx: None }
    }

    fn channel(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    fn is_streaming(&self) -> bool {
        self.tx.is_some()
    }

    /// Fails with `StreamCancelled` when the consumer has gone away.
    async fn emit(&self, event: StreamEvent) -> AgentResult<()> {
        if let Some(tx) = &self.tx {
            tx.send(event)
                .await
                .map_err(|_| AgentError::StreamCancelled)?;
        }
        Ok(())
    }
}

fn summarize(content: &str) -> String {
    let mut summary: String = content.chars().take(SUMMARY_MAX_CHARS).collect();
    if summary.len() < content.len() {
        summary.push_str("...");
    }
    summary
}
