use async_trait::async_trait;
use nutriagent_core::{AgentResult, Message, ToolCall};
use nutriagent_tools::ToolDescriptor;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Outcome of one reasoning step.
#[derive(Debug, Clone)]
pub enum Reasoning {
    /// The engine produced its final answer for the turn.
    Final {
        /// The answer text.
        text: String,
    },
    /// The engine wants the listed tools invoked, in order, before it
    /// continues reasoning.
    ToolRequests(Vec<ToolCall>),
}

/// The external reasoning engine consulted once per orchestration step.
///
/// Implementations receive the system prompt, the session history with
/// tool results folded in, and the advertised tool descriptors, and decide
/// whether to answer directly or to request tool invocations first. Engine
/// failures that may clear on retry (timeouts, upstream unavailability)
/// are reported as [`nutriagent_core::AgentError::ModelUnavailable`].
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// One blocking reasoning step.
    async fn reason(
        &self,
        system_prompt: Option<&str>,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> AgentResult<Reasoning>;

    /// One streaming reasoning step.
    ///
    /// Returns a receiver of incremental text fragments plus a join handle
    /// that resolves to the aggregated result once the stream ends. Steps
    /// that end in tool requests typically yield no fragments.
    async fn reason_stream(
        &self,
        system_prompt: Option<&str>,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> AgentResult<(mpsc::Receiver<String>, JoinHandle<AgentResult<Reasoning>>)>;
}
