//! Core types and error definitions for the nutriagent service.
//!
//! This crate provides the foundational types shared across all nutriagent
//! crates, including error handling, conversation messages, and tool call
//! abstractions.
//!
//! # Main types
//!
//! - [`AgentError`] — Unified error enum for all nutriagent subsystems.
//! - [`AgentResult`] — Convenience alias for `Result<T, AgentError>`.
//! - [`Role`] — Message role (user, assistant, tool).
//! - [`Message`] — A single message within a conversation session.
//! - [`ToolCall`] — A reasoning-engine request to invoke a named tool.
//! - [`ToolOutcome`] — The result returned after executing a tool call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the nutriagent service.
///
/// The variants form the stable error taxonomy surfaced over HTTP and on
/// the streaming channel; [`AgentError::kind`] yields the machine-readable
/// kind string for each.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The referenced session identifier was never created.
    #[error("unknown session: {0}")]
    UnknownSession(String),

    /// The session already has a turn in flight.
    #[error("session busy: {0}")]
    SessionBusy(String),

    /// A tool with this name is already registered.
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),

    /// No tool with this name is registered.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The tool arguments did not match the tool's input schema.
    /// Never retried.
    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidToolArguments {
        /// Name of the tool whose arguments were rejected.
        tool: String,
        /// Human-readable description of the violation.
        reason: String,
    },

    /// A tool invocation failed. `transient` marks failures worth retrying
    /// (timeouts, upstream unavailability) as opposed to permanent ones.
    #[error("tool '{tool}' failed: {reason}")]
    ToolExecution {
        /// Name of the failing tool.
        tool: String,
        /// Human-readable description of the failure.
        reason: String,
        /// Whether the failure is expected to clear on retry.
        transient: bool,
    },

    /// The turn exceeded the configured bound on reasoning/tool cycles.
    #[error("tool loop exceeded {0} cycles")]
    ToolLoopExceeded(u32),

    /// The reasoning engine could not be reached or timed out. Transient.
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    /// The stream consumer went away mid-turn. Caller-initiated, not a
    /// failure of the service.
    #[error("stream cancelled by caller")]
    StreamCancelled,

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Stable machine-readable kind string, used in HTTP error bodies and
    /// terminal `error` stream frames.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownSession(_) => "unknown_session",
            Self::SessionBusy(_) => "session_busy",
            Self::DuplicateTool(_) => "duplicate_tool",
            Self::UnknownTool(_) => "unknown_tool",
            Self::InvalidToolArguments { .. } => "invalid_tool_arguments",
            Self::ToolExecution { .. } => "tool_execution",
            Self::ToolLoopExceeded(_) => "tool_loop_exceeded",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::StreamCancelled => "stream_cancelled",
            Self::Json(_) => "json",
            Self::Io(_) => "io",
        }
    }

    /// Whether the error is transient and eligible for retry with backoff.
    ///
    /// Structural errors (unknown tool, invalid arguments, loop bound) are
    /// never retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ModelUnavailable(_) | Self::ToolExecution { transient: true, .. }
        )
    }
}

/// A convenience `Result` alias using [`AgentError`].
pub type AgentResult<T> = Result<T, AgentError>;

// --- Message types ---

/// The role of the participant that authored a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A human end-user.
    User,
    /// The AI assistant.
    Assistant,
    /// Output produced by a tool invocation.
    Tool,
}

/// A single message within a conversation session.
///
/// Messages are immutable once appended to a session; the session store
/// only ever adds to the tail of a history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier for this message.
    pub id: Uuid,
    /// The role of the message author.
    pub role: Role,
    /// The textual content of the message.
    pub content: String,
    /// The session (thread) this message belongs to.
    pub thread_id: String,
    /// UTC timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
    /// Optional artifact locator attached to the message, e.g. a generated
    /// nutrition-label path. The core carries the locator string only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
}

impl Message {
    /// Creates a new message with the given role, content, and thread ID.
    pub fn new(role: Role, content: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            thread_id: thread_id.into(),
            timestamp: Utc::now(),
            artifact: None,
        }
    }

    /// Creates a new message with [`Role::User`].
    pub fn user(content: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self::new(Role::User, content, thread_id)
    }

    /// Creates a new message with [`Role::Assistant`].
    pub fn assistant(content: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content, thread_id)
    }

    /// Creates a new message with [`Role::Tool`].
    pub fn tool(content: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self::new(Role::Tool, content, thread_id)
    }

    /// Attaches an artifact locator to the message.
    pub fn with_artifact(mut self, locator: impl Into<String>) -> Self {
        self.artifact = Some(locator.into());
        self
    }
}

// --- Tool types ---

/// A request from the reasoning engine to invoke a specific tool.
///
/// Tool calls are never persisted standalone; their arguments and results
/// are folded into the session history as a [`Role::Tool`] message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier assigned by the engine for this call within the turn.
    pub id: String,
    /// Name of the tool to invoke.
    pub name: String,
    /// JSON arguments to pass to the tool.
    pub arguments: serde_json::Value,
}

/// The result returned after executing a [`ToolCall`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutcome {
    /// The ID of the [`ToolCall`] this outcome corresponds to.
    pub call_id: String,
    /// The textual output produced by the tool.
    pub content: String,
    /// Locator of an artifact the tool produced, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Whether the tool reported a domain-level miss or soft error. Hard
    /// failures are raised as [`AgentError::ToolExecution`] instead.
    pub is_error: bool,
}

impl ToolOutcome {
    /// Creates a successful tool outcome.
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            artifact: None,
            is_error: false,
        }
    }

    /// Creates a soft-error tool outcome (fed back to the engine as
    /// context rather than failing the turn).
    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            artifact: None,
            is_error: true,
        }
    }

    /// Attaches an artifact locator to the outcome.
    pub fn with_artifact(mut self, locator: impl Into<String>) -> Self {
        self.artifact = Some(locator.into());
        self
    }
}
