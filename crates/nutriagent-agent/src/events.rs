use serde::{Deserialize, Serialize};

/// Events emitted while a turn progresses.
///
/// Consumers receive these strictly in order. A turn's stream carries
/// exactly one terminal event (`done` or `error`), never both and never
/// neither; events are ephemeral per turn and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// An incremental fragment of assistant text.
    Token {
        /// The text fragment.
        text: String,
    },

    /// A tool invocation is about to run.
    ToolCall {
        /// Name of the requested tool.
        name: String,
        /// Arguments the engine supplied.
        arguments: serde_json::Value,
    },

    /// A tool invocation finished.
    ToolResult {
        /// Name of the tool that ran.
        name: String,
        /// Truncated view of the tool's output.
        summary: String,
    },

    /// Terminal: the turn completed.
    Done {
        /// The final assistant response.
        response: String,
        /// Locator of an artifact produced during the turn, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        artifact: Option<String>,
    },

    /// Terminal: the turn failed.
    Error {
        /// Stable machine-readable error kind.
        kind: String,
        /// Human-readable message.
        message: String,
    },
}

impl StreamEvent {
    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
