use async_trait::async_trait;
use nutriagent_core::{AgentResult, ToolCall, ToolOutcome};
use serde::{Deserialize, Serialize};

/// Metadata describing a tool's interface.
///
/// Both schemas are JSON-Schema-style objects (`type`, `properties`,
/// `required`). The input schema is enforced by the registry before
/// dispatch and advertised to the reasoning engine; the output schema is
/// advertised for capability introspection only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description shown to the reasoning engine.
    pub description: String,
    /// Schema the call arguments must satisfy.
    pub input_schema: serde_json::Value,
    /// Schema describing the shape of the tool's output. An empty object
    /// leaves the output unconstrained.
    #[serde(default = "empty_schema")]
    pub output_schema: serde_json::Value,
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({})
}

impl ToolDescriptor {
    /// Creates a descriptor with the given name, description, and input
    /// schema. The output schema starts unconstrained.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            output_schema: empty_schema(),
        }
    }

    /// Sets the output schema.
    pub fn with_output_schema(mut self, schema: serde_json::Value) -> Self {
        self.output_schema = schema;
        self
    }
}

/// Trait that all tools must implement.
///
/// Implementations receive calls whose arguments already passed the
/// registry's schema check; stricter, typed parsing inside `invoke` is
/// still expected where the tool needs it.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The tool's descriptor.
    fn descriptor(&self) -> &ToolDescriptor;

    /// Executes the call.
    ///
    /// Domain-level misses (nothing found, unparseable food name) come back
    /// as `Ok` with [`ToolOutcome::is_error`] set so the engine can react;
    /// `Err` is reserved for infrastructure failures.
    async fn invoke(&self, call: ToolCall) -> AgentResult<ToolOutcome>;
}
