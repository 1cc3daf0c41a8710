use crate::tool::{Tool, ToolDescriptor};
use nutriagent_core::{AgentError, AgentResult, ToolCall, ToolOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Central registry for all available tools.
///
/// Registration rejects duplicate names; dispatch validates call arguments
/// against the target tool's input schema before invoking it.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers a tool under its descriptor name.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> AgentResult<()> {
        let name = tool.descriptor().name.clone();
        if self.tools.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        info!(tool = %name, "Registered tool");
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Looks up a tool by name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Whether a tool with the given name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Returns all descriptors, sorted by tool name for stable listings.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        let mut descriptors: Vec<ToolDescriptor> = self
            .tools
            .values()
            .map(|tool| tool.descriptor().clone())
            .collect();
        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Returns all tool names, sorted alphabetically.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatches a call to the named tool, validating arguments first.
    pub async fn dispatch(&self, call: ToolCall) -> AgentResult<ToolOutcome> {
        let tool = self
            .tools
            .get(&call.name)
            .ok_or_else(|| AgentError::UnknownTool(call.name.clone()))?;

        validate_arguments(tool.descriptor(), &call.arguments)?;

        debug!(tool = %call.name, call_id = %call.id, "Dispatching tool call");
        tool.invoke(call).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks a call's arguments against the descriptor's input schema.
///
/// Enforces the object shape, required properties, and declared primitive
/// types. Extra properties pass through untouched; the tool's own typed
/// parsing is the final authority.
fn validate_arguments(descriptor: &ToolDescriptor, arguments: &serde_json::Value) -> AgentResult<()> {
    let schema = &descriptor.input_schema;
    let invalid = |reason: String| AgentError::InvalidToolArguments {
        tool: descriptor.name.clone(),
        reason,
    };

    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        // Schema declares no properties; nothing to enforce.
        return Ok(());
    };

    let args = arguments
        .as_object()
        .ok_or_else(|| invalid("arguments must be a JSON object".to_string()))?;

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for name in required.iter().filter_map(|n| n.as_str()) {
            if !args.contains_key(name) {
                return Err(invalid(format!("missing required property '{name}'")));
            }
        }
    }

    for (name, value) in args {
        let Some(expected) = properties
            .get(name)
            .and_then(|p| p.get("type"))
            .and_then(|t| t.as_str())
        else {
            continue;
        };
        let matches = match expected {
            "string" => value.is_string(),
            "number" => value.is_number(),
            "integer" => value.is_i64() || value.is_u64(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !matches {
            return Err(invalid(format!(
                "property '{name}' must be of type '{expected}'"
            )));
        }
    }

    Ok(())
}
