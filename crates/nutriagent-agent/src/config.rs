use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Default system prompt for the nutrition assistant.
pub const SYSTEM_PROMPT: &str = "You are NutriAgent, a helpful nutrition assistant.\n\n\
You can help users:\n\
1. Search for foods in the USDA database\n\
2. Get detailed nutrition information for single foods\n\
3. Compare nutrients across foods\n\
4. Calculate combined nutrition for recipes with multiple ingredients\n\
5. Generate nutrition labels\n\n\
For single foods: use search_foods to find the food id, get_nutrition for \
details, then generate_label to create a label.\n\
For recipes: use calculate_recipe_nutrition with a JSON array like \
[{\"name\": \"eggs\", \"grams\": 100}, {\"name\": \"flour\", \"grams\": 200}].\n\n\
All nutrition is based on grams. Ask users for approximate grams if needed.\n\
Be friendly, concise, and helpful!";

/// Tuning knobs for the turn orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Hard bound on reasoning/tool-dispatch cycles within one turn.
    #[serde(default = "default_max_tool_cycles")]
    pub max_tool_cycles: u32,
    /// Timeout for one reasoning-engine call, in milliseconds. Expiry is
    /// treated as a transient failure.
    #[serde(default = "default_engine_timeout_ms")]
    pub engine_timeout_ms: u64,
    /// Timeout for one tool invocation, in milliseconds. Expiry is treated
    /// as a transient failure.
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,
    /// Most recent messages kept in the reasoning context.
    #[serde(default = "default_max_context_messages")]
    pub max_context_messages: usize,
    /// Capacity of the per-turn event channel behind `open_stream`.
    #[serde(default = "default_stream_buffer")]
    pub stream_buffer: usize,
    /// System prompt prepended to every reasoning call.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: Option<String>,
    /// Retry behaviour for transient failures.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_max_tool_cycles() -> u32 {
    5
}

fn default_engine_timeout_ms() -> u64 {
    30_000
}

fn default_tool_timeout_ms() -> u64 {
    10_000
}

fn default_max_context_messages() -> usize {
    100
}

fn default_stream_buffer() -> usize {
    32
}

fn default_system_prompt() -> Option<String> {
    Some(SYSTEM_PROMPT.to_string())
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_tool_cycles: default_max_tool_cycles(),
            engine_timeout_ms: default_engine_timeout_ms(),
            tool_timeout_ms: default_tool_timeout_ms(),
            max_context_messages: default_max_context_messages(),
            stream_buffer: default_stream_buffer(),
            system_prompt: default_system_prompt(),
            retry: RetryPolicy::default(),
        }
    }
}
