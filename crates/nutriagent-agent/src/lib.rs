//! Turn orchestration for the nutriagent service.
//!
//! The [`Orchestrator`] drives one conversational turn at a time: it
//! consults an external [`ReasoningEngine`] with the session history,
//! dispatches any tool calls the engine requests through the registry,
//! folds results back into context, and finishes by appending the final
//! assistant message to the session. Progress is observable as an ordered
//! sequence of [`StreamEvent`]s terminated by exactly one `done` or
//! `error`.

/// Orchestrator tuning knobs.
pub mod config;
/// The reasoning context window.
pub mod context;
/// The reasoning-engine trait.
pub mod engine;
/// Turn progress events.
pub mod events;
/// The turn orchestrator.
pub mod orchestrator;
/// Retry policy for transient failures.
pub mod retry;

pub use config::OrchestratorConfig;
pub use context::ContextWindow;
pub use engine::{Reasoning, ReasoningEngine};
pub use events::StreamEvent;
pub use orchestrator::{Orchestrator, TurnOutput, TurnStream};
pub use retry::RetryPolicy;
