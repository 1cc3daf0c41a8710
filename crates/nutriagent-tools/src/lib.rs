//! Tool abstractions and the dispatch registry.
//!
//! A tool is a named, schema-described capability the reasoning engine can
//! request during a turn. The [`ToolRegistry`] owns the set of registered
//! tools, rejects duplicate names, validates call arguments against each
//! tool's input schema, and dispatches calls to the implementation.

/// The tool registry and argument validation.
pub mod registry;
/// The tool trait and its descriptor.
pub mod tool;

pub use registry::ToolRegistry;
pub use tool::{Tool, ToolDescriptor};
