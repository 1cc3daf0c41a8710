//! HTTP gateway for the nutriagent service.
//!
//! Exposes conversational turns over a small REST surface plus a streaming
//! chat endpoint (SSE). Turn semantics live in `nutriagent-agent`; this
//! crate only translates between HTTP and the orchestrator: request bodies
//! in, JSON responses and event frames out, errors mapped onto status
//! codes.

/// HTTP error mapping.
pub mod error;
/// Router construction and request handlers.
pub mod server;
/// The streaming chat response.
pub mod sse;

pub use error::ApiError;
pub use server::{AppState, GatewayServer, DEFAULT_ALLOWED_ORIGINS};
