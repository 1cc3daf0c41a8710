//! Session storage for nutriagent conversations.
//!
//! A session (thread) is an ordered, append-only message history keyed by
//! an opaque string identifier. Sessions are created on first reference,
//! never mutated in place, and live in process memory under a capacity
//! bound with least-recently-active eviction.

/// Session data structures.
pub mod session;
/// The session store trait and in-memory implementation.
pub mod store;

pub use session::Session;
pub use store::{
    MemorySessionStore, SessionStore, SessionSummary, TurnGuard, DEFAULT_SESSION_CAPACITY,
};
