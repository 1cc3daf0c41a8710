use chrono::{DateTime, Utc};
use nutriagent_core::Message;

/// One conversation thread: an ordered message history plus bookkeeping
/// timestamps used for eviction.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque thread identifier. Client-supplied or server-generated.
    pub thread_id: String,
    /// Ordered history; insertion order is chronological order.
    pub messages: Vec<Message>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Last append or turn start. Drives least-recently-active eviction.
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Creates an empty session under the given identifier.
    pub fn new(thread_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            thread_id: thread_id.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Appends a message to the tail of the history.
    ///
    /// Timestamps within a history are kept non-decreasing: a message
    /// stamped earlier than the current tail (clock adjustment) is clamped
    /// to the tail's timestamp before it is stored.
    pub fn add_message(&mut self, mut message: Message) {
        if let Some(last) = self.messages.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Number of messages in the history.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}
