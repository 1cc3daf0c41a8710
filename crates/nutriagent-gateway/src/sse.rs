use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use nutriagent_agent::{StreamEvent, TurnStream};
use serde_json::{json, Value};
use std::convert::Infallible;
use tokio_stream::wrappers::ReceiverStream;

/// Converts an in-flight turn into an SSE response.
///
/// Each frame is one JSON object `{"type", "data", "thread_id"}`; the
/// sequence ends with exactly one `done` or `error` frame, after which the
/// response body closes. Dropping the response (client disconnect) drops
/// the turn guard, which cancels the turn before its next sub-step.
pub fn turn_events(turn: TurnStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let TurnStream {
        thread_id,
        events,
        guard,
    } = turn;

    let frames = ReceiverStream::new(events).map(move |event| {
        // The guard must live as long as the stream.
        let _ = &guard;
        Ok(Event::default().data(frame(event, &thread_id).to_string()))
    });

    Sse::new(frames).keep_alive(KeepAlive::default())
}

/// One wire frame of the streaming chat response.
///
/// The `done` frame carries the artifact locator as `image_path`, the
/// field name the chat frontend reads it under.
fn frame(event: StreamEvent, thread_id: &str) -> Value {
    let (kind, data) = match event {
        StreamEvent::Token { text } => ("token", json!({ "text": text })),
        StreamEvent::ToolCall { name, arguments } => {
            ("tool_call", json!({ "name": name, "arguments": arguments }))
        }
        StreamEvent::ToolResult { name, summary } => {
            ("tool_result", json!({ "name": name, "summary": summary }))
        }
        StreamEvent::Done { response, artifact } => {
            let mut data = json!({ "response": response });
            if let Some(locator) = artifact {
                data["image_path"] = Value::String(locator);
            }
            ("done", data)
        }
        StreamEvent::Error { kind, message } => {
            ("error", json!({ "kind": kind, "message": message }))
        }
    };
    json!({ "type": kind, "data": data, "thread_id": thread_id })
}
