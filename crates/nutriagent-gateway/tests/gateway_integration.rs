//! End-to-end HTTP tests: a real server on a random port, driven with
//! reqwest, wired to the keyword engine over the in-memory food table.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use nutriagent_agent::{Orchestrator, OrchestratorConfig};
use nutriagent_builtins::{
    register_builtins, ArtifactBackend, InMemoryArtifactBackend, KeywordEngine, MemoryFoodData,
    NutritionService,
};
use nutriagent_gateway::GatewayServer;
use nutriagent_session::{MemorySessionStore, SessionStore};
use nutriagent_tools::ToolRegistry;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

async fn start_test_server_with_store() -> (SocketAddr, Arc<dyn SessionStore>) {
    let service = Arc::new(NutritionService::new(Arc::new(MemoryFoodData::new())));
    let artifacts: Arc<dyn ArtifactBackend> = Arc::new(InMemoryArtifactBackend::new());
    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, service, Arc::clone(&artifacts)).expect("register builtins");

    let tools = Arc::new(registry);
    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let orchestrator = Orchestrator::new(
        Arc::new(KeywordEngine::new()),
        Arc::clone(&tools),
        Arc::clone(&sessions),
        OrchestratorConfig::default(),
    );

    let app = GatewayServer::build(orchestrator, Arc::clone(&sessions), tools, artifacts);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, sessions)
}

async fn start_test_server() -> SocketAddr {
    start_test_server_with_store().await.0
}

fn sse_frames(body: &str) -> Vec<Value> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).expect("frame is JSON"))
        .collect()
}

#[tokio::test]
async fn test_root_banner_and_health() {
    let addr = start_test_server().await;

    let banner: Value = reqwest::get(format!("http://{addr}/"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(banner["status"], "healthy");
    assert_eq!(banner["service"], "nutriagent");
    assert!(banner["version"].is_string());

    let health: Value = reqwest::get(format!("http://{addr}/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["agent"], "ready");
    assert_eq!(health["tools_count"], 5);
    assert_eq!(health["sessions"], 0);
    assert!(health["api_version"].is_string());
}

#[tokio::test]
async fn test_chat_answers_and_history_records_the_turn() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({ "message": "What's the nutrition of apples?" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let response = body["response"].as_str().unwrap();
    assert!(response.contains("52"), "unexpected response: {response}");
    let thread_id = body["thread_id"].as_str().unwrap().to_string();
    assert!(!thread_id.is_empty());
    assert!(body.get("image_path").is_none());

    let history: Value = client
        .get(format!("http://{addr}/api/history/{thread_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["thread_id"], thread_id.as_str());
    assert_eq!(history["message_count"], 4);

    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "What's the nutrition of apples?");
    assert_eq!(messages[1]["role"], "tool");
    assert_eq!(messages.last().unwrap()["role"], "assistant");
    assert!(messages
        .iter()
        .all(|row| row["content"].as_str().unwrap().chars().count() <= 500));
}

#[tokio::test]
async fn test_chat_continues_an_existing_thread() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let first: Value = client
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({ "message": "nutrition for bananas" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let thread_id = first["thread_id"].as_str().unwrap().to_string();

    let second: Value = client
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({ "message": "nutrition for oats", "thread_id": thread_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(second["thread_id"], thread_id.as_str());
    assert!(second["response"].as_str().unwrap().contains("389"));

    let history: Value = client
        .get(format!("http://{addr}/api/history/{thread_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["message_count"], 8);
}

#[tokio::test]
async fn test_blank_thread_id_starts_a_new_thread() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let body: Value = client
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({ "message": "hello", "thread_id": "" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert!(!body["thread_id"].as_str().unwrap().is_empty());
    assert!(!body["response"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_history_of_unknown_thread_is_404() {
    let addr = start_test_server().await;

    let response = reqwest::get(format!("http://{addr}/api/history/no-such-thread"))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "unknown_session");
}

#[tokio::test]
async fn test_chat_conflicts_while_a_turn_is_in_flight() {
    let (addr, sessions) = start_test_server_with_store().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("http://{addr}/api/threads"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let thread_id = created["thread_id"].as_str().unwrap().to_string();

    // Hold the thread's turn permit, as an in-flight turn would.
    let guard = sessions.begin_turn(&thread_id).await.unwrap();

    let busy = client
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({ "message": "hello", "thread_id": thread_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(busy.status(), reqwest::StatusCode::CONFLICT);
    let body: Value = busy.json().await.unwrap();
    assert_eq!(body["kind"], "session_busy");

    // Releasing the permit lets the next turn through.
    drop(guard);
    let retried = client
        .post(format!("http://{addr}/api/chat"))
        .json(&json!({ "message": "hello", "thread_id": thread_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(retried.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn test_clearing_history_is_idempotent() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(format!("http://{addr}/api/threads"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let thread_id = created["thread_id"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let response = client
            .delete(format!("http://{addr}/api/history/{thread_id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["cleared"], true);
        assert_eq!(body["thread_id"], thread_id.as_str());
    }
}

#[tokio::test]
async fn test_threads_can_be_created_and_listed() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/api/threads"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::CREATED);
    let created: Value = response.json().await.unwrap();
    let thread_id = created["thread_id"].as_str().unwrap().to_string();

    let listing: Value = client
        .get(format!("http://{addr}/api/threads"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["threads"][0]["thread_id"], thread_id.as_str());
    assert_eq!(listing["threads"][0]["message_count"], 0);
    assert!(listing["threads"][0]["last_activity"].is_string());
}

#[tokio::test]
async fn test_tools_listing_names_every_builtin() {
    let addr = start_test_server().await;

    let body: Value = reqwest::get(format!("http://{addr}/api/tools"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["count"], 5);

    let names: Vec<&str> = body["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    for expected in [
        "search_foods",
        "get_nutrition",
        "compare_nutrients",
        "calculate_recipe_nutrition",
        "generate_label",
    ] {
        assert!(names.contains(&expected), "missing tool: {expected}");
    }
    assert!(body["tools"][0]["input_schema"].is_object());
}

#[tokio::test]
async fn test_streaming_chat_emits_ordered_frames_and_serves_the_label() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let body = client
        .post(format!("http://{addr}/api/chat/stream"))
        .json(&json!({ "message": "Make a nutrition label for oats" }))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let frames = sse_frames(&body);
    assert!(!frames.is_empty());

    let thread_id = frames[0]["thread_id"].as_str().unwrap();
    assert!(frames.iter().all(|frame| frame["thread_id"] == thread_id));

    let kinds: Vec<&str> = frames
        .iter()
        .map(|frame| frame["type"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds
            .iter()
            .filter(|kind| **kind == "done" || **kind == "error")
            .count(),
        1
    );
    assert_eq!(*kinds.last().unwrap(), "done");

    let calls: Vec<&str> = frames
        .iter()
        .filter(|frame| frame["type"] == "tool_call")
        .map(|frame| frame["data"]["name"].as_str().unwrap())
        .collect();
    assert_eq!(calls, ["search_foods", "get_nutrition", "generate_label"]);

    let streamed: String = frames
        .iter()
        .filter(|frame| frame["type"] == "token")
        .map(|frame| frame["data"]["text"].as_str().unwrap())
        .collect();
    let done = frames.last().unwrap();
    assert_eq!(streamed, done["data"]["response"].as_str().unwrap());

    let image_path = done["data"]["image_path"].as_str().unwrap();
    let name = image_path.strip_prefix("/labels/").unwrap();
    let label = client
        .get(format!("http://{addr}/labels/{name}"))
        .send()
        .await
        .unwrap();
    assert_eq!(label.status(), reqwest::StatusCode::OK);
    assert!(label.text().await.unwrap().contains("Nutrition Facts"));
}

#[tokio::test]
async fn test_missing_label_is_404() {
    let addr = start_test_server().await;

    let response = reqwest::get(format!("http://{addr}/labels/nope.txt"))
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_malformed_chat_body_is_400() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let truncated = client
        .post(format!("http://{addr}/api/chat"))
        .header("content-type", "application/json")
        .body("{\"message\":")
        .send()
        .await
        .unwrap();
    assert_eq!(truncated.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = truncated.json().await.unwrap();
    assert_eq!(body["kind"], "bad_request");

    let missing_field = client
        .post(format!("http://{addr}/api/chat"))
        .header("content-type", "application/json")
        .body("{}")
        .send()
        .await
        .unwrap();
    assert_eq!(missing_field.status(), reqwest::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_cors_preflight_allows_the_local_frontend() {
    let addr = start_test_server().await;
    let client = reqwest::Client::new();

    let response = client
        .request(
            reqwest::Method::OPTIONS,
            format!("http://{addr}/api/chat"),
        )
        .header("origin", "http://localhost:5173")
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "content-type")
        .send()
        .await
        .unwrap();

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok()),
        Some("http://localhost:5173")
    );
}
