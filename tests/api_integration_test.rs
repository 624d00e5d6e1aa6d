use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use forexai::agents::config::AgentConfig;
use forexai::agents::core::{Agent, AgentInvocation};
use forexai::agents::domain::{AgentChunk, AgentResponse, AgentStream};
use forexai::agents::handler::AgentHandler;
use forexai::agents::memory::InMemoryStore;
use forexai::agents::pipeline::PipelineRunner;
use forexai::agents::presets;
use forexai::ApiState;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::util::ServiceExt;

/// Agent that returns a fixed answer without touching any model
struct ScriptedAgent {
    config: AgentConfig,
    output: String,
}

impl Agent for ScriptedAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn execute(&self, _invocation: AgentInvocation) -> AgentStream {
        let (sender, stream) = AgentStream::channel(16);
        let output = self.output.clone();
        tokio::spawn(async move {
            let _ = sender.send(AgentChunk::text(&output)).await;
            let _ = sender
                .send(AgentChunk::complete(AgentResponse {
                    output,
                    tool_calls: Vec::new(),
                    execution_time_ms: 1,
                }))
                .await;
        });
        stream
    }
}

fn scripted(name: &str, output: &str) -> Arc<dyn Agent> {
    Arc::new(ScriptedAgent {
        config: AgentConfig::new(name, "gemini", "gemini-1.5-pro", "test"),
        output: output.to_string(),
    })
}

/// App over scripted agents covering every preset pipeline stage
fn build_app() -> axum::Router {
    let mut agents: HashMap<String, Arc<dyn Agent>> = HashMap::new();
    agents.insert("analyst".to_string(), scripted("analyst", "EURUSD looks bullish"));
    agents.insert("executor".to_string(), scripted("executor", "Order placed"));
    agents.insert(
        "orchestrator".to_string(),
        scripted("orchestrator", "gathered analysis"),
    );
    agents.insert(
        "synthesizer".to_string(),
        scripted("synthesizer", "## Market Analysis Summary"),
    );
    agents.insert(
        "chart-scraper".to_string(),
        scripted("chart-scraper", "screenshot captured"),
    );
    agents.insert(
        "strategy-analyst".to_string(),
        scripted("strategy-analyst", "BULLISH with three levels"),
    );
    agents.insert(
        "plan-writer".to_string(),
        scripted("plan-writer", "Plan saved with ID: 7"),
    );

    let store = Arc::new(InMemoryStore::new(50));
    let handler = AgentHandler::new(
        PipelineRunner::new(agents, store.clone()),
        presets::default_pipelines(),
        store,
    );
    forexai::create_app(ApiState {
        agents: Arc::new(handler),
    })
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .method("POST")
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn root_describes_the_service() {
    let app = build_app();
    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["service"], "ForexAI Trading Agent");
    assert_eq!(body["status"], "running");
    assert_eq!(body["endpoints"]["health"], "/ping");
}

#[tokio::test]
async fn ping_reports_healthy_with_a_timestamp() {
    let app = build_app();
    let response = app
        .oneshot(Request::builder().uri("/ping").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "Healthy");
    assert!(body["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn invocation_without_message_is_rejected() {
    let app = build_app();
    let response = app
        .oneshot(post_json("/invocations", json!({ "sessionId": "s1" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "Message is required");
}

#[tokio::test]
async fn invocation_runs_the_default_analyst() {
    let app = build_app();
    let response = app
        .oneshot(post_json("/invocations", json!({ "message": "How is EURUSD?" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["type"], "result");
    assert_eq!(body["content"], "EURUSD looks bullish");
    assert_eq!(body["sessionId"], "default-session");
}

#[tokio::test]
async fn orchestrator_type_runs_the_two_stage_chat_pipeline() {
    let app = build_app();
    let response = app
        .oneshot(post_json(
            "/invocations",
            json!({ "message": "full analysis please", "agentType": "orchestrator" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The synthesizer is the last stage, so its output is the result
    let body = body_json(response).await;
    assert_eq!(body["content"], "## Market Analysis Summary");
}

#[tokio::test]
async fn analyze_streams_ordered_events_over_sse() {
    let app = build_app();
    let response = app
        .oneshot(post_json("/analyze", json!({ "message": "stream it" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/event-stream"))
        .unwrap_or(false));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();

    let connected = body.find("event: connected").unwrap();
    let result = body.find("event: result").unwrap();
    let done = body.find("event: done").unwrap();
    assert!(connected < result && result < done);
    assert!(!body.contains("event: error"));
}

#[tokio::test]
async fn plan_requires_both_inputs() {
    let app = build_app();
    let response = app
        .oneshot(post_json("/plan", json!({ "broker_url": "https://broker.example" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "strategy_pdf_text and broker_url are required");
}

#[tokio::test]
async fn plan_runs_the_three_stage_planner() {
    let app = build_app();
    let response = app
        .oneshot(post_json(
            "/plan",
            json!({
                "strategy_pdf_text": "Trade breakouts above the Asian range.",
                "broker_url": "https://broker.example/chart"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "success");
    assert_eq!(body["result"], "Plan saved with ID: 7");
}

#[tokio::test]
async fn history_roundtrip_records_and_clears_a_session() {
    let app = build_app();

    let response = app
        .clone()
        .oneshot(post_json(
            "/invocations",
            json!({ "message": "hello", "sessionId": "trader-1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/history?sessionId=trader-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["sessionId"], "trader-1");
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["content"], "hello");
    assert_eq!(messages[1]["content"], "EURUSD looks bullish");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/history?sessionId=trader-1")
                .method("DELETE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "success");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/history?sessionId=trader-1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert!(body["messages"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn delete_without_session_clears_everything() {
    let app = build_app();

    for session in ["alpha", "beta"] {
        let response = app
            .clone()
            .oneshot(post_json(
                "/invocations",
                json!({ "message": "hi", "sessionId": session }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/history")
                .method("DELETE")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["message"], "All history cleared");

    for session in ["alpha", "beta"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/history?sessionId={}", session))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = body_json(response).await;
        assert!(body["messages"].as_array().unwrap().is_empty());
    }
}

#[tokio::test]
async fn unknown_history_session_renders_empty() {
    let app = build_app();
    let response = app
        .oneshot(
            Request::builder()
                .uri("/history?sessionId=never-seen")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["messages"].as_array().unwrap().is_empty());
}
