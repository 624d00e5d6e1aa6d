//! HTTP handlers for the agent API
//!
//! Four surfaces: buffered chat (`/invocations`), streamed chat over SSE
//! (`/analyze`), the daily-planner trigger (`/plan`) and session history
//! (`/history`). Request validation happens here, before any pipeline
//! stage runs; a bad request never touches the agent system.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

use crate::agents::domain::PipelineEvent;
use crate::agents::handler::AgentHandler;
use crate::agents::presets::DEFAULT_CHAT_SESSION;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub agents: Arc<AgentHandler>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Extract a non-empty string field from a JSON body
fn string_field(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

fn internal_error(message: String) -> Response {
    error!("{}", message);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
        .into_response()
}

/// POST /invocations - run a pipeline to completion and return the result
pub async fn invoke(State(state): State<ApiState>, Json(body): Json<Value>) -> Response {
    let Some(message) = string_field(&body, "message") else {
        return bad_request("Message is required");
    };
    let session_id = string_field(&body, "sessionId");
    let agent_type = string_field(&body, "agentType");

    let stream = match state.agents.invoke(message, session_id, agent_type.as_deref()) {
        Ok(stream) => stream,
        Err(e) => return internal_error(e.to_string()),
    };

    let terminal = stream
        .collect_all()
        .await
        .into_iter()
        .find(PipelineEvent::is_terminal);

    match terminal {
        Some(PipelineEvent::Result {
            content,
            session_id,
        }) => Json(json!({
            "type": "result",
            "content": content,
            "sessionId": session_id,
        }))
        .into_response(),
        Some(PipelineEvent::Error { message }) => internal_error(message),
        _ => internal_error("stream closed before a terminal event".to_string()),
    }
}

/// POST /analyze - run a pipeline, streaming events over SSE
pub async fn analyze(State(state): State<ApiState>, Json(body): Json<Value>) -> Response {
    let Some(message) = string_field(&body, "message") else {
        return bad_request("Message is required");
    };
    let session_id = string_field(&body, "sessionId");
    let agent_type = string_field(&body, "agentType");

    let stream = match state.agents.invoke(message, session_id, agent_type.as_deref()) {
        Ok(stream) => stream,
        Err(e) => return internal_error(e.to_string()),
    };

    let sse_stream = stream.map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok::<Event, Infallible>(Event::default().event(event.event_name()).data(data))
    });

    Sse::new(sse_stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

/// POST /plan - run the daily-planner pipeline over the supplied inputs
pub async fn plan(State(state): State<ApiState>, Json(body): Json<Value>) -> Response {
    let strategy_pdf_text = string_field(&body, "strategy_pdf_text");
    let broker_url = string_field(&body, "broker_url");
    let (Some(strategy_pdf_text), Some(broker_url)) = (strategy_pdf_text, broker_url) else {
        return bad_request("strategy_pdf_text and broker_url are required");
    };
    let session_id = string_field(&body, "sessionId");

    let stream = match state.agents.plan(strategy_pdf_text, broker_url, session_id) {
        Ok(stream) => stream,
        Err(e) => return internal_error(e.to_string()),
    };

    match stream.into_outcome().await {
        Ok(result) => Json(json!({ "status": "success", "result": result })).into_response(),
        Err(message) => {
            error!("Plan run failed: {}", message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": message })),
            )
                .into_response()
        }
    }
}

/// GET /history?sessionId= - fetch a session's conversation history
pub async fn get_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let session_id = query
        .session_id
        .unwrap_or_else(|| DEFAULT_CHAT_SESSION.to_string());

    match state.agents.history(&session_id).await {
        Ok(session) => {
            let messages = session.map(|s| s.messages).unwrap_or_default();
            Json(json!({ "sessionId": session_id, "messages": messages })).into_response()
        }
        Err(e) => internal_error(e.to_string()),
    }
}

/// DELETE /history?sessionId= - clear one session, or every session when
/// no sessionId is given
pub async fn delete_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let result = match &query.session_id {
        Some(session_id) => state.agents.clear_history(session_id).await,
        None => state.agents.clear_all_history().await,
    };

    match result {
        Ok(()) => {
            let message = match query.session_id {
                Some(session_id) => format!("History cleared for session: {}", session_id),
                None => "All history cleared".to_string(),
            };
            Json(json!({ "status": "success", "message": message })).into_response()
        }
        Err(e) => internal_error(e.to_string()),
    }
}
