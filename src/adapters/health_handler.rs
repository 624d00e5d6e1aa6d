//! Service descriptor and health endpoints

use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

/// GET / - describe the service and its endpoints
pub async fn service_info() -> impl IntoResponse {
    Json(json!({
        "service": "ForexAI Trading Agent",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/ping",
            "chat": "POST /invocations",
            "stream": "POST /analyze",
            "plan": "POST /plan",
            "history": "GET|DELETE /history",
        },
    }))
}

/// GET /ping - liveness check
pub async fn ping() -> impl IntoResponse {
    Json(json!({
        "status": "Healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn ping_returns_ok() {
        let response = ping().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn service_info_returns_ok() {
        let response = service_info().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
