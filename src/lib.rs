//! # ForexAI Trading Agent
//!
//! An HTTP server that wires LLM agents into fixed pipelines for Forex
//! market analysis and daily trade planning.
//!
//! ## Architecture
//!
//! - **agents**: providers, session memory, the tool loop and the
//!   sequential pipeline runner
//! - **adapters**: HTTP handlers, tool routing, the stdio MCP client and
//!   the plan-saving tool
//! - **persistence**: the daily-plan database sink
//! - **config**: file/env/CLI configuration loading
//!
//! Browser automation comes from an external Playwright MCP server spawned
//! over stdio; its tools are exposed to agents under the `mcp__playwright_`
//! prefix.

pub mod adapters;
pub mod agents;
pub mod cli;
pub mod config;
pub mod domain;
pub mod persistence;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::adapters::{api_handler, health_handler};

pub use crate::adapters::api_handler::ApiState;

/// Build the application router with all endpoints configured
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .route("/", get(health_handler::service_info))
        .route("/ping", get(health_handler::ping))
        .route("/invocations", post(api_handler::invoke))
        .route("/analyze", post(api_handler::analyze))
        .route("/plan", post(api_handler::plan))
        .route(
            "/history",
            get(api_handler::get_history).delete(api_handler::delete_history),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
