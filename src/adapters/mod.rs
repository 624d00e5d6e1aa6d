//! Adapters for external surfaces: HTTP handlers, tool routing, the MCP
//! client and the plan-saving tool

pub mod api_handler;
pub mod daily_plan_tool;
pub mod health_handler;
pub mod mcp_client;
pub mod tool_handler;
