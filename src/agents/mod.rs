//! Agent system: configuration, LLM providers, session memory, the tool
//! loop and the sequential pipeline runner

pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod handler;
pub mod llm;
pub mod memory;
pub mod pipeline;
pub mod presets;
