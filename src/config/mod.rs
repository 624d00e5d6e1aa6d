//! Configuration loading
//!
//! Settings come from an optional TOML file with CLI/environment overrides
//! (CLI > env > file > defaults). Model identifiers, credentials and tool
//! server commands are opaque strings here; nothing validates their content
//! beyond shape.

use config::{Config, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::cli::Cli;

#[derive(Debug, Deserialize, Serialize)]
pub struct Settings {
    pub server: ServerSettings,
    /// Optional plan database; without it the save tool reports failure
    #[serde(default)]
    pub database: Option<DatabaseSettings>,
    /// LLM providers keyed by name ("openai", "gemini")
    #[serde(default)]
    pub providers: HashMap<String, LlmProviderSettings>,
    /// External MCP tool servers to spawn
    #[serde(default = "default_mcp_servers")]
    pub mcp_servers: Vec<McpServerSettings>,
    #[serde(default)]
    pub memory: MemorySettings,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseSettings {
    /// Postgres connection URL
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Configuration for one LLM provider
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmProviderSettings {
    /// Default model identifier
    pub model: String,
    /// Environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Override for the provider's API base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Configuration for an external MCP tool server (stdio transport)
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct McpServerSettings {
    /// Unique name for this server connection
    pub name: String,
    /// Command to spawn
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the spawned process
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Per-request timeout in seconds
    #[serde(default = "default_mcp_timeout")]
    pub timeout_seconds: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_mcp_timeout() -> u64 {
    60
}

/// The browser automation server every deployment carries by default
fn default_mcp_servers() -> Vec<McpServerSettings> {
    vec![McpServerSettings {
        name: "playwright".to_string(),
        command: "npx".to_string(),
        args: vec!["@playwright/mcp@latest".to_string()],
        env: HashMap::new(),
        enabled: true,
        timeout_seconds: default_mcp_timeout(),
    }]
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MemorySettings {
    /// Most recent messages kept per session
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

fn default_max_messages() -> usize {
    50
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
        }
    }
}

impl Settings {
    /// Create settings from CLI arguments (config file plus CLI overrides)
    pub fn new_with_cli(cli: &Cli) -> Result<Self, anyhow::Error> {
        let s = Config::builder()
            .add_source(File::from(cli.config.clone()).required(false))
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8090)?
            .build()?;

        let mut settings: Settings = s.try_deserialize()?;
        settings.apply_cli_overrides(cli);

        Ok(settings)
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.server.host = host.clone();
        }
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(url) = &cli.database_url {
            self.database = Some(DatabaseSettings {
                url: url.clone(),
                max_connections: default_max_connections(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn defaults_apply_without_a_config_file() {
        let cli = Cli::parse_from(["forexai", "--config", "/nonexistent/forexai.toml"]);
        let settings = Settings::new_with_cli(&cli).unwrap();
        assert_eq!(settings.server.port, 8090);
        assert_eq!(settings.memory.max_messages, 50);
        assert_eq!(settings.mcp_servers.len(), 1);
        assert_eq!(settings.mcp_servers[0].name, "playwright");
        assert_eq!(settings.mcp_servers[0].command, "npx");
    }

    #[test]
    fn cli_overrides_win() {
        let cli = Cli::parse_from([
            "forexai",
            "--config",
            "/nonexistent/forexai.toml",
            "--port",
            "9999",
            "--host",
            "127.0.0.1",
        ]);
        let settings = Settings::new_with_cli(&cli).unwrap();
        assert_eq!(settings.server.port, 9999);
        assert_eq!(settings.server.host, "127.0.0.1");
    }
}
