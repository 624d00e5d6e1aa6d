use clap::Parser;
use std::path::PathBuf;

/// ForexAI Trading Agent server
#[derive(Parser, Debug, Clone)]
#[command(name = "forexai", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "FOREXAI_CONFIG", default_value = "forexai.toml")]
    pub config: PathBuf,

    /// Server host address
    #[arg(long, env = "FOREXAI_HOST")]
    pub host: Option<String>,

    /// Server port
    #[arg(long, env = "FOREXAI_PORT")]
    pub port: Option<u16>,

    /// Postgres URL for plan persistence
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,
}
