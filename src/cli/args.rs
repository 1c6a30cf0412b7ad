//! CLI argument types - shared between binary and tests

use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(name = "cookie-relay")]
#[command(about = "HTTP/JSON relay in front of an MCP server with automatic reconnection")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The subcommand to run; a bare invocation means `serve`, still
    /// honouring `COOKIE_RELAY_CONFIG`
    pub fn into_command(self) -> Command {
        self.command
            .unwrap_or_else(|| Command::Serve(ServeArgs::parse_from(["serve"])))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the relay
    Serve(ServeArgs),
    /// Query a running relay's connection status
    Status(StatusArgs),
    /// Inspect configuration
    Config(ConfigArgs),
    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser, Debug, Default)]
pub struct ServeArgs {
    /// Configuration file path (TOML)
    #[arg(short, long, env = "COOKIE_RELAY_CONFIG")]
    pub config: Option<String>,
    /// Host to bind to
    #[arg(short = 'H', long)]
    pub host: Option<String>,
    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,
    /// MCP server endpoint
    #[arg(short, long)]
    pub backend_url: Option<String>,
    /// Log level
    #[arg(short, long)]
    pub log_level: Option<String>,
    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Base URL of the running relay
    #[arg(short, long, default_value = "http://127.0.0.1:12307")]
    pub url: String,
    /// Print the raw JSON response
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
    /// Configuration file path (TOML)
    #[arg(short, long, env = "COOKIE_RELAY_CONFIG", global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration JSON Schema
    Schema,
    /// Validate a configuration file
    Validate { path: String },
}
