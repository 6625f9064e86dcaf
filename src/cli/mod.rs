use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

pub mod config;
pub mod run;
pub mod sandbox;
pub mod schema;
pub mod secrets;

use config::ConfigArgs;
use run::RunArgs;
use sandbox::SandboxArgs;
use schema::SchemaArgs;
use secrets::SecretArgs;

use greentic_plaid::{
    config::ConfigManager,
    logger::{LogConfig, LogLevel},
    secret::SecretsManager,
};

#[derive(Parser, Debug)]
#[command(
    name = "greentic-plaid",
    about = "Plaid financial-data node for Greentic flows",
    version = "0.1.0"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Execute a node definition against a batch of items
    Run(RunArgs),

    /// Emit JSON‐Schema
    Schema(SchemaArgs),

    /// Link a sandbox institution and print a usable access token
    SandboxToken(SandboxArgs),

    /// Handle secrets
    Secrets(SecretArgs),

    /// Handle configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct LogArgs {
    /// Log level (e.g. error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// OpenTelemetry endpoint (e.g. http://localhost:4318)
    #[arg(long)]
    pub otel_endpoint: Option<String>,
}

impl LogArgs {
    pub fn to_config(&self, root: &Path) -> LogConfig {
        LogConfig::new(
            root,
            LogLevel::parse(&self.log_level),
            self.otel_endpoint.clone(),
        )
    }
}

#[derive(Clone)]
pub struct CliContext {
    pub root: PathBuf,
    pub config_manager: ConfigManager,
    pub secrets_manager: SecretsManager,
}

impl CliContext {
    pub fn new(
        root: PathBuf,
        config_manager: ConfigManager,
        secrets_manager: SecretsManager,
    ) -> Self {
        Self {
            root,
            config_manager,
            secrets_manager,
        }
    }
}

pub async fn execute(context: &CliContext, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run(args) => run::execute(args, context).await,
        Commands::Schema(args) => schema::execute(args, context).await,
        Commands::SandboxToken(args) => sandbox::execute(args, context).await,
        Commands::Secrets(args) => secrets::execute(args, context).await,
        Commands::Config(args) => config::execute(args, context).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_command() {
        let cli = Cli::try_parse_from([
            "greentic-plaid",
            "run",
            "--node",
            "sync.yaml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.node, PathBuf::from("sync.yaml"));
                assert!(args.items.is_none());
                let config = args.log.to_config(Path::new("/tmp/g"));
                assert_eq!(config.log_level, LogLevel::Debug);
                assert_eq!(config.log_file, PathBuf::from("/tmp/g/logs/greentic-plaid.log"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_sandbox_token_defaults() {
        let cli = Cli::try_parse_from(["greentic-plaid", "sandbox-token"]).unwrap();
        match cli.command {
            Commands::SandboxToken(args) => {
                assert_eq!(args.institution, "ins_109509");
                assert!(!args.list);
                assert!(!args.save);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
