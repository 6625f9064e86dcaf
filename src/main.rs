mod cli;

use clap::Parser;
use cli::{Cli, CliContext};
use greentic_plaid::{
    config::{ConfigManager, EnvConfigManager},
    secret::{EnvSecretsManager, SecretsManager},
};
use std::{env, path::PathBuf};

/// Resolve the greentic root directory from the environment or use default.
pub fn resolve_root_dir() -> PathBuf {
    if let Ok(path) = env::var("GREENTIC_ROOT") {
        PathBuf::from(path)
    } else {
        PathBuf::from("./greentic")
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let root = resolve_root_dir();

    let config_manager = ConfigManager(EnvConfigManager::new(root.join("config").join(".env")));
    let secrets_manager = SecretsManager(EnvSecretsManager::new(Some(root.join("secrets"))));
    let context = CliContext::new(root, config_manager, secrets_manager);

    cli::execute(&context, cli.command).await
}
