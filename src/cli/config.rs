use clap::{Args, Subcommand};

use super::CliContext;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

/// Plaid reads PLAID_TIMEOUT_SECS, PLAID_BASE_URL and PLAID_VERSION.
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    Add { key: String, value: String },
    Update { key: String, value: String },
    Delete { key: String },
    /// Print the value currently in effect
    Get { key: String },
    /// Show the PLAID_* values currently in effect
    List,
}

pub async fn execute(args: ConfigArgs, context: &CliContext) -> anyhow::Result<()> {
    match args.command {
        ConfigCommands::Add { key, value } => {
            match context.config_manager.0.set(&key, &value).await {
                Ok(_) => println!("✅ Config {key} added."),
                Err(e) => eprintln!("❌ Config {key} could not be added: {e}"),
            }
        }
        ConfigCommands::Update { key, value } => {
            match context.config_manager.0.set(&key, &value).await {
                Ok(_) => println!("✅ Config {key} updated."),
                Err(e) => eprintln!("❌ Config {key} could not be updated: {e}"),
            }
        }
        ConfigCommands::Delete { key } => {
            context.config_manager.0.del(&key).await;
            println!("✅ Config {key} deleted.");
        }
        ConfigCommands::Get { key } => match context.config_manager.get(&key).await {
            Some(value) => println!("{key}={value}"),
            None => eprintln!("{key} is not set"),
        },
        ConfigCommands::List => {
            for (key, value) in plaid_entries(context.config_manager.0.as_vec().await) {
                println!("{key}={value}");
            }
        }
    }
    Ok(())
}

/// The env-backed manager sees the whole process environment; keep only
/// the node's own keys.
fn plaid_entries(mut entries: Vec<(String, String)>) -> Vec<(String, String)> {
    entries.retain(|(key, _)| key.starts_with("PLAID_"));
    entries.sort();
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use greentic_plaid::config::{ConfigManagerType, MapConfigManager};

    #[tokio::test]
    async fn list_shows_only_plaid_keys() {
        let mgr = MapConfigManager::with_entries([
            ("PLAID_VERSION", "2020-09-14"),
            ("PATH", "/usr/bin"),
            ("PLAID_BASE_URL", "http://localhost:1234"),
        ]);
        assert_eq!(
            plaid_entries(mgr.as_vec().await),
            vec![
                ("PLAID_BASE_URL".to_string(), "http://localhost:1234".to_string()),
                ("PLAID_VERSION".to_string(), "2020-09-14".to_string()),
            ]
        );
    }
}
