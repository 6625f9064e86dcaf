use clap::{Args, Subcommand};

use super::CliContext;
use greentic_plaid::plaid::helpers::mask_credential;

#[derive(Args, Debug)]
pub struct SecretArgs {
    #[command(subcommand)]
    pub command: SecretCommands,
}

/// Plaid reads PLAID_CLIENT_ID, PLAID_SECRET, PLAID_ENVIRONMENT and
/// optionally PLAID_ACCESS_TOKEN, PLAID_PUBLIC_TOKEN, PLAID_AUTH_METHOD.
#[derive(Subcommand, Debug)]
pub enum SecretCommands {
    Add { key: String, secret: String },
    Update { key: String, secret: String },
    Delete { key: String },
    /// Show stored keys with masked values
    List,
}

pub async fn execute(args: SecretArgs, context: &CliContext) -> anyhow::Result<()> {
    match args.command {
        SecretCommands::Add { key, secret } => {
            match context.secrets_manager.add_secret(&key, &secret).await {
                Ok(_) => println!("✅ Secret {key} added."),
                Err(e) => eprintln!("❌ Secret {key} could not be added: {e}"),
            }
        }
        SecretCommands::Update { key, secret } => {
            match context.secrets_manager.update_secret(&key, &secret).await {
                Ok(_) => println!("✅ Secret {key} updated."),
                Err(e) => eprintln!("❌ Secret {key} could not be updated: {e}"),
            }
        }
        SecretCommands::Delete { key } => match context.secrets_manager.delete_secret(&key).await {
            Ok(_) => println!("✅ Secret {key} deleted."),
            Err(e) => eprintln!("❌ Secret {key} could not be deleted: {e}"),
        },
        SecretCommands::List => {
            let mut secrets = context.secrets_manager.0.as_vec().await;
            secrets.sort();
            for (key, value) in secrets {
                println!("{key}={}", mask_credential(&value));
            }
        }
    }
    Ok(())
}
