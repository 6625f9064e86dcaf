use anyhow::Context;
use clap::Args;
use serde_json::Value;

use super::{CliContext, LogArgs};
use greentic_plaid::logger::init_tracing;
use greentic_plaid::plaid::credentials::{ACCESS_TOKEN_KEY, AUTH_METHOD_KEY};
use greentic_plaid::plaid::sandbox::{
    DEFAULT_INSTITUTION, TEST_INSTITUTIONS, create_sandbox_access_token, institution_name,
};
use greentic_plaid::plaid::{PlaidClient, PlaidCredentials, PlaidEnvironment, PlaidSettings};

#[derive(Args, Debug)]
pub struct SandboxArgs {
    /// Sandbox institution to link
    #[arg(long, default_value = DEFAULT_INSTITUTION)]
    pub institution: String,

    /// List the sandbox test institutions and exit
    #[arg(short, long)]
    pub list: bool,

    /// Store the new access token as PLAID_ACCESS_TOKEN
    #[arg(long)]
    pub save: bool,

    #[command(flatten)]
    pub log: LogArgs,
}

pub async fn execute(args: SandboxArgs, context: &CliContext) -> anyhow::Result<()> {
    if args.list {
        println!("Sandbox test institutions:");
        for (id, name) in TEST_INSTITUTIONS {
            println!("  {id:<12} {name}");
        }
        return Ok(());
    }

    let (_logger, guard) = init_tracing(&args.log.to_config(&context.root))?;

    let mut credentials = PlaidCredentials::from_secrets(&context.secrets_manager)
        .await
        .context("PLAID_CLIENT_ID and PLAID_SECRET must be set, see `greentic-plaid secrets add`")?;
    credentials.environment = PlaidEnvironment::Sandbox;
    let settings = PlaidSettings::from_config(&context.config_manager).await;
    let client = PlaidClient::new(&credentials, &settings)?;

    println!(
        "🏦 Linking {} ({}) on {}",
        institution_name(&args.institution).unwrap_or("unknown institution"),
        args.institution,
        client.base_url()
    );
    let result = create_sandbox_access_token(&client, &args.institution).await;
    guard.shutdown();
    let token = result?;

    println!("\n✅ Public token:  {}", token.public_token);
    println!("✅ Access token:  {}", token.access_token);
    println!("✅ Item id:       {}", token.item_id);
    println!("\nAccounts ({}):", token.accounts.len());
    for account in &token.accounts {
        println!("  {}", describe_account(account));
    }

    if args.save {
        context
            .secrets_manager
            .add_secret(ACCESS_TOKEN_KEY, &token.access_token)
            .await?;
        context
            .secrets_manager
            .add_secret(AUTH_METHOD_KEY, "access_token")
            .await?;
        println!("\n💾 Stored {ACCESS_TOKEN_KEY} in the secrets store.");
    } else {
        println!("\nNext steps:");
        println!(
            "  greentic-plaid secrets add {ACCESS_TOKEN_KEY} {}",
            token.access_token
        );
        println!("  greentic-plaid run --node <node.yaml>");
    }
    Ok(())
}

fn describe_account(account: &Value) -> String {
    let text = |key: &str| account.get(key).and_then(Value::as_str).unwrap_or("-");
    let balance = account
        .pointer("/balances/current")
        .and_then(Value::as_f64)
        .map(|b| format!("{b:.2}"))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "{} ({}) id={} balance={}",
        text("name"),
        text("subtype"),
        text("account_id"),
        balance
    )
}
