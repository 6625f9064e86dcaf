//! Sandbox-only shortcut that links a test institution without Plaid Link.

use serde_json::{Map, Value, json};
use tracing::info;

use super::auth::exchange_public_token;
use super::client::PlaidClient;
use super::error::PlaidError;

pub const DEFAULT_INSTITUTION: &str = "ins_109509";

pub const TEST_INSTITUTIONS: &[(&str, &str)] = &[
    ("ins_3", "Chase"),
    ("ins_4", "Bank of America"),
    ("ins_5", "Wells Fargo"),
    ("ins_6", "Citibank"),
    ("ins_7", "Capital One"),
    ("ins_109508", "First Republic Bank"),
    ("ins_109509", "Tartan Bank"),
];

pub fn institution_name(institution_id: &str) -> Option<&'static str> {
    TEST_INSTITUTIONS
        .iter()
        .find(|(id, _)| *id == institution_id)
        .map(|(_, name)| *name)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxToken {
    pub public_token: String,
    pub access_token: String,
    pub item_id: String,
    pub accounts: Vec<Value>,
}

/// Create a public token for `institution_id`, exchange it, and check the
/// resulting access token by listing the item's accounts.
pub async fn create_sandbox_access_token(
    client: &PlaidClient,
    institution_id: &str,
) -> Result<SandboxToken, PlaidError> {
    let mut body = Map::new();
    body.insert("institution_id".into(), json!(institution_id));
    body.insert("initial_products".into(), json!(["transactions", "auth"]));
    let created = client.post("/sandbox/public_token/create", body).await?;
    let public_token = created
        .get("public_token")
        .and_then(Value::as_str)
        .ok_or_else(|| PlaidError::Transport("sandbox response has no public_token".into()))?
        .to_string();
    info!(institution_id, "sandbox public token created");

    let exchanged = exchange_public_token(client, &public_token).await?;

    let mut body = Map::new();
    body.insert("access_token".into(), json!(exchanged.access_token));
    let accounts = client
        .post("/accounts/get", body)
        .await?
        .get("accounts")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    Ok(SandboxToken {
        public_token,
        access_token: exchanged.access_token,
        item_id: exchanged.item_id,
        accounts,
    })
}
