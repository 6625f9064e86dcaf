use std::fmt::Debug;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::client::PlaidClient;
use super::credentials::PlaidCredentials;
use super::error::PlaidError;

pub const EXCHANGE_ENDPOINT: &str = "/item/public_token/exchange";

/// How account-scoped calls obtain their access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// A long-lived access token stored with the credentials.
    AccessToken,
    /// A Link public token, exchanged for an access token on use.
    PublicToken,
    /// No item access; only institution and link-token calls work.
    ClientOnly,
}

impl AuthMethod {
    /// Accepts `access_token`, `accessToken`, `public-token`, `client only`
    /// and similar spellings. Unknown names give `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalised: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        match normalised.as_str() {
            "accesstoken" | "legacy" | "static" => Some(AuthMethod::AccessToken),
            "publictoken" | "exchange" => Some(AuthMethod::PublicToken),
            "clientonly" | "client" | "none" => Some(AuthMethod::ClientOnly),
            _ => None,
        }
    }

    /// Explicit choice if one was stored, otherwise whichever token is present.
    pub fn effective(credentials: &PlaidCredentials) -> Self {
        if let Some(method) = credentials.auth_method {
            return method;
        }
        if credentials.access_token.is_some() {
            AuthMethod::AccessToken
        } else if credentials.public_token.is_some() {
            AuthMethod::PublicToken
        } else {
            AuthMethod::ClientOnly
        }
    }
}

#[async_trait]
pub trait AccessTokenResolver: Send + Sync + Debug {
    fn method(&self) -> AuthMethod;
    async fn resolve(&self, client: &PlaidClient) -> Result<String, PlaidError>;
}

#[derive(Debug, Clone)]
pub struct StaticAccessToken {
    token: Option<String>,
}

#[async_trait]
impl AccessTokenResolver for StaticAccessToken {
    fn method(&self) -> AuthMethod {
        AuthMethod::AccessToken
    }

    async fn resolve(&self, _client: &PlaidClient) -> Result<String, PlaidError> {
        self.token.clone().ok_or_else(|| {
            PlaidError::AuthResolution("no access token is stored with the credentials".into())
        })
    }
}

#[derive(Debug, Clone)]
pub struct PublicTokenExchange {
    public_token: Option<String>,
}

#[async_trait]
impl AccessTokenResolver for PublicTokenExchange {
    fn method(&self) -> AuthMethod {
        AuthMethod::PublicToken
    }

    async fn resolve(&self, client: &PlaidClient) -> Result<String, PlaidError> {
        let public_token = self.public_token.as_deref().ok_or_else(|| {
            PlaidError::AuthResolution("no public token is stored with the credentials".into())
        })?;
        let exchanged = exchange_public_token(client, public_token).await?;
        debug!(item_id = %exchanged.item_id, "public token exchanged");
        Ok(exchanged.access_token)
    }
}

#[derive(Debug, Clone)]
pub struct ClientOnly;

#[async_trait]
impl AccessTokenResolver for ClientOnly {
    fn method(&self) -> AuthMethod {
        AuthMethod::ClientOnly
    }

    async fn resolve(&self, _client: &PlaidClient) -> Result<String, PlaidError> {
        Err(PlaidError::AuthResolution(
            "this operation needs an access token, but the credentials are client-only".into(),
        ))
    }
}

/// Pick the access token strategy for one execution.
pub fn resolver_for(credentials: &PlaidCredentials) -> Box<dyn AccessTokenResolver> {
    let method = AuthMethod::effective(credentials);
    info!(?method, "access token strategy selected");
    match method {
        AuthMethod::AccessToken => Box::new(StaticAccessToken {
            token: credentials.access_token.clone(),
        }),
        AuthMethod::PublicToken => Box::new(PublicTokenExchange {
            public_token: credentials.public_token.clone(),
        }),
        AuthMethod::ClientOnly => Box::new(ClientOnly),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangedToken {
    pub access_token: String,
    pub item_id: String,
    pub request_id: Option<String>,
}

pub async fn exchange_public_token(
    client: &PlaidClient,
    public_token: &str,
) -> Result<ExchangedToken, PlaidError> {
    let mut body = Map::new();
    body.insert("public_token".into(), json!(public_token));
    let response = client.post(EXCHANGE_ENDPOINT, body).await?;

    let field = |key: &str| response.get(key).and_then(Value::as_str).map(str::to_string);
    let access_token = field("access_token").ok_or_else(|| {
        PlaidError::Transport("token exchange response has no access_token".into())
    })?;

    Ok(ExchangedToken {
        access_token,
        item_id: field("item_id").unwrap_or_default(),
        request_id: field("request_id"),
    })
}
