use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::auth::AuthMethod;
use super::environment::PlaidEnvironment;
use super::helpers::mask_credential;
use crate::secret::SecretsManager;

pub const ENVIRONMENT_KEY: &str = "PLAID_ENVIRONMENT";
pub const CLIENT_ID_KEY: &str = "PLAID_CLIENT_ID";
pub const SECRET_KEY: &str = "PLAID_SECRET";
pub const ACCESS_TOKEN_KEY: &str = "PLAID_ACCESS_TOKEN";
pub const PUBLIC_TOKEN_KEY: &str = "PLAID_PUBLIC_TOKEN";
pub const AUTH_METHOD_KEY: &str = "PLAID_AUTH_METHOD";

/// Stored Plaid credentials for one node invocation.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlaidCredentials {
    #[serde(default)]
    pub environment: PlaidEnvironment,
    pub client_id: String,
    pub secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_method: Option<AuthMethod>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    Missing(&'static str),
    Backend(String),
}

impl fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialsError::Missing(key) => write!(f, "missing Plaid credential {}", key),
            CredentialsError::Backend(msg) => write!(f, "could not read Plaid credentials: {}", msg),
        }
    }
}

impl std::error::Error for CredentialsError {}

impl PlaidCredentials {
    pub fn new(environment: PlaidEnvironment, client_id: &str, secret: &str) -> Self {
        Self {
            environment,
            client_id: client_id.to_string(),
            secret: secret.to_string(),
            ..Default::default()
        }
    }

    pub fn with_access_token(mut self, token: &str) -> Self {
        self.access_token = Some(token.to_string());
        self
    }

    pub fn with_public_token(mut self, token: &str) -> Self {
        self.public_token = Some(token.to_string());
        self
    }

    pub fn with_auth_method(mut self, method: AuthMethod) -> Self {
        self.auth_method = Some(method);
        self
    }

    /// Read the credential set from the secrets store. Blank values count as
    /// absent; client id and secret are mandatory.
    pub async fn from_secrets(secrets: &SecretsManager) -> Result<Self, CredentialsError> {
        let environment = read_secret(secrets, ENVIRONMENT_KEY)
            .await?
            .map(|e| PlaidEnvironment::parse(&e))
            .unwrap_or_default();
        let client_id = read_secret(secrets, CLIENT_ID_KEY)
            .await?
            .ok_or(CredentialsError::Missing(CLIENT_ID_KEY))?;
        let secret = read_secret(secrets, SECRET_KEY).await?.ok_or(CredentialsError::Missing(SECRET_KEY))?;
        let auth_method = read_secret(secrets, AUTH_METHOD_KEY)
            .await?
            .and_then(|m| AuthMethod::parse(&m));

        Ok(Self {
            environment,
            client_id,
            secret,
            access_token: read_secret(secrets, ACCESS_TOKEN_KEY).await?,
            public_token: read_secret(secrets, PUBLIC_TOKEN_KEY).await?,
            auth_method,
        })
    }
}

async fn read_secret(
    secrets: &SecretsManager,
    key: &'static str,
) -> Result<Option<String>, CredentialsError> {
    secrets
        .get_secret(key)
        .await
        .map(|v| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()))
        .map_err(|e| CredentialsError::Backend(e.to_string()))
}

impl fmt::Debug for PlaidCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaidCredentials")
            .field("environment", &self.environment)
            .field("client_id", &mask_credential(&self.client_id))
            .field("secret", &"<redacted>")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("public_token", &self.public_token.as_ref().map(|_| "<redacted>"))
            .field("auth_method", &self.auth_method)
            .finish()
    }
}
