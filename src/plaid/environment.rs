use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use super::credentials::PlaidCredentials;
use super::error::PlaidError;
use super::settings::PlaidSettings;

pub const SANDBOX_URL: &str = "https://sandbox.plaid.com";
pub const PRODUCTION_URL: &str = "https://production.plaid.com";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PlaidEnvironment {
    #[default]
    Sandbox,
    Production,
}

impl PlaidEnvironment {
    /// Only `production` (any case, surrounding whitespace ignored) selects
    /// production. Everything else, including unknown names, is sandbox.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("production") {
            PlaidEnvironment::Production
        } else {
            PlaidEnvironment::Sandbox
        }
    }

    pub fn base_url(&self) -> &'static str {
        match self {
            PlaidEnvironment::Sandbox => SANDBOX_URL,
            PlaidEnvironment::Production => PRODUCTION_URL,
        }
    }
}

impl<'de> Deserialize<'de> for PlaidEnvironment {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(PlaidEnvironment::parse(&raw))
    }
}

/// Where to send requests and which headers authenticate them.
#[derive(Debug, Clone)]
pub struct ResolvedEnvironment {
    pub base_url: String,
    pub headers: HeaderMap,
}

pub fn resolve_environment(
    credentials: &PlaidCredentials,
    settings: &PlaidSettings,
) -> Result<ResolvedEnvironment, PlaidError> {
    let base_url = settings
        .base_url
        .clone()
        .unwrap_or_else(|| credentials.environment.base_url().to_string())
        .trim_end_matches('/')
        .to_string();

    let mut headers = HeaderMap::new();
    insert_header(&mut headers, "plaid-client-id", &credentials.client_id)?;
    insert_header(&mut headers, "plaid-secret", &credentials.secret)?;
    insert_header(&mut headers, "plaid-version", &settings.api_version)?;
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Ok(ResolvedEnvironment { base_url, headers })
}

fn insert_header(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<(), PlaidError> {
    let value = HeaderValue::from_str(value)
        .map_err(|_| PlaidError::Parameter(format!("{name} contains characters not allowed in a header")))?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}
