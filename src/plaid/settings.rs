use std::time::Duration;

use crate::config::ConfigManager;

pub const TIMEOUT_KEY: &str = "PLAID_TIMEOUT_SECS";
pub const BASE_URL_KEY: &str = "PLAID_BASE_URL";
pub const VERSION_KEY: &str = "PLAID_VERSION";

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_API_VERSION: &str = "2020-09-14";

/// Non-secret knobs for the Plaid client, read from the config manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaidSettings {
    pub timeout: Duration,
    /// Replaces the environment URL, e.g. for a proxy or a local mock.
    pub base_url: Option<String>,
    pub api_version: String,
}

impl Default for PlaidSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            base_url: None,
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl PlaidSettings {
    pub async fn from_config(config: &ConfigManager) -> Self {
        let defaults = Self::default();
        let timeout = config
            .get_parsed::<u64>(TIMEOUT_KEY)
            .await
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        let base_url = config
            .get(BASE_URL_KEY)
            .await
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        let api_version = config
            .get(VERSION_KEY)
            .await
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.api_version);

        Self {
            timeout,
            base_url,
            api_version,
        }
    }
}
