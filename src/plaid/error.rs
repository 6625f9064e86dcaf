use serde_json::{Value, json};
use thiserror::Error;

pub const PARAMETER_ERROR: &str = "PARAMETER_ERROR";
pub const AUTH_RESOLUTION_ERROR: &str = "AUTH_RESOLUTION_ERROR";
pub const TRANSPORT_ERROR: &str = "TRANSPORT_ERROR";
pub const PLAID_ERROR: &str = "PLAID_ERROR";

/// Everything that can go wrong while handling one input item.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaidError {
    #[error("Plaid API Error (PARAMETER_ERROR): {0}")]
    Parameter(String),
    #[error("Plaid API Error (AUTH_RESOLUTION_ERROR): {0}")]
    AuthResolution(String),
    #[error("Plaid API Error ({code}): {message}")]
    Upstream {
        status: u16,
        code: String,
        message: String,
        error_type: Option<String>,
        request_id: Option<String>,
    },
    #[error("Plaid API Error (TRANSPORT_ERROR): {0}")]
    Transport(String),
}

impl PlaidError {
    pub fn code(&self) -> &str {
        match self {
            PlaidError::Parameter(_) => PARAMETER_ERROR,
            PlaidError::AuthResolution(_) => AUTH_RESOLUTION_ERROR,
            PlaidError::Upstream { code, .. } => code,
            PlaidError::Transport(_) => TRANSPORT_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            PlaidError::Parameter(m) | PlaidError::AuthResolution(m) | PlaidError::Transport(m) => m,
            PlaidError::Upstream { message, .. } => message,
        }
    }

    /// Build an upstream error from a non-2xx response body. Plaid puts the
    /// error fields at the top level; proxies and SDK wrappers nest them under
    /// `response`, `data` or `body`.
    pub fn from_error_body(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let fields = parsed.as_ref().map(error_fields);

        let text = |key: &str| {
            fields
                .and_then(|f| f.get(key))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let message = text("error_message")
            .or_else(|| text("display_message"))
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() || parsed.is_some() {
                    format!("request failed with status {status}")
                } else {
                    trimmed.to_string()
                }
            });

        PlaidError::Upstream {
            status,
            code: text("error_code").unwrap_or_else(|| PLAID_ERROR.to_string()),
            message,
            error_type: text("error_type"),
            request_id: text("request_id"),
        }
    }
}

fn error_fields(body: &Value) -> &Value {
    let mut current = body;
    // unwrap at most a couple of envelope levels, e.g. { response: { data: {...} } }
    for _ in 0..3 {
        if current.get("error_code").is_some() || current.get("error_message").is_some() {
            return current;
        }
        match ["response", "data", "body"]
            .iter()
            .find_map(|key| current.get(*key).filter(|v| v.is_object()))
        {
            Some(inner) => current = inner,
            None => break,
        }
    }
    current
}

/// The record emitted in place of an item's output when failures are tolerated.
pub fn error_record(error: &PlaidError, resource: &str, operation: &str, processed_at: &str) -> Value {
    json!({
        "error": true,
        "error_message": error.message(),
        "error_code": error.code(),
        "resource": resource,
        "operation": operation,
        "processed_at": processed_at,
    })
}
