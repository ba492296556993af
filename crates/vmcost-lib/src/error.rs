//! Error types for the VM cost pipeline

use thiserror::Error;

/// Failure to obtain a bearer token
#[derive(Error, Debug)]
pub enum CredentialError {
    /// No credential source is configured in this environment
    #[error("No Azure credential available: {0}")]
    Unavailable(String),

    /// The token endpoint or CLI rejected the request
    #[error("Token request failed: {0}")]
    Rejected(String),

    #[error("Token request transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to run Azure CLI: {0}")]
    Cli(#[from] std::io::Error),

    #[error("Malformed token response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Failure of a single Azure Resource Manager request
#[derive(Error, Debug)]
pub enum ArmError {
    #[error("Authentication failed: {0}")]
    Credential(#[from] CredentialError),

    #[error("Unauthorized (401): {0}")]
    Unauthorized(String),

    #[error("Access denied (403): {0}")]
    Forbidden(String),

    #[error("Not found (404): {0}")]
    NotFound(String),

    /// Still throttled after all retries
    #[error("Rate limited after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Fatal failure of one subscription; the run continues with the next one
#[derive(Error, Debug)]
pub enum SubscriptionError {
    #[error("'{0}' is not a valid subscription ID")]
    InvalidId(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Access denied to subscription {0}")]
    AccessDenied(String),

    #[error("Subscription {0} not found")]
    NotFound(String),

    #[error("No virtual machines found in subscription {0}")]
    NoVirtualMachines(String),

    #[error("Failed to list virtual machines: {0}")]
    Inventory(#[source] ArmError),
}

impl SubscriptionError {
    /// Classify an inventory request failure for a subscription
    pub fn from_inventory(subscription_id: &str, err: ArmError) -> Self {
        match err {
            ArmError::Credential(e) => SubscriptionError::Authentication(e.to_string()),
            ArmError::Unauthorized(body) => SubscriptionError::Authentication(body),
            ArmError::Forbidden(_) => SubscriptionError::AccessDenied(subscription_id.to_string()),
            ArmError::NotFound(_) => SubscriptionError::NotFound(subscription_id.to_string()),
            other => SubscriptionError::Inventory(other),
        }
    }
}

/// Failure writing report artifacts
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Malformed pricing cache entry: {0}")]
    CacheEntry(String),
}
