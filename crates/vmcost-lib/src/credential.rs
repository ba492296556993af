//! Bearer token acquisition for Azure Resource Manager
//!
//! Sources are tried in order: a pre-issued token in `AZURE_ACCESS_TOKEN`,
//! a service principal from `AZURE_TENANT_ID` / `AZURE_CLIENT_ID` /
//! `AZURE_CLIENT_SECRET`, then the Azure CLI login.

use crate::error::CredentialError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

/// Resource the tokens are requested for
pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com/";

/// OAuth2 scope for Resource Manager
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Default Microsoft Entra login endpoint
pub const DEFAULT_LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";

/// Refresh tokens this long before they expire
const EXPIRY_MARGIN_SECS: i64 = 300;

/// A bearer token and its expiry
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Whether the token can still be used at `now`
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_on {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_MARGIN_SECS) > now,
            None => true,
        }
    }
}

/// Source of Resource Manager bearer tokens
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self) -> Result<AccessToken, CredentialError>;
}

/// A fixed token, typically from `AZURE_ACCESS_TOKEN`
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<AccessToken, CredentialError> {
        Ok(AccessToken {
            token: self.token.clone(),
            expires_on: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Service principal using the OAuth2 client-credentials grant
pub struct ClientSecretCredential {
    client: Client,
    login_endpoint: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
}

impl ClientSecretCredential {
    pub fn new(
        login_endpoint: &str,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            login_endpoint: login_endpoint.trim_end_matches('/').to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for ClientSecretCredential {
    async fn token(&self) -> Result<AccessToken, CredentialError> {
        let url = format!("{}/{}/oauth2/v2.0/token", self.login_endpoint, self.tenant_id);
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", MANAGEMENT_SCOPE),
        ];

        let response = self.client.post(&url).form(&params).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CredentialError::Rejected(format!("{}: {}", status, body)));
        }

        let parsed: OAuthTokenResponse = response.json().await?;
        Ok(AccessToken {
            token: parsed.access_token,
            expires_on: Some(Utc::now() + Duration::seconds(parsed.expires_in)),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<i64>,
}

/// Token from the logged-in Azure CLI (`az login`)
pub struct AzureCliCredential {
    program: String,
}

impl Default for AzureCliCredential {
    fn default() -> Self {
        Self::new("az")
    }
}

impl AzureCliCredential {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for AzureCliCredential {
    async fn token(&self) -> Result<AccessToken, CredentialError> {
        let output = Command::new(&self.program)
            .args([
                "account",
                "get-access-token",
                "--resource",
                MANAGEMENT_RESOURCE,
                "--output",
                "json",
            ])
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => CredentialError::Unavailable(format!(
                    "'{}' is not installed; set AZURE_ACCESS_TOKEN or a service principal",
                    self.program
                )),
                _ => CredentialError::Cli(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CredentialError::Rejected(format!(
                "az account get-access-token failed: {}. Run 'az login' first.",
                stderr.trim()
            )));
        }

        parse_cli_token(&output.stdout)
    }
}

fn parse_cli_token(stdout: &[u8]) -> Result<AccessToken, CredentialError> {
    let parsed: CliTokenResponse = serde_json::from_slice(stdout)?;
    let expires_on = parsed
        .expires_on
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
    Ok(AccessToken {
        token: parsed.access_token,
        expires_on,
    })
}

/// Pick the first credential source configured in the environment
pub fn default_credential(login_endpoint: &str) -> Box<dyn TokenProvider> {
    if let Ok(token) = std::env::var("AZURE_ACCESS_TOKEN") {
        if !token.trim().is_empty() {
            debug!("Using token from AZURE_ACCESS_TOKEN");
            return Box::new(StaticToken::new(token.trim()));
        }
    }

    let tenant = std::env::var("AZURE_TENANT_ID").ok();
    let client_id = std::env::var("AZURE_CLIENT_ID").ok();
    let secret = std::env::var("AZURE_CLIENT_SECRET").ok();
    if let (Some(tenant), Some(client_id), Some(secret)) = (tenant, client_id, secret) {
        debug!(tenant = %tenant, "Using service principal credential");
        return Box::new(ClientSecretCredential::new(
            login_endpoint,
            tenant,
            client_id,
            secret,
        ));
    }

    debug!("Using Azure CLI credential");
    Box::new(AzureCliCredential::default())
}

/// Reuses a token until it is about to expire
pub struct CachedToken {
    inner: Box<dyn TokenProvider>,
    current: Mutex<Option<AccessToken>>,
}

impl CachedToken {
    pub fn new(inner: Box<dyn TokenProvider>) -> Self {
        Self {
            inner,
            current: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenProvider for CachedToken {
    async fn token(&self) -> Result<AccessToken, CredentialError> {
        let mut current = self.current.lock().await;
        if let Some(token) = current.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.clone());
            }
        }

        let fresh = self.inner.token().await?;
        *current = Some(fresh.clone());
        Ok(fresh)
    }
}
