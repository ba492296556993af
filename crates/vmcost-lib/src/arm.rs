//! HTTP client for Azure Resource Manager
//!
//! Adds the bearer token to every request and retries throttled (HTTP 429)
//! requests after a fixed delay. Any other failure is returned to the caller
//! unchanged so collectors can decide whether it is fatal.

use crate::credential::TokenProvider;
use crate::error::ArmError;
use crate::observability::RunLogger;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use url::Url;

/// Public cloud Resource Manager endpoint
pub const DEFAULT_MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// Retry behaviour for throttled requests
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Fixed wait before retrying a throttled request
    pub delay: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            max_retries: 3,
        }
    }
}

/// Configuration for the Resource Manager client
#[derive(Debug, Clone)]
pub struct ArmConfig {
    /// Base URL, e.g. `https://management.azure.com`
    pub endpoint: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_MANAGEMENT_ENDPOINT.to_string(),
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Authenticated Resource Manager client
pub struct ArmClient {
    client: Client,
    base_url: Url,
    credential: Box<dyn TokenProvider>,
    retry: RetryPolicy,
    logger: RunLogger,
}

impl ArmClient {
    /// Create a new client
    pub fn new(config: ArmConfig, credential: Box<dyn TokenProvider>) -> Result<Self, ArmError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        let base_url = Url::parse(&config.endpoint)?;

        Ok(Self {
            client,
            base_url,
            credential,
            retry: config.retry,
            logger: RunLogger::new(),
        })
    }

    /// Resolve an ARM path (or an absolute `nextLink`) against the endpoint
    pub fn url(&self, path_or_link: &str) -> Result<Url, ArmError> {
        if path_or_link.starts_with("http://") || path_or_link.starts_with("https://") {
            return Ok(Url::parse(path_or_link)?);
        }
        Ok(self.base_url.join(path_or_link)?)
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, ArmError> {
        self.send(Method::GET, url, None::<&()>).await
    }

    /// Make a POST request with JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: Url,
        body: &B,
    ) -> Result<T, ArmError> {
        self.send(Method::POST, url, Some(body)).await
    }

    async fn send<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<T, ArmError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let token = self.credential.token().await?;
            let mut request: RequestBuilder = self
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(&token.token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt > self.retry.max_retries {
                    return Err(ArmError::RateLimited { attempts: attempt });
                }
                self.logger
                    .log_throttled(url.path(), attempt, self.retry.delay);
                tokio::time::sleep(self.retry.delay).await;
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(match status {
                    StatusCode::UNAUTHORIZED => ArmError::Unauthorized(body),
                    StatusCode::FORBIDDEN => ArmError::Forbidden(body),
                    StatusCode::NOT_FOUND => ArmError::NotFound(body),
                    _ => ArmError::Http {
                        status: status.as_u16(),
                        body,
                    },
                });
            }

            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticToken;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Echo {
        value: u32,
    }

    fn client_for(server: &mockito::ServerGuard, max_retries: u32) -> ArmClient {
        ArmClient::new(
            ArmConfig {
                endpoint: server.url(),
                request_timeout: Duration::from_secs(5),
                retry: RetryPolicy {
                    delay: Duration::from_millis(5),
                    max_retries,
                },
            },
            Box::new(StaticToken::new("test-token")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_get_sends_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/echo")
            .match_header("authorization", "Bearer test-token")
            .with_status(200)
            .with_body(r#"{"value": 7}"#)
            .create_async()
            .await;

        let client = client_for(&server, 3);
        let echo: Echo = client.get(client.url("/echo").unwrap()).await.unwrap();
        assert_eq!(echo.value, 7);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_throttled_request_is_retried() {
        let mut server = mockito::Server::new_async().await;
        let throttled = server
            .mock("GET", "/echo")
            .with_status(429)
            .expect(1)
            .create_async()
            .await;
        let ok = server
            .mock("GET", "/echo")
            .with_status(200)
            .with_body(r#"{"value": 1}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, 3);
        let echo: Echo = client.get(client.url("/echo").unwrap()).await.unwrap();
        assert_eq!(echo.value, 1);
        throttled.assert_async().await;
        ok.assert_async().await;
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let mut server = mockito::Server::new_async().await;
        let throttled = server
            .mock("GET", "/echo")
            .with_status(429)
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server, 2);
        let err = client
            .get::<Echo>(client.url("/echo").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ArmError::RateLimited { attempts: 3 }));
        throttled.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/denied").with_status(403).create_async().await;
        server.mock("GET", "/missing").with_status(404).create_async().await;
        server
            .mock("GET", "/broken")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = client_for(&server, 0);
        let denied = client.get::<Echo>(client.url("/denied").unwrap()).await;
        assert!(matches!(denied, Err(ArmError::Forbidden(_))));
        let missing = client.get::<Echo>(client.url("/missing").unwrap()).await;
        assert!(matches!(missing, Err(ArmError::NotFound(_))));
        let broken = client.get::<Echo>(client.url("/broken").unwrap()).await;
        assert!(matches!(broken, Err(ArmError::Http { status: 500, .. })));
    }

    #[test]
    fn test_url_accepts_absolute_next_links() {
        let client = ArmClient::new(ArmConfig::default(), Box::new(StaticToken::new("t"))).unwrap();
        let link = "https://management.azure.com/subscriptions/x?$skiptoken=abc";
        assert_eq!(client.url(link).unwrap().as_str(), link);
        assert_eq!(
            client.url("/subscriptions/x").unwrap().as_str(),
            "https://management.azure.com/subscriptions/x"
        );
    }
}
