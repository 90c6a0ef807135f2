//! HTTP layer: auth header, status mapping, read retry.
//!
//! This is the ONLY place for status code handling. client/mod.rs never
//! interprets status codes.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use crate::auth::{SessionGuard, TokenProvider};
use crate::error::{ClientError, ClientResult};
use crate::types::ClientConfig;

use super::helpers::error_message;

/// HTTP backend for making requests (holds reqwest client, auth, config).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: Url,
    pub(crate) token_provider: TokenProvider,
    pub(crate) session: SessionGuard,
    pub(crate) config: ClientConfig,
}

impl HttpBackend {
    /// Resolve an API path (`files/quota`) against the base URL.
    pub(crate) fn url(&self, path: &str) -> ClientResult<Url> {
        self.base_url.join(path).map_err(|e| ClientError::Config {
            message: format!("invalid request path {}: {}", path, e),
        })
    }

    /// Idempotent GET with retry on transient failures.
    pub(crate) async fn get(&self, url: &Url) -> ClientResult<Response> {
        use rand::Rng;

        let mut retries = 0;
        let max_retries = self.config.max_retries;

        loop {
            let request = self.client.get(url.clone());
            match self.execute(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retries < max_retries => {
                    retries += 1;

                    let base_backoff = Duration::from_millis(200 << retries);
                    let base_backoff = base_backoff.min(Duration::from_secs(5));
                    let jittered_ms =
                        rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
                    let backoff = Duration::from_millis(jittered_ms.max(10));

                    warn!(
                        error = %e,
                        url = %url,
                        retry = retries,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Send a request exactly once and map the response status.
    pub(crate) async fn execute(&self, request: RequestBuilder) -> ClientResult<Response> {
        let request = match self.token_provider.token() {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {}", token)),
            None => request,
        };

        let response = request.send().await?;
        self.check_status(response).await
    }

    async fn check_status(&self, response: Response) -> ClientResult<Response> {
        let status = response.status();
        debug!(status = status.as_u16(), url = %response.url(), "response received");

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            self.session.signal_expired();
            return Err(ClientError::AuthExpired);
        }

        let reason = status.canonical_reason().unwrap_or("unknown status");
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body, reason);

        match status.as_u16() {
            400..=499 => Err(ClientError::Validation {
                status: status.as_u16(),
                message,
            }),
            500..=599 => Err(ClientError::Server {
                status: status.as_u16(),
                message,
            }),
            other => Err(ClientError::InvalidResponse {
                message: format!("unexpected HTTP {}: {}", other, message),
            }),
        }
    }
}
