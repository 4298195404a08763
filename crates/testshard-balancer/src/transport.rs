//! Opaque text transport to the CI server.
//!
//! The balancer never sees HTTP beyond this seam: documents and artifacts
//! come back as text, payloads go out as text. No retries; a failed call
//! fails the operation that made it.

use async_trait::async_trait;

use crate::error::{BalanceError, Result};

/// GET/PUT text against a base server.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch `url`, returning the response body.
    async fn get(&self, url: &str) -> Result<String>;

    /// Send `body` to `url`, returning the response body.
    async fn put(&self, url: &str, body: String) -> Result<String>;
}

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        HttpTransport {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| transport_error(url, &err))?;
        response.text().await.map_err(|err| transport_error(url, &err))
    }

    async fn put(&self, url: &str, body: String) -> Result<String> {
        let response = self
            .client
            .put(url)
            .body(body)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|err| transport_error(url, &err))?;
        response.text().await.map_err(|err| transport_error(url, &err))
    }
}

fn transport_error(url: &str, err: &reqwest::Error) -> BalanceError {
    BalanceError::Transport {
        url: url.to_string(),
        message: err.to_string(),
    }
}
