//! One-shot delivery of the outcome to the caller's presigned callback URL.
//!
//! Exactly one PUT is attempted per invocation. Redirects are not followed and
//! nothing is retried: the address is single use, and a second delivery could
//! contradict the first.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::error::{ProvisionError, ProvisionResult};
use crate::event::Outcome;

/// A fully prepared callback: target URL and serialized body.
#[derive(Debug, Clone)]
pub struct CallbackRequest {
    url: Url,
    body: Vec<u8>,
}

impl CallbackRequest {
    pub fn new(callback_address: &str, outcome: &Outcome) -> ProvisionResult<Self> {
        let url = Url::parse(callback_address)
            .map_err(|e| ProvisionError::Delivery(format!("invalid callback address: {e}")))?;
        if url.host_str().map(str::is_empty).unwrap_or(true) {
            return Err(ProvisionError::Delivery(
                "callback address has no host".to_string(),
            ));
        }
        let body = serde_json::to_vec(outcome)
            .map_err(|e| ProvisionError::Delivery(format!("failed to serialize outcome: {e}")))?;
        Ok(Self { url, body })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The presigned endpoint expects an empty content type, and the length
    /// must match the body byte-for-byte.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(""));
        headers.insert(CONTENT_LENGTH, HeaderValue::from(self.body.len()));
        headers
    }

    fn target(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

#[async_trait]
pub trait CallbackTransport: Send + Sync {
    /// Performs a single exchange and returns the response status code.
    async fn send(&self, request: &CallbackRequest) -> ProvisionResult<u16>;
}

pub struct HttpsCallbackTransport {
    client: Client,
}

impl HttpsCallbackTransport {
    pub fn new(timeout: Option<Duration>) -> ProvisionResult<Self> {
        let mut builder = Client::builder().redirect(Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ProvisionError::Delivery(format!("failed to build callback client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CallbackTransport for HttpsCallbackTransport {
    async fn send(&self, request: &CallbackRequest) -> ProvisionResult<u16> {
        let response = self
            .client
            .put(request.url().clone())
            .headers(request.headers())
            .body(request.body().to_vec())
            .send()
            .await
            .map_err(|e| ProvisionError::Delivery(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}

#[derive(Clone)]
pub struct CallbackSignaler {
    transport: Arc<dyn CallbackTransport>,
}

impl CallbackSignaler {
    pub fn new(transport: Arc<dyn CallbackTransport>) -> Self {
        Self { transport }
    }

    /// Delivers `outcome`. Any status below 400 counts as delivered; the
    /// response body is never inspected.
    pub async fn signal(&self, callback_address: &str, outcome: &Outcome) -> ProvisionResult<()> {
        let request = CallbackRequest::new(callback_address, outcome)?;
        let status = self.transport.send(&request).await.map_err(|e| {
            warn!(target_host = request.target(), error = %e, "callback transport failed");
            e
        })?;
        if status >= 400 {
            warn!(target_host = request.target(), status, "callback rejected");
            return Err(ProvisionError::Delivery(format!("HTTP {status}")));
        }
        info!(
            target_host = request.target(),
            status,
            outcome = ?outcome.status,
            "callback delivered"
        );
        Ok(())
    }
}
