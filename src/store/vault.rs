use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{NewSecret, SecretHandle, SecretStore};
use crate::config;
use crate::error::{ProvisionError, ProvisionResult};

/// HashiCorp Vault KV v2 backend.
pub struct VaultSecretStore {
    base: String,
    token: String,
    mount: String,
    client: Client,
}

impl VaultSecretStore {
    pub fn from_env() -> ProvisionResult<Self> {
        let base = config::VAULT_ADDR
            .clone()
            .ok_or_else(|| ProvisionError::unavailable("VAULT_ADDR must be set"))?;
        let token = config::VAULT_TOKEN
            .clone()
            .ok_or_else(|| ProvisionError::unavailable("VAULT_TOKEN must be set"))?;
        Self::new(base, token, config::VAULT_KV_MOUNT.as_str())
    }

    pub fn new(
        base: impl Into<String>,
        token: impl Into<String>,
        mount: impl Into<String>,
    ) -> ProvisionResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            mount: mount.into().trim_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, area: &str, name: &str) -> String {
        format!("{}/v1/{}/{}/{}", self.base, self.mount, area, name)
    }

    fn handle(&self, name: &str) -> SecretHandle {
        SecretHandle(format!("vault:{}/{}", self.mount, name))
    }

    async fn request(
        &self,
        method: Method,
        url: String,
        body: Option<Value>,
    ) -> Result<Response, reqwest::Error> {
        let mut req = self
            .client
            .request(method, &url)
            .header("X-Vault-Token", &self.token);
        if let Some(b) = body {
            req = req.json(&b);
        }
        req.send().await
    }
}

async fn vault_errors(response: Response) -> String {
    let status = response.status();
    let detail = response
        .json::<Value>()
        .await
        .ok()
        .and_then(|body| {
            body["errors"].as_array().map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.as_str())
                    .collect::<Vec<_>>()
                    .join("; ")
            })
        })
        .filter(|joined| !joined.is_empty());
    match detail {
        Some(detail) => format!("vault returned {status}: {detail}"),
        None => format!("vault returned {status}"),
    }
}

#[async_trait]
impl SecretStore for VaultSecretStore {
    async fn create(&self, secret: &NewSecret<'_>) -> ProvisionResult<SecretHandle> {
        if !secret.replica_regions.is_empty() {
            return Err(ProvisionError::unavailable(format!(
                "vault store cannot replicate {} to regions {}",
                secret.name,
                secret.replica_regions.join(", ")
            )));
        }

        // cas=0 only writes when no version exists yet.
        let response = self
            .request(
                Method::POST,
                self.url("data", secret.name),
                Some(json!({
                    "options": { "cas": 0 },
                    "data": { "value": secret.value },
                })),
            )
            .await?;
        if !response.status().is_success() {
            let detail = vault_errors(response).await;
            // Vault answers a failed check-and-set with a 400 like any other bad request.
            if detail.contains("check-and-set") {
                return Err(ProvisionError::StoreConflict(format!(
                    "secret {} already exists",
                    secret.name
                )));
            }
            return Err(ProvisionError::StoreUnavailable(detail));
        }

        // No rollback if this fails: the value stays without a description and
        // a retry conflicts until the next Delete clears it.

        let response = self
            .request(
                Method::POST,
                self.url("metadata", secret.name),
                Some(json!({
                    "custom_metadata": { "description": secret.description },
                })),
            )
            .await?;
        if !response.status().is_success() {
            return Err(ProvisionError::StoreUnavailable(vault_errors(response).await));
        }

        debug!(name = secret.name, "created vault secret");
        Ok(self.handle(secret.name))
    }

    async fn find(&self, name: &str) -> ProvisionResult<Option<SecretHandle>> {
        let response = self
            .request(Method::GET, self.url("metadata", name), None)
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(self.handle(name))),
            _ => Err(ProvisionError::StoreUnavailable(vault_errors(response).await)),
        }
    }

    async fn delete(&self, name: &str) -> ProvisionResult<()> {
        // Removing metadata destroys every version; there is no undelete.
        let response = self
            .request(Method::DELETE, self.url("metadata", name), None)
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => {
                debug!(name, "destroyed vault secret");
                Ok(())
            }
            _ => Err(ProvisionError::StoreUnavailable(vault_errors(response).await)),
        }
    }
}
