use async_trait::async_trait;
use aws_sdk_secretsmanager::config::retry::RetryConfig;
use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_secretsmanager::types::{Filter, FilterNameStringType, ReplicaRegionType};
use aws_sdk_secretsmanager::Client;
use tracing::debug;

use super::{NewSecret, SecretHandle, SecretStore};
use crate::error::{ProvisionError, ProvisionResult};

/// AWS Secrets Manager backend.
#[derive(Clone)]
pub struct AwsSecretStore {
    client: Client,
}

impl AwsSecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the standard AWS provider chain (env, profile, role).
    /// SDK retries are switched off; re-invocation is the caller's retry policy.
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .retry_config(RetryConfig::disabled())
            .load()
            .await;
        Self::new(Client::new(&config))
    }
}

fn sdk_message<E>(err: &E) -> String
where
    E: ProvideErrorMetadata + std::error::Error,
{
    err.message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(err).to_string())
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn create(&self, secret: &NewSecret<'_>) -> ProvisionResult<SecretHandle> {
        let replicas = secret
            .replica_regions
            .iter()
            .map(|region| ReplicaRegionType::builder().region(region).build())
            .collect::<Vec<_>>();

        let mut request = self
            .client
            .create_secret()
            .name(secret.name)
            .secret_string(secret.value)
            .description(secret.description);
        if !replicas.is_empty() {
            request = request.set_add_replica_regions(Some(replicas));
        }

        let output = request.send().await.map_err(|err| {
            let message = sdk_message(&err);
            match err.as_service_error() {
                Some(service) if service.is_resource_exists_exception() => {
                    ProvisionError::StoreConflict(message)
                }
                _ => ProvisionError::StoreUnavailable(message),
            }
        })?;

        let arn = output.arn().ok_or_else(|| {
            ProvisionError::unavailable(format!("no ARN returned for secret {}", secret.name))
        })?;
        debug!(name = secret.name, arn, "created secret");
        Ok(SecretHandle(arn.to_string()))
    }

    async fn find(&self, name: &str) -> ProvisionResult<Option<SecretHandle>> {
        // The name filter matches prefixes, so `x/public` also returns `x/public-key-id`.
        let filter = Filter::builder()
            .key(FilterNameStringType::Name)
            .values(name)
            .build();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .client
                .list_secrets()
                .filters(filter.clone())
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|err| ProvisionError::StoreUnavailable(sdk_message(&err)))?;

            if let Some(entry) = output
                .secret_list()
                .iter()
                .find(|entry| entry.name() == Some(name))
            {
                let handle = entry.arn().unwrap_or(name).to_string();
                return Ok(Some(SecretHandle(handle)));
            }

            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => return Ok(None),
            }
        }
    }

    async fn delete(&self, name: &str) -> ProvisionResult<()> {
        let result = self
            .client
            .delete_secret()
            .secret_id(name)
            .force_delete_without_recovery(true)
            .send()
            .await;
        match result {
            Ok(_) => {
                debug!(name, "deleted secret");
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .map(|service| service.is_resource_not_found_exception())
                    .unwrap_or(false) =>
            {
                debug!(name, "secret already gone");
                Ok(())
            }
            Err(err) => Err(ProvisionError::StoreUnavailable(sdk_message(&err))),
        }
    }
}
