use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{ProvisionError, ProvisionResult};
use crate::event::{LifecycleRequest, Outcome, OutcomeData};
use crate::keygen::{self, KeyPairMaterial};
use crate::store::{
    private_secret_description, private_secret_name, public_secret_description,
    public_secret_name, NewSecret, SecretStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Received,
    Creating,
    Deleting,
    Completed,
    Failed,
}

/// Drives one lifecycle request against the key generator and secret store.
/// Holds no state between invocations; the store is the only persistence.
#[derive(Clone)]
pub struct Provisioner {
    store: Arc<dyn SecretStore>,
}

impl Provisioner {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }

    /// Runs the request to completion. Never fails: errors become a FAILED
    /// outcome whose reason is the error message.
    pub async fn provision(&self, request: &LifecycleRequest) -> Outcome {
        let mut state = ProvisioningState::Received;
        let working = if request.operation.provisions() {
            ProvisioningState::Creating
        } else {
            ProvisioningState::Deleting
        };
        transition(&mut state, working);

        let result = match working {
            ProvisioningState::Creating => self.create_pair(request).await,
            _ if !request.name_valid => {
                info!(name = %request.resource_name, "no pair can exist under this name, nothing to delete");
                Ok(OutcomeData::default())
            }
            _ => self
                .delete_pair(&request.resource_name)
                .await
                .map(|()| OutcomeData::default()),
        };

        match result {
            Ok(data) => {
                transition(&mut state, ProvisioningState::Completed);
                Outcome::success(
                    request.resource_name.clone(),
                    request.correlation.clone(),
                    data,
                )
            }
            Err(err) => {
                transition(&mut state, ProvisioningState::Failed);
                error!(
                    operation = request.operation.as_str(),
                    name = %request.resource_name,
                    error = %err,
                    "provisioning failed"
                );
                Outcome::failed(
                    request.resource_name.clone(),
                    request.correlation.clone(),
                    err.to_string(),
                )
            }
        }
    }

    async fn create_pair(&self, request: &LifecycleRequest) -> ProvisionResult<OutcomeData> {
        let material = generate_off_thread(request).await?;

        let public_name = public_secret_name(&request.resource_name);
        let private_name = private_secret_name(&request.resource_name);
        let public_description = public_secret_description(&request.resource_description);
        let private_description = private_secret_description(&request.resource_description);

        let public = NewSecret {
            name: &public_name,
            value: &material.public_pem,
            description: &public_description,
            replica_regions: &request.replication_regions,
        };
        let private = NewSecret {
            name: &private_name,
            value: material.private_pem.as_str(),
            description: &private_description,
            replica_regions: &request.replication_regions,
        };

        let (public_result, private_result) =
            tokio::join!(self.store.create(&public), self.store.create(&private));

        // No rollback: a lone survivor is cleaned up by the next Delete.
        match (&public_result, &private_result) {
            (Ok(_), Err(_)) => warn!(secret = %public_name, "pair incomplete, sibling create failed"),
            (Err(_), Ok(_)) => warn!(secret = %private_name, "pair incomplete, sibling create failed"),
            _ => {}
        }
        let public_handle = public_result?;
        let private_handle = private_result?;

        info!(
            public = %public_handle,
            private = %private_handle,
            algorithm = request.key_algorithm.as_str(),
            replicas = request.replication_regions.len(),
            "key pair stored"
        );

        let KeyPairMaterial { public_pem, .. } = material;
        Ok(OutcomeData {
            public_key: Some(public_pem),
            public_key_arn: Some(public_handle.into_string()),
            private_key_arn: Some(private_handle.into_string()),
        })
    }

    async fn delete_pair(&self, resource_name: &str) -> ProvisionResult<()> {
        let public_name = public_secret_name(resource_name);
        let private_name = private_secret_name(resource_name);
        let (public_result, private_result) =
            tokio::join!(self.remove(&public_name), self.remove(&private_name));
        public_result?;
        private_result?;
        Ok(())
    }

    async fn remove(&self, name: &str) -> ProvisionResult<()> {
        match self.store.find(name).await? {
            Some(handle) => {
                self.store.delete(name).await?;
                info!(secret = name, %handle, "secret deleted");
            }
            None => info!(secret = name, "secret absent, nothing to delete"),
        }
        Ok(())
    }
}

async fn generate_off_thread(request: &LifecycleRequest) -> ProvisionResult<KeyPairMaterial> {
    let algorithm = request.key_algorithm;
    tokio::task::spawn_blocking(move || keygen::generate(algorithm))
        .await
        .map_err(|e| ProvisionError::Generation(e.to_string()))?
}

fn transition(state: &mut ProvisioningState, next: ProvisioningState) {
    tracing::Span::current().record("state", tracing::field::debug(next));
    info!(from = ?state, to = ?next, "state transition");
    *state = next;
}
