use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use zeroize::Zeroizing;

use super::{NewSecret, SecretHandle, SecretStore};
use crate::error::{ProvisionError, ProvisionResult};

#[derive(Debug, Clone)]
pub struct StoredSecret {
    pub handle: SecretHandle,
    pub value: Zeroizing<String>,
    pub description: String,
    pub replica_regions: Vec<String>,
}

/// In-process secret store for tests and local runs.
#[derive(Default)]
pub struct MemorySecretStore {
    secrets: DashMap<String, StoredSecret>,
    create_failures: DashMap<String, ProvisionError>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `create` of `name` fail with `error`.
    pub fn fail_creates_of(&self, name: impl Into<String>, error: ProvisionError) {
        self.create_failures.insert(name.into(), error);
    }

    pub fn get(&self, name: &str) -> Option<StoredSecret> {
        self.secrets.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.secrets.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    fn handle_for(name: &str) -> SecretHandle {
        SecretHandle(format!("arn:memory:secretsmanager:local:secret:{name}"))
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn create(&self, secret: &NewSecret<'_>) -> ProvisionResult<SecretHandle> {
        if let Some(error) = self.create_failures.get(secret.name) {
            return Err(error.value().clone());
        }
        match self.secrets.entry(secret.name.to_string()) {
            Entry::Occupied(_) => Err(ProvisionError::StoreConflict(format!(
                "The operation failed because the secret {} already exists.",
                secret.name
            ))),
            Entry::Vacant(slot) => {
                let handle = Self::handle_for(secret.name);
                slot.insert(StoredSecret {
                    handle: handle.clone(),
                    value: Zeroizing::new(secret.value.to_string()),
                    description: secret.description.to_string(),
                    replica_regions: secret.replica_regions.to_vec(),
                });
                Ok(handle)
            }
        }
    }

    async fn find(&self, name: &str) -> ProvisionResult<Option<SecretHandle>> {
        Ok(self.secrets.get(name).map(|entry| entry.handle.clone()))
    }

    async fn delete(&self, name: &str) -> ProvisionResult<()> {
        self.secrets.remove(name);
        Ok(())
    }
}
