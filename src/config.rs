use once_cell::sync::Lazy;
use std::fs;
use std::time::Duration;

/// Which secret store backend holds the generated key pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretStoreBackend {
    Aws,
    Vault,
    Memory,
}

impl SecretStoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretStoreBackend::Aws => "aws",
            SecretStoreBackend::Vault => "vault",
            SecretStoreBackend::Memory => "memory",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "aws" | "secretsmanager" => Some(SecretStoreBackend::Aws),
            "vault" => Some(SecretStoreBackend::Vault),
            "memory" => Some(SecretStoreBackend::Memory),
            _ => None,
        }
    }
}

fn parse_secret_store_backend() -> SecretStoreBackend {
    match std::env::var("SECRET_STORE_BACKEND") {
        Ok(raw) => SecretStoreBackend::parse(&raw).unwrap_or_else(|| {
            panic!(
                "unsupported SECRET_STORE_BACKEND value '{raw}'; expected 'aws', 'vault' or 'memory'"
            )
        }),
        Err(_) => SecretStoreBackend::Aws,
    }
}

/// Secret store backend. Defaults to `aws` (Secrets Manager).
pub static SECRET_STORE_BACKEND: Lazy<SecretStoreBackend> =
    Lazy::new(parse_secret_store_backend);

/// Base address of the Vault server, only consulted by the vault backend.
pub static VAULT_ADDR: Lazy<Option<String>> = Lazy::new(|| read_optional_env("VAULT_ADDR"));

/// Vault token, read from `VAULT_TOKEN_FILE` when set, otherwise `VAULT_TOKEN`.
pub static VAULT_TOKEN: Lazy<Option<String>> =
    Lazy::new(|| read_secret_env("VAULT_TOKEN", "VAULT_TOKEN_FILE"));

/// Mount point of the KV v2 engine. Defaults to `secret`.
pub static VAULT_KV_MOUNT: Lazy<String> = Lazy::new(|| {
    read_optional_env("VAULT_KV_MOUNT")
        .map(|value| value.trim_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "secret".to_string())
});

/// Optional ceiling on the callback exchange. Unset leaves the invocation's own
/// time budget as the only bound.
pub static CALLBACK_TIMEOUT: Lazy<Option<Duration>> = Lazy::new(|| {
    std::env::var("CALLBACK_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .map(Duration::from_secs)
});

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_secret_env(value_key: &str, file_key: &str) -> Option<String> {
    if let Some(path) = read_optional_env(file_key) {
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let trimmed = contents.trim().to_string();
                if !trimmed.is_empty() {
                    return Some(trimmed);
                }
            }
            Err(err) => panic!("failed to read {file_key} from {path}: {err}"),
        }
    }

    read_optional_env(value_key)
}
