pub mod callback;
pub mod config;
pub mod error;
pub mod event;
pub mod handler;
pub mod keygen;
pub mod provisioner;
pub mod store;
pub mod telemetry;

pub use callback::{CallbackRequest, CallbackSignaler, CallbackTransport, HttpsCallbackTransport};
pub use error::{ProvisionError, ProvisionResult};
pub use event::{CustomResourceEvent, KeyAlgorithm, LifecycleOperation, LifecycleRequest, Outcome};
pub use handler::Handler;
pub use provisioner::Provisioner;
pub use store::{SecretHandle, SecretStore};
