use std::sync::Arc;

use keypair_provisioner::callback::{CallbackSignaler, HttpsCallbackTransport};
use keypair_provisioner::{config, store, telemetry, Handler, Provisioner};
use lambda_runtime::{service_fn, LambdaEvent};
use serde_json::Value;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_tracing();

    let backend = *config::SECRET_STORE_BACKEND;
    let store = store::from_backend(backend).await?;
    let transport = HttpsCallbackTransport::new(*config::CALLBACK_TIMEOUT)?;
    let handler = Handler::new(
        Provisioner::new(store),
        CallbackSignaler::new(Arc::new(transport)),
    );
    tracing::info!(backend = backend.as_str(), "provisioner ready");

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let handler = handler.clone();
        async move {
            handler.handle_value(event.payload).await?;
            Ok::<(), lambda_runtime::Error>(())
        }
    }))
    .await
    .map_err(|error| anyhow::anyhow!("lambda runtime stopped: {error}"))
}
