use serde::Deserialize;
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};

use crate::callback::CallbackSignaler;
use crate::error::{ProvisionError, ProvisionResult};
use crate::event::{Correlation, CustomResourceEvent, LifecycleRequest, Outcome};
use crate::provisioner::Provisioner;

/// The bare minimum needed to answer an event whose body failed to decode.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReplyEnvelope {
    #[serde(rename = "ResponseURL")]
    response_url: String,
    stack_id: String,
    request_id: String,
    logical_resource_id: String,
}

/// Invocation entry point: every decodable event is answered exactly once.
#[derive(Clone)]
pub struct Handler {
    provisioner: Provisioner,
    signaler: CallbackSignaler,
}

impl Handler {
    pub fn new(provisioner: Provisioner, signaler: CallbackSignaler) -> Self {
        Self {
            provisioner,
            signaler,
        }
    }

    /// Handles a raw invocation payload. Payloads without a usable callback
    /// address cannot be answered and come back as `Validation` errors.
    pub async fn handle_value(&self, payload: Value) -> ProvisionResult<Outcome> {
        match CustomResourceEvent::deserialize(&payload) {
            Ok(event) => self.handle(event).await,
            Err(decode_error) => {
                let envelope = serde_json::from_value::<ReplyEnvelope>(payload).map_err(|_| {
                    ProvisionError::validation(format!(
                        "malformed invocation payload: {decode_error}"
                    ))
                })?;
                warn!(request_id = %envelope.request_id, error = %decode_error, "undecodable event");
                let outcome = Outcome::failed(
                    envelope.logical_resource_id.clone(),
                    Correlation {
                        stack_id: envelope.stack_id,
                        request_id: envelope.request_id,
                        logical_resource_id: envelope.logical_resource_id,
                    },
                    ProvisionError::validation(decode_error.to_string()).to_string(),
                );
                self.signaler.signal(&envelope.response_url, &outcome).await?;
                Ok(outcome)
            }
        }
    }

    /// Validates, provisions and signals. Only a failed delivery is an `Err`;
    /// everything else is reported through the callback.
    pub async fn handle(&self, event: CustomResourceEvent) -> ProvisionResult<Outcome> {
        let span = info_span!(
            "invocation",
            request_type = event.request_type.as_str(),
            request_id = %event.request_id,
            logical_id = %event.logical_resource_id,
            state = tracing::field::Empty,
        );
        async move {
            let outcome = match LifecycleRequest::from_event(&event) {
                Ok(request) => self.provisioner.provision(&request).await,
                Err(err) => {
                    warn!(error = %err, "rejecting request");
                    Outcome::failed(
                        event.physical_resource_id(),
                        event.correlation(),
                        err.to_string(),
                    )
                }
            };
            self.signaler.signal(&event.response_url, &outcome).await?;
            info!(status = ?outcome.status, "invocation complete");
            Ok(outcome)
        }
        .instrument(span)
        .await
    }
}
