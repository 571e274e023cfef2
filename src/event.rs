//! Inbound custom-resource events and the outcome reported back to the caller.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, ProvisionResult};

const MAX_NAME_LEN: usize = 128;

static NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9/_+=.@-]+$").expect("secret name pattern compiles")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleOperation {
    Create,
    Update,
    Delete,
}

impl LifecycleOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleOperation::Create => "Create",
            LifecycleOperation::Update => "Update",
            LifecycleOperation::Delete => "Delete",
        }
    }

    /// Update carries no in-place path and provisions fresh material like Create.
    pub fn provisions(&self) -> bool {
        !matches!(self, LifecycleOperation::Delete)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyAlgorithm {
    #[default]
    Rsa2048,
    Ecdsa256,
}

impl KeyAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyAlgorithm::Rsa2048 => "RSA_2048",
            KeyAlgorithm::Ecdsa256 => "ECDSA_256",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "RSA_2048" => Some(KeyAlgorithm::Rsa2048),
            "ECDSA_256" => Some(KeyAlgorithm::Ecdsa256),
            _ => None,
        }
    }
}

/// Properties declared on the custom resource. Everything is optional at the
/// wire level so a malformed resource still yields an event we can answer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct ResourceProperties {
    pub name: Option<String>,
    pub description: Option<String>,
    pub key_type: Option<String>,
    pub secret_regions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceEvent {
    pub request_type: LifecycleOperation,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub resource_properties: ResourceProperties,
}

impl CustomResourceEvent {
    pub fn correlation(&self) -> Correlation {
        Correlation {
            stack_id: self.stack_id.clone(),
            request_id: self.request_id.clone(),
            logical_resource_id: self.logical_resource_id.clone(),
        }
    }

    /// The resource name when one was supplied, otherwise the logical id so the
    /// caller always receives a non-empty physical id.
    pub fn physical_resource_id(&self) -> String {
        self.resource_properties
            .name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.logical_resource_id)
            .to_string()
    }
}

/// Identifiers echoed back untouched in the callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Correlation {
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleRequest {
    pub operation: LifecycleOperation,
    pub resource_name: String,
    pub resource_description: String,
    pub key_algorithm: KeyAlgorithm,
    pub replication_regions: Vec<String>,
    pub callback_address: String,
    pub correlation: Correlation,
    /// False for a Delete whose name could never have been provisioned; there
    /// is nothing in the store to look up.
    pub name_valid: bool,
}

impl LifecycleRequest {
    pub fn from_event(event: &CustomResourceEvent) -> ProvisionResult<Self> {
        if event.request_type.provisions() {
            Self::for_provisioning(event)
        } else {
            Ok(Self::for_teardown(event))
        }
    }

    fn for_provisioning(event: &CustomResourceEvent) -> ProvisionResult<Self> {
        let props = &event.resource_properties;
        let resource_name = validate_name(props.name.as_deref())?;

        let resource_description = match &props.description {
            Some(description) if !description.trim().is_empty() => description.clone(),
            _ => return Err(ProvisionError::validation("Description is required")),
        };

        let key_algorithm = match props.key_type.as_deref() {
            None => KeyAlgorithm::default(),
            Some(raw) => KeyAlgorithm::from_str(raw).ok_or_else(|| {
                ProvisionError::validation(format!(
                    "unsupported KeyType '{raw}'; expected RSA_2048 or ECDSA_256"
                ))
            })?,
        };

        Ok(Self {
            operation: event.request_type,
            resource_name,
            resource_description,
            key_algorithm,
            replication_regions: props.secret_regions.clone().unwrap_or_default(),
            callback_address: event.response_url.clone(),
            correlation: event.correlation(),
            name_valid: true,
        })
    }

    /// Delete never fails validation: it also rolls back Creates that were
    /// rejected, so it only needs to know whether a pair could exist at all.
    fn for_teardown(event: &CustomResourceEvent) -> Self {
        let props = &event.resource_properties;
        let (resource_name, name_valid) = match validate_name(props.name.as_deref()) {
            Ok(name) => (name, true),
            Err(_) => (event.physical_resource_id(), false),
        };
        let key_algorithm = props
            .key_type
            .as_deref()
            .and_then(KeyAlgorithm::from_str)
            .unwrap_or_default();

        Self {
            operation: event.request_type,
            resource_name,
            resource_description: props.description.clone().unwrap_or_default(),
            key_algorithm,
            replication_regions: props.secret_regions.clone().unwrap_or_default(),
            callback_address: event.response_url.clone(),
            correlation: event.correlation(),
            name_valid,
        }
    }
}

fn validate_name(name: Option<&str>) -> ProvisionResult<String> {
    let name = name.unwrap_or_default();
    if name.trim().is_empty() {
        return Err(ProvisionError::validation("Name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ProvisionError::validation(format!(
            "Name must be {MAX_NAME_LEN} characters or less"
        )));
    }
    if !NAME_PATTERN.is_match(name) {
        return Err(ProvisionError::validation(
            "Name contains invalid characters",
        ));
    }
    Ok(name.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutcomeData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_arn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_arn: Option<String>,
}

/// Result of one invocation, serialized as the callback body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Outcome {
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub physical_resource_id: String,
    #[serde(flatten)]
    pub correlation: Correlation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<OutcomeData>,
}

impl Outcome {
    pub fn success(
        physical_resource_id: impl Into<String>,
        correlation: Correlation,
        data: OutcomeData,
    ) -> Self {
        Self {
            status: OutcomeStatus::Success,
            reason: None,
            physical_resource_id: physical_resource_id.into(),
            correlation,
            data: Some(data),
        }
    }

    pub fn failed(
        physical_resource_id: impl Into<String>,
        correlation: Correlation,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            status: OutcomeStatus::Failed,
            reason: Some(reason.into()),
            physical_resource_id: physical_resource_id.into(),
            correlation,
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> CustomResourceEvent {
        serde_json::from_value(value).expect("event decodes")
    }

    fn create_event(props: serde_json::Value) -> CustomResourceEvent {
        event(json!({
            "RequestType": "Create",
            "ResponseURL": "https://callback.test/respond?sig=abc",
            "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/demo/1",
            "RequestId": "req-1",
            "LogicalResourceId": "KeyPair",
            "ServiceToken": "arn:aws:lambda:us-east-1:123456789012:function:kp",
            "ResourceProperties": props,
        }))
    }

    #[test]
    fn key_type_defaults_to_rsa() {
        let request = LifecycleRequest::from_event(&create_event(json!({
            "Name": "acme",
            "Description": "Acme keys",
        })))
        .unwrap();
        assert_eq!(request.key_algorithm, KeyAlgorithm::Rsa2048);
        assert!(request.replication_regions.is_empty());
        assert_eq!(request.callback_address, "https://callback.test/respond?sig=abc");
    }

    #[test]
    fn unknown_key_type_is_rejected() {
        let err = LifecycleRequest::from_event(&create_event(json!({
            "Name": "acme",
            "Description": "Acme keys",
            "KeyType": "DSA_1024",
        })))
        .unwrap_err();
        assert!(matches!(err, ProvisionError::Validation(ref msg) if msg.contains("DSA_1024")));
    }

    #[test]
    fn names_are_checked_for_length_and_characters() {
        let long = "a".repeat(129);
        for bad in [" ", long.as_str(), "acme keys", "acme#1"] {
            let err = LifecycleRequest::from_event(&create_event(json!({
                "Name": bad,
                "Description": "Acme keys",
            })))
            .unwrap_err();
            assert!(matches!(err, ProvisionError::Validation(_)), "{bad:?} accepted");
        }

        let ok = LifecycleRequest::from_event(&create_event(json!({
            "Name": "team/acme_prod+1=@v.2-a",
            "Description": "Acme keys",
        })));
        assert!(ok.is_ok());
    }

    #[test]
    fn delete_does_not_require_description() {
        let request = LifecycleRequest::from_event(&event(json!({
            "RequestType": "Delete",
            "ResponseURL": "https://callback.test/respond",
            "StackId": "stack",
            "RequestId": "req-2",
            "LogicalResourceId": "KeyPair",
            "ResourceProperties": { "Name": "acme" },
        })))
        .unwrap();
        assert_eq!(request.operation, LifecycleOperation::Delete);
        assert_eq!(request.resource_name, "acme");
        assert!(request.name_valid);
    }

    #[test]
    fn delete_ignores_properties_that_would_reject_a_create() {
        for props in [
            json!({ "Name": "acme", "Description": "Acme keys", "KeyType": "DSA_1024" }),
            json!({ "Name": "acme keys", "Description": "Acme keys" }),
            json!({}),
        ] {
            let mut raw = json!({
                "RequestType": "Delete",
                "ResponseURL": "https://callback.test/respond",
                "StackId": "stack",
                "RequestId": "req-3",
                "LogicalResourceId": "KeyPair",
            });
            raw["ResourceProperties"] = props.clone();
            let request = LifecycleRequest::from_event(&event(raw))
                .unwrap_or_else(|err| panic!("{props} rejected: {err}"));
            assert_eq!(request.operation, LifecycleOperation::Delete);
        }
    }

    #[test]
    fn delete_with_unusable_name_answers_for_the_logical_id() {
        let request = LifecycleRequest::from_event(&event(json!({
            "RequestType": "Delete",
            "ResponseURL": "https://callback.test/respond",
            "StackId": "stack",
            "RequestId": "req-4",
            "LogicalResourceId": "KeyPair",
            "ResourceProperties": { "Name": " " },
        })))
        .unwrap();
        assert!(!request.name_valid);
        assert_eq!(request.resource_name, "KeyPair");
    }

    #[test]
    fn physical_id_falls_back_to_logical_id() {
        let evt = create_event(json!({ "Description": "Acme keys" }));
        assert_eq!(evt.physical_resource_id(), "KeyPair");
    }

    #[test]
    fn failed_outcome_serializes_reason_without_data() {
        let correlation = Correlation {
            stack_id: "stack".into(),
            request_id: "req".into(),
            logical_resource_id: "KeyPair".into(),
        };
        let outcome = Outcome::failed("acme", correlation, "boom");
        let body = serde_json::to_string(&outcome).unwrap();
        assert_eq!(
            body,
            r#"{"Status":"FAILED","Reason":"boom","PhysicalResourceId":"acme","StackId":"stack","RequestId":"req","LogicalResourceId":"KeyPair"}"#
        );
    }

    #[test]
    fn delete_outcome_serializes_empty_data() {
        let correlation = Correlation {
            stack_id: "stack".into(),
            request_id: "req".into(),
            logical_resource_id: "KeyPair".into(),
        };
        let outcome = Outcome::success("acme", correlation, OutcomeData::default());
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["Status"], "SUCCESS");
        assert_eq!(value["Data"], json!({}));
        assert!(value.get("Reason").is_none());
    }
}
