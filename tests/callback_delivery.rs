use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use httpmock::prelude::*;
use keypair_provisioner::callback::{CallbackRequest, CallbackSignaler, HttpsCallbackTransport};
use keypair_provisioner::event::{Correlation, Outcome, OutcomeData};
use keypair_provisioner::store::MemorySecretStore;
use keypair_provisioner::{Handler, ProvisionError, Provisioner};
use serde_json::json;

fn signaler() -> CallbackSignaler {
    let transport = HttpsCallbackTransport::new(Some(Duration::from_secs(5))).unwrap();
    CallbackSignaler::new(Arc::new(transport))
}

fn outcome() -> Outcome {
    Outcome::success(
        "acme",
        Correlation {
            stack_id: "stack-1".into(),
            request_id: "req-1".into(),
            logical_resource_id: "AcmeKeyPair".into(),
        },
        OutcomeData::default(),
    )
}

#[tokio::test]
async fn delivers_single_put_with_exact_length() {
    let server = MockServer::start_async().await;
    let outcome = outcome();
    let address = server.url("/callback?sig=abc");
    let expected_len = CallbackRequest::new(&address, &outcome)
        .unwrap()
        .body()
        .len()
        .to_string();

    let callback = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/callback")
                .query_param("sig", "abc")
                .header_exists("content-type")
                .header("content-length", expected_len.as_str())
                .body_contains("\"Status\":\"SUCCESS\"")
                .body_contains("\"Data\":{}");
            then.status(200).body("ignored");
        })
        .await;

    signaler()
        .signal(&address, &outcome)
        .await
        .expect("2xx is delivered");
    callback.assert_async().await;
}

#[tokio::test]
async fn error_status_fails_delivery_regardless_of_body() {
    let server = MockServer::start_async().await;
    let callback = server
        .mock_async(|when, then| {
            when.method(PUT).path("/callback");
            then.status(500).json_body(json!({ "ok": true }));
        })
        .await;

    let err = signaler()
        .signal(&server.url("/callback"), &outcome())
        .await
        .unwrap_err();
    assert_eq!(err, ProvisionError::Delivery("HTTP 500".into()));
    assert_eq!(callback.hits_async().await, 1);
}

#[tokio::test]
async fn redirects_are_not_followed() {
    let server = MockServer::start_async().await;
    let callback = server
        .mock_async(|when, then| {
            when.method(PUT).path("/callback");
            then.status(302).header("location", "/elsewhere");
        })
        .await;
    let elsewhere = server
        .mock_async(|when, then| {
            when.path("/elsewhere");
            then.status(200);
        })
        .await;

    signaler()
        .signal(&server.url("/callback"), &outcome())
        .await
        .expect("3xx is below 400");
    assert_eq!(callback.hits_async().await, 1);
    assert_eq!(elsewhere.hits_async().await, 0);
}

#[tokio::test]
async fn connection_refused_is_a_delivery_error() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let err = signaler()
        .signal(&format!("http://127.0.0.1:{port}/callback"), &outcome())
        .await
        .unwrap_err();
    assert!(err.is_delivery());
}

#[tokio::test]
async fn handler_reports_created_pair_over_http() {
    let server = MockServer::start_async().await;
    let callback = server
        .mock_async(|when, then| {
            when.method(PUT)
                .path("/cfn-response")
                .body_contains("\"Status\":\"SUCCESS\"")
                .body_contains("\"PhysicalResourceId\":\"acme\"")
                .body_contains("-----BEGIN PUBLIC KEY-----");
            then.status(200);
        })
        .await;

    let store = Arc::new(MemorySecretStore::new());
    let handler = Handler::new(Provisioner::new(store.clone()), signaler());
    let outcome = handler
        .handle_value(json!({
            "RequestType": "Create",
            "ResponseURL": server.url("/cfn-response"),
            "StackId": "stack-1",
            "RequestId": "req-1",
            "LogicalResourceId": "AcmeKeyPair",
            "ResourceProperties": {
                "Name": "acme",
                "Description": "Acme keys",
                "KeyType": "ECDSA_256"
            }
        }))
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(store.len(), 2);
    callback.assert_async().await;
}
