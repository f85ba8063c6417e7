//! Integration tests for the HTTP registry client against a mock server
//!
//! These tests verify that:
//! - Bearer tokens are fetched once per hospital and reused
//! - OperationOutcome refusals become rejections, not errors
//! - 5xx and 401 responses are retried and then surface as errors

use medbridge::adapters::registry::{
    HttpRegistryClient, RegistryClient, RegistryResponse, RejectionKind,
};
use medbridge::config::{secret_string, HospitalConfig, RegistryConfig, RetryConfig};
use medbridge::domain::errors::{BridgeError, RegistryError};
use medbridge::domain::ids::HospitalId;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::json;

const TOKEN_PATH: &str = "/oauth2/v1/accesstoken";

fn client(server: &ServerGuard) -> HttpRegistryClient {
    let config = RegistryConfig {
        base_url: format!("{}/fhir-r4/v1", server.url()),
        auth_url: format!("{}{TOKEN_PATH}", server.url()),
        timeout_seconds: 5,
        retry: RetryConfig {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_multiplier: 1.0,
        },
        ..RegistryConfig::default()
    };
    let hospitals = vec![HospitalConfig {
        id: "H1".to_string(),
        organization_id: "ORG1".to_string(),
        client_id: "client-h1".to_string(),
        client_secret: secret_string("secret-h1".to_string()),
        enabled: true,
    }];
    HttpRegistryClient::new(&config, &hospitals).unwrap()
}

fn hospital() -> HospitalId {
    HospitalId::new("H1").unwrap()
}

async fn token_mock(server: &mut ServerGuard, hits: usize) -> Mock {
    server
        .mock("POST", TOKEN_PATH)
        .match_query(Matcher::UrlEncoded(
            "grant_type".to_string(),
            "client_credentials".to_string(),
        ))
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("client_id".to_string(), "client-h1".to_string()),
            Matcher::UrlEncoded("client_secret".to_string(), "secret-h1".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"tok-1","expires_in":"3599"}"#)
        .expect(hits)
        .create_async()
        .await
}

#[tokio::test]
async fn test_create_reuses_token() {
    let mut server = mockito::Server::new_async().await;
    let token = token_mock(&mut server, 1).await;
    let create = server
        .mock("POST", "/fhir-r4/v1/Encounter")
        .match_header("authorization", "Bearer tok-1")
        .match_body(Matcher::PartialJson(json!({ "resourceType": "Encounter" })))
        .with_status(201)
        .with_body(r#"{"resourceType":"Encounter","id":"enc-123"}"#)
        .expect(2)
        .create_async()
        .await;

    let client = client(&server);
    let payload = json!({ "resourceType": "Encounter", "status": "finished" });
    for _ in 0..2 {
        let response = client.create(&hospital(), "Encounter", &payload).await.unwrap();
        assert_eq!(response.accepted_id(), Some("enc-123"));
    }

    token.assert_async().await;
    create.assert_async().await;
}

#[tokio::test]
async fn test_update_targets_resource_id() {
    let mut server = mockito::Server::new_async().await;
    let _token = token_mock(&mut server, 1).await;
    let update = server
        .mock("PUT", "/fhir-r4/v1/Condition/cond-9")
        .with_status(200)
        .with_body(r#"{"resourceType":"Condition","id":"cond-9"}"#)
        .create_async()
        .await;

    let response = client(&server)
        .update(&hospital(), "Condition", "cond-9", &json!({ "id": "cond-9" }))
        .await
        .unwrap();
    match response {
        RegistryResponse::Accepted(accepted) => {
            assert_eq!(accepted.id, "cond-9");
            assert_eq!(accepted.resource_type, "Condition");
        }
        other => panic!("expected acceptance, got {other:?}"),
    }
    update.assert_async().await;
}

#[tokio::test]
async fn test_duplicate_outcome_is_rejection() {
    let mut server = mockito::Server::new_async().await;
    let _token = token_mock(&mut server, 1).await;
    let _create = server
        .mock("POST", "/fhir-r4/v1/Encounter")
        .with_status(400)
        .with_body(
            json!({
                "resourceType": "OperationOutcome",
                "issue": [{
                    "severity": "error",
                    "code": "duplicate",
                    "details": { "text": "Encounter already exists" }
                }]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let response = client(&server)
        .create(&hospital(), "Encounter", &json!({}))
        .await
        .unwrap();
    match response {
        RegistryResponse::Rejected(rejection) => {
            assert_eq!(rejection.status, 400);
            assert_eq!(rejection.kind, RejectionKind::Duplicate);
            assert_eq!(rejection.message, "Encounter already exists");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_server_error_is_retried_then_returned() {
    let mut server = mockito::Server::new_async().await;
    let _token = token_mock(&mut server, 1).await;
    let create = server
        .mock("POST", "/fhir-r4/v1/Observation")
        .with_status(503)
        .with_body("maintenance")
        .expect(2)
        .create_async()
        .await;

    let err = client(&server)
        .create(&hospital(), "Observation", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Registry(RegistryError::ServerError { status: 503, .. })
    ));
    assert!(err.is_retryable());
    create.assert_async().await;
}

#[tokio::test]
async fn test_unauthorized_refetches_token() {
    let mut server = mockito::Server::new_async().await;
    let token = token_mock(&mut server, 2).await;
    let _create = server
        .mock("POST", "/fhir-r4/v1/Encounter")
        .with_status(401)
        .expect(2)
        .create_async()
        .await;

    let err = client(&server)
        .create(&hospital(), "Encounter", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Registry(RegistryError::AuthenticationFailed(_))
    ));
    token.assert_async().await;
}

#[tokio::test]
async fn test_search_returns_bundle_resources() {
    let mut server = mockito::Server::new_async().await;
    let _token = token_mock(&mut server, 1).await;
    let _search = server
        .mock("GET", "/fhir-r4/v1/Encounter")
        .match_query(Matcher::UrlEncoded(
            "identifier".to_string(),
            "http://sys-ids.example/encounter/ORG1|REG-1".to_string(),
        ))
        .with_status(200)
        .with_body(
            json!({
                "resourceType": "Bundle",
                "entry": [{ "resource": { "resourceType": "Encounter", "id": "enc-7" } }]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let resources = client(&server)
        .search(
            &hospital(),
            "Encounter",
            &[(
                "identifier".to_string(),
                "http://sys-ids.example/encounter/ORG1|REG-1".to_string(),
            )],
        )
        .await
        .unwrap();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0]["id"], "enc-7");
}

#[tokio::test]
async fn test_unknown_hospital_is_not_retried() {
    let server = mockito::Server::new_async().await;
    let err = client(&server)
        .create(&HospitalId::new("H9").unwrap(), "Encounter", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Registry(RegistryError::UnknownHospital(_))
    ));
    assert!(!err.is_retryable());
}
