// SPDX-FileCopyrightText: 2026 Zapflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for instance resolution against a mocked instance API.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zapflow_config::model::EvolutionConfig;
use zapflow_core::InstanceName;
use zapflow_evolution::{EvolutionAdapter, InstanceDirectory};
use zapflow_test_utils::MockInstanceApi;

const SETTLE: Duration = Duration::from_millis(10);

fn directory_for(server: &MockServer) -> InstanceDirectory {
    let config = EvolutionConfig {
        base_url: server.uri(),
        api_key: Some("test-api-key".into()),
        ..EvolutionConfig::default()
    };
    let adapter = EvolutionAdapter::new(&config).expect("adapter should build");
    InstanceDirectory::new(Arc::new(adapter), SETTLE)
}

fn nina() -> InstanceName {
    InstanceName::parse("nina-clinicasp").unwrap()
}

/// Absent instance: create is issued, the second fetch yields a real id and no phone.
#[tokio::test]
async fn absent_instance_is_created_then_resolved() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/instance/fetchInstances"))
        .and(query_param("instanceName", "nina-clinicasp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/instance/fetchInstances"))
        .and(query_param("instanceName", "nina-clinicasp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "9b1f7c2e-3d4a-4e5f-8a6b-7c8d9e0f1a2b",
            "name": "nina-clinicasp",
            "connectionStatus": "close",
            "ownerJid": null
        }])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/instance/create"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "instance": {"instanceName": "nina-clinicasp", "status": "created"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let directory = directory_for(&server);
    let resolved = directory.resolve(&nina()).await.expect("should resolve");
    assert_eq!(resolved.remote_id, "9b1f7c2e-3d4a-4e5f-8a6b-7c8d9e0f1a2b");
    assert!(resolved.phone.is_none());

    // Second call converges on the same id without creating again.
    let again = directory.resolve(&nina()).await.expect("should resolve again");
    assert_eq!(again.remote_id, resolved.remote_id);
}

/// Existing instance with a bound JID resolves directly to digits.
#[tokio::test]
async fn existing_instance_resolves_without_create() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/instance/fetchInstances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "instance": {
                "instanceName": "nina-clinicasp",
                "instanceId": "abc-123",
                "owner": "5511988887777@s.whatsapp.net",
                "status": "open"
            }
        }])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/instance/create"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let resolved = directory_for(&server).resolve(&nina()).await.unwrap();
    assert_eq!(resolved.remote_id, "abc-123");
    assert_eq!(resolved.phone.as_deref(), Some("5511988887777"));
}

/// Placeholder id after create is not a resolution.
#[tokio::test]
async fn placeholder_id_after_create_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/instance/fetchInstances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "00000000-0000-0000-0000-000000000000",
            "name": "nina-clinicasp"
        }])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/instance/create"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    assert!(directory_for(&server).resolve(&nina()).await.is_none());
}

/// Server errors on lookup yield None and never trigger a create.
#[tokio::test]
async fn lookup_failure_is_none_without_create() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/instance/fetchInstances"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/instance/create"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    assert!(directory_for(&server).resolve(&nina()).await.is_none());
}

/// Malformed JSON yields None.
#[tokio::test]
async fn malformed_listing_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/instance/fetchInstances"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    assert!(directory_for(&server).resolve(&nina()).await.is_none());
}

/// Create rejected (name taken by a concurrent creator) still resolves on the second lookup.
#[tokio::test]
async fn create_conflict_still_resolves_on_second_lookup() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/instance/fetchInstances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/instance/fetchInstances"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "winner-id", "name": "nina-clinicasp"
        }])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/instance/create"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": "This name \"nina-clinicasp\" is already in use."
        })))
        .mount(&server)
        .await;

    let resolved = directory_for(&server).resolve(&nina()).await.unwrap();
    assert_eq!(resolved.remote_id, "winner-id");
}

/// Repeated resolves against the in-memory API create exactly once.
#[tokio::test]
async fn resolve_is_idempotent_against_mock_api() {
    let api = Arc::new(MockInstanceApi::new());
    let directory = InstanceDirectory::new(api.clone(), SETTLE);

    let first = directory.resolve(&nina()).await.unwrap();
    let second = directory.resolve(&nina()).await.unwrap();
    let third = directory.resolve(&nina()).await.unwrap();

    assert_eq!(first.remote_id, second.remote_id);
    assert_eq!(second.remote_id, third.remote_id);
    assert_eq!(api.create_calls(), 1);
}

/// `find` never creates.
#[tokio::test]
async fn find_does_not_create() {
    let api = Arc::new(MockInstanceApi::new());
    let directory = InstanceDirectory::new(api.clone(), SETTLE);

    assert!(directory.find(&nina()).await.is_none());
    assert_eq!(api.create_calls(), 0);
}
