//! Integration tests for the query gateway using wiremock
//!
//! A single mock server plays Keystone plus the compute, network and volume
//! endpoints advertised in its catalog.

use openstack_mcp::error::{AuthError, BackendError, ToolError};
use openstack_mcp::openstack::{Credentials, ServiceType, Session, SessionSettings, DEFAULT_REGION};
use openstack_mcp::resource::ListOptions;
use openstack_mcp::tools::{ToolOutput, ToolRegistry};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "tok-123";

fn credentials(server: &MockServer) -> Credentials {
    let vars: HashMap<&str, String> = HashMap::from([
        ("OS_AUTH_URL", server.uri()),
        ("OS_USERNAME", "demo".to_string()),
        ("OS_PASSWORD", "secret".to_string()),
        ("OS_PROJECT_NAME", "demo".to_string()),
    ]);
    Credentials::from_lookup(|key: &str| vars.get(key).cloned()).expect("valid credentials")
}

fn catalog(uri: &str, with_volume: bool) -> Value {
    let mut catalog = vec![
        json!({"type": "compute", "name": "nova", "endpoints": [
            {"interface": "public", "region_id": DEFAULT_REGION, "region": DEFAULT_REGION,
             "url": format!("{}/compute/v2.1", uri)}
        ]}),
        json!({"type": "network", "name": "neutron", "endpoints": [
            {"interface": "public", "region_id": DEFAULT_REGION, "region": DEFAULT_REGION,
             "url": format!("{}/network", uri)}
        ]}),
    ];
    if with_volume {
        catalog.push(json!({"type": "block-storage", "name": "cinder", "endpoints": [
            {"interface": "public", "region_id": DEFAULT_REGION, "region": DEFAULT_REGION,
             "url": format!("{}/volume/v3/p1", uri)}
        ]}));
    }
    json!(catalog)
}

async fn mount_keystone(server: &MockServer, with_volume: bool) {
    Mock::given(method("POST"))
        .and(path("/v3/auth/tokens"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("X-Subject-Token", TOKEN)
                .set_body_json(json!({
                    "token": {
                        "expires_at": "2030-01-01T00:00:00.000000Z",
                        "catalog": catalog(&server.uri(), with_volume)
                    }
                })),
        )
        .expect(1)
        .mount(server)
        .await;
}

async fn session(server: &MockServer) -> Arc<Session> {
    mount_keystone(server, true).await;
    let session = Session::establish_with(&credentials(server), &SessionSettings::default())
        .await
        .expect("session should establish");
    Arc::new(session)
}

async fn registry(server: &MockServer) -> ToolRegistry {
    ToolRegistry::new(session(server).await, ListOptions::default())
}

/// Session establishment against a mock identity service
mod session_tests {
    use super::*;

    #[tokio::test]
    async fn test_establish_binds_catalog_endpoints() {
        let server = MockServer::start().await;
        let session = session(&server).await;

        assert_eq!(session.region(), DEFAULT_REGION);
        assert_eq!(
            session.client(ServiceType::Compute).endpoint(),
            format!("{}/compute/v2.1/", server.uri())
        );
        assert_eq!(
            session.client(ServiceType::Network).endpoint(),
            format!("{}/network/", server.uri())
        );
        assert_eq!(
            session.client(ServiceType::Volume).endpoint(),
            format!("{}/volume/v3/p1/", server.uri())
        );
        assert!(session.expires_at().is_some());
    }

    #[tokio::test]
    async fn test_rejected_credentials() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": 401, "message": "The request you have made requires authentication."}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = Session::establish_with(&credentials(&server), &SessionSettings::default())
            .await
            .unwrap_err();
        match err {
            AuthError::Rejected { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("requires authentication"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_token_header() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"token": {"catalog": []}})),
            )
            .mount(&server)
            .await;

        let err = Session::establish_with(&credentials(&server), &SessionSettings::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingToken));
    }

    #[tokio::test]
    async fn test_missing_volume_service_names_it() {
        let server = MockServer::start().await;
        mount_keystone(&server, false).await;

        let err = Session::establish_with(&credentials(&server), &SessionSettings::default())
            .await
            .unwrap_err();
        match err {
            AuthError::ServiceNotFound { service, .. } => assert_eq!(service, "volume"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_region_fails() {
        let server = MockServer::start().await;
        mount_keystone(&server, true).await;

        let settings = SessionSettings {
            region_override: Some("RegionNine".to_string()),
            ..SessionSettings::default()
        };
        let err = Session::establish_with(&credentials(&server), &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ServiceNotFound { service: "compute", .. }));
    }
}

/// Paginated listing through the registry
mod list_tests {
    use super::*;

    #[tokio::test]
    async fn test_list_vms_concatenates_pages_in_order() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        Mock::given(method("GET"))
            .and(path("/compute/v2.1/servers/detail"))
            .and(query_param_is_missing("marker"))
            .and(header("X-Auth-Token", TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [
                    {"id": "v1", "name": "web-01", "status": "ACTIVE", "flavor": {"id": "m1"}},
                    {"id": "v2", "name": "web-02", "status": "SHUTOFF", "key_name": "ops"}
                ],
                "servers_links": [
                    {"rel": "next", "href": format!("{}/compute/v2.1/servers/detail?marker=v2", server.uri())}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/compute/v2.1/servers/detail"))
            .and(query_param("marker", "v2"))
            .and(header("X-Auth-Token", TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": [
                    {"id": "v3", "name": "db-01", "status": "ERROR", "addresses": {}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let output = registry
            .invoke("ListVMs", &json!({}), &CancellationToken::new())
            .await
            .expect("listing should succeed");

        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({"vms": [
                {"id": "v1", "name": "web-01", "status": "ACTIVE"},
                {"id": "v2", "name": "web-02", "status": "SHUTOFF"},
                {"id": "v3", "name": "db-01", "status": "ERROR"}
            ]})
        );
    }

    #[tokio::test]
    async fn test_empty_collection_is_empty_list() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        Mock::given(method("GET"))
            .and(path("/volume/v3/p1/volumes/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"volumes": []})))
            .mount(&server)
            .await;

        let output = registry
            .invoke("ListVolumes", &Value::Null, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output, ToolOutput::Volumes(vec![]));
    }

    #[tokio::test]
    async fn test_volume_summary_carries_size() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        Mock::given(method("GET"))
            .and(path("/volume/v3/p1/volumes/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "volumes": [
                    {"id": "vol-1", "name": "data", "status": "in-use", "size": 100,
                     "attachments": [{"server_id": "v1"}]}
                ]
            })))
            .mount(&server)
            .await;

        let output = registry
            .invoke("ListVolumes", &json!({}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({"volumes": [{"id": "vol-1", "name": "data", "status": "in-use", "size_gb": 100}]})
        );
    }

    #[tokio::test]
    async fn test_failing_second_page_returns_no_partial_results() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        Mock::given(method("GET"))
            .and(path("/network/v2.0/networks"))
            .and(query_param_is_missing("marker"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "networks": [{"id": "n1", "name": "public"}],
                "networks_links": [
                    {"rel": "next", "href": format!("{}/network/v2.0/networks?marker=n1", server.uri())}
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/network/v2.0/networks"))
            .and(query_param("marker", "n1"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream failure"))
            .mount(&server)
            .await;

        let err = registry
            .invoke("ListNetworks", &json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ToolError::Enumeration { kind, source } => {
                assert_eq!(kind.key(), "network");
                assert!(source.to_string().contains("500"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_page_aborts() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        Mock::given(method("GET"))
            .and(path("/compute/v2.1/servers/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
            .mount(&server)
            .await;

        let err = registry
            .invoke("ListVMs", &json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Enumeration { .. }));
    }

    #[tokio::test]
    async fn test_malformed_records_fail_listing() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        Mock::given(method("GET"))
            .and(path("/compute/v2.1/servers/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "servers": ["garbage", {"id": 5, "name": ["x"], "status": {}}]
            })))
            .mount(&server)
            .await;

        let err = registry
            .invoke("ListVMs", &json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ToolError::Enumeration { kind, source } => {
                assert_eq!(kind.key(), "vm");
                assert!(matches!(source, BackendError::Decode(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_non_integer_volume_size_fails_listing() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        Mock::given(method("GET"))
            .and(path("/volume/v3/p1/volumes/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "volumes": [{"id": "vol-1", "name": "data", "status": "available", "size": "100"}]
            })))
            .mount(&server)
            .await;

        let err = registry
            .invoke("ListVolumes", &json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Enumeration { .. }));
    }

    #[tokio::test]
    async fn test_page_size_sent_as_limit() {
        let server = MockServer::start().await;
        let registry = ToolRegistry::new(
            session(&server).await,
            ListOptions {
                page_size: Some(2),
            },
        );

        Mock::given(method("GET"))
            .and(path("/network/v2.0/networks"))
            .and(query_param("limit", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"networks": []})))
            .expect(1)
            .mount(&server)
            .await;

        registry
            .invoke("ListNetworks", &json!({}), &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_lists_return_identical_results() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        Mock::given(method("GET"))
            .and(path("/network/v2.0/networks"))
            .and(query_param_is_missing("marker"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "networks": [{"id": "n1", "name": "public"}, {"id": "n2", "name": "private"}],
                "networks_links": [
                    {"rel": "next", "href": format!("{}/network/v2.0/networks?marker=n2", server.uri())}
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/network/v2.0/networks"))
            .and(query_param("marker", "n2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "networks": [{"id": "n3", "name": "storage"}]
            })))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let args_a = json!({});
        let args_b = json!({});
        let (a, b) = tokio::join!(
            registry.invoke("ListNetworks", &args_a, &cancel),
            registry.invoke("ListNetworks", &args_b, &cancel),
        );
        let a = a.unwrap();
        assert_eq!(a, b.unwrap());
        match a {
            ToolOutput::Networks(networks) => assert_eq!(networks.len(), 3),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_listing() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        Mock::given(method("GET"))
            .and(path("/compute/v2.1/servers/detail"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"servers": []})))
            .expect(0)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = registry
            .invoke("ListVMs", &json!({}), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Cancelled { .. }));
    }
}

/// Detail fetches and dispatch validation
mod detail_tests {
    use super::*;

    #[tokio::test]
    async fn test_vm_details_pass_through_unmodified() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        let record = json!({
            "id": "v1",
            "name": "web-01",
            "status": "ACTIVE",
            "flavor": {"original_name": "m1.small"},
            "addresses": {"private": [{"addr": "10.0.0.5", "version": 4}]},
            "OS-EXT-AZ:availability_zone": "nova"
        });

        Mock::given(method("GET"))
            .and(path("/compute/v2.1/servers/v1"))
            .and(header("X-Auth-Token", TOKEN))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"server": record})))
            .mount(&server)
            .await;

        let output = registry
            .invoke("GetVMDetails", &json!({"vm_id": "v1"}), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output, ToolOutput::VmDetails(record));
    }

    #[tokio::test]
    async fn test_volume_not_found() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        Mock::given(method("GET"))
            .and(path("/volume/v3/p1/volumes/does-not-exist"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "itemNotFound": {"code": 404, "message": "Volume does-not-exist could not be found."}
            })))
            .mount(&server)
            .await;

        let err = registry
            .invoke(
                "GetVolumeDetails",
                &json!({"volume_id": "does-not-exist"}),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        match err {
            ToolError::NotFound { kind, id } => {
                assert_eq!(kind.key(), "volume");
                assert_eq!(id, "does-not-exist");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_network_fetch_failure_carries_id() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        Mock::given(method("GET"))
            .and(path("/network/v2.0/networks/n1"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = registry
            .invoke("GetNetworkDetails", &json!({"network_id": "n1"}), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ToolError::Fetch { kind, id, source } => {
                assert_eq!(kind.key(), "network");
                assert_eq!(id, "n1");
                assert!(!source.is_not_found());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_parameter_makes_no_backend_call() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let err = registry
            .invoke("GetVMDetails", &json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ToolError::InvalidParameter { name, .. } => assert_eq!(name, "vm_id"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_operation_makes_no_backend_call() {
        let server = MockServer::start().await;
        let registry = registry(&server).await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0)
            .mount(&server)
            .await;

        let err = registry
            .invoke("UnknownOp", &json!({}), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownOperation(name) if name == "UnknownOp"));
    }
}
