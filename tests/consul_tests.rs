//! Integration tests for the Consul registry gateway, against a mock
//! HTTP agent.

use paddock::consul::ConsulRegistry;
use paddock::error::Error;
use paddock::gateway::{
    ConnectRegistration, DeregisterOutcome, RegistryGateway, ServiceRegistration,
    SidecarRegistration,
};
use serde_json::json;
use std::collections::HashMap;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mounts a self-info endpoint advertising one plaintext gRPC listener.
async fn mount_agent_self(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/agent/self"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "DebugConfig": {
                "GRPCAddrs": ["tcp://10.1.2.3:8502"],
                "GRPCTLSAddrs": []
            }
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn connect_discovers_mesh_endpoint() {
    let server = MockServer::start().await;
    mount_agent_self(&server).await;

    let registry = ConsulRegistry::connect(server.uri()).await.unwrap();

    let mesh = registry.mesh();
    assert_eq!(mesh.address, "10.1.2.3");
    assert_eq!(mesh.port, 8502);
    assert!(!mesh.tls);
}

#[tokio::test]
async fn connect_fails_without_usable_grpc_address() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/agent/self"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "DebugConfig": {
                "GRPCAddrs": ["tcp://127.0.0.1:8502"],
                "GRPCTLSAddrs": []
            }
        })))
        .mount(&server)
        .await;

    let err = ConsulRegistry::connect(server.uri()).await.unwrap_err();
    assert!(matches!(err, Error::MeshDiscovery { .. }));
}

#[tokio::test]
async fn register_sends_the_agent_wire_format() {
    let server = MockServer::start().await;
    mount_agent_self(&server).await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let registry = ConsulRegistry::connect(server.uri()).await.unwrap();

    let mut meta = HashMap::new();
    meta.insert("paddock_managed".to_string(), "true".to_string());

    registry
        .register(&ServiceRegistration {
            id: "web-web-svc".to_string(),
            name: "web-svc".to_string(),
            tags: vec!["http".to_string()],
            port: 8080,
            meta,
            connect: Some(ConnectRegistration {
                native: false,
                sidecar_service: Some(SidecarRegistration { proxy: None }),
            }),
        })
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let register = requests
        .iter()
        .find(|r| r.url.path() == "/v1/agent/service/register")
        .expect("register request should have been sent");

    let body: serde_json::Value = serde_json::from_slice(&register.body).unwrap();
    assert_eq!(body["ID"], "web-web-svc");
    assert_eq!(body["Name"], "web-svc");
    assert_eq!(body["Port"], 8080);
    assert_eq!(body["Meta"]["paddock_managed"], "true");
    assert_eq!(body["Connect"]["Native"], false);
    assert!(body["Connect"]["SidecarService"].is_object());
}

#[tokio::test]
async fn deregister_maps_missing_service_to_not_found() {
    let server = MockServer::start().await;
    mount_agent_self(&server).await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/deregister/ghost"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Unknown service ID \"ghost\""))
        .mount(&server)
        .await;

    let registry = ConsulRegistry::connect(server.uri()).await.unwrap();

    let outcome = registry.deregister("ghost").await.unwrap();
    assert_eq!(outcome, DeregisterOutcome::NotFound);
}

#[tokio::test]
async fn deregister_surfaces_other_failures() {
    let server = MockServer::start().await;
    mount_agent_self(&server).await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/deregister/web-web-svc"))
        .respond_with(ResponseTemplate::new(500).set_body_string("agent on fire"))
        .mount(&server)
        .await;

    let registry = ConsulRegistry::connect(server.uri()).await.unwrap();

    let err = registry.deregister("web-web-svc").await.unwrap_err();
    match err {
        Error::Gateway { reason, .. } => assert!(reason.contains("agent on fire")),
        other => panic!("expected Gateway, got {other:?}"),
    }
}

#[tokio::test]
async fn lookup_parses_sidecar_entries() {
    let server = MockServer::start().await;
    mount_agent_self(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/agent/service/web-web-svc-sidecar-proxy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ID": "web-web-svc-sidecar-proxy",
            "Service": "web-svc-sidecar-proxy",
            "Port": 21000,
            "Proxy": {
                "DestinationServiceName": "web-svc",
                "Expose": {
                    "Paths": [
                        {
                            "Path": "/metrics",
                            "LocalPathPort": 9102,
                            "ListenerPort": 21500,
                            "Protocol": "http"
                        }
                    ]
                }
            }
        })))
        .mount(&server)
        .await;

    let registry = ConsulRegistry::connect(server.uri()).await.unwrap();

    let svc = registry
        .lookup("web-web-svc-sidecar-proxy")
        .await
        .unwrap()
        .expect("sidecar entry should be found");

    assert_eq!(svc.id, "web-web-svc-sidecar-proxy");
    assert_eq!(svc.port, 21000);
    let proxy = svc.proxy.unwrap();
    assert_eq!(proxy.expose.paths.len(), 1);
    assert_eq!(proxy.expose.paths[0].listener_port, 21500);
}

#[tokio::test]
async fn lookup_maps_missing_service_to_none() {
    let server = MockServer::start().await;
    mount_agent_self(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/agent/service/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let registry = ConsulRegistry::connect(server.uri()).await.unwrap();

    assert!(registry.lookup("ghost").await.unwrap().is_none());
}
