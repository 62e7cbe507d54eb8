//! Sidecar proxy bootstrap rendering.
//!
//! Produces the Envoy bootstrap document injected into sidecar containers.
//! The bootstrap is minimal: an admin listener, the node identity the mesh
//! expects (cluster = service name, id = sidecar service ID), one static
//! cluster pointing at the registry agent's gRPC xDS endpoint, and ADS
//! dynamic resources served over that cluster. Everything else the proxy
//! needs arrives over xDS at runtime.
//!
//! Rendering is a pure function of [`SidecarParams`]; the document is
//! assembled as a serde value tree and serialized to YAML.

use crate::error::{Error, Result};
use serde_json::json;

/// Parameters for a sidecar bootstrap document.
#[derive(Debug, Clone)]
pub struct SidecarParams {
    /// Admin interface bind address.
    pub admin_address: String,
    /// Admin interface port.
    pub admin_port: u16,
    /// Name of the service the sidecar fronts.
    pub service_name: String,
    /// Registry ID of the sidecar service entry.
    pub service_id: String,
    /// Registry agent gRPC address.
    pub agent_address: String,
    /// Registry agent gRPC port.
    pub agent_port: u16,
    /// Whether the agent gRPC endpoint requires TLS.
    pub agent_tls: bool,
}

/// Renders the bootstrap config for a sidecar proxy.
///
/// # Errors
///
/// Returns [`Error::SidecarConfig`] if the document cannot be serialized.
pub fn render_bootstrap(params: &SidecarParams) -> Result<String> {
    let mut agent_cluster = json!({
        "name": "local_agent",
        "connect_timeout": "1s",
        "type": "STATIC",
        "typed_extension_protocol_options": {
            "envoy.extensions.upstreams.http.v3.HttpProtocolOptions": {
                "@type": "type.googleapis.com/envoy.extensions.upstreams.http.v3.HttpProtocolOptions",
                "explicit_http_config": {
                    "http2_protocol_options": {}
                }
            }
        },
        "load_assignment": {
            "cluster_name": "local_agent",
            "endpoints": [{
                "lb_endpoints": [{
                    "endpoint": {
                        "address": {
                            "socket_address": {
                                "address": params.agent_address,
                                "port_value": params.agent_port,
                            }
                        }
                    }
                }]
            }]
        }
    });

    if params.agent_tls {
        agent_cluster["transport_socket"] = json!({
            "name": "envoy.transport_sockets.tls",
            "typed_config": {
                "@type": "type.googleapis.com/envoy.extensions.transport_sockets.tls.v3.UpstreamTlsContext"
            }
        });
    }

    let bootstrap = json!({
        "admin": {
            "address": {
                "socket_address": {
                    "address": params.admin_address,
                    "port_value": params.admin_port,
                }
            }
        },
        "node": {
            "cluster": params.service_name,
            "id": params.service_id,
        },
        "static_resources": {
            "clusters": [agent_cluster]
        },
        "dynamic_resources": {
            "lds_config": { "ads": {}, "resource_api_version": "V3" },
            "cds_config": { "ads": {}, "resource_api_version": "V3" },
            "ads_config": {
                "api_type": "GRPC",
                "transport_api_version": "V3",
                "grpc_services": [{
                    "envoy_grpc": { "cluster_name": "local_agent" }
                }]
            }
        }
    });

    serde_yaml::to_string(&bootstrap).map_err(|e| Error::SidecarConfig {
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_params() -> SidecarParams {
        SidecarParams {
            admin_address: "0.0.0.0".to_string(),
            admin_port: 9100,
            service_name: "web-svc".to_string(),
            service_id: "web-web-svc-sidecar-proxy".to_string(),
            agent_address: "10.0.0.5".to_string(),
            agent_port: 8502,
            agent_tls: false,
        }
    }

    #[test]
    fn bootstrap_carries_node_identity() {
        let cfg = render_bootstrap(&test_params()).unwrap();
        assert!(cfg.contains("cluster: web-svc"));
        assert!(cfg.contains("id: web-web-svc-sidecar-proxy"));
    }

    #[test]
    fn bootstrap_omits_tls_when_plaintext() {
        let cfg = render_bootstrap(&test_params()).unwrap();
        assert!(!cfg.contains("transport_socket"));
    }

    #[test]
    fn bootstrap_adds_tls_when_requested() {
        let mut params = test_params();
        params.agent_tls = true;
        let cfg = render_bootstrap(&params).unwrap();
        assert!(cfg.contains("envoy.transport_sockets.tls"));
    }
}
