//! Consul registry gateway.
//!
//! Talks to the local Consul agent's HTTP API: service registration,
//! deregistration, and lookup, plus one-time discovery of the agent's
//! public gRPC xDS endpoint that injected sidecar proxies bootstrap
//! against.
//!
//! A deregistration of an unknown service reports
//! [`DeregisterOutcome::NotFound`] instead of failing; a prior partial
//! delete may already have removed the entry and the engine must be able
//! to tell that apart from a real failure.

use crate::error::{Error, Result};
use crate::gateway::{DeregisterOutcome, RegisteredService, RegistryGateway, ServiceRegistration};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::net::IpAddr;
use tracing::debug;

/// The registry agent's gRPC xDS endpoint, as advertised by the agent.
#[derive(Debug, Clone)]
pub struct MeshEndpoint {
    /// Endpoint address (non-loopback IP).
    pub address: String,
    /// Endpoint port.
    pub port: u16,
    /// Whether the endpoint requires TLS.
    pub tls: bool,
}

/// Agent self-info, reduced to the gRPC listener lists.
#[derive(Debug, Default, Deserialize)]
struct AgentSelf {
    #[serde(rename = "DebugConfig", default)]
    debug_config: AgentDebugConfig,
}

#[derive(Debug, Default, Deserialize)]
struct AgentDebugConfig {
    #[serde(rename = "GRPCAddrs", default)]
    grpc_addrs: Vec<String>,
    #[serde(rename = "GRPCTLSAddrs", default)]
    grpc_tls_addrs: Vec<String>,
}

/// Picks the agent's reachable gRPC endpoint: TLS listeners first, then
/// plaintext, first `tcp://` address with a non-loopback IP wins.
fn find_grpc_endpoint(config: &AgentDebugConfig) -> Option<MeshEndpoint> {
    let candidates = config
        .grpc_tls_addrs
        .iter()
        .map(|a| (a, true))
        .chain(config.grpc_addrs.iter().map(|a| (a, false)));

    for (addr, tls) in candidates {
        let Some(host_port) = addr.strip_prefix("tcp://") else {
            continue;
        };
        let Some((host, port)) = host_port.rsplit_once(':') else {
            continue;
        };
        let Ok(ip) = host.parse::<IpAddr>() else {
            continue;
        };
        if ip.is_loopback() {
            continue;
        }
        let Ok(port) = port.parse::<u16>() else {
            continue;
        };

        return Some(MeshEndpoint {
            address: host.to_string(),
            port,
            tls,
        });
    }

    None
}

/// Client for the Consul agent HTTP API.
#[derive(Debug)]
pub struct ConsulRegistry {
    http: reqwest::Client,
    base_url: String,
    mesh: MeshEndpoint,
}

impl ConsulRegistry {
    /// Connects to the agent and discovers its gRPC xDS endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::Gateway`] if the agent is unreachable
    /// - [`Error::MeshDiscovery`] if no usable gRPC address is advertised
    pub async fn connect(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::new();

        let info: AgentSelf = http
            .get(format!("{base_url}/v1/agent/self"))
            .send()
            .await
            .map_err(|e| Error::Gateway {
                operation: "agent info",
                target: base_url.clone(),
                reason: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| Error::Gateway {
                operation: "agent info",
                target: base_url.clone(),
                reason: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| Error::Gateway {
                operation: "agent info",
                target: base_url.clone(),
                reason: format!("could not decode response: {e}"),
            })?;

        let mesh = find_grpc_endpoint(&info.debug_config).ok_or_else(|| Error::MeshDiscovery {
            reason: "agent advertises no non-loopback tcp gRPC address".to_string(),
        })?;

        debug!(address = %mesh.address, port = mesh.port, tls = mesh.tls, "discovered mesh gRPC endpoint");

        Ok(Self {
            http,
            base_url,
            mesh,
        })
    }

    /// Returns the discovered gRPC xDS endpoint.
    pub fn mesh(&self) -> &MeshEndpoint {
        &self.mesh
    }
}

#[async_trait]
impl RegistryGateway for ConsulRegistry {
    async fn register(&self, reg: &ServiceRegistration) -> Result<()> {
        debug!(service = %reg.id, "registering service");

        let res = self
            .http
            .put(format!("{}/v1/agent/service/register", self.base_url))
            .json(reg)
            .send()
            .await
            .map_err(|e| Error::Gateway {
                operation: "service register",
                target: reg.id.clone(),
                reason: e.to_string(),
            })?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(Error::Gateway {
                operation: "service register",
                target: reg.id.clone(),
                reason: format!("unexpected status {status}: {body}"),
            });
        }

        Ok(())
    }

    async fn deregister(&self, id: &str) -> Result<DeregisterOutcome> {
        debug!(service = %id, "deregistering service");

        let res = self
            .http
            .put(format!("{}/v1/agent/service/deregister/{id}", self.base_url))
            .send()
            .await
            .map_err(|e| Error::Gateway {
                operation: "service deregister",
                target: id.to_string(),
                reason: e.to_string(),
            })?;

        match res.status() {
            StatusCode::NOT_FOUND => Ok(DeregisterOutcome::NotFound),
            s if s.is_success() => Ok(DeregisterOutcome::Removed),
            s => {
                let body = res.text().await.unwrap_or_default();
                Err(Error::Gateway {
                    operation: "service deregister",
                    target: id.to_string(),
                    reason: format!("unexpected status {s}: {body}"),
                })
            }
        }
    }

    async fn lookup(&self, id: &str) -> Result<Option<RegisteredService>> {
        let res = self
            .http
            .get(format!("{}/v1/agent/service/{id}", self.base_url))
            .send()
            .await
            .map_err(|e| Error::Gateway {
                operation: "service lookup",
                target: id.to_string(),
                reason: e.to_string(),
            })?;

        match res.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let svc = res.json().await.map_err(|e| Error::Gateway {
                    operation: "service lookup",
                    target: id.to_string(),
                    reason: format!("could not decode response: {e}"),
                })?;
                Ok(Some(svc))
            }
            s => {
                let body = res.text().await.unwrap_or_default();
                Err(Error::Gateway {
                    operation: "service lookup",
                    target: id.to_string(),
                    reason: format!("unexpected status {s}: {body}"),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_discovery_prefers_tls_listeners() {
        let config = AgentDebugConfig {
            grpc_addrs: vec!["tcp://10.0.0.5:8502".to_string()],
            grpc_tls_addrs: vec!["tcp://10.0.0.5:8503".to_string()],
        };

        let mesh = find_grpc_endpoint(&config).unwrap();
        assert_eq!(mesh.port, 8503);
        assert!(mesh.tls);
    }

    #[test]
    fn endpoint_discovery_skips_loopback_and_malformed() {
        let config = AgentDebugConfig {
            grpc_addrs: vec![
                "unix:///run/consul.sock".to_string(),
                "tcp://127.0.0.1:8502".to_string(),
                "tcp://[::1]:8502".to_string(),
                "tcp://192.168.1.9:8502".to_string(),
            ],
            grpc_tls_addrs: vec![],
        };

        let mesh = find_grpc_endpoint(&config).unwrap();
        assert_eq!(mesh.address, "192.168.1.9");
        assert_eq!(mesh.port, 8502);
        assert!(!mesh.tls);
    }

    #[test]
    fn endpoint_discovery_fails_without_candidates() {
        let config = AgentDebugConfig {
            grpc_addrs: vec!["tcp://127.0.0.1:8502".to_string()],
            grpc_tls_addrs: vec![],
        };

        assert!(find_grpc_endpoint(&config).is_none());
    }
}
