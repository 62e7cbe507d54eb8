//! Gateway traits for the container runtime and the service registry.
//!
//! The reconciliation engine drives external state exclusively through the
//! two traits in this module. Production implementations live in
//! [`crate::podman`] and [`crate::consul`]; tests substitute in-memory
//! fakes. Both traits are object-safe so the engine can hold them as
//! trait objects.
//!
//! # Tolerated Conditions as Data
//!
//! The two conditions the engine is allowed to tolerate — "pod already
//! started" and "service not found on deregister" — are modeled as
//! [`StartOutcome`] and [`DeregisterOutcome`] variants rather than errors,
//! so implementations cannot accidentally surface them as failures and
//! callers cannot accidentally swallow anything else.

use crate::constants::{LAST_APPLIED_LABEL, SERVICE_IDS_LABEL};
use crate::error::Result;
use crate::manifest::PullPolicy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Runtime Gateway
// =============================================================================

/// Narrow interface onto the container runtime.
#[async_trait]
pub trait RuntimeGateway: Send + Sync {
    /// Checks whether a pod with the given name exists, returning its
    /// runtime ID when it does.
    async fn pod_exists(&self, name: &str) -> Result<Option<String>>;

    /// Inspects a pod by name or runtime ID.
    async fn inspect_pod(&self, name_or_id: &str) -> Result<PodReport>;

    /// Creates a pod and returns its runtime ID.
    async fn create_pod(&self, req: &PodCreateRequest) -> Result<String>;

    /// Starts a pod. Starting an already-running pod reports
    /// [`StartOutcome::AlreadyRunning`], not an error.
    async fn start_pod(&self, name_or_id: &str) -> Result<StartOutcome>;

    /// Deletes a pod, forcibly when `force` is set (its containers go
    /// with it).
    async fn remove_pod(&self, name_or_id: &str, force: bool) -> Result<()>;

    /// Creates a container attached to an existing pod.
    async fn create_container(&self, req: &ContainerCreateRequest) -> Result<()>;

    /// Copies a tar archive into a container's filesystem, rooted at `/`.
    async fn copy_into_container(&self, name_or_id: &str, archive: Vec<u8>) -> Result<()>;

    /// Pulls an image from a remote registry, returning the image ID.
    async fn pull_image(&self, reference: &str, policy: PullPolicy) -> Result<String>;

    /// Loads an image from archive bytes, returning the image ID.
    async fn load_image(&self, archive: Vec<u8>) -> Result<String>;
}

/// Outcome of a pod start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The pod was started by this call.
    Started,
    /// The pod was already running; nothing was done.
    AlreadyRunning,
}

/// Coarse pod run state reported by the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodState {
    Created,
    Running,
    Paused,
    Degraded,
    Stopped,
    Exited,
    Unknown,
}

impl PodState {
    /// Parses the runtime's state string.
    pub fn parse(s: &str) -> Self {
        match s {
            "Created" => Self::Created,
            "Running" => Self::Running,
            "Paused" => Self::Paused,
            "Degraded" => Self::Degraded,
            "Stopped" => Self::Stopped,
            "Exited" => Self::Exited,
            _ => Self::Unknown,
        }
    }

    /// Returns true if the pod is running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Snapshot of a runtime pod, as seen by the engine.
///
/// The agent's reserved labels are decoded into typed fields here, at the
/// gateway boundary, so no other component re-parses label strings:
/// `owned` is derived from the presence of the last-applied hash label,
/// and `service_ids` is the decoded service-ID list.
#[derive(Debug, Clone)]
pub struct PodReport {
    /// Runtime ID.
    pub id: String,
    /// Pod name.
    pub name: String,
    /// Current run state.
    pub state: PodState,
    /// Full label map on the pod.
    pub labels: HashMap<String, String>,
    /// True when the pod carries the agent's ownership marker.
    pub owned: bool,
    /// Hash of the last applied document, when owned.
    pub last_applied_hash: Option<String>,
    /// Registry service IDs recorded on the pod.
    pub service_ids: Vec<String>,
}

impl PodReport {
    /// Builds a report from the raw inspect fields, decoding the reserved
    /// labels.
    pub fn from_parts(
        id: String,
        name: String,
        state: PodState,
        labels: HashMap<String, String>,
    ) -> Self {
        let last_applied_hash = labels.get(LAST_APPLIED_LABEL).cloned();
        let service_ids = labels
            .get(SERVICE_IDS_LABEL)
            .map(|ids| {
                ids.split(',')
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id,
            name,
            state,
            owned: last_applied_hash.is_some(),
            last_applied_hash,
            labels,
            service_ids,
        }
    }
}

/// Request to create a pod.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PodCreateRequest {
    /// Pod name.
    pub name: String,
    /// Hostname inside the pod, when declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Labels to attach, including the agent's reserved labels.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    /// Port mappings promoted to pod scope.
    #[serde(rename = "portmappings", skip_serializing_if = "Vec::is_empty")]
    pub port_mappings: Vec<PodPortMapping>,
    /// Static host entries in `host:ip` form.
    #[serde(rename = "hostadd", skip_serializing_if = "Vec::is_empty")]
    pub host_add: Vec<String>,
}

/// A pod-scope port mapping on a create request.
#[derive(Debug, Clone, Serialize)]
pub struct PodPortMapping {
    #[serde(rename = "host_ip", skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    #[serde(rename = "host_port")]
    pub host_port: u16,
    #[serde(rename = "container_port")]
    pub container_port: u16,
    pub protocol: String,
}

/// Request to create a container inside a pod.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContainerCreateRequest {
    /// Container name.
    pub name: String,
    /// Resolved image ID or reference.
    pub image: String,
    /// Runtime ID of the owning pod.
    pub pod: String,
    /// Restart policy.
    #[serde(rename = "restart_policy")]
    pub restart_policy: String,
    /// Arguments to the image entrypoint.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Mounts attached to the container.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<ContainerMount>,
}

/// A mount on a container create request.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerMount {
    pub destination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

// =============================================================================
// Registry Gateway
// =============================================================================

/// Narrow interface onto the service-registry agent.
#[async_trait]
pub trait RegistryGateway: Send + Sync {
    /// Registers (or re-registers) a service under its declared ID.
    async fn register(&self, reg: &ServiceRegistration) -> Result<()>;

    /// Deregisters a service by ID. A missing service reports
    /// [`DeregisterOutcome::NotFound`], not an error.
    async fn deregister(&self, id: &str) -> Result<DeregisterOutcome>;

    /// Looks up a registered service by ID.
    async fn lookup(&self, id: &str) -> Result<Option<RegisteredService>>;
}

/// Outcome of a service deregistration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeregisterOutcome {
    /// The service was removed.
    Removed,
    /// The registry had no service under that ID.
    NotFound,
}

/// Service registration sent to the registry agent.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub port: u16,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub meta: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<ConnectRegistration>,
}

/// Connect block on a service registration.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConnectRegistration {
    pub native: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sidecar_service: Option<SidecarRegistration>,
}

/// Sidecar registration nested in a connect block.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SidecarRegistration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyRegistration>,
}

/// Proxy config on a sidecar registration.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProxyRegistration {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub upstreams: Vec<UpstreamRegistration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expose: Option<ExposeRegistration>,
}

/// Upstream entry on a proxy registration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpstreamRegistration {
    pub destination_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_bind_address: Option<String>,
    pub local_bind_port: u16,
}

/// Expose block on a proxy registration.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExposeRegistration {
    pub paths: Vec<ExposePathRegistration>,
}

/// Exposed path entry on a proxy registration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExposePathRegistration {
    pub path: String,
    pub local_path_port: u16,
    pub listener_port: u16,
    pub protocol: String,
}

/// A service as reported back by the registry agent.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredService {
    /// Registered service ID.
    #[serde(rename = "ID")]
    pub id: String,
    /// Service name.
    #[serde(rename = "Service")]
    pub service: String,
    /// Service port.
    #[serde(rename = "Port", default)]
    pub port: u16,
    /// Proxy details for sidecar entries.
    #[serde(rename = "Proxy", default)]
    pub proxy: Option<ProxyDetails>,
}

/// Proxy details on a registered sidecar service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyDetails {
    /// Expose block, carrying listener ports the sidecar must publish.
    #[serde(rename = "Expose", default)]
    pub expose: ExposeDetails,
}

/// Expose details on a registered sidecar service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExposeDetails {
    #[serde(rename = "Paths", default)]
    pub paths: Vec<ExposePathDetails>,
}

/// A single exposed path on a registered sidecar service.
#[derive(Debug, Clone, Deserialize)]
pub struct ExposePathDetails {
    #[serde(rename = "Path", default)]
    pub path: String,
    #[serde(rename = "LocalPathPort", default)]
    pub local_path_port: u16,
    #[serde(rename = "ListenerPort", default)]
    pub listener_port: u16,
    #[serde(rename = "Protocol", default)]
    pub protocol: String,
}
