//! Pod document model.
//!
//! A pod manifest is the declarative unit of desired state: a named group
//! of containers plus the services registered alongside them. Manifests
//! are parsed from YAML; the field names follow the manifest dialect
//! (camelCase keys, sensible defaults for policies and modes).
//!
//! # Content Hash
//!
//! [`Pod::content_hash`] digests the full serialized document and is the
//! engine's change detector: the hash of the last applied document is
//! stored as a label on the runtime pod, and any mismatch on a later apply
//! triggers full pod replacement. The maps in this module are ordered
//! (`BTreeMap`) and struct fields serialize in declaration order, so two
//! documents that serialize identically always hash identically.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

// =============================================================================
// Pod
// =============================================================================

/// A declarative pod definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pod {
    /// Pod name, unique within the runtime and within a watch directory.
    pub name: String,
    /// Override hostname inside the pod's network namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// Static host entries (hostname -> IP) merged into the pod.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hosts: BTreeMap<String, String>,
    /// User labels, merged with the agent's reserved labels at apply time.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Containers to create, in declaration order.
    #[serde(default)]
    pub containers: Vec<Container>,
    /// Services to register alongside the pod.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,
}

impl Pod {
    /// Parses a pod document from YAML bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidManifest`] if the YAML does not decode or
    /// the document declares no name.
    pub fn from_yaml(bytes: &[u8]) -> Result<Self> {
        let pod: Pod = serde_yaml::from_slice(bytes).map_err(|e| Error::InvalidManifest {
            reason: e.to_string(),
        })?;

        if pod.name.is_empty() {
            return Err(Error::InvalidManifest {
                reason: "pod declares no name".to_string(),
            });
        }

        Ok(pod)
    }

    /// Computes the content hash of the document.
    ///
    /// The hash is the lowercase hex SHA-256 digest of the document's
    /// canonical JSON serialization.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HashFailed`] if the document cannot be serialized.
    pub fn content_hash(&self) -> Result<String> {
        let buf = serde_json::to_vec(self).map_err(|e| Error::HashFailed {
            pod: self.name.clone(),
            reason: e.to_string(),
        })?;

        Ok(hex::encode(Sha256::digest(&buf)))
    }
}

// =============================================================================
// Container
// =============================================================================

/// A container within a pod.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name (unique within the pod).
    pub name: String,
    /// Image reference, optionally prefixed with `docker-archive:` or
    /// `oci-archive:` to load from a local archive instead of pulling.
    pub image: String,
    /// Image pull policy.
    #[serde(default)]
    pub image_pull_policy: PullPolicy,
    /// Restart policy.
    #[serde(default)]
    pub restart_policy: RestartPolicy,
    /// Arguments to the image entrypoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Port mappings, promoted to pod scope at creation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortMapping>,
    /// Inline files written into the container before it starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ContainerFile>,
    /// Mounts attached to the container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<Mount>,
}

/// A port mapping on a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    /// Host IP to bind (all interfaces when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[serde(rename = "hostIP")]
    pub host_ip: Option<String>,
    /// Host port.
    #[serde(default)]
    pub host_port: u16,
    /// Container port.
    #[serde(default)]
    pub container_port: u16,
    /// Protocol, `tcp` by default.
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

/// An inline file written into a container's filesystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerFile {
    /// Absolute destination path inside the container.
    pub destination: String,
    /// File content.
    pub content: String,
    /// File mode, `0644` by default.
    #[serde(default = "default_file_mode")]
    pub mode: u32,
}

/// A mount attached to a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    /// Mount type (`bind`, `volume`, or `tmpfs`), `bind` by default.
    #[serde(default = "default_mount_kind", rename = "type")]
    pub kind: String,
    /// Mount source on the host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Destination path inside the container.
    pub destination: String,
    /// Mount options.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

// =============================================================================
// Policies
// =============================================================================

/// Image pull policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PullPolicy {
    /// Always pull the image.
    #[default]
    Always,
    /// Pull only when the image is missing locally.
    Missing,
    /// Pull when the remote image is newer than the local one.
    Newer,
    /// Never pull; fail if the image is missing locally.
    Never,
}

impl PullPolicy {
    /// Returns the wire representation of the policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Missing => "missing",
            Self::Newer => "newer",
            Self::Never => "never",
        }
    }
}

/// Container restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Never restart.
    No,
    /// Always restart.
    #[default]
    Always,
    /// Restart only on non-zero exit.
    OnFailure,
    /// Restart unless explicitly stopped.
    UnlessStopped,
}

impl RestartPolicy {
    /// Returns the wire representation of the policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Always => "always",
            Self::OnFailure => "on-failure",
            Self::UnlessStopped => "unless-stopped",
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// A service registered alongside a pod.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Service name.
    pub name: String,
    /// Tags attached to the registry entry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Service port.
    pub port: u16,
    /// Mesh connectivity config.
    #[serde(default)]
    pub connect: ServiceConnect,
}

/// Mesh connectivity config for a service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConnect {
    /// The service speaks the mesh protocol natively; no sidecar is needed.
    #[serde(default)]
    pub native: bool,
    /// Sidecar proxy request for non-native services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar_service: Option<SidecarService>,
}

/// Sidecar registration request on a service's connect block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SidecarService {
    /// Proxy configuration for the sidecar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<SidecarProxy>,
}

/// Proxy configuration for a sidecar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SidecarProxy {
    /// Upstream services the sidecar opens local listeners for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstreams: Vec<Upstream>,
    /// Paths exposed through the sidecar without mesh TLS.
    #[serde(default)]
    pub expose: Expose,
}

/// An upstream dependency reached through the sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Upstream {
    /// Name of the destination service.
    pub destination_name: String,
    /// Local bind address for the upstream listener.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_bind_address: Option<String>,
    /// Local bind port for the upstream listener.
    pub local_bind_port: u16,
}

/// Path exposure config on a sidecar proxy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Expose {
    /// Exposed paths.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<ExposePath>,
}

/// A single exposed path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExposePath {
    /// HTTP path to expose.
    pub path: String,
    /// Port the local service listens on.
    pub local_path_port: u16,
    /// Port the sidecar listens on for the exposed path.
    pub listener_port: u16,
    /// Protocol (`http` or `http2`).
    #[serde(default = "default_expose_protocol")]
    pub protocol: String,
}

// =============================================================================
// Defaults
// =============================================================================

fn default_protocol() -> String {
    "tcp".to_string()
}

fn default_expose_protocol() -> String {
    "http".to_string()
}

fn default_file_mode() -> u32 {
    crate::constants::DEFAULT_FILE_MODE
}

fn default_mount_kind() -> String {
    "bind".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_yaml_rejects_missing_name() {
        let result = Pod::from_yaml(b"containers: []");
        assert!(matches!(result, Err(Error::InvalidManifest { .. })));
    }

    #[test]
    fn from_yaml_applies_policy_defaults() {
        let pod = Pod::from_yaml(
            b"name: web\ncontainers:\n  - name: app\n    image: nginx:1.25\n",
        )
        .unwrap();

        assert_eq!(pod.containers[0].image_pull_policy, PullPolicy::Always);
        assert_eq!(pod.containers[0].restart_policy, RestartPolicy::Always);
    }

    #[test]
    fn content_hash_is_stable() {
        let pod = Pod::from_yaml(b"name: web\ncontainers: []").unwrap();
        assert_eq!(pod.content_hash().unwrap(), pod.content_hash().unwrap());
    }
}
