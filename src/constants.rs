//! # Agent Constants
//!
//! Reserved label keys, channel bounds, and sidecar defaults for the
//! reconciliation layer. These constants are the **single source of truth**
//! for every key that ends up on a runtime object or registry entry.
//!
//! ## Compatibility
//!
//! The reserved label keys are persisted on runtime pods and read back on
//! every reconcile. Changing them orphans every pod applied by an earlier
//! version, so they must stay stable across releases.

// =============================================================================
// Reserved Labels (written onto runtime pods)
// =============================================================================

/// Label holding the content hash of the last applied pod document.
///
/// Presence of this label is the sole marker that a pod is managed by the
/// agent. A pod without it is foreign and is never mutated or deleted.
pub const LAST_APPLIED_LABEL: &str = "paddock/last-applied-configuration";

/// Label holding the comma-joined registry service IDs created for a pod.
///
/// This is the only record of which registry entries belong to the pod;
/// the registry itself is never queried to discover them on delete.
pub const SERVICE_IDS_LABEL: &str = "paddock/service-ids";

// =============================================================================
// Registry Metadata (written onto registered services)
// =============================================================================

/// Meta key marking a registry entry as created by the agent.
pub const MANAGED_SERVICE_META: &str = "paddock_managed";

/// Meta key carrying the owning pod's name on a registry entry.
pub const SERVICE_POD_NAME_META: &str = "paddock_pod_name";

// =============================================================================
// Watch Pipeline
// =============================================================================

/// Capacity of the bounded pod-event channel between the watch pipeline
/// and the agent loop. The pipeline blocks on send when full; events are
/// never dropped.
pub const EVENT_CHANNEL_CAPACITY: usize = 100;

// =============================================================================
// Sidecar Proxy
// =============================================================================

/// Suffix the registry appends to auto-provisioned sidecar entries.
pub const SIDECAR_SERVICE_SUFFIX: &str = "-sidecar-proxy";

/// Admin interface bind address inside the sidecar container.
pub const SIDECAR_ADMIN_ADDRESS: &str = "0.0.0.0";

/// Admin interface port inside the sidecar container.
pub const SIDECAR_ADMIN_PORT: u16 = 9100;

/// Path of the rendered bootstrap config inside the sidecar container.
pub const SIDECAR_CONFIG_PATH: &str = "/etc/envoy/envoy.yml";

/// Default proxy image used for injected sidecar containers.
pub const DEFAULT_PROXY_IMAGE: &str = "docker.io/envoyproxy/envoy:v1.27.0";

// =============================================================================
// Images
// =============================================================================

/// Image reference prefixes that select the archive-load path instead of a
/// registry pull.
pub const IMAGE_ARCHIVE_PREFIXES: &[&str] = &["docker-archive:", "oci-archive:"];

// =============================================================================
// Files
// =============================================================================

/// Default mode for inline container files that do not declare one.
pub const DEFAULT_FILE_MODE: u32 = 0o644;
