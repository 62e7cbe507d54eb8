//! Error types for the agent.

use std::path::PathBuf;

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, Error>;

fn cleanup_note(cleanup: &Option<String>) -> String {
    match cleanup {
        Some(reason) => format!(" (cleanup of the partial pod also failed: {reason})"),
        None => String::new(),
    }
}

/// Errors that can occur while watching, reconciling, or talking to the
/// runtime and registry gateways.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Manifest Errors
    // =========================================================================
    /// A pod definition file could not be parsed.
    #[error("could not parse pod manifest '{path}': {reason}")]
    ManifestParse { path: PathBuf, reason: String },

    /// A pod document is structurally invalid.
    #[error("invalid pod manifest: {reason}")]
    InvalidManifest { reason: String },

    /// Content hash of a pod document could not be computed.
    #[error("could not compute hash for pod '{pod}': {reason}")]
    HashFailed { pod: String, reason: String },

    // =========================================================================
    // Convergence Errors
    // =========================================================================
    /// The target pod exists but does not carry the agent's ownership label.
    #[error("pod '{name}' is not managed by paddock, refusing to touch it")]
    ForeignPod { name: String },

    /// The target pod could not be found in the runtime.
    #[error("pod not found: {name}")]
    PodNotFound { name: String },

    /// Container creation failed after the pod was created. The pod delete
    /// attempted as cleanup is best-effort; if it also failed, the secondary
    /// failure is carried here instead of being discarded.
    #[error("could not create container '{container}' in pod '{pod}': {reason}{}", cleanup_note(.cleanup))]
    ContainerCreateFailed {
        pod: String,
        container: String,
        reason: String,
        cleanup: Option<String>,
    },

    // =========================================================================
    // Image Errors
    // =========================================================================
    /// Image pull from a remote registry failed.
    #[error("could not pull image '{reference}': {reason}")]
    ImagePull { reference: String, reason: String },

    /// Image load from a local archive failed.
    #[error("could not load archive image '{reference}': {reason}")]
    ImageLoad { reference: String, reason: String },

    // =========================================================================
    // Gateway Errors
    // =========================================================================
    /// A runtime or registry gateway call failed.
    #[error("{operation} failed for '{target}': {reason}")]
    Gateway {
        operation: &'static str,
        target: String,
        reason: String,
    },

    /// No usable mesh gRPC endpoint was advertised by the registry agent.
    #[error("could not discover mesh gRPC endpoint: {reason}")]
    MeshDiscovery { reason: String },

    /// Sidecar bootstrap config could not be rendered.
    #[error("could not render sidecar bootstrap config: {reason}")]
    SidecarConfig { reason: String },

    // =========================================================================
    // Watch Pipeline Errors
    // =========================================================================
    /// The file-watch backend failed after start.
    #[error("file watch failed: {reason}")]
    Watch { reason: String },

    /// The pod-event channel was closed by its consumer.
    #[error("pod event channel closed")]
    ChannelClosed,

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
