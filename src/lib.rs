//! # paddock
//!
//! **Single-Host Declarative Pod Agent**
//!
//! paddock watches a directory of declarative pod definitions and drives a
//! Podman-compatible container runtime and a Consul-compatible service
//! registry toward the declared state. Services that request mesh
//! connectivity get an Envoy sidecar proxy injected into their pod
//! automatically.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                           paddock                                │
//! │                                                                  │
//! │  file mutation                                                   │
//! │       │                                                          │
//! │       ▼                                                          │
//! │  ┌───────────┐  PodEvent   ┌────────────┐                        │
//! │  │ PodWatcher│ ──────────► │ Reconciler │                        │
//! │  └───────────┘  (bounded   └─────┬──────┘                        │
//! │                  channel)        │                               │
//! │                     ┌────────────┼─────────────┐                 │
//! │                     ▼            ▼             ▼                 │
//! │              ┌────────────┐ ┌───────────┐ ┌──────────┐           │
//! │              │ PodmanClient│ │ConsulReg. │ │ sidecar  │          │
//! │              │ (runtime)  │ │(registry) │ │ renderer │           │
//! │              └────────────┘ └───────────┘ └──────────┘           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Convergence Model
//!
//! Desired state is a [`manifest::Pod`] document. The engine stores the
//! document's content hash as a label on the runtime pod; on the next
//! apply, an equal hash is a no-op and a different hash replaces the pod
//! wholesale. A pod without the hash label is foreign and never touched.
//!
//! The reconciler holds no in-memory beliefs: every apply and delete reads
//! the runtime's labels fresh, so the agent survives restarts with no
//! state files.
//!
//! # Example
//!
//! ```rust,ignore
//! use paddock::{agent, manifest::Pod};
//!
//! #[tokio::main]
//! async fn main() -> paddock::Result<()> {
//!     let reconciler = agent::connect(
//!         "/run/user/1000/podman/podman.sock",
//!         "http://127.0.0.1:8500",
//!         "docker.io/envoyproxy/envoy:v1.27.0",
//!     )
//!     .await?;
//!
//!     let pod = Pod::from_yaml(&std::fs::read("web.yml")?)?;
//!     reconciler.apply(pod).await?;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod constants;
pub mod consul;
pub mod error;
pub mod gateway;
pub mod manifest;
pub mod podman;
pub mod reconciler;
pub mod sidecar;
pub mod watcher;

// Re-exports
pub use consul::{ConsulRegistry, MeshEndpoint};
pub use error::{Error, Result};
pub use gateway::{
    DeregisterOutcome, PodReport, PodState, RegistryGateway, RuntimeGateway, StartOutcome,
};
pub use manifest::Pod;
pub use podman::PodmanClient;
pub use reconciler::Reconciler;
pub use watcher::{PodEvent, PodWatcher};
