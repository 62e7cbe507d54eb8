//! Reconciliation engine.
//!
//! Converges actual runtime and registry state to a declared pod document.
//! The engine keeps no state of its own: everything it needs is read fresh
//! from the runtime on every call, and the only persisted bookkeeping is
//! the pair of reserved labels written onto the runtime pod (the content
//! hash of the last applied document and the registry service IDs).
//!
//! # Convergence Model
//!
//! Change detection is hash-based: if the existing pod's recorded hash
//! differs from the freshly computed one, the pod is force-deleted and
//! rebuilt from scratch. There is no partial in-place mutation — full
//! replacement is the engine's only convergence mechanism, even for
//! single-field drift.
//!
//! A pod that exists but carries no hash label was not created by this
//! agent. It is foreign: both apply and delete refuse to touch it.
//!
//! # Failure Model
//!
//! No retries anywhere; every failure surfaces to the caller immediately.
//! The only two tolerated conditions are an already-running pod on start
//! and an already-removed service on deregister. If container creation
//! fails halfway through a pod build, the just-created pod is deleted
//! best-effort and the creation error is returned with the cleanup
//! failure, if any, carried alongside.

use crate::constants::{
    IMAGE_ARCHIVE_PREFIXES, LAST_APPLIED_LABEL, MANAGED_SERVICE_META, SERVICE_IDS_LABEL,
    SERVICE_POD_NAME_META, SIDECAR_ADMIN_ADDRESS, SIDECAR_ADMIN_PORT, SIDECAR_CONFIG_PATH,
    SIDECAR_SERVICE_SUFFIX,
};
use crate::consul::MeshEndpoint;
use crate::error::{Error, Result};
use crate::gateway::{
    ConnectRegistration, ContainerCreateRequest, ContainerMount, DeregisterOutcome,
    ExposePathRegistration, ExposeRegistration, PodCreateRequest, PodPortMapping,
    ProxyRegistration, RegistryGateway, RuntimeGateway, ServiceRegistration,
    SidecarRegistration, StartOutcome, UpstreamRegistration,
};
use crate::manifest::{
    Container, ContainerFile, Pod, PortMapping, PullPolicy, RestartPolicy, Service, SidecarProxy,
};
use crate::sidecar::{self, SidecarParams};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Drives the runtime and registry gateways toward declared pod state.
pub struct Reconciler {
    runtime: Arc<dyn RuntimeGateway>,
    registry: Arc<dyn RegistryGateway>,
    proxy_image: String,
    mesh: MeshEndpoint,
}

impl Reconciler {
    /// Creates an engine over the given gateways.
    pub fn new(
        runtime: Arc<dyn RuntimeGateway>,
        registry: Arc<dyn RegistryGateway>,
        mesh: MeshEndpoint,
        proxy_image: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            registry,
            proxy_image: proxy_image.into(),
            mesh,
        }
    }

    /// Applies a pod document, converging actual state to it.
    ///
    /// The document is consumed: service materialization may append
    /// synthetic sidecar containers before the content hash is taken.
    pub async fn apply(&self, mut pod: Pod) -> Result<()> {
        if pod.name.is_empty() {
            return Err(Error::InvalidManifest {
                reason: "pod declares no name".to_string(),
            });
        }

        info!(pod = %pod.name, "applying pod");

        // Register services first. Repeated applies reuse the same
        // deterministic registry IDs instead of accumulating duplicates,
        // and any requested sidecars join the container list so the hash
        // below covers them.
        let mut service_ids = Vec::with_capacity(pod.services.len());
        for svc in pod.services.clone() {
            let (id, sidecar) = self.materialize_service(&pod.name, &svc).await?;
            if let Some(container) = sidecar {
                pod.containers.push(container);
            }
            service_ids.push(id);
        }

        // Reserved keys are written after the user's labels, so user
        // labels can never shadow them.
        let mut labels: HashMap<String, String> = pod
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        labels.insert(SERVICE_IDS_LABEL.to_string(), service_ids.join(","));

        let hash = pod.content_hash()?;

        let mut existing = self.runtime.pod_exists(&pod.name).await?;

        if let Some(id) = existing.clone() {
            let report = self.runtime.inspect_pod(&id).await?;

            if !report.owned {
                return Err(Error::ForeignPod {
                    name: pod.name.clone(),
                });
            }

            if report.last_applied_hash.as_deref() != Some(hash.as_str()) {
                info!(pod = %pod.name, "configuration drift, replacing pod");
                self.runtime.remove_pod(&id, true).await?;
                existing = None;
            }
        }

        if existing.is_none() {
            labels.insert(LAST_APPLIED_LABEL.to_string(), hash);
            self.create_pod(&pod, labels).await?;
        } else {
            debug!(pod = %pod.name, "pod already matches applied configuration");
        }

        // Start is idempotent: a pod that raced into the running state
        // between inspect and start reports AlreadyRunning, which is fine.
        let report = self.runtime.inspect_pod(&pod.name).await?;
        if !report.state.is_running() {
            match self.runtime.start_pod(&pod.name).await? {
                StartOutcome::Started => info!(pod = %pod.name, "pod started"),
                StartOutcome::AlreadyRunning => {}
            }
        }

        Ok(())
    }

    /// Deletes a pod by name or runtime ID, unwinding its registry
    /// entries first.
    ///
    /// Services are deregistered before the pod is deleted: a crash after
    /// the pod delete would orphan registry entries with no stored
    /// reference left to retry against, while a crash after deregistration
    /// leaves a pod that a later apply or delete can still reach by name.
    pub async fn delete(&self, name_or_id: &str) -> Result<()> {
        info!(pod = %name_or_id, "deleting pod");

        let report = self.runtime.inspect_pod(name_or_id).await?;

        if !report.owned {
            return Err(Error::ForeignPod {
                name: name_or_id.to_string(),
            });
        }

        for id in &report.service_ids {
            match self.registry.deregister(id).await? {
                DeregisterOutcome::Removed => {
                    debug!(service = %id, "service deregistered");
                }
                // A previous partial delete may already have removed it.
                DeregisterOutcome::NotFound => {
                    warn!(service = %id, "service already gone from registry");
                }
            }
        }

        // Ownership is confirmed above, so force delete is safe.
        self.runtime.remove_pod(&report.id, true).await
    }

    /// Creates the runtime pod and all of its containers.
    async fn create_pod(&self, pod: &Pod, labels: HashMap<String, String>) -> Result<()> {
        let req = PodCreateRequest {
            name: pod.name.clone(),
            hostname: pod.hostname.clone(),
            labels,
            host_add: pod
                .hosts
                .iter()
                .map(|(host, ip)| format!("{host}:{ip}"))
                .collect(),
            // Port mappings live on the pod's shared network namespace,
            // so every container's mappings are promoted to pod scope.
            port_mappings: pod
                .containers
                .iter()
                .flat_map(|c| c.ports.iter())
                .map(|p| PodPortMapping {
                    host_ip: p.host_ip.clone(),
                    host_port: p.host_port,
                    container_port: p.container_port,
                    protocol: p.protocol.clone(),
                })
                .collect(),
        };

        let pod_id = self.runtime.create_pod(&req).await?;
        info!(pod = %pod.name, id = %pod_id, "pod created");

        for container in &pod.containers {
            let name = format!("{}-{}", pod.name, container.name);

            if let Err(e) = self.create_container(&name, &pod_id, container).await {
                // Partial pods must not be left behind. The delete is
                // best-effort; its own failure rides along with the
                // creation error instead of masking it.
                let cleanup = match self.runtime.remove_pod(&pod_id, true).await {
                    Ok(()) => None,
                    Err(cleanup_err) => Some(cleanup_err.to_string()),
                };

                return Err(Error::ContainerCreateFailed {
                    pod: pod.name.clone(),
                    container: container.name.clone(),
                    reason: e.to_string(),
                    cleanup,
                });
            }
        }

        Ok(())
    }

    /// Creates one container: realizes its image, creates it in the pod,
    /// and copies any inline files into its filesystem before start.
    async fn create_container(&self, name: &str, pod_id: &str, container: &Container) -> Result<()> {
        let image = realize_image(
            self.runtime.as_ref(),
            &container.image,
            container.image_pull_policy,
        )
        .await?;

        let req = ContainerCreateRequest {
            name: name.to_string(),
            image,
            pod: pod_id.to_string(),
            restart_policy: container.restart_policy.as_str().to_string(),
            command: container.args.clone(),
            mounts: container
                .mounts
                .iter()
                .map(|m| ContainerMount {
                    destination: m.destination.clone(),
                    source: m.source.clone(),
                    kind: m.kind.clone(),
                    options: m.options.clone(),
                })
                .collect(),
        };

        self.runtime.create_container(&req).await?;

        if !container.files.is_empty() {
            let archive = pack_files(&container.files)?;
            self.runtime.copy_into_container(name, archive).await?;
        }

        Ok(())
    }

    /// Registers one declared service and, when the registry provisioned a
    /// sidecar for it, synthesizes the sidecar proxy container to inject.
    async fn materialize_service(
        &self,
        pod_name: &str,
        svc: &Service,
    ) -> Result<(String, Option<Container>)> {
        let id = format!("{pod_name}-{}", svc.name);

        let mut meta = HashMap::new();
        meta.insert(MANAGED_SERVICE_META.to_string(), "true".to_string());
        meta.insert(SERVICE_POD_NAME_META.to_string(), pod_name.to_string());

        let mut connect = ConnectRegistration {
            native: svc.connect.native,
            sidecar_service: None,
        };

        if !svc.connect.native {
            if let Some(sidecar) = &svc.connect.sidecar_service {
                connect.sidecar_service = Some(SidecarRegistration {
                    proxy: sidecar.proxy.as_ref().and_then(proxy_registration),
                });
            }
        }

        self.registry
            .register(&ServiceRegistration {
                id: id.clone(),
                name: svc.name.clone(),
                tags: svc.tags.clone(),
                port: svc.port,
                meta,
                connect: Some(connect),
            })
            .await?;

        // The registry auto-provisions the sidecar entry; its presence is
        // what decides whether a proxy container joins the pod.
        let sidecar_id = format!("{id}{SIDECAR_SERVICE_SUFFIX}");
        let Some(sidecar) = self.registry.lookup(&sidecar_id).await? else {
            return Ok((id, None));
        };

        let bootstrap = sidecar::render_bootstrap(&SidecarParams {
            admin_address: SIDECAR_ADMIN_ADDRESS.to_string(),
            admin_port: SIDECAR_ADMIN_PORT,
            service_name: svc.name.clone(),
            service_id: sidecar.id.clone(),
            agent_address: self.mesh.address.clone(),
            agent_port: self.mesh.port,
            agent_tls: self.mesh.tls,
        })?;

        // The proxy listens on the sidecar service port plus every
        // exposed-path listener port.
        let mut ports = vec![PortMapping {
            host_ip: None,
            host_port: sidecar.port,
            container_port: sidecar.port,
            protocol: "tcp".to_string(),
        }];

        if let Some(proxy) = &sidecar.proxy {
            for path in &proxy.expose.paths {
                ports.push(PortMapping {
                    host_ip: None,
                    host_port: path.listener_port,
                    container_port: path.listener_port,
                    protocol: "tcp".to_string(),
                });
            }
        }

        let container = Container {
            name: format!("{}{SIDECAR_SERVICE_SUFFIX}", svc.name),
            image: self.proxy_image.clone(),
            image_pull_policy: PullPolicy::Missing,
            restart_policy: RestartPolicy::Always,
            args: vec!["-c".to_string(), SIDECAR_CONFIG_PATH.to_string()],
            ports,
            files: vec![ContainerFile {
                destination: SIDECAR_CONFIG_PATH.to_string(),
                content: bootstrap,
                mode: 0o644,
            }],
            mounts: Vec::new(),
        };

        Ok((id, Some(container)))
    }
}

/// Builds the proxy block of a sidecar registration, or `None` when the
/// declared proxy config is empty.
fn proxy_registration(proxy: &SidecarProxy) -> Option<ProxyRegistration> {
    if proxy.upstreams.is_empty() && proxy.expose.paths.is_empty() {
        return None;
    }

    let expose = if proxy.expose.paths.is_empty() {
        None
    } else {
        Some(ExposeRegistration {
            paths: proxy
                .expose
                .paths
                .iter()
                .map(|p| ExposePathRegistration {
                    path: p.path.clone(),
                    local_path_port: p.local_path_port,
                    listener_port: p.listener_port,
                    protocol: p.protocol.clone(),
                })
                .collect(),
        })
    };

    Some(ProxyRegistration {
        mode: Some("transparent".to_string()),
        upstreams: proxy
            .upstreams
            .iter()
            .map(|u| UpstreamRegistration {
                destination_name: u.destination_name.clone(),
                local_bind_address: u.local_bind_address.clone(),
                local_bind_port: u.local_bind_port,
            })
            .collect(),
        expose,
    })
}

/// Realizes an image reference into a runtime image ID.
///
/// References with an archive prefix load the local archive file into the
/// runtime; everything else is pulled with the given policy. No fallback
/// between the two paths is attempted.
pub async fn realize_image(
    runtime: &dyn RuntimeGateway,
    reference: &str,
    policy: PullPolicy,
) -> Result<String> {
    for prefix in IMAGE_ARCHIVE_PREFIXES {
        if let Some(path) = reference.strip_prefix(prefix) {
            let archive = tokio::fs::read(path).await.map_err(|e| Error::ImageLoad {
                reference: reference.to_string(),
                reason: format!("could not read archive file: {e}"),
            })?;

            return runtime
                .load_image(archive)
                .await
                .map_err(|e| Error::ImageLoad {
                    reference: reference.to_string(),
                    reason: e.to_string(),
                });
        }
    }

    runtime.pull_image(reference, policy).await
}

/// Packs inline container files into a tar archive rooted at `/`.
fn pack_files(files: &[ContainerFile]) -> Result<Vec<u8>> {
    let mtime = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut builder = tar::Builder::new(Vec::new());

    for file in files {
        let data = file.content.as_bytes();

        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(file.mode);
        header.set_mtime(mtime);

        builder.append_data(&mut header, file.destination.trim_start_matches('/'), data)?;
    }

    builder.into_inner().map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_files_strips_leading_slash() {
        let files = vec![ContainerFile {
            destination: "/etc/envoy/envoy.yml".to_string(),
            content: "admin: {}".to_string(),
            mode: 0o644,
        }];

        let archive = pack_files(&files).unwrap();

        let mut found = Vec::new();
        let mut reader = tar::Archive::new(archive.as_slice());
        for entry in reader.entries().unwrap() {
            let entry = entry.unwrap();
            found.push(entry.path().unwrap().to_string_lossy().to_string());
        }

        assert_eq!(found, vec!["etc/envoy/envoy.yml"]);
    }

    #[test]
    fn proxy_registration_empty_config_is_none() {
        assert!(proxy_registration(&SidecarProxy::default()).is_none());
    }
}
