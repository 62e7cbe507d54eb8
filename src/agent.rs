//! Watch-driven agent loop.
//!
//! Wires the file-watch pipeline into the reconciliation engine: one task
//! watches the directory, this loop consumes its events one at a time and
//! reconciles. Processing a single event stream serializes apply/delete
//! for the same pod name, which is the only ordering the engine needs.
//!
//! A failed reconcile is logged and the loop moves on — one broken pod
//! must not stall the others. Pipeline-level failures (malformed file,
//! watch backend error) are fatal and end the agent.

use crate::consul::ConsulRegistry;
use crate::error::{Error, Result};
use crate::podman::PodmanClient;
use crate::reconciler::Reconciler;
use crate::watcher::{PodEvent, PodWatcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Builds a reconciler wired to the production gateways.
///
/// Connects to the registry agent eagerly so mesh endpoint discovery
/// failures surface at startup rather than on the first sidecar apply.
pub async fn connect(
    socket: impl AsRef<Path>,
    consul_addr: &str,
    proxy_image: &str,
) -> Result<Reconciler> {
    let runtime = Arc::new(PodmanClient::new(socket.as_ref()));
    let registry = ConsulRegistry::connect(consul_addr).await?;
    let mesh = registry.mesh().clone();

    Ok(Reconciler::new(
        runtime,
        Arc::new(registry),
        mesh,
        proxy_image,
    ))
}

/// Runs the agent until a signal or a fatal pipeline error.
pub async fn run(reconciler: Reconciler, watch_dir: impl Into<PathBuf>) -> Result<()> {
    let watch_dir = watch_dir.into();
    info!(dir = %watch_dir.display(), "watching for pod definitions");

    let (watcher, mut events) = PodWatcher::new(watch_dir);

    let shutdown = CancellationToken::new();
    let mut watch_task = tokio::spawn(watcher.run(shutdown.clone()));

    let signal = shutdown_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(PodEvent::Apply { name, pod }) => {
                        if let Err(e) = reconciler.apply(pod).await {
                            error!(pod = %name, error = %e, "could not apply pod");
                        }
                    }
                    Some(PodEvent::Delete { name }) => {
                        if let Err(e) = reconciler.delete(&name).await {
                            error!(pod = %name, error = %e, "could not delete pod");
                        }
                    }
                    // The stream only ends when the pipeline stopped;
                    // surface whatever ended it.
                    None => return join_watch(watch_task).await,
                }
            }

            res = &mut watch_task => {
                return flatten_join(res);
            }

            _ = &mut signal => {
                info!("shutdown signal received");
                shutdown.cancel();
                let _ = watch_task.await;
                return Ok(());
            }
        }
    }
}

/// Awaits the pipeline task and flattens its result.
async fn join_watch(task: tokio::task::JoinHandle<Result<()>>) -> Result<()> {
    flatten_join(task.await)
}

fn flatten_join(res: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match res {
        Ok(inner) => inner,
        Err(join) => Err(Error::Watch {
            reason: format!("watch task failed: {join}"),
        }),
    }
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(_) => {
                let _ = ctrl_c.await;
                return;
            }
        };

        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
