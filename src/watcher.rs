//! File-watch event pipeline.
//!
//! Turns file-system mutations in a watch directory into a deduplicated
//! stream of declarative pod events. One [`PodWatcher`] task exclusively
//! owns the path → last-parsed-document map; the consumer sees only the
//! bounded event channel.
//!
//! # Semantics
//!
//! - On startup every regular file directly under the directory is parsed
//!   and emitted as an apply, before watching begins. A malformed file at
//!   boot is fatal, not skipped.
//! - A create or write re-parses the file and emits an apply.
//! - A rename is observed as remove-old-name + create-new-name. The old
//!   name is dropped from tracking **without** a delete event; emitting one
//!   would tear down and recreate a running pod for nothing. The create
//!   half re-applies, which is idempotent.
//! - A remove of a tracked file emits a delete keyed on the *declared pod
//!   name* from the last parse, not the file path. Removes of untracked
//!   paths are ignored.
//! - The channel is bounded; sends block rather than drop. Losing an event
//!   would desync declared and actual state with no recovery path.
//!
//! Parse failures and watch-backend failures after start are terminal for
//! the pipeline and surface through [`PodWatcher::run`]'s return value.

use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::error::{Error, Result};
use crate::manifest::Pod;
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A declarative pod event produced by the pipeline.
#[derive(Debug, Clone)]
pub enum PodEvent {
    /// The document at some path was created or changed; converge to it.
    Apply {
        /// Declared pod name.
        name: String,
        /// The full parsed document.
        pod: Pod,
    },
    /// The file declaring this pod was removed; tear the pod down.
    Delete {
        /// Declared pod name from the last successful parse.
        name: String,
    },
}

/// Watches one directory of pod definition files.
pub struct PodWatcher {
    dir: PathBuf,
    tx: mpsc::Sender<PodEvent>,
    tracked: HashMap<PathBuf, Pod>,
}

impl PodWatcher {
    /// Creates a watcher for the given directory and returns the event
    /// stream its consumer reads from.
    pub fn new(dir: impl Into<PathBuf>) -> (Self, mpsc::Receiver<PodEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        (
            Self {
                dir: dir.into(),
                tx,
                tracked: HashMap::new(),
            },
            rx,
        )
    }

    /// Runs the pipeline until cancellation or a terminal error.
    ///
    /// # Errors
    ///
    /// - [`Error::ManifestParse`] for any malformed definition file
    /// - [`Error::Watch`] if the notification backend fails
    /// - [`Error::ChannelClosed`] if the consumer dropped the stream
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        // Parse everything already present before subscribing to changes.
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            self.apply_file(&entry.path()).await?;
        }

        // Bridge the notify callback thread into the async loop. The raw
        // channel is bounded too; blocking_send applies backpressure on
        // the notify thread instead of dropping.
        let (raw_tx, mut raw_rx) =
            mpsc::channel::<notify::Result<notify::Event>>(EVENT_CHANNEL_CAPACITY);

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.blocking_send(res);
        })
        .map_err(|e| Error::Watch {
            reason: e.to_string(),
        })?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Watch {
                reason: format!("could not watch directory '{}': {e}", self.dir.display()),
            })?;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(dir = %self.dir.display(), "watch pipeline cancelled");
                    return Ok(());
                }
                ev = raw_rx.recv() => {
                    let Some(res) = ev else {
                        return Err(Error::Watch {
                            reason: "notification stream closed".to_string(),
                        });
                    };
                    let event = res.map_err(|e| Error::Watch {
                        reason: e.to_string(),
                    })?;
                    self.handle_event(event).await?;
                }
            }
        }
    }

    /// Classifies one notification and drives the tracked map.
    async fn handle_event(&mut self, event: notify::Event) -> Result<()> {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_)) => {
                for path in &event.paths {
                    if path.is_file() {
                        self.apply_file(path).await?;
                    }
                }
            }

            // A rename fires as a remove of the old name followed by a
            // create of the new one. Drop the old name from tracking
            // without a delete event; the create half re-applies.
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                for path in &event.paths {
                    self.tracked.remove(path);
                }
            }

            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                for path in &event.paths {
                    if path.is_file() {
                        self.apply_file(path).await?;
                    }
                }
            }

            // Both halves in one event: old path first, new path second.
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let Some(old) = event.paths.first() {
                    self.tracked.remove(old);
                }
                if let Some(new) = event.paths.get(1) {
                    if new.is_file() {
                        self.apply_file(new).await?;
                    }
                }
            }

            // Backends that cannot tell the rename direction report Any;
            // a path that still exists is the new name.
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
                for path in &event.paths {
                    if path.is_file() {
                        self.apply_file(path).await?;
                    } else {
                        self.tracked.remove(path);
                    }
                }
            }

            EventKind::Remove(_) => {
                for path in &event.paths {
                    // Removes of paths we never tracked (e.g. a file that
                    // failed to parse before this pipeline started) are
                    // dropped silently.
                    let Some(pod) = self.tracked.remove(path) else {
                        continue;
                    };

                    debug!(pod = %pod.name, path = %path.display(), "definition removed");

                    self.tx
                        .send(PodEvent::Delete { name: pod.name })
                        .await
                        .map_err(|_| Error::ChannelClosed)?;
                }
            }

            _ => {}
        }

        Ok(())
    }

    /// Parses a definition file, tracks it, and emits an apply event.
    async fn apply_file(&mut self, path: &Path) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;

        let pod = Pod::from_yaml(&bytes).map_err(|e| Error::ManifestParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        debug!(pod = %pod.name, path = %path.display(), "definition parsed");

        // Tracking by path is what lets a later remove event recover the
        // declared pod name.
        self.tracked.insert(path.to_path_buf(), pod.clone());

        self.tx
            .send(PodEvent::Apply {
                name: pod.name.clone(),
                pod,
            })
            .await
            .map_err(|_| Error::ChannelClosed)
    }
}
