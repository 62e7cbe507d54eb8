//! paddock - declarative pod agent CLI
//!
//! Runs pods in Podman with Consul services from declarative YAML
//! definitions.
//!
//! ## Usage
//!
//! ```sh
//! paddock apply pod.yml [pod2.yml ...]
//! paddock delete web [db ...]
//! paddock agent --watch-dir /etc/paddock/pods
//! ```

use clap::{Parser, Subcommand};
use paddock::constants::DEFAULT_PROXY_IMAGE;
use paddock::error::{Error, Result};
use paddock::manifest::Pod;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "paddock",
    version,
    about = "Run pods in Podman with Consul services from declarative definitions"
)]
struct Cli {
    /// Path to the Podman API socket.
    #[arg(
        long,
        short = 's',
        global = true,
        env = "PADDOCK_PODMAN_SOCKET",
        default_value = "$XDG_RUNTIME_DIR/podman/podman.sock"
    )]
    socket: String,

    /// Base URL of the Consul agent HTTP API.
    #[arg(
        long,
        global = true,
        env = "CONSUL_HTTP_ADDR",
        default_value = "http://127.0.0.1:8500"
    )]
    consul_addr: String,

    /// Image used for injected sidecar proxy containers.
    #[arg(
        long,
        global = true,
        env = "PADDOCK_PROXY_IMAGE",
        default_value = DEFAULT_PROXY_IMAGE
    )]
    proxy_image: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pod definition files.
    #[command(visible_alias = "a")]
    Apply {
        /// Pod definition files to apply, in order.
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,
    },

    /// Delete pods by name and clean up their registry services.
    #[command(visible_alias = "d")]
    Delete {
        /// Pod names to delete.
        #[arg(required = true, value_name = "POD")]
        pods: Vec<String>,
    },

    /// Watch a directory for pod definition files and keep them applied.
    #[command(visible_alias = "ag")]
    Agent {
        /// Directory of pod definition files.
        #[arg(long, short = 'w', env = "PADDOCK_WATCH_DIR", value_name = "DIR")]
        watch_dir: PathBuf,
    },
}

/// Expands a leading `$XDG_RUNTIME_DIR` in the socket flag.
fn expand_socket(socket: &str) -> PathBuf {
    match socket.strip_prefix("$XDG_RUNTIME_DIR") {
        Some(rest) => {
            let base = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/run".to_string());
            PathBuf::from(format!("{base}{rest}"))
        }
        None => PathBuf::from(socket),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let socket = expand_socket(&cli.socket);

    match cli.command {
        Command::Apply { files } => {
            // Parse everything up front so one malformed file fails the
            // invocation before any pod is touched.
            let mut pods = Vec::with_capacity(files.len());
            for path in files {
                let bytes = std::fs::read(&path)?;
                let pod = Pod::from_yaml(&bytes).map_err(|e| Error::ManifestParse {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                pods.push(pod);
            }

            let reconciler =
                paddock::agent::connect(&socket, &cli.consul_addr, &cli.proxy_image).await?;

            for pod in pods {
                reconciler.apply(pod).await?;
            }

            Ok(())
        }

        Command::Delete { pods } => {
            let reconciler =
                paddock::agent::connect(&socket, &cli.consul_addr, &cli.proxy_image).await?;

            for name in pods {
                reconciler.delete(&name).await?;
            }

            Ok(())
        }

        Command::Agent { watch_dir } => {
            let watch_dir = watch_dir.canonicalize().map_err(|e| Error::Watch {
                reason: format!("could not resolve '{}': {e}", watch_dir.display()),
            })?;
            if !watch_dir.is_dir() {
                return Err(Error::Watch {
                    reason: format!("'{}' is not a directory", watch_dir.display()),
                });
            }

            let reconciler =
                paddock::agent::connect(&socket, &cli.consul_addr, &cli.proxy_image).await?;

            paddock::agent::run(reconciler, watch_dir).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("PADDOCK_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
