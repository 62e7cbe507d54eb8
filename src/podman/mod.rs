//! Podman runtime gateway.
//!
//! Speaks the libpod v4 REST API over the Podman unix socket. The client
//! is split per resource — [`pods`], [`containers`], [`images`] — with a
//! shared transport in this module, and implements [`RuntimeGateway`] for
//! the reconciliation engine.
//!
//! All calls are plain request/response; the engine performs no retries,
//! so every transport or API failure is surfaced directly with the
//! operation name and target baked in.

pub mod containers;
pub mod images;
pub mod pods;

use crate::error::{Error, Result};
use crate::gateway::{
    ContainerCreateRequest, PodCreateRequest, PodReport, RuntimeGateway, StartOutcome,
};
use crate::manifest::PullPolicy;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{header, Method, Request, StatusCode};
use hyper_util::client::legacy::Client;
use hyperlocal::{UnixClientExt, UnixConnector};
use serde::Deserialize;
use std::path::PathBuf;

/// Base path of the libpod API.
const API_BASE: &str = "/v4.0.0/libpod";

/// Structured error body returned by the libpod API.
#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub cause: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub response: i64,
}

/// Decodes an API error body into a display reason, falling back to the
/// raw body when it is not the structured form.
fn api_reason(status: StatusCode, body: &[u8]) -> String {
    match serde_json::from_slice::<ApiError>(body) {
        Ok(e) if !e.message.is_empty() => format!("{}: {} ({})", e.cause, e.message, status),
        _ => format!(
            "unexpected status {status}: {}",
            String::from_utf8_lossy(body)
        ),
    }
}

/// Client for the Podman runtime API.
pub struct PodmanClient {
    http: Client<UnixConnector, Full<Bytes>>,
    socket: PathBuf,
}

impl PodmanClient {
    /// Creates a client talking to the given unix socket.
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            http: Client::unix(),
            socket: socket.into(),
        }
    }

    /// Pod-level operations.
    pub fn pods(&self) -> pods::Pods<'_> {
        pods::Pods { client: self }
    }

    /// Container-level operations.
    pub fn containers(&self) -> containers::Containers<'_> {
        containers::Containers { client: self }
    }

    /// Image-level operations.
    pub fn images(&self) -> images::Images<'_> {
        images::Images { client: self }
    }

    /// Sends one request and collects the response body.
    pub(crate) async fn request(
        &self,
        method: Method,
        path_and_query: String,
        content_type: &'static str,
        body: Bytes,
    ) -> Result<(StatusCode, Bytes)> {
        let uri: hyper::Uri =
            hyperlocal::Uri::new(&self.socket, &format!("{API_BASE}{path_and_query}")).into();

        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(Full::new(body))
            .map_err(|e| Error::Gateway {
                operation: "runtime request",
                target: path_and_query.clone(),
                reason: e.to_string(),
            })?;

        let res = self.http.request(req).await.map_err(|e| Error::Gateway {
            operation: "runtime request",
            target: path_and_query.clone(),
            reason: e.to_string(),
        })?;

        let status = res.status();
        let bytes = res
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::Gateway {
                operation: "runtime request",
                target: path_and_query,
                reason: e.to_string(),
            })?
            .to_bytes();

        Ok((status, bytes))
    }

    pub(crate) async fn get(&self, path: String) -> Result<(StatusCode, Bytes)> {
        self.request(Method::GET, path, "application/json", Bytes::new())
            .await
    }

    pub(crate) async fn post_json<T: serde::Serialize>(
        &self,
        path: String,
        body: &T,
    ) -> Result<(StatusCode, Bytes)> {
        let buf = serde_json::to_vec(body).map_err(|e| Error::Gateway {
            operation: "encode request",
            target: path.clone(),
            reason: e.to_string(),
        })?;
        self.request(Method::POST, path, "application/json", Bytes::from(buf))
            .await
    }
}

#[async_trait]
impl RuntimeGateway for PodmanClient {
    async fn pod_exists(&self, name: &str) -> Result<Option<String>> {
        self.pods().exists(name).await
    }

    async fn inspect_pod(&self, name_or_id: &str) -> Result<PodReport> {
        self.pods().inspect(name_or_id).await
    }

    async fn create_pod(&self, req: &PodCreateRequest) -> Result<String> {
        self.pods().create(req).await
    }

    async fn start_pod(&self, name_or_id: &str) -> Result<StartOutcome> {
        self.pods().start(name_or_id).await
    }

    async fn remove_pod(&self, name_or_id: &str, force: bool) -> Result<()> {
        self.pods().delete(name_or_id, force).await
    }

    async fn create_container(&self, req: &ContainerCreateRequest) -> Result<()> {
        self.containers().create(req).await
    }

    async fn copy_into_container(&self, name_or_id: &str, archive: Vec<u8>) -> Result<()> {
        self.containers().copy(name_or_id, archive).await
    }

    async fn pull_image(&self, reference: &str, policy: PullPolicy) -> Result<String> {
        self.images().pull(reference, policy).await
    }

    async fn load_image(&self, archive: Vec<u8>) -> Result<String> {
        self.images().load(archive).await
    }
}
