//! Container-level libpod endpoints.

use super::{api_reason, PodmanClient};
use crate::error::{Error, Result};
use crate::gateway::ContainerCreateRequest;
use bytes::Bytes;
use hyper::{Method, StatusCode};
use tracing::debug;

/// Container operations on a [`PodmanClient`].
pub struct Containers<'a> {
    pub(crate) client: &'a PodmanClient,
}

impl Containers<'_> {
    /// Creates a container attached to an existing pod.
    pub async fn create(&self, req: &ContainerCreateRequest) -> Result<()> {
        debug!(container = %req.name, pod = %req.pod, "creating container");

        let (status, body) = self
            .client
            .post_json("/containers/create".to_string(), req)
            .await?;

        if status != StatusCode::CREATED {
            return Err(Error::Gateway {
                operation: "container create",
                target: req.name.clone(),
                reason: api_reason(status, &body),
            });
        }

        Ok(())
    }

    /// Copies a tar archive into a container's filesystem, rooted at `/`.
    pub async fn copy(&self, name_or_id: &str, archive: Vec<u8>) -> Result<()> {
        debug!(container = %name_or_id, bytes = archive.len(), "copying archive into container");

        let (status, body) = self
            .client
            .request(
                Method::PUT,
                format!("/containers/{name_or_id}/archive?path=%2F"),
                "application/x-tar",
                Bytes::from(archive),
            )
            .await?;

        if !status.is_success() {
            return Err(Error::Gateway {
                operation: "container copy",
                target: name_or_id.to_string(),
                reason: api_reason(status, &body),
            });
        }

        Ok(())
    }
}
