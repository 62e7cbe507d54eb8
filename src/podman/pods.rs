//! Pod-level libpod endpoints.

use super::{api_reason, PodmanClient};
use crate::error::{Error, Result};
use crate::gateway::{PodCreateRequest, PodReport, PodState, StartOutcome};
use bytes::Bytes;
use hyper::{Method, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::debug;

/// Inspect payload for a pod, reduced to the fields the engine reads.
#[derive(Debug, Deserialize)]
struct PodInspect {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Labels", default)]
    labels: HashMap<String, String>,
    #[serde(rename = "State", default)]
    state: String,
}

/// Pod operations on a [`PodmanClient`].
pub struct Pods<'a> {
    pub(crate) client: &'a PodmanClient,
}

impl Pods<'_> {
    /// Checks whether a pod exists, returning its runtime ID when it does.
    pub async fn exists(&self, name: &str) -> Result<Option<String>> {
        let (status, _) = self.client.get(format!("/pods/{name}/exists")).await?;

        if status != StatusCode::NO_CONTENT {
            return Ok(None);
        }

        // The exists endpoint carries no body, so resolve the ID separately.
        let report = self.inspect(name).await?;
        Ok(Some(report.id))
    }

    /// Inspects a pod by name or runtime ID.
    pub async fn inspect(&self, name_or_id: &str) -> Result<PodReport> {
        let (status, body) = self.client.get(format!("/pods/{name_or_id}/json")).await?;

        if status == StatusCode::NOT_FOUND {
            return Err(Error::PodNotFound {
                name: name_or_id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(Error::Gateway {
                operation: "pod inspect",
                target: name_or_id.to_string(),
                reason: api_reason(status, &body),
            });
        }

        let inspect: PodInspect =
            serde_json::from_slice(&body).map_err(|e| Error::Gateway {
                operation: "pod inspect",
                target: name_or_id.to_string(),
                reason: format!("could not decode response: {e}"),
            })?;

        Ok(PodReport::from_parts(
            inspect.id,
            inspect.name,
            PodState::parse(&inspect.state),
            inspect.labels,
        ))
    }

    /// Creates a pod and returns its runtime ID.
    pub async fn create(&self, req: &PodCreateRequest) -> Result<String> {
        debug!(pod = %req.name, "creating pod");

        let (status, body) = self.client.post_json("/pods/create".to_string(), req).await?;

        if status != StatusCode::CREATED {
            return Err(Error::Gateway {
                operation: "pod create",
                target: req.name.clone(),
                reason: api_reason(status, &body),
            });
        }

        #[derive(Deserialize)]
        struct Created {
            #[serde(rename = "Id")]
            id: String,
        }

        let created: Created = serde_json::from_slice(&body).map_err(|e| Error::Gateway {
            operation: "pod create",
            target: req.name.clone(),
            reason: format!("could not decode response: {e}"),
        })?;

        Ok(created.id)
    }

    /// Starts a pod. A 304 from the API means it was already running.
    pub async fn start(&self, name_or_id: &str) -> Result<StartOutcome> {
        debug!(pod = %name_or_id, "starting pod");

        let (status, body) = self
            .client
            .request(
                Method::POST,
                format!("/pods/{name_or_id}/start"),
                "application/json",
                Bytes::new(),
            )
            .await?;

        match status {
            StatusCode::NOT_MODIFIED => Ok(StartOutcome::AlreadyRunning),
            s if s.is_success() => Ok(StartOutcome::Started),
            s => Err(Error::Gateway {
                operation: "pod start",
                target: name_or_id.to_string(),
                reason: api_reason(s, &body),
            }),
        }
    }

    /// Deletes a pod, forcibly when `force` is set.
    pub async fn delete(&self, name_or_id: &str, force: bool) -> Result<()> {
        debug!(pod = %name_or_id, force, "deleting pod");

        let (status, body) = self
            .client
            .request(
                Method::DELETE,
                format!("/pods/{name_or_id}?force={force}"),
                "application/json",
                Bytes::new(),
            )
            .await?;

        if !status.is_success() {
            return Err(Error::Gateway {
                operation: "pod delete",
                target: name_or_id.to_string(),
                reason: api_reason(status, &body),
            });
        }

        Ok(())
    }
}
