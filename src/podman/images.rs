//! Image-level libpod endpoints.

use super::{api_reason, PodmanClient};
use crate::error::{Error, Result};
use crate::manifest::PullPolicy;
use bytes::Bytes;
use hyper::Method;
use serde::Deserialize;
use tracing::debug;

/// Final progress line of a pull response.
#[derive(Debug, Default, Deserialize)]
struct PullReport {
    #[serde(default)]
    id: String,
    #[serde(default)]
    error: String,
}

/// Response body of an image load.
#[derive(Debug, Deserialize)]
struct LoadReport {
    #[serde(rename = "Names", default)]
    names: Vec<String>,
}

/// Image operations on a [`PodmanClient`].
pub struct Images<'a> {
    pub(crate) client: &'a PodmanClient,
}

impl Images<'_> {
    /// Pulls an image from a remote registry, returning its image ID.
    ///
    /// The API streams one JSON object per progress line; the last line
    /// carries either the resolved ID or an error message.
    pub async fn pull(&self, reference: &str, policy: PullPolicy) -> Result<String> {
        debug!(image = %reference, policy = policy.as_str(), "pulling image");

        let query: String = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("reference", reference)
            .append_pair("policy", policy.as_str())
            .finish();

        let (status, body) = self
            .client
            .request(
                Method::POST,
                format!("/images/pull?{query}"),
                "application/json",
                Bytes::new(),
            )
            .await?;

        if !status.is_success() {
            return Err(Error::ImagePull {
                reference: reference.to_string(),
                reason: api_reason(status, &body),
            });
        }

        let last_line = body
            .split(|b| *b == b'\n')
            .filter(|line| !line.is_empty())
            .last()
            .ok_or_else(|| Error::ImagePull {
                reference: reference.to_string(),
                reason: "empty pull response".to_string(),
            })?;

        let report: PullReport =
            serde_json::from_slice(last_line).map_err(|e| Error::ImagePull {
                reference: reference.to_string(),
                reason: format!("could not decode pull response: {e}"),
            })?;

        if !report.error.is_empty() {
            return Err(Error::ImagePull {
                reference: reference.to_string(),
                reason: report.error,
            });
        }
        if report.id.is_empty() {
            return Err(Error::ImagePull {
                reference: reference.to_string(),
                reason: "pull response carried no image ID".to_string(),
            });
        }

        Ok(report.id)
    }

    /// Loads an image from archive bytes, returning its image ID.
    pub async fn load(&self, archive: Vec<u8>) -> Result<String> {
        debug!(bytes = archive.len(), "loading image archive");

        let (status, body) = self
            .client
            .request(
                Method::POST,
                "/images/load".to_string(),
                "application/x-tar",
                Bytes::from(archive),
            )
            .await?;

        if !status.is_success() {
            return Err(Error::Gateway {
                operation: "image load",
                target: "archive".to_string(),
                reason: api_reason(status, &body),
            });
        }

        let report: LoadReport = serde_json::from_slice(&body).map_err(|e| Error::Gateway {
            operation: "image load",
            target: "archive".to_string(),
            reason: format!("could not decode load response: {e}"),
        })?;

        let name = report.names.first().ok_or_else(|| Error::Gateway {
            operation: "image load",
            target: "archive".to_string(),
            reason: "load reported no image names".to_string(),
        })?;

        self.resolve_id(name).await
    }

    /// Resolves an image name to its ID via inspect.
    async fn resolve_id(&self, name_or_id: &str) -> Result<String> {
        let (status, body) = self.client.get(format!("/images/{name_or_id}/json")).await?;

        if !status.is_success() {
            return Err(Error::Gateway {
                operation: "image inspect",
                target: name_or_id.to_string(),
                reason: api_reason(status, &body),
            });
        }

        #[derive(Deserialize)]
        struct ImageInspect {
            #[serde(rename = "Id")]
            id: String,
        }

        let inspect: ImageInspect =
            serde_json::from_slice(&body).map_err(|e| Error::Gateway {
                operation: "image inspect",
                target: name_or_id.to_string(),
                reason: format!("could not decode response: {e}"),
            })?;

        Ok(inspect.id)
    }
}
