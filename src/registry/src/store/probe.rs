//! Version and status probes against an etcd endpoint's `/version` resource.

use serde::Deserialize;

use super::StoreApi;
use crate::error::StoreError;

/// Body of `GET /version`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct VersionInfo {
    #[serde(rename = "etcdserver")]
    pub server: String,
    #[serde(rename = "etcdcluster")]
    pub cluster: String,
}

impl VersionInfo {
    /// API to speak with a cluster reporting this version.
    pub fn api(&self) -> StoreApi {
        let version = if self.cluster.is_empty() || self.cluster == "not_decided" {
            &self.server
        } else {
            &self.cluster
        };
        if version.starts_with("2.") {
            StoreApi::V2
        } else {
            StoreApi::V3
        }
    }
}

pub fn version_url(endpoint: &str) -> String {
    format!("{}/version", endpoint.trim_end_matches('/'))
}

/// Status code of the endpoint's version resource.
pub async fn endpoint_status(http: &reqwest::Client, endpoint: &str) -> Result<u16, StoreError> {
    let resp = http.get(version_url(endpoint)).send().await?;
    Ok(resp.status().as_u16())
}

/// Fetch and decode the endpoint's version.
pub async fn detect_version(
    http: &reqwest::Client,
    endpoint: &str,
) -> Result<VersionInfo, StoreError> {
    let resp = http.get(version_url(endpoint)).send().await?;
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(StoreError::Rejected {
            status: status.as_u16(),
            message: body,
        });
    }
    let info: VersionInfo = serde_json::from_str(&body)?;
    log::debug!(
        "etcd at {endpoint} reports server {} cluster {}",
        info.server,
        info.cluster
    );
    Ok(info)
}
