//! Key-value store clients the adapter writes through.
//!
//! The adapter only ever talks to a [`KvStore`]; which implementation sits
//! behind it is decided once, when the adapter is built.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

pub mod etcd_v2;
pub mod etcd_v3;
pub mod memory;
pub mod probe;

pub use etcd_v2::EtcdV2Store;
pub use etcd_v3::EtcdV3Store;
pub use memory::InMemoryKvStore;

/// Endpoint used when a registry URI carries no authority.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:2379";

/// Capability every store client offers to the adapter.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Write `value` at `key`, expiring after `ttl` unless `ttl` is zero.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Write every `(key, value)` pair with a shared `ttl`, one result per
    /// pair in input order. A failed write never stops the ones after it.
    async fn put_batch(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
    ) -> Vec<Result<(), StoreError>> {
        let mut results = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            results.push(self.put(key, value, ttl).await);
        }
        results
    }

    /// Remove `prefix` and every key nested beneath it in one operation.
    async fn delete_recursive(&self, prefix: &str) -> Result<(), StoreError>;

    /// Refresh the cached list of cluster endpoints.
    async fn sync_membership(&self) -> Result<(), StoreError>;

    /// Endpoints currently known to the client.
    fn endpoints(&self) -> Vec<String>;

    /// HTTP status of the endpoint's version resource.
    async fn endpoint_status(&self, endpoint: &str) -> Result<u16, StoreError>;
}

/// Which etcd API a store client speaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreApi {
    /// Probe the endpoint's version and pick accordingly
    #[default]
    Auto,
    /// HTTP keys API (etcd 2.x)
    V2,
    /// gRPC KV API (etcd 3.x)
    V3,
}

impl fmt::Display for StoreApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StoreApi::Auto => "auto",
            StoreApi::V2 => "v2",
            StoreApi::V3 => "v3",
        };
        write!(f, "{s}")
    }
}

impl FromStr for StoreApi {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(StoreApi::Auto),
            "v2" | "2" => Ok(StoreApi::V2),
            "v3" | "3" => Ok(StoreApi::V3),
            other => Err(format!("unknown store api: {other}")),
        }
    }
}

/// Settings fixed for the lifetime of a store client.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub endpoints: Vec<String>,
    /// Upper bound on every network call to the store
    pub request_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            endpoints: vec![DEFAULT_ENDPOINT.to_string()],
            request_timeout: Duration::from_secs(1),
        }
    }
}

pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, StoreError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}
