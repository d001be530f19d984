//! Client for the etcd v2 HTTP keys API.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Response};
use serde::Deserialize;
use url::Url;

use super::{KvStore, StoreOptions, http_client, probe};
use crate::error::StoreError;

#[derive(Debug, Deserialize)]
struct V2Error {
    #[serde(rename = "errorCode")]
    error_code: u32,
    message: String,
    #[serde(default)]
    cause: String,
}

#[derive(Debug, Deserialize)]
struct MembersResponse {
    members: Vec<Member>,
}

#[derive(Debug, Deserialize)]
struct Member {
    #[serde(rename = "clientURLs", default)]
    client_urls: Vec<String>,
}

/// etcd 2.x store speaking the `/v2/keys` HTTP API.
pub struct EtcdV2Store {
    http: reqwest::Client,
    endpoints: RwLock<Vec<String>>,
}

impl EtcdV2Store {
    pub fn new(options: &StoreOptions) -> Result<Self, StoreError> {
        if options.endpoints.is_empty() {
            return Err(StoreError::NoEndpoints);
        }
        Ok(Self {
            http: http_client(options.request_timeout)?,
            endpoints: RwLock::new(options.endpoints.clone()),
        })
    }

    fn current_endpoints(&self) -> Vec<String> {
        self.endpoints
            .read()
            .map(|endpoints| endpoints.clone())
            .unwrap_or_default()
    }

    /// Send the request to each known endpoint in turn until one answers.
    async fn send(
        &self,
        method: Method,
        key: &str,
        query: &[(&str, &str)],
        form: Option<String>,
    ) -> Result<Response, StoreError> {
        let mut last_err = StoreError::NoEndpoints;
        for endpoint in self.current_endpoints() {
            let url = keys_url(&endpoint, key, query)?;
            let mut request = self.http.request(method.clone(), url);
            if let Some(body) = &form {
                request = request
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        "application/x-www-form-urlencoded",
                    )
                    .body(body.clone());
            }
            match request.send().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    log::debug!("etcd endpoint {endpoint} unreachable: {e}");
                    last_err = StoreError::Http(e);
                }
            }
        }
        Err(last_err)
    }
}

/// `{endpoint}/v2/keys{key}` with the given query pairs. Each key segment is
/// percent-encoded, so `?`, `#` and `%` stay part of the key.
fn keys_url(endpoint: &str, key: &str, query: &[(&str, &str)]) -> Result<Url, StoreError> {
    let mut url = Url::parse(endpoint.trim_end_matches('/'))?;
    url.path_segments_mut()
        .map_err(|_| StoreError::InvalidEndpoint(endpoint.to_string()))?
        .pop_if_empty()
        .extend(["v2", "keys"])
        .extend(key.trim_start_matches('/').split('/'));
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

fn put_body(value: &str, ttl: Duration) -> String {
    let mut body = url::form_urlencoded::Serializer::new(String::new());
    body.append_pair("value", value);
    if !ttl.is_zero() {
        body.append_pair("ttl", &ttl_seconds(ttl).to_string());
    }
    body.finish()
}

/// Whole seconds, rounding sub-second remainders up so a lease never shrinks to zero.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 { secs + 1 } else { secs }
}

async fn check(resp: Response) -> Result<String, StoreError> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.is_success() {
        return Ok(body);
    }
    let message = serde_json::from_str::<V2Error>(&body)
        .map(|e| {
            if e.cause.is_empty() {
                format!("{} (code {})", e.message, e.error_code)
            } else {
                format!("{}: {} (code {})", e.message, e.cause, e.error_code)
            }
        })
        .unwrap_or(body);
    Err(StoreError::Rejected {
        status: status.as_u16(),
        message,
    })
}

#[async_trait]
impl KvStore for EtcdV2Store {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let resp = self
            .send(Method::PUT, key, &[], Some(put_body(value, ttl)))
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn delete_recursive(&self, prefix: &str) -> Result<(), StoreError> {
        let resp = self
            .send(Method::DELETE, prefix, &[("recursive", "true")], None)
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn sync_membership(&self) -> Result<(), StoreError> {
        let mut last_err = StoreError::NoEndpoints;
        for endpoint in self.current_endpoints() {
            let url = format!("{}/v2/members", endpoint.trim_end_matches('/'));
            let resp = match self.http.get(&url).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_err = StoreError::Http(e);
                    continue;
                }
            };
            let members: MembersResponse = match check(resp).await.and_then(|body| {
                serde_json::from_str(&body).map_err(StoreError::from)
            }) {
                Ok(members) => members,
                Err(e) => {
                    log::debug!("etcd endpoint {endpoint} cannot list members: {e}");
                    last_err = e;
                    continue;
                }
            };
            let urls: Vec<String> = members
                .members
                .into_iter()
                .flat_map(|member| member.client_urls)
                .collect();
            if urls.is_empty() {
                return Ok(());
            }
            log::debug!("etcd v2 cluster endpoints: {urls:?}");
            if let Ok(mut endpoints) = self.endpoints.write() {
                *endpoints = urls;
            }
            return Ok(());
        }
        Err(last_err)
    }

    fn endpoints(&self) -> Vec<String> {
        self.current_endpoints()
    }

    async fn endpoint_status(&self, endpoint: &str) -> Result<u16, StoreError> {
        probe::endpoint_status(&self.http, endpoint).await
    }
}
