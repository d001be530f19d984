//! Client for the etcd v3 gRPC KV API.

use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{Client, ConnectOptions, DeleteOptions, PutOptions, Txn, TxnOp};

use super::{KvStore, StoreOptions, http_client, probe};
use crate::error::StoreError;

/// etcd 3.x store. TTLs are carried by one lease per batch of writes.
pub struct EtcdV3Store {
    client: Client,
    http: reqwest::Client,
    endpoints: RwLock<Vec<String>>,
}

impl EtcdV3Store {
    pub async fn connect(options: &StoreOptions) -> Result<Self, StoreError> {
        if options.endpoints.is_empty() {
            return Err(StoreError::NoEndpoints);
        }
        let connect_options = ConnectOptions::new()
            .with_timeout(options.request_timeout)
            .with_connect_timeout(options.request_timeout);
        let client = Client::connect(&options.endpoints, Some(connect_options)).await?;
        log::info!("Connected to etcd v3 at {:?}", options.endpoints);

        Ok(Self {
            client,
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
}

/// Lease length in whole seconds, never below one. `None` when `ttl` is zero.
fn lease_ttl(ttl: Duration) -> Option<i64> {
    if ttl.is_zero() {
        return None;
    }
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    Some(i64::try_from(secs.max(1)).unwrap_or(i64::MAX))
}

/// Deletes removing `prefix` and everything below `prefix/`. v3 has no
/// directories, so `web/10` must survive a delete of `web/1`.
fn subtree_deletes(prefix: &str) -> Vec<TxnOp> {
    vec![
        TxnOp::delete(prefix, None),
        TxnOp::delete(
            format!("{prefix}/"),
            Some(DeleteOptions::new().with_prefix()),
        ),
    ]
}

impl EtcdV3Store {
    async fn grant_lease(&self, ttl: Duration) -> Result<Option<PutOptions>, StoreError> {
        let Some(seconds) = lease_ttl(ttl) else {
            return Ok(None);
        };
        let lease = self.client.clone().lease_grant(seconds, None).await?;
        Ok(Some(PutOptions::new().with_lease(lease.id())))
    }
}

#[async_trait]
impl KvStore for EtcdV3Store {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let options = self.grant_lease(ttl).await?;
        self.client.clone().put(key, value, options).await?;
        Ok(())
    }

    async fn put_batch(
        &self,
        entries: &[(String, String)],
        ttl: Duration,
    ) -> Vec<Result<(), StoreError>> {
        let options = match self.grant_lease(ttl).await {
            Ok(options) => options,
            Err(e) => {
                let reason = e.to_string();
                return entries
                    .iter()
                    .map(|_| Err(StoreError::LeaseUnavailable(reason.clone())))
                    .collect();
            }
        };

        let mut client = self.client.clone();
        let mut results = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let result = client
                .put(key.as_str(), value.as_str(), options.clone())
                .await
                .map(|_| ())
                .map_err(StoreError::from);
            results.push(result);
        }
        results
    }

    async fn delete_recursive(&self, prefix: &str) -> Result<(), StoreError> {
        let txn = Txn::new().and_then(subtree_deletes(prefix));
        self.client.clone().txn(txn).await?;
        Ok(())
    }

    async fn sync_membership(&self) -> Result<(), StoreError> {
        let mut client = self.client.clone();
        let resp = client.member_list().await?;
        let urls: Vec<String> = resp
            .members()
            .iter()
            .flat_map(|member| member.client_urls().iter().cloned())
            .collect();
        if urls.is_empty() {
            return Ok(());
        }
        log::debug!("etcd v3 cluster endpoints: {urls:?}");
        if let Ok(mut endpoints) = self.endpoints.write() {
            *endpoints = urls;
        }
        Ok(())
    }

    fn endpoints(&self) -> Vec<String> {
        self.current_endpoints()
    }

    async fn endpoint_status(&self, endpoint: &str) -> Result<u16, StoreError> {
        probe::endpoint_status(&self.http, endpoint).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_ttl() {
        assert_eq!(lease_ttl(Duration::from_secs(30)), Some(30));
        assert_eq!(lease_ttl(Duration::from_millis(200)), Some(1));
        assert_eq!(lease_ttl(Duration::from_millis(2500)), Some(3));
        assert_eq!(lease_ttl(Duration::ZERO), None);
    }

    #[test]
    fn test_subtree_deletes_form_one_transaction() {
        let ops = subtree_deletes("/services/web/1");
        assert_eq!(ops.len(), 2);
        assert_eq!(
            format!("{:?}", ops[0]),
            format!("{:?}", TxnOp::delete("/services/web/1", None))
        );
        assert_eq!(
            format!("{:?}", ops[1]),
            format!(
                "{:?}",
                TxnOp::delete("/services/web/1/", Some(DeleteOptions::new().with_prefix()))
            )
        );
    }

    #[tokio::test]
    async fn test_connect_rejects_empty_endpoints() {
        let options = StoreOptions {
            endpoints: vec![],
            ..Default::default()
        };
        assert!(matches!(
            EtcdV3Store::connect(&options).await,
            Err(StoreError::NoEndpoints)
        ));
    }
}
