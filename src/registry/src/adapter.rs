use std::sync::Arc;

use async_trait::async_trait;

use crate::RegistryAdapter;
use crate::error::{RegistryError, StoreError};
use crate::observer::{LogObserver, RegistrationObserver};
use crate::path::{self, KeyLayout};
use crate::service::Service;
use crate::store::KvStore;

/// Publishes services as a tree of independent keys in a [`KvStore`].
pub struct EtcdAdapter {
    store: Arc<dyn KvStore>,
    root: String,
    layout: KeyLayout,
    observer: Arc<dyn RegistrationObserver>,
}

impl EtcdAdapter {
    pub fn new(store: Arc<dyn KvStore>, root: &str) -> Self {
        Self {
            store,
            root: path::normalize_root(root),
            layout: KeyLayout::default(),
            observer: Arc::new(LogObserver),
        }
    }

    pub fn with_layout(mut self, layout: KeyLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RegistrationObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn layout(&self) -> KeyLayout {
        self.layout
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn service_path(&self, service: &Service) -> String {
        path::service_path(&self.root, self.layout, service)
    }

    /// Best-effort membership sync; a failure is reported and otherwise ignored.
    async fn sync_cluster(&self) {
        if let Err(e) = self.store.sync_membership().await {
            self.observer.on_sync_failed(&e);
        }
    }

    fn write_failed(&self, service: &Service, key: String, source: StoreError) -> RegistryError {
        self.observer.on_write_failed(&service.name, &key, &source);
        RegistryError::Write { key, source }
    }

    /// Every leaf written for `service`, in write order.
    fn entries(service: &Service) -> Vec<(String, String)> {
        let origin = &service.origin;
        let mut entries = vec![
            (path::ADDRESS_KEY.to_string(), service.address()),
            (path::PORT_TYPE_KEY.to_string(), origin.port_type.clone()),
            (path::HOST_PORT_KEY.to_string(), origin.host_port.clone()),
            (path::HOST_IP_KEY.to_string(), origin.host_ip.clone()),
            (path::EXPOSED_PORT_KEY.to_string(), origin.exposed_port.clone()),
            (path::EXPOSED_IP_KEY.to_string(), origin.exposed_ip.clone()),
        ];
        entries.extend(
            service
                .tags
                .iter()
                .enumerate()
                .map(|(index, tag)| (path::tag_key(index), tag.clone())),
        );
        entries.extend(
            service
                .attrs
                .iter()
                .map(|(name, value)| (path::attr_key(name), value.clone())),
        );
        entries
    }
}

#[async_trait]
impl RegistryAdapter for EtcdAdapter {
    /// Write every key of `service` as one batch sharing the service TTL.
    /// Each write is attempted regardless of earlier failures; the last
    /// failure is returned.
    async fn register(&self, service: &Service) -> Result<(), RegistryError> {
        service.validate()?;
        self.sync_cluster().await;

        let service_path = self.service_path(service);
        let batch: Vec<(String, String)> = Self::entries(service)
            .into_iter()
            .map(|(key, value)| (path::key_path(&service_path, &key), value))
            .collect();

        let results = self.store.put_batch(&batch, service.ttl).await;
        let mut last_err = None;
        for ((key, _), result) in batch.into_iter().zip(results) {
            if let Err(e) = result {
                last_err = Some(self.write_failed(service, key, e));
            }
        }

        match last_err {
            Some(e) => Err(e),
            None => {
                log::debug!("Registered {} at {service_path}", service.name);
                Ok(())
            }
        }
    }

    async fn deregister(&self, service: &Service) -> Result<(), RegistryError> {
        service.validate()?;
        self.sync_cluster().await;

        let service_path = self.service_path(service);
        if let Err(source) = self.store.delete_recursive(&service_path).await {
            self.observer
                .on_delete_failed(&service.name, &service_path, &source);
            return Err(RegistryError::Delete {
                path: service_path,
                source,
            });
        }
        log::debug!("Deregistered {} from {service_path}", service.name);
        Ok(())
    }

    async fn refresh(&self, service: &Service) -> Result<(), RegistryError> {
        self.register(service).await
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        self.sync_cluster().await;

        for endpoint in self.store.endpoints() {
            let result = match self.store.endpoint_status(&endpoint).await {
                Ok(200) => Ok(()),
                Ok(status) => Err(RegistryError::Unhealthy {
                    endpoint: endpoint.clone(),
                    status,
                }),
                Err(source) => Err(RegistryError::Status {
                    endpoint: endpoint.clone(),
                    source,
                }),
            };
            if let Err(e) = result {
                self.observer.on_ping_failed(&e);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Reading services back is not supported; always an empty list.
    async fn services(&self) -> Result<Vec<Service>, RegistryError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockKvStore;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingObserver {
        writes: Mutex<Vec<String>>,
        syncs: Mutex<usize>,
    }

    impl RegistrationObserver for RecordingObserver {
        fn on_sync_failed(&self, _error: &StoreError) {
            *self.syncs.lock().unwrap() += 1;
        }

        fn on_write_failed(&self, _service: &str, key: &str, _error: &StoreError) {
            self.writes.lock().unwrap().push(key.to_string());
        }

        fn on_delete_failed(&self, _service: &str, _path: &str, _error: &StoreError) {}

        fn on_ping_failed(&self, _error: &RegistryError) {}
    }

    fn web() -> Service {
        Service {
            name: "web".into(),
            id: "1".into(),
            ip: "10.0.0.5".into(),
            port: 8080,
            ttl: Duration::from_secs(30),
            tags: vec!["prod".into(), "v2".into()],
            attrs: BTreeMap::from([("region".to_string(), "us".to_string())]),
            ..Default::default()
        }
    }

    fn fail_keys(
        entries: &[(String, String)],
        failing: &[&str],
    ) -> Vec<Result<(), StoreError>> {
        entries
            .iter()
            .map(|(key, _)| {
                if failing.iter().any(|suffix| key.ends_with(suffix)) {
                    Err(StoreError::Injected(key.clone()))
                } else {
                    Ok(())
                }
            })
            .collect()
    }

    #[tokio::test]
    async fn test_register_attempts_every_key_despite_failures() {
        let mut store = MockKvStore::new();
        store.expect_sync_membership().times(1).returning(|| Ok(()));
        // 6 fixed keys + 2 tags + 1 attr, all failing
        store
            .expect_put_batch()
            .withf(|entries, _| entries.len() == 9)
            .times(1)
            .returning(|entries, _| {
                entries
                    .iter()
                    .map(|(key, _)| Err(StoreError::Injected(key.clone())))
                    .collect()
            });

        let observer = Arc::new(RecordingObserver::default());
        let adapter =
            EtcdAdapter::new(Arc::new(store), "/services").with_observer(observer.clone());

        let err = adapter.register(&web()).await.unwrap_err();
        match err {
            RegistryError::Write { key, .. } => assert_eq!(key, "/services/web/1/attrs/region"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(observer.writes.lock().unwrap().len(), 9);
    }

    #[tokio::test]
    async fn test_register_returns_last_error() {
        let mut store = MockKvStore::new();
        store.expect_sync_membership().returning(|| Ok(()));
        store
            .expect_put_batch()
            .returning(|entries, _| fail_keys(entries, &["/address", "/tags/1"]));

        let observer = Arc::new(RecordingObserver::default());
        let adapter =
            EtcdAdapter::new(Arc::new(store), "/services").with_observer(observer.clone());
        let err = adapter.register(&web()).await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Write { ref key, .. } if key == "/services/web/1/tags/1"
        ));
        assert_eq!(
            *observer.writes.lock().unwrap(),
            vec![
                "/services/web/1/address".to_string(),
                "/services/web/1/tags/1".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_register_writes_one_batch_with_service_ttl() {
        let mut store = MockKvStore::new();
        store.expect_sync_membership().returning(|| Ok(()));
        store.expect_put().never();
        store
            .expect_put_batch()
            .withf(|entries, ttl| {
                *ttl == Duration::from_secs(30)
                    && entries.len() == 9
                    && entries[0] == ("/services/web/1/address".into(), "10.0.0.5:8080".into())
                    && entries[8] == ("/services/web/1/attrs/region".into(), "us".into())
            })
            .times(1)
            .returning(|entries, _| entries.iter().map(|_| Ok(())).collect());

        let adapter = EtcdAdapter::new(Arc::new(store), "/services");
        adapter.register(&web()).await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_failure_is_not_fatal() {
        let mut store = MockKvStore::new();
        store
            .expect_sync_membership()
            .times(1)
            .returning(|| Err(StoreError::Injected("sync".into())));
        store
            .expect_put_batch()
            .times(1)
            .returning(|entries, _| entries.iter().map(|_| Ok(())).collect());

        let observer = Arc::new(RecordingObserver::default());
        let adapter =
            EtcdAdapter::new(Arc::new(store), "/services").with_observer(observer.clone());

        adapter.register(&web()).await.unwrap();
        assert_eq!(*observer.syncs.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_service_is_rejected_before_any_io() {
        let store = MockKvStore::new();
        let adapter = EtcdAdapter::new(Arc::new(store), "/services");
        let service = Service {
            name: "web".into(),
            ..Default::default()
        };
        assert!(matches!(
            adapter.deregister(&service).await,
            Err(RegistryError::InvalidService(_))
        ));
        assert!(adapter.register(&service).await.is_err());
    }

    #[tokio::test]
    async fn test_deregister_deletes_service_subtree_once() {
        let mut store = MockKvStore::new();
        store.expect_sync_membership().returning(|| Ok(()));
        store
            .expect_delete_recursive()
            .withf(|prefix| prefix == "/services/web/1")
            .times(1)
            .returning(|_| Ok(()));

        let adapter = EtcdAdapter::new(Arc::new(store), "/services");
        adapter.deregister(&web()).await.unwrap();
    }

    #[tokio::test]
    async fn test_deregister_failure_is_returned() {
        let mut store = MockKvStore::new();
        store.expect_sync_membership().returning(|| Ok(()));
        store
            .expect_delete_recursive()
            .times(1)
            .returning(|_| Err(StoreError::Injected("delete".into())));

        let adapter = EtcdAdapter::new(Arc::new(store), "/services");
        let err = adapter.deregister(&web()).await.unwrap_err();
        assert!(matches!(err, RegistryError::Delete { ref path, .. } if path == "/services/web/1"));
    }

    #[tokio::test]
    async fn test_ping_stops_at_first_unhealthy_endpoint() {
        let mut store = MockKvStore::new();
        store.expect_sync_membership().returning(|| Ok(()));
        store
            .expect_endpoints()
            .return_const(vec!["http://a:2379".to_string(), "http://b:2379".to_string()]);
        store
            .expect_endpoint_status()
            .withf(|endpoint| endpoint == "http://a:2379")
            .times(1)
            .returning(|_| Ok(503));

        let adapter = EtcdAdapter::new(Arc::new(store), "/services");
        let err = adapter.ping().await.unwrap_err();
        assert!(matches!(
            err,
            RegistryError::Unhealthy { ref endpoint, status: 503 } if endpoint == "http://a:2379"
        ));
    }

    #[tokio::test]
    async fn test_ping_checks_every_endpoint() {
        let mut store = MockKvStore::new();
        store
            .expect_sync_membership()
            .returning(|| Err(StoreError::Injected("sync".into())));
        store
            .expect_endpoints()
            .return_const(vec!["http://a:2379".to_string(), "http://b:2379".to_string()]);
        store.expect_endpoint_status().times(2).returning(|_| Ok(200));

        let adapter = EtcdAdapter::new(Arc::new(store), "/services");
        adapter.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_services_is_always_empty() {
        let store = MockKvStore::new();
        let adapter = EtcdAdapter::new(Arc::new(store), "/services");
        assert!(adapter.services().await.unwrap().is_empty());
    }

    #[test]
    fn test_entries_order() {
        let keys: Vec<String> = EtcdAdapter::entries(&web())
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(
            keys,
            vec![
                "address",
                "port_type",
                "host_port",
                "host_ip",
                "exposed_port",
                "exposed_ip",
                "tags/0",
                "tags/1",
                "attrs/region",
            ]
        );
    }
}
