//! Builds registry adapters from URIs such as `etcd://10.0.0.1:2379/services`.
//!
//! The URI scheme selects a factory, the authority the store endpoint and the
//! path the root every service key is written under. Query parameters
//! (`api`, `layout`, `timeout`) override [`AdapterSettings`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::RegistryAdapter;
use crate::adapter::EtcdAdapter;
use crate::error::ConstructionError;
use crate::path::KeyLayout;
use crate::store::{
    DEFAULT_ENDPOINT, EtcdV2Store, EtcdV3Store, InMemoryKvStore, KvStore, StoreApi, StoreOptions,
    http_client, probe,
};

/// Construction-time settings shared by every factory.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub request_timeout: Duration,
    pub api: StoreApi,
    pub layout: KeyLayout,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(1),
            api: StoreApi::Auto,
            layout: KeyLayout::Flat,
        }
    }
}

impl AdapterSettings {
    /// Settings with the URI's query parameters applied on top.
    pub fn merged_with(&self, uri: &Url) -> Result<Self, ConstructionError> {
        let mut settings = self.clone();
        for (name, value) in uri.query_pairs() {
            let invalid = || ConstructionError::InvalidOption {
                name: name.to_string(),
                value: value.to_string(),
            };
            match name.as_ref() {
                "api" => settings.api = value.parse().map_err(|_| invalid())?,
                "layout" => settings.layout = value.parse().map_err(|_| invalid())?,
                "timeout" => {
                    settings.request_timeout =
                        humantime::parse_duration(&value).map_err(|_| invalid())?
                }
                _ => return Err(invalid()),
            }
        }
        Ok(settings)
    }
}

/// Creates an adapter for one URI scheme.
#[async_trait]
pub trait AdapterFactory: Send + Sync {
    async fn create(
        &self,
        uri: &Url,
        settings: &AdapterSettings,
    ) -> Result<Box<dyn RegistryAdapter>, ConstructionError>;
}

/// Store endpoint named by the URI authority.
pub fn endpoint_from_uri(uri: &Url) -> String {
    match uri.host_str() {
        Some(host) if !host.is_empty() => match uri.port() {
            Some(port) => format!("http://{host}:{port}"),
            None => format!("http://{host}"),
        },
        _ => DEFAULT_ENDPOINT.to_string(),
    }
}

/// etcd, speaking v2 or v3 depending on configuration or a version probe.
#[derive(Debug, Default)]
pub struct EtcdFactory;

impl EtcdFactory {
    async fn resolve_api(
        &self,
        api: StoreApi,
        options: &StoreOptions,
    ) -> Result<StoreApi, ConstructionError> {
        if api != StoreApi::Auto {
            return Ok(api);
        }
        let endpoint = options
            .endpoints
            .first()
            .cloned()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let http = http_client(options.request_timeout).map_err(ConstructionError::Connect)?;
        let info = probe::detect_version(&http, &endpoint)
            .await
            .map_err(|source| ConstructionError::Probe {
                endpoint: endpoint.clone(),
                source,
            })?;
        let api = info.api();
        log::info!(
            "Detected etcd cluster version {} at {endpoint}, using {api} API",
            info.cluster
        );
        Ok(api)
    }

    async fn connect_store(
        &self,
        api: StoreApi,
        options: &StoreOptions,
    ) -> Result<Arc<dyn KvStore>, ConstructionError> {
        let store: Arc<dyn KvStore> = match self.resolve_api(api, options).await? {
            StoreApi::V2 => {
                Arc::new(EtcdV2Store::new(options).map_err(ConstructionError::Connect)?)
            }
            StoreApi::V3 | StoreApi::Auto => Arc::new(
                EtcdV3Store::connect(options)
                    .await
                    .map_err(ConstructionError::Connect)?,
            ),
        };
        Ok(store)
    }
}

#[async_trait]
impl AdapterFactory for EtcdFactory {
    async fn create(
        &self,
        uri: &Url,
        settings: &AdapterSettings,
    ) -> Result<Box<dyn RegistryAdapter>, ConstructionError> {
        let options = StoreOptions {
            endpoints: vec![endpoint_from_uri(uri)],
            request_timeout: settings.request_timeout,
        };
        let store = self.connect_store(settings.api, &options).await?;
        let adapter = EtcdAdapter::new(store, uri.path()).with_layout(settings.layout);
        log::info!(
            "etcd registry ready at {:?}, root '{}'",
            options.endpoints,
            adapter.root()
        );
        Ok(Box::new(adapter))
    }
}

/// Process-local store; registrations vanish with the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryFactory {
    store: InMemoryKvStore,
}

impl MemoryFactory {
    /// Factory whose adapters all share `store`.
    pub fn with_store(store: InMemoryKvStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AdapterFactory for MemoryFactory {
    async fn create(
        &self,
        uri: &Url,
        settings: &AdapterSettings,
    ) -> Result<Box<dyn RegistryAdapter>, ConstructionError> {
        let adapter = EtcdAdapter::new(Arc::new(self.store.clone()), uri.path())
            .with_layout(settings.layout);
        Ok(Box::new(adapter))
    }
}

/// URI scheme to factory lookup.
#[derive(Default, Clone)]
pub struct FactoryRegistry {
    factories: HashMap<String, Arc<dyn AdapterFactory>>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `etcd` and `memory` schemes.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("etcd", Arc::new(EtcdFactory));
        registry.register("memory", Arc::new(MemoryFactory::default()));
        registry
    }

    pub fn register(&mut self, scheme: &str, factory: Arc<dyn AdapterFactory>) {
        self.factories.insert(scheme.to_ascii_lowercase(), factory);
    }

    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.factories.keys().cloned().collect();
        schemes.sort();
        schemes
    }

    pub fn lookup(&self, scheme: &str) -> Option<Arc<dyn AdapterFactory>> {
        self.factories.get(&scheme.to_ascii_lowercase()).cloned()
    }

    /// Build the adapter named by `uri`.
    pub async fn create(
        &self,
        uri: &str,
        settings: &AdapterSettings,
    ) -> Result<Box<dyn RegistryAdapter>, ConstructionError> {
        let parsed = Url::parse(uri).map_err(|e| ConstructionError::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
        let factory = self
            .lookup(parsed.scheme())
            .ok_or_else(|| ConstructionError::UnsupportedScheme(parsed.scheme().to_string()))?;
        let settings = settings.merged_with(&parsed)?;
        factory.create(&parsed, &settings).await
    }
}
