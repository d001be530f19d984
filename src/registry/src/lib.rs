//! Publishes running services into a hierarchical key-value store.
//!
//! Each service becomes a subtree of independent keys (address, origin
//! metadata, tags, attributes) sharing the service's TTL. Callers keep a
//! registration alive by calling [`RegistryAdapter::refresh`] before the TTL
//! runs out.

use async_trait::async_trait;

pub mod adapter;
pub mod error;
pub mod factory;
pub mod observer;
pub mod path;
pub mod service;
pub mod store;

pub use adapter::EtcdAdapter;
pub use error::{ConstructionError, RegistryError, StoreError};
pub use factory::{AdapterFactory, AdapterSettings, FactoryRegistry};
pub use observer::{LogObserver, RegistrationObserver};
pub use path::KeyLayout;
pub use service::{Origin, Service};
pub use store::{KvStore, StoreApi};

/// Operations a registry backend offers to whatever orchestrates services.
#[async_trait]
pub trait RegistryAdapter: Send + Sync {
    async fn register(&self, service: &Service) -> Result<(), RegistryError>;

    async fn deregister(&self, service: &Service) -> Result<(), RegistryError>;

    /// Rewrite every key of `service`, renewing its TTL.
    async fn refresh(&self, service: &Service) -> Result<(), RegistryError>;

    async fn ping(&self) -> Result<(), RegistryError>;

    async fn services(&self) -> Result<Vec<Service>, RegistryError>;
}
