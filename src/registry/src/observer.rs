use crate::error::{RegistryError, StoreError};

/// Receives failures as they happen, before the adapter returns.
///
/// The adapter never logs on its own; whatever drives it decides where these
/// reports go. [`LogObserver`] forwards them to the `log` facade.
pub trait RegistrationObserver: Send + Sync {
    fn on_sync_failed(&self, error: &StoreError);

    fn on_write_failed(&self, service: &str, key: &str, error: &StoreError);

    fn on_delete_failed(&self, service: &str, path: &str, error: &StoreError);

    fn on_ping_failed(&self, error: &RegistryError);
}

/// Default observer writing every failure to the process log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl RegistrationObserver for LogObserver {
    fn on_sync_failed(&self, error: &StoreError) {
        log::warn!("etcd: cluster sync failed: {error}");
    }

    fn on_write_failed(&self, service: &str, key: &str, error: &StoreError) {
        log::error!("etcd: failed to register service {service} ({key}): {error}");
    }

    fn on_delete_failed(&self, service: &str, path: &str, error: &StoreError) {
        log::error!("etcd: failed to deregister service {service} ({path}): {error}");
    }

    fn on_ping_failed(&self, error: &RegistryError) {
        log::warn!("etcd: ping failed: {error}");
    }
}
