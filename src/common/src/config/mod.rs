use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use registry::{AdapterSettings, KeyLayout, StoreApi};

/// Default configuration file, looked up in the working directory.
pub const CONFIG_FILE: &str = "registrator.toml";
/// Prefix of environment overrides, e.g. `REGISTRATOR__REGISTRY__URI`.
pub const ENV_PREFIX: &str = "REGISTRATOR__";

/// Configuration of the registry backend
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Backend URI; scheme picks the backend, path the key root
    pub uri: String,
    /// Upper bound on every request to the store
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// etcd API to speak (auto, v2, v3)
    pub api: StoreApi,
    /// Key layout below the root (flat, nested)
    pub layout: KeyLayout,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            uri: String::from("etcd:///services"),
            request_timeout: Duration::from_secs(1),
            api: StoreApi::Auto,
            layout: KeyLayout::Flat,
        }
    }
}

impl RegistryConfig {
    pub fn adapter_settings(&self) -> AdapterSettings {
        AdapterSettings {
            request_timeout: self.request_timeout,
            api: self.api,
            layout: self.layout,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Configuration {
    /// Registry backend configuration
    pub registry: RegistryConfig,
}

impl Configuration {
    fn figment(file: &Path) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(Path::new(CONFIG_FILE))
            .extract()
            .map_err(Box::new)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(path).extract().map_err(Box::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_configuration() {
        let config = Configuration::default();
        assert_eq!(config.registry.uri, "etcd:///services");
        assert_eq!(config.registry.request_timeout, Duration::from_secs(1));
        assert_eq!(config.registry.api, StoreApi::Auto);
        assert_eq!(config.registry.layout, KeyLayout::Flat);
    }

    #[test]
    fn test_configless_operation() {
        Jail::expect_with(|_jail| {
            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.registry.uri, "etcd:///services");
            Ok(())
        });
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                [registry]
                uri = "etcd://10.0.0.1:2379/skydns"
                request_timeout = "5s"
                api = "v2"
                layout = "nested"
                "#,
            )?;
            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.registry.uri, "etcd://10.0.0.1:2379/skydns");
            assert_eq!(config.registry.request_timeout, Duration::from_secs(5));
            assert_eq!(config.registry.api, StoreApi::V2);
            assert_eq!(config.registry.layout, KeyLayout::Nested);
            Ok(())
        });
    }

    #[test]
    fn test_env_var_override() {
        Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "[registry]\nuri = \"etcd:///from-file\"\n")?;
            jail.set_env("REGISTRATOR__REGISTRY__URI", "etcd:///from-env");
            jail.set_env("REGISTRATOR__REGISTRY__API", "v3");

            let config = Configuration::load().map_err(|e| *e)?;
            assert_eq!(config.registry.uri, "etcd:///from-env");
            assert_eq!(config.registry.api, StoreApi::V3);
            Ok(())
        });
    }

    #[test]
    fn test_load_from_explicit_path() {
        Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[registry]\nrequest_timeout = \"250ms\"\n")?;
            let config =
                Configuration::load_from_path(Path::new("custom.toml")).map_err(|e| *e)?;
            assert_eq!(
                config.registry.request_timeout,
                Duration::from_millis(250)
            );
            assert_eq!(config.registry.uri, "etcd:///services");
            Ok(())
        });
    }

    #[test]
    fn test_adapter_settings_follow_config() {
        let config = RegistryConfig {
            api: StoreApi::V3,
            layout: KeyLayout::Nested,
            request_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let settings = config.adapter_settings();
        assert_eq!(settings.api, StoreApi::V3);
        assert_eq!(settings.layout, KeyLayout::Nested);
        assert_eq!(settings.request_timeout, Duration::from_secs(2));
    }
}
