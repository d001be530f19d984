use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Network mapping a published service was derived from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Origin {
    /// Protocol of the mapped port, e.g. `tcp` or `udp`
    pub port_type: String,
    /// Port bound on the host
    pub host_port: String,
    /// Address bound on the host
    pub host_ip: String,
    /// Port exposed inside the container
    pub exposed_port: String,
    /// Address exposed inside the container
    pub exposed_ip: String,
}

/// One running instance of a named service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Service {
    /// Logical service name
    pub name: String,
    /// Instance identifier, unique per name
    pub id: String,
    pub ip: String,
    pub port: u16,
    /// Lease length for every key of this service; zero disables expiry
    #[serde(with = "humantime_serde", default)]
    pub ttl: Duration,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub origin: Origin,
}

impl Service {
    /// Network address of the instance, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        join_host_port(&self.ip, self.port)
    }

    /// Reject records that cannot be mapped onto a unique path.
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.name.is_empty() {
            return Err(RegistryError::InvalidService(
                "service name cannot be empty".to_string(),
            ));
        }
        if self.id.is_empty() {
            return Err(RegistryError::InvalidService(format!(
                "service {} has an empty id",
                self.name
            )));
        }
        Ok(())
    }
}

/// Join host and port into `host:port`, or `[host]:port` when the host holds a colon.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_host_port_ipv4() {
        assert_eq!(join_host_port("10.0.0.5", 8080), "10.0.0.5:8080");
    }

    #[test]
    fn test_join_host_port_ipv6() {
        assert_eq!(join_host_port("fe80::1", 80), "[fe80::1]:80");
    }

    #[test]
    fn test_join_host_port_hostname() {
        assert_eq!(join_host_port("localhost", 2379), "localhost:2379");
    }

    #[test]
    fn test_validate_rejects_empty_name_and_id() {
        let service = Service {
            id: "1".into(),
            ..Default::default()
        };
        assert!(matches!(
            service.validate(),
            Err(RegistryError::InvalidService(_))
        ));

        let service = Service {
            name: "web".into(),
            ..Default::default()
        };
        assert!(service.validate().is_err());

        let service = Service {
            name: "web".into(),
            id: "1".into(),
            ..Default::default()
        };
        assert!(service.validate().is_ok());
    }

    #[test]
    fn test_service_deserializes_humantime_ttl() {
        let json = r#"{
            "name": "web",
            "id": "1",
            "ip": "10.0.0.5",
            "port": 8080,
            "ttl": "30s",
            "tags": ["prod"],
            "attrs": {"region": "us"}
        }"#;
        let service: Service = serde_json::from_str(json).unwrap();
        assert_eq!(service.ttl, Duration::from_secs(30));
        assert_eq!(service.tags, vec!["prod".to_string()]);
        assert_eq!(service.attrs.get("region").map(String::as_str), Some("us"));
        assert_eq!(service.origin, Origin::default());
    }
}
