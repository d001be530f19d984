use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use registry::{Origin, Service};

/// Describes the service a command acts on, from flags or a JSON file.
#[derive(Args, Debug, Clone, Default)]
pub struct ServiceArgs {
    #[arg(long, help = "Read the service description from a JSON file")]
    pub service_file: Option<PathBuf>,

    #[arg(long, help = "Service name")]
    pub name: Option<String>,

    #[arg(long, help = "Unique instance id")]
    pub id: Option<String>,

    #[arg(long, help = "Address the service is reachable at")]
    pub ip: Option<String>,

    #[arg(long, help = "Port the service is reachable at")]
    pub port: Option<u16>,

    #[arg(long, value_parser = humantime::parse_duration, help = "Registration TTL, e.g. 30s")]
    pub ttl: Option<Duration>,

    #[arg(long = "tag", help = "Tag to publish (repeatable)")]
    pub tags: Vec<String>,

    #[arg(long = "attr", value_parser = parse_key_val, help = "Attribute as key=value (repeatable)")]
    pub attrs: Vec<(String, String)>,

    #[arg(long, default_value = "tcp")]
    pub port_type: String,

    #[arg(long)]
    pub host_port: Option<String>,

    #[arg(long)]
    pub host_ip: Option<String>,

    #[arg(long)]
    pub exposed_port: Option<String>,

    #[arg(long)]
    pub exposed_ip: Option<String>,
}

pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("attribute key cannot be empty in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

impl ServiceArgs {
    pub fn into_service(self) -> Result<Service> {
        if let Some(path) = &self.service_file {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let service: Service = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse service from {}", path.display()))?;
            return Ok(service);
        }

        let name = self.name.context("--name is required")?;
        let id = self.id.context("--id is required")?;
        let ip = self.ip.context("--ip is required")?;
        let port = self.port.context("--port is required")?;
        let origin = Origin {
            port_type: self.port_type,
            host_port: self.host_port.unwrap_or_else(|| port.to_string()),
            host_ip: self.host_ip.unwrap_or_else(|| ip.clone()),
            exposed_port: self.exposed_port.unwrap_or_else(|| port.to_string()),
            exposed_ip: self.exposed_ip.unwrap_or_default(),
        };

        Ok(Service {
            name,
            id,
            ip,
            port,
            ttl: self.ttl.unwrap_or_default(),
            tags: self.tags,
            attrs: self.attrs.into_iter().collect::<BTreeMap<_, _>>(),
            origin,
        })
    }
}
