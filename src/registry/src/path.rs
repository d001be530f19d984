//! Hierarchical key layout for published services.
//!
//! A service lives under `{root}/{name}/{id}` (or `{root}/{name}/services/{id}`
//! with [`KeyLayout::Nested`]); every piece of metadata is an independent leaf
//! below that path.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::service::Service;

pub const ADDRESS_KEY: &str = "address";
pub const PORT_TYPE_KEY: &str = "port_type";
pub const HOST_PORT_KEY: &str = "host_port";
pub const HOST_IP_KEY: &str = "host_ip";
pub const EXPOSED_PORT_KEY: &str = "exposed_port";
pub const EXPOSED_IP_KEY: &str = "exposed_ip";
pub const TAGS_DIR: &str = "tags";
pub const ATTRS_DIR: &str = "attrs";

/// Where instances sit relative to their service name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyLayout {
    /// `{root}/{name}/{id}`
    #[default]
    Flat,
    /// `{root}/{name}/services/{id}`
    Nested,
}

impl fmt::Display for KeyLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KeyLayout::Flat => "flat",
            KeyLayout::Nested => "nested",
        };
        write!(f, "{s}")
    }
}

impl FromStr for KeyLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(KeyLayout::Flat),
            "nested" => Ok(KeyLayout::Nested),
            other => Err(format!("unknown key layout: {other}")),
        }
    }
}

/// Strip trailing separators so `/services/` and `/services` address the same tree.
pub fn normalize_root(root: &str) -> String {
    root.trim_end_matches('/').to_string()
}

/// Path of the subtree holding every key of `service`.
pub fn service_path(root: &str, layout: KeyLayout, service: &Service) -> String {
    match layout {
        KeyLayout::Flat => format!("{root}/{}/{}", service.name, service.id),
        KeyLayout::Nested => format!("{root}/{}/services/{}", service.name, service.id),
    }
}

/// Leaf key below a service path.
pub fn key_path(service_path: &str, key: &str) -> String {
    format!("{service_path}/{key}")
}

pub fn tag_key(index: usize) -> String {
    format!("{TAGS_DIR}/{index}")
}

pub fn attr_key(name: &str) -> String {
    format!("{ATTRS_DIR}/{name}")
}
