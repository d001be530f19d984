/// Failures reported by a key-value store client.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("failed to decode store response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("no reachable endpoints configured")]
    NoEndpoints,
    #[error("endpoint {0} cannot carry key paths")]
    InvalidEndpoint(String),
    #[error("no lease for batch: {0}")]
    LeaseUnavailable(String),
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Failures surfaced by registry adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to write {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to delete {path}: {source}")]
    Delete {
        path: String,
        #[source]
        source: StoreError,
    },
    #[error("failed ({status}) to connect to {endpoint}")]
    Unhealthy { endpoint: String, status: u16 },
    #[error("failed to reach {endpoint}: {source}")]
    Status {
        endpoint: String,
        #[source]
        source: StoreError,
    },
    #[error("invalid service: {0}")]
    InvalidService(String),
}

/// An adapter could not be built; no registry handle exists.
#[derive(Debug, thiserror::Error)]
pub enum ConstructionError {
    #[error("no adapter registered for scheme '{0}'")]
    UnsupportedScheme(String),
    #[error("invalid registry URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },
    #[error("invalid option {name}={value}")]
    InvalidOption { name: String, value: String },
    #[error("failed to detect store version at {endpoint}: {source}")]
    Probe {
        endpoint: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to connect to store: {0}")]
    Connect(#[source] StoreError),
}
