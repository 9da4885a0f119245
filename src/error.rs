use thiserror::Error;

/// Failures talking to the dashboard backend.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    /// `connect` is set when the server could not be reached at all.
    #[error("network failure on {endpoint}: {reason}")]
    Network {
        endpoint: String,
        reason: String,
        connect: bool,
    },

    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("malformed response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("invalid backend url: {0}")]
    InvalidUrl(String),

    #[error("live update stream closed")]
    StreamClosed,
}

impl ApiError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The backend process looks down rather than misbehaving.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Network { connect: true, .. })
    }

    pub(crate) fn from_reqwest(endpoint: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                endpoint: endpoint.to_string(),
            }
        } else if err.is_decode() {
            Self::Decode {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            }
        } else {
            Self::Network {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
                connect: err.is_connect(),
            }
        }
    }
}

/// Configuration-related errors with structured variants.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write config file {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// A filter value typed by the user that can't be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("neznámá dispozice: {0}")]
    UnknownDisposition(String),

    #[error("neznámé řazení: {0}")]
    UnknownSort(String),

    #[error("Cena musí být mezi 0 a 1 000 000 Kč")]
    InvalidPrice(String),
}
