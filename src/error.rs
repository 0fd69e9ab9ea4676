//! Error types shared by the device facades and the refresh coordinator

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised while talking to a device or validating its configuration
#[derive(Debug, Error)]
pub enum Error {
    /// A required configuration key is absent
    #[error("missing required config key={0}")]
    MissingConfig(&'static str),

    /// A configuration value could not be used
    #[error("invalid config value for {key}: {reason}")]
    InvalidConfig { key: &'static str, reason: String },

    /// The request never produced a usable response
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: StatusCode, url: String },

    /// The device connection was already released
    #[error("connection to {0} is closed")]
    Closed(String),

    #[error("building HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl Error {
    pub(crate) fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.into(),
            source,
        }
    }

    /// Whether this error came from the network rather than from configuration
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Status { .. } | Self::Closed(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
