use thiserror::Error;

/// Failures talking to the exchange
///
/// Every variant is recoverable: callers log it and skip the current cycle.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP transport failure: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to decode exchange payload: {0}")]
    Decode(String),

    #[error("API credentials required for signed endpoint")]
    MissingCredentials,

    #[error("unknown order status {0:?}")]
    UnknownOrderStatus(String),

    #[error("asset {0} not present in account balances")]
    UnknownAsset(String),
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Decode(e.to_string())
    }
}

impl From<serde_urlencoded::ser::Error> for GatewayError {
    fn from(e: serde_urlencoded::ser::Error) -> Self {
        GatewayError::Decode(e.to_string())
    }
}

/// Invalid bot configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
