use thiserror::Error;

/// Deckhand-specific error types for better error handling
#[derive(Error, Debug)]
pub enum DeckhandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Container gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization error: {0}")]
    Serialization(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Other(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Deckfile not found at path: {path}")]
    DeckfileNotFound { path: String },

    #[error("Invalid Deckfile format: {reason}")]
    InvalidFormat { reason: String },

    #[error("Unknown container: {name}")]
    UnknownContainer { name: String },

    #[error("Unknown timezone: {name}")]
    UnknownTimezone { name: String },
}

/// Failures reported by the container runtime gateway.
///
/// `Timeout` is deliberately its own variant: a timed-out action call is
/// not proof of failure, so callers leave pending state in place to be
/// reconciled against a later status read.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Operation timed out after {seconds}s for container '{container}'")]
    Timeout { container: String, seconds: u64 },

    #[error("Container runtime unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Action '{action}' failed for container '{container}': {reason}")]
    ActionFailed {
        container: String,
        action: String,
        reason: String,
    },

    #[error("Malformed runtime response for container '{container}': {reason}")]
    MalformedResponse { container: String, reason: String },
}

#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("Location not reachable: {location}")]
    LocationUnreachable { location: String },

    #[error("Failed to create surface in {location}: {reason}")]
    CreateFailed { location: String, reason: String },

    #[error("Failed to delete content in {location}: {reason}")]
    DeleteFailed { location: String, reason: String },
}

/// Convenience type alias for Deckhand results
pub type Result<T, E = DeckhandError> = std::result::Result<T, E>;
