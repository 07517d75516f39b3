//! Error types for the trading agent engine

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[derive(Error, Debug)]
pub enum AgentError {

    // =============================
    // Transient upstream failures
    // =============================

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Gateway error ({status}): {message}")]
    Gateway { status: u16, message: String },

    // =============================
    // Permanent failures
    // =============================

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Planner error: {0}")]
    Planner(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidToolArgs(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    // =============================
    // External library conversions
    // =============================

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Transient failures are worth retrying with backoff. Validation,
    /// auth, and order-rejection failures never are.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited(_) => true,
            Self::Gateway { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Network(format!("connection failed: {}", err))
        } else {
            Self::Network(err.to_string())
        }
    }
}
