//! Error types for the Stratum session.

use thiserror::Error;

use crate::subscription::SubscriptionError;

/// Stratum protocol and transport errors.
#[derive(Error, Debug)]
pub enum StratumError {
    /// Network I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed message received from pool
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// TCP connection could not be established
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Pool declined or errored the login
    #[error("authorization failed: {0}")]
    AuthorizationFailed(String),

    /// Subscription failed or its result had the wrong shape
    #[error("subscription failed: {0}")]
    SubscriptionFailed(String),

    /// Job lifecycle error surfaced by the coordinator
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    /// Connection lost
    #[error("connection lost")]
    Disconnected,
}

/// Convenient Result type for Stratum operations.
pub type StratumResult<T> = Result<T, StratumError>;
