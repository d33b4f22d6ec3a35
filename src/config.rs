//! Environment-driven configuration for the daemon binary.
//!
//! The library API takes a [`ClientConfig`](crate::stratum::ClientConfig)
//! value directly; this module only exists so `galenad` can be configured
//! without flags, the same way it would run under a process supervisor.

use std::env;
use std::thread;

use thiserror::Error;

use crate::algorithm::{Algorithm, ParseAlgorithmError};

/// Daemon configuration, read from `GALENA_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pool address (`GALENA_POOL`), e.g. `stratum+tcp://pool.example:3333`.
    pub pool_address: String,

    /// Worker login (`GALENA_LOGIN`).
    pub login: String,

    /// Worker password (`GALENA_PASSWORD`, default `"x"`).
    pub password: String,

    /// Proof-of-work algorithm (`GALENA_ALGORITHM`, default `sha256d`).
    pub algorithm: Algorithm,

    /// Worker count (`GALENA_MINERS`, default: available parallelism).
    pub miners_count: u32,
}

/// Error reading the environment configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("GALENA_ALGORITHM: {0}")]
    Algorithm(#[from] ParseAlgorithmError),

    #[error("GALENA_MINERS must be a positive integer, got {0:?}")]
    Miners(String),
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let pool_address =
            env::var("GALENA_POOL").map_err(|_| ConfigError::Missing("GALENA_POOL"))?;
        let login = env::var("GALENA_LOGIN").map_err(|_| ConfigError::Missing("GALENA_LOGIN"))?;
        let password = env::var("GALENA_PASSWORD").unwrap_or_else(|_| "x".to_string());

        let algorithm = match env::var("GALENA_ALGORITHM") {
            Ok(name) => name.parse()?,
            Err(_) => Algorithm::Sha256d,
        };

        let miners_count = match env::var("GALENA_MINERS") {
            Ok(count) => match count.parse::<u32>() {
                Ok(count) if count > 0 => count,
                _ => return Err(ConfigError::Miners(count)),
            },
            Err(_) => default_miners_count(),
        };

        Ok(Config {
            pool_address,
            login,
            password,
            algorithm,
            miners_count,
        })
    }
}

fn default_miners_count() -> u32 {
    thread::available_parallelism().map_or(1, |n| n.get() as u32)
}
