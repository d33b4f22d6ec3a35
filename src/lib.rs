//! Stratum v1 mining client for Bitcoin-family proof-of-work chains.
//!
//! The crate connects to a mining pool over TCP, speaks the line-delimited
//! JSON-RPC dialect known as Stratum, distributes the proof-of-work search
//! across a pool of CPU workers, and submits found shares back to the pool.
//!
//! # Architecture
//!
//! - [`stratum::Client`] owns the session: it performs the
//!   authorize/subscribe handshake, correlates responses to outstanding
//!   requests, and dispatches server notifications.
//! - [`subscription::Subscription`] holds the session-scoped mining
//!   parameters and serialises the job lifecycle: at any instant at most one
//!   [`job::Job`] is mining.
//! - [`job::Job`] sweeps the extraNonce2 × nonce space with stride-partitioned
//!   workers and emits [`share::Share`] values on a channel the client
//!   drains into `mining.submit` calls.
//!
//! # Usage
//!
//! ```rust,ignore
//! use galena_miner::algorithm::Algorithm;
//! use galena_miner::stratum::{Client, ClientConfig};
//!
//! let client = Client::new(ClientConfig {
//!     pool_address: "stratum+tcp://pool.example.com:3333".into(),
//!     login: "wallet.worker".into(),
//!     password: "x".into(),
//!     algorithm: Algorithm::Sha256d,
//!     miners_count: 4,
//!     ..Default::default()
//! });
//!
//! client.serve().await?;
//! ```

pub mod algorithm;
pub mod bytes;
pub mod config;
pub mod job;
pub mod share;
pub mod stratum;
pub mod subscription;
pub mod target;
pub mod tracing;
