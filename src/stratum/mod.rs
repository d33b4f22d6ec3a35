//! Stratum v1 mining protocol client.
//!
//! Stratum is a bidirectional, line-delimited JSON-RPC dialect over TCP:
//!
//! - **Client requests**: `mining.authorize`, `mining.subscribe`,
//!   `mining.submit` — each carries a correlation id and is answered by a
//!   response frame.
//! - **Server requests**: `mining.set_difficulty`, `mining.notify` and a few
//!   informational methods — sent with `id: null`, never answered.
//!
//! The [`Client`] owns the session: a single reader loop classifies each
//! frame through the pending-request table, responses drive the handshake
//! and submit handling, notifications drive the job lifecycle.

mod client;
mod connection;
mod error;
mod messages;
mod transport;

pub use client::{Client, ClientConfig};
pub use connection::{
    Connection, ConnectionReader, ConnectionWriter, TransportRead, TransportWrite,
};
pub use error::{StratumError, StratumResult};
pub use messages::{Message, RpcError};
