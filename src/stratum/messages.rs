//! Stratum v1 wire format.
//!
//! Stratum predates JSON-RPC 2.0 and bends the rules: notifications carry
//! `id: null` instead of omitting the id, errors may be a plain
//! `[code, message, traceback]` array, and there is no version field. The
//! untagged [`Message`] enum mirrors the required classification order:
//! a frame is a request if it has a `method`, otherwise a response.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{StratumError, StratumResult};
use crate::algorithm::HashFn;
use crate::job::JobParams;

/// A single JSON-RPC frame, either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    /// Request or notification (`id: null`).
    Request {
        id: Option<u64>,
        method: String,
        #[serde(default)]
        params: Vec<Value>,
    },

    /// Response to a request we sent.
    Response {
        id: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<RpcError>,
    },
}

/// Error member of a response, in either of the forms pools use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcError {
    /// Structured form: `{"code": 21, "message": "Job not found"}`.
    Object { code: i64, message: String },
    /// Legacy array form: `[21, "Job not found", null]`.
    Array(Vec<Value>),
}

impl RpcError {
    /// Numeric error code, if one is present.
    pub fn code(&self) -> Option<i64> {
        match self {
            RpcError::Object { code, .. } => Some(*code),
            RpcError::Array(items) => items.first().and_then(Value::as_i64),
        }
    }

    /// Human-readable error message.
    pub fn message(&self) -> &str {
        match self {
            RpcError::Object { message, .. } => message,
            RpcError::Array(items) => {
                items.get(1).and_then(Value::as_str).unwrap_or("unknown error")
            }
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code() {
            Some(code) => write!(f, "{} (code {})", self.message(), code),
            None => f.write_str(self.message()),
        }
    }
}

fn invalid(message: impl Into<String>) -> StratumError {
    StratumError::InvalidMessage(message.into())
}

/// Parse the result of `mining.subscribe`:
/// `[[[name, subscription_id], …], extra_nonce1_hex, extra_nonce2_length]`.
pub fn parse_subscribe_result(result: &Value) -> StratumResult<(String, String, u32)> {
    let items = result
        .as_array()
        .ok_or_else(|| invalid("subscribe result is not an array"))?;
    if items.len() != 3 {
        return Err(invalid("subscribe result is not a 3-tuple"));
    }

    let subscription_id = items[0]
        .get(0)
        .and_then(|pair| pair.get(1))
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("subscription id missing from subscribe result"))?;

    let extra_nonce1 = items[1]
        .as_str()
        .ok_or_else(|| invalid("extraNonce1 is not a string"))?;

    let extra_nonce2_length = items[2]
        .as_u64()
        .ok_or_else(|| invalid("extraNonce2 length is not an unsigned integer"))?
        as u32;

    Ok((
        subscription_id.to_string(),
        extra_nonce1.to_string(),
        extra_nonce2_length,
    ))
}

/// Parse the 9 params of `mining.notify` into job parameters plus the
/// clean-jobs flag. The session-scoped fields (target, extraNonce1, width)
/// are left for the subscription coordinator to fill.
pub fn parse_notify_params(
    params: &[Value],
    hash: HashFn,
    workers: u32,
) -> StratumResult<(JobParams, bool)> {
    if params.len() != 9 {
        return Err(invalid("mining.notify expects 9 params"));
    }

    let field = |index: usize, name: &str| -> StratumResult<String> {
        params[index]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid(format!("{name} is not a string")))
    };

    let merkle_branches = params[4]
        .as_array()
        .ok_or_else(|| invalid("merkle branches is not an array"))?
        .iter()
        .map(|branch| {
            branch
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| invalid("merkle branch is not a string"))
        })
        .collect::<StratumResult<Vec<String>>>()?;

    let clean_jobs = params[8]
        .as_bool()
        .ok_or_else(|| invalid("clean_jobs is not a boolean"))?;

    let job_params = JobParams {
        job_id: field(0, "job_id")?,
        prev_hash: field(1, "prev_hash")?,
        coinb1: field(2, "coinb1")?,
        coinb2: field(3, "coinb2")?,
        merkle_branches,
        version: field(5, "version")?,
        nbits: field(6, "nbits")?,
        ntime: field(7, "ntime")?,
        target: [0u8; 32],
        extra_nonce1: Vec::new(),
        extra_nonce2_length: 0,
        hash,
        workers,
    };

    Ok((job_params, clean_jobs))
}
