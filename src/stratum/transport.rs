//! Outbound JSON-RPC transport: id allocation and response correlation.
//!
//! A single mutex guards the writer, the id counter and the pending-request
//! table. Ids are therefore allocated in wire order, and a response can only
//! be correlated after its request is recorded, because lookups take the
//! same lock.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::connection::TransportWrite;
use super::error::StratumResult;
use super::messages::Message;

/// An outstanding request awaiting its response.
#[derive(Debug, Clone)]
pub(crate) struct PendingCall {
    pub method: String,
    pub params: Vec<Value>,
}

/// Serialised writer plus the pending-request table.
pub(crate) struct RpcTransport {
    inner: Mutex<Inner>,
}

struct Inner {
    writer: Box<dyn TransportWrite>,
    next_id: u64,
    pending: HashMap<u64, PendingCall>,
}

impl RpcTransport {
    pub fn new(writer: Box<dyn TransportWrite>) -> Self {
        RpcTransport {
            inner: Mutex::new(Inner {
                writer,
                next_id: 0,
                pending: HashMap::new(),
            }),
        }
    }

    /// Call a pool method, recording the request for correlation.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> StratumResult<u64> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id;

        let frame = serde_json::to_string(&Message::Request {
            id: Some(id),
            method: method.to_string(),
            params: params.clone(),
        })?;

        debug!(id, method, "Calling pool method");
        inner.writer.write_frame(&frame).await?;

        inner.pending.insert(
            id,
            PendingCall {
                method: method.to_string(),
                params,
            },
        );
        inner.next_id += 1;

        Ok(id)
    }

    /// Remove and return the pending call matching a response id.
    ///
    /// Each id resolves at most once; a second lookup returns `None`.
    pub async fn take_pending(&self, id: u64) -> Option<PendingCall> {
        self.inner.lock().await.pending.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stratum::connection::MockTransport;
    use serde_json::json;

    #[tokio::test]
    async fn ids_are_monotonic_from_zero_and_match_wire_order() {
        let (_reader, writer, mut pool) = MockTransport::pair();
        let transport = RpcTransport::new(Box::new(writer));

        let first = transport
            .call("mining.authorize", vec![json!("user"), json!("pass")])
            .await
            .unwrap();
        let second = transport
            .call("mining.subscribe", vec![json!("agent/1.0")])
            .await
            .unwrap();
        assert_eq!((first, second), (0, 1));

        let frame = pool.recv().await;
        assert_eq!(frame["id"], 0);
        assert_eq!(frame["method"], "mining.authorize");
        assert_eq!(frame["params"], json!(["user", "pass"]));

        let frame = pool.recv().await;
        assert_eq!(frame["id"], 1);
        assert_eq!(frame["method"], "mining.subscribe");
    }

    #[tokio::test]
    async fn pending_calls_resolve_exactly_once() {
        let (_reader, writer, _pool) = MockTransport::pair();
        let transport = RpcTransport::new(Box::new(writer));

        let id = transport.call("mining.submit", vec![json!("w")]).await.unwrap();

        let call = transport.take_pending(id).await.expect("pending call");
        assert_eq!(call.method, "mining.submit");
        assert_eq!(call.params, vec![json!("w")]);

        assert!(transport.take_pending(id).await.is_none());
        assert!(transport.take_pending(99).await.is_none());
    }
}
