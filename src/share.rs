//! Share record submitted to the pool.

use crate::bytes::reversed;

/// A found solution in the hex form `mining.submit` wants.
///
/// `ntime` is stored little-endian inside the job (header byte order), so it
/// is byte-reversed here back to the big-endian text the pool sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Share {
    /// Job the solution belongs to.
    pub job_id: String,
    /// Hex of the 4 little-endian extraNonce2 bytes.
    pub extra_nonce2: String,
    /// Hex of the ntime field, byte-reversed to wire order.
    pub ntime: String,
    /// Hex of the 4 little-endian nonce bytes.
    pub nonce: String,
}

impl Share {
    pub(crate) fn new(job_id: &str, extra_nonce2: [u8; 4], ntime: [u8; 4], nonce: [u8; 4]) -> Self {
        Share {
            job_id: job_id.to_string(),
            extra_nonce2: hex::encode(extra_nonce2),
            ntime: hex::encode(reversed(ntime)),
            nonce: hex::encode(nonce),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_fields_as_hex() {
        let share = Share::new(
            "job-7",
            0x0000002au32.to_le_bytes(),
            [0xb9, 0x86, 0x4e, 0x50],
            0xdeadbeefu32.to_le_bytes(),
        );

        assert_eq!(share.job_id, "job-7");
        assert_eq!(share.extra_nonce2, "2a000000");
        assert_eq!(share.nonce, "efbeadde");
    }

    #[test]
    fn ntime_returns_to_wire_order() {
        // The job decoded "504e86b9" and reversed it into header order;
        // the share must present the original wire text again.
        let wire: [u8; 4] = hex::decode("504e86b9").unwrap().try_into().unwrap();
        let header_order = reversed(wire);

        let share = Share::new("j", [0; 4], header_order, [0; 4]);
        assert_eq!(share.ntime, "504e86b9");
    }
}
