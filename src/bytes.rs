//! Byte-order utilities for Stratum wire fields.
//!
//! Stratum transmits most header fields as big-endian hex while the block
//! header itself is little-endian, so decoded fields usually need a byte
//! reversal before they can be hashed. The previous block hash additionally
//! arrives "word-swapped": eight 4-byte words in reversed word order.

/// Return a copy of `bytes` with the byte order reversed.
pub fn reversed<const N: usize>(bytes: [u8; N]) -> [u8; N] {
    let mut out = bytes;
    out.reverse();
    out
}

/// Undo the pool's per-word encoding of the previous block hash.
///
/// Swaps consecutive 4-byte words end-for-end:
/// `out[32-i-4..32-i] = input[i..i+4]`. Composed with itself this is the
/// identity; composed with a full [`reversed`] it yields the little-endian
/// prev_hash form the block header wants.
pub fn restore_prev_hash_word_order(hash: [u8; 32]) -> [u8; 32] {
    let mut restored = [0u8; 32];
    for i in (0..32).step_by(4) {
        restored[32 - i - 4..32 - i].copy_from_slice(&hash[i..i + 4]);
    }
    restored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reversed_flips_byte_order() {
        assert_eq!(reversed([0x01, 0x02, 0x03, 0x04]), [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(reversed([0xab]), [0xab]);
        assert_eq!(reversed::<0>([]), [] as [u8; 0]);
    }

    #[test]
    fn word_order_restore_swaps_words_end_for_end() {
        let mut input = [0u8; 32];
        for (i, byte) in input.iter_mut().enumerate() {
            *byte = i as u8;
        }

        let restored = restore_prev_hash_word_order(input);

        // First word lands last, byte order within the word preserved.
        assert_eq!(&restored[28..32], &[0, 1, 2, 3]);
        assert_eq!(&restored[0..4], &[28, 29, 30, 31]);
    }

    #[test]
    fn word_order_restore_is_an_involution() {
        let mut input = [0u8; 32];
        for (i, byte) in input.iter_mut().enumerate() {
            *byte = (i as u8).wrapping_mul(37).wrapping_add(11);
        }

        assert_eq!(restore_prev_hash_word_order(restore_prev_hash_word_order(input)), input);
    }

    #[test]
    fn word_swap_then_reverse_yields_little_endian_prev_hash() {
        // Eight words as the pool would send them.
        let stratum: [u8; 32] = hex::decode(
            "aabbccdd112233445566778899aabbccdeadbeefcafebabef00dfacebadc0ffe",
        )
        .unwrap()
        .try_into()
        .unwrap();

        let internal = reversed(restore_prev_hash_word_order(stratum));

        // Word-swap plus full reversal reverses the bytes within each word
        // while keeping word order, which is the header-internal form.
        let expected: [u8; 32] = hex::decode(
            "ddccbbaa4433221188776655ccbbaa99efbeaddebebafecacefa0df0fe0fdcba",
        )
        .unwrap()
        .try_into()
        .unwrap();
        assert_eq!(internal, expected);
    }

    #[test]
    fn u32_le_round_trips() {
        for value in [0u32, 1, 0x1a2b3c4d, u32::MAX] {
            let bytes = value.to_le_bytes();
            assert_eq!(u32::from_le_bytes(bytes), value);
        }
        assert_eq!(0x1a2b3c4du32.to_le_bytes(), [0x4d, 0x3c, 0x2b, 0x1a]);
    }
}
