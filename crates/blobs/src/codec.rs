//! Stored-integer codec.
//!
//! All numeric metadata fields are 8-byte little-endian unsigned integers;
//! this is part of the on-disk format.

pub(crate) fn encode_u64(n: u64) -> [u8; 8] {
    n.to_le_bytes()
}

/// Decode a stored integer. `None` for anything but exactly 8 bytes, so
/// corrupt metadata surfaces as a missing field instead of a panic.
pub(crate) fn decode_u64(data: &[u8]) -> Option<u64> {
    let bytes: [u8; 8] = data.try_into().ok()?;
    Some(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        for n in [0u64, 1, 10_000, u64::MAX] {
            assert_eq!(decode_u64(&encode_u64(n)), Some(n));
        }
    }

    #[test]
    fn encodes_little_endian() {
        assert_eq!(encode_u64(10_000), [0x10, 0x27, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn rejects_wrong_lengths() {
        assert_eq!(decode_u64(&[]), None);
        assert_eq!(decode_u64(&[1, 2, 3]), None);
        assert_eq!(decode_u64(&[0; 9]), None);
    }
}
