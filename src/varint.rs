//! Canonical variable-length integer ("CompactSize") codec
//!
//! | value range            | encoding                 |
//! |------------------------|--------------------------|
//! | `0 ..= 0xfc`           | 1 byte                   |
//! | `0xfd ..= 0xffff`      | `0xfd` + u16 LE          |
//! | `0x10000 ..= u32::MAX` | `0xfe` + u32 LE          |
//! | above                  | `0xff` + u64 LE          |
//!
//! Only the shortest form is accepted on decode.

use crate::error::{Result, SpvError};

/// Decode the varint starting at `offset`.
///
/// Returns `(value, bytes_consumed)`.
pub fn decode(bytes: &[u8], offset: usize) -> Result<(u64, usize)> {
    let discriminant = *bytes.get(offset).ok_or(SpvError::OutOfBounds { offset })?;
    let (value, size, min) = match discriminant {
        0xfd => (read_le(bytes, offset + 1, 2)?, 3, 0xfd),
        0xfe => (read_le(bytes, offset + 1, 4)?, 5, 0x1_0000),
        0xff => (read_le(bytes, offset + 1, 8)?, 9, 0x1_0000_0000),
        b => return Ok((b as u64, 1)),
    };
    if value < min {
        return Err(SpvError::NonCanonicalVarint { offset });
    }
    Ok((value, size))
}

fn read_le(bytes: &[u8], offset: usize, width: usize) -> Result<u64> {
    let slice = bytes
        .get(offset..offset + width)
        .ok_or(SpvError::OutOfBounds { offset })?;
    Ok(slice
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64))
}

/// Encode `value` in its canonical minimal form
pub fn encode(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(size(value));
    encode_into(value, &mut out);
    out
}

pub fn encode_into(value: u64, out: &mut Vec<u8>) {
    match value {
        0..=0xfc => out.push(value as u8),
        0xfd..=0xffff => {
            out.push(0xfd);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xffff_ffff => {
            out.push(0xfe);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xff);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Encoded length of `value` without materializing it
pub fn size(value: u64) -> usize {
    match value {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte() {
        assert_eq!(decode(&[0x00], 0).unwrap(), (0, 1));
        assert_eq!(decode(&[0xfc], 0).unwrap(), (0xfc, 1));
        assert_eq!(encode(0xfc), vec![0xfc]);
    }

    #[test]
    fn test_boundaries() {
        assert_eq!(encode(0xfd), vec![0xfd, 0xfd, 0x00]);
        assert_eq!(encode(0xffff), vec![0xfd, 0xff, 0xff]);
        assert_eq!(encode(0x10000), vec![0xfe, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(encode(0xffff_ffff), vec![0xfe, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(encode(0x1_0000_0000), vec![0xff, 0, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_decode_at_offset() {
        let bytes = [0xaa, 0xfd, 0x34, 0x12];
        assert_eq!(decode(&bytes, 1).unwrap(), (0x1234, 3));
    }

    #[test]
    fn test_non_canonical_rejected() {
        assert_eq!(
            decode(&[0xfd, 0xfc, 0x00], 0),
            Err(SpvError::NonCanonicalVarint { offset: 0 })
        );
        assert_eq!(
            decode(&[0xfe, 0xff, 0xff, 0x00, 0x00], 0),
            Err(SpvError::NonCanonicalVarint { offset: 0 })
        );
        assert_eq!(
            decode(&[0xff, 0xff, 0xff, 0xff, 0xff, 0, 0, 0, 0], 0),
            Err(SpvError::NonCanonicalVarint { offset: 0 })
        );
    }

    #[test]
    fn test_truncated() {
        assert_eq!(decode(&[], 0), Err(SpvError::OutOfBounds { offset: 0 }));
        assert_eq!(decode(&[0xfd, 0x01], 0), Err(SpvError::OutOfBounds { offset: 1 }));
    }

    #[test]
    fn test_size_matches_encoding() {
        for v in [0, 0xfc, 0xfd, 0xffff, 0x10000, 0xffff_ffff, 0x1_0000_0000, u64::MAX] {
            assert_eq!(size(v), encode(v).len());
        }
    }
}
