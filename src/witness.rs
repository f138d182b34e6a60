//! Per-input witness stack: 𝒲 = 𝕊* (sequence of byte strings)

use crate::cursor::{Reader, Writer};
use crate::encode::{Decodable, Encodable};
use crate::error::Result;
use crate::varint;

/// Witness items of one input. Serialized as a varint count followed by
/// varint-length items.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Witness(Vec<Vec<u8>>);

impl Witness {
    pub fn new(items: Vec<Vec<u8>>) -> Self {
        Witness(items)
    }

    pub fn items(&self) -> &[Vec<u8>] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, item: Vec<u8>) {
        self.0.push(item);
    }

    pub fn last(&self) -> Option<&[u8]> {
        self.0.last().map(Vec::as_slice)
    }
}

impl From<Vec<Vec<u8>>> for Witness {
    fn from(items: Vec<Vec<u8>>) -> Self {
        Witness(items)
    }
}

impl Encodable for Witness {
    fn encoded_size(&self) -> usize {
        varint::size(self.0.len() as u64)
            + self
                .0
                .iter()
                .map(|item| varint::size(item.len() as u64) + item.len())
                .sum::<usize>()
    }

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_varint(self.0.len() as u64)?;
        for item in &self.0 {
            writer.write_var_bytes(item)?;
        }
        Ok(())
    }
}

impl Decodable for Witness {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.read_varint()?;
        // Each item needs at least its length byte
        let mut items = Vec::with_capacity((count as usize).min(reader.left()));
        for _ in 0..count {
            items.push(reader.read_var_bytes()?);
        }
        Ok(Witness(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_witness_encoding() {
        let witness = Witness::new(vec![vec![0x30; 3], vec![], vec![0x02; 2]]);
        let bytes = witness.to_bytes().unwrap();
        assert_eq!(bytes, vec![0x03, 0x03, 0x30, 0x30, 0x30, 0x00, 0x02, 0x02, 0x02]);
        assert_eq!(Witness::from_bytes(&bytes).unwrap(), witness);
    }

    #[test]
    fn test_empty_witness() {
        let witness = Witness::default();
        assert_eq!(witness.to_bytes().unwrap(), vec![0x00]);
        assert!(witness.last().is_none());
    }

    #[test]
    fn test_truncated_item() {
        assert!(Witness::from_bytes(&[0x01, 0x05, 0x00]).is_err());
    }
}
