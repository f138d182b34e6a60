//! Shared encode/decode capability for wire structures

use crate::cursor::{Reader, Writer};
use crate::error::Result;
use crate::types::decode_hex;

/// A structure with a canonical wire encoding of known size.
pub trait Encodable {
    /// Exact number of bytes `encode` writes
    fn encoded_size(&self) -> usize;

    fn encode(&self, writer: &mut Writer) -> Result<()>;

    /// Serialize into a buffer pre-sized to `encoded_size()`; a size/encode
    /// disagreement surfaces as `OutOfBounds` rather than a silently short buffer.
    fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::with_size(self.encoded_size());
        self.encode(&mut writer)?;
        writer.finish()
    }

    fn to_hex(&self) -> Result<String> {
        Ok(hex::encode(self.to_bytes()?))
    }
}

/// A structure that can be read from the wire.
pub trait Decodable: Sized {
    fn decode(reader: &mut Reader<'_>) -> Result<Self>;

    /// Decode from a buffer that must contain exactly one encoded value
    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let value = Self::decode(&mut reader)?;
        reader.finish()?;
        Ok(value)
    }

    fn from_hex(s: &str) -> Result<Self> {
        Self::from_bytes(&decode_hex(s)?)
    }
}
