//! Core value types: fixed-length digests and raw headers

use crate::constants::{HASH160_SIZE, HASH256_SIZE, HEADER_SIZE};
use crate::error::{Result, SpvError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Raw 80-byte block header
pub type RawHeader = [u8; HEADER_SIZE];

/// Double-SHA256 digest held in internal (wire, little-endian) byte order.
///
/// Hex I/O without a suffix uses the byte-reversed display form that block
/// explorers and RPC nodes print; the `_le` variants use internal order.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash256([u8; HASH256_SIZE]);

impl Hash256 {
    pub const ZERO: Hash256 = Hash256([0; HASH256_SIZE]);

    pub const fn from_le_bytes(bytes: [u8; HASH256_SIZE]) -> Self {
        Hash256(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; HASH256_SIZE] = slice.try_into().map_err(|_| SpvError::InvalidLength {
            expected: HASH256_SIZE,
            got: slice.len(),
        })?;
        Ok(Hash256(bytes))
    }

    /// Parse display (big-endian) hex
    pub fn from_hex(s: &str) -> Result<Self> {
        let mut hash = Self::from_hex_le(s)?;
        hash.0.reverse();
        Ok(hash)
    }

    /// Parse internal-order hex
    pub fn from_hex_le(s: &str) -> Result<Self> {
        Self::from_slice(&decode_hex(s)?)
    }

    pub fn as_bytes(&self) -> &[u8; HASH256_SIZE] {
        &self.0
    }

    pub fn to_le_bytes(self) -> [u8; HASH256_SIZE] {
        self.0
    }

    pub fn to_be_bytes(self) -> [u8; HASH256_SIZE] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }

    /// Display (big-endian) hex
    pub fn to_hex(&self) -> String {
        hex::encode(self.to_be_bytes())
    }

    pub fn to_hex_le(&self) -> String {
        hex::encode(self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; HASH256_SIZE]
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self.to_hex())
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// RIPEMD160(SHA256) digest, as embedded in P2PKH/P2SH/P2WPKH scripts
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash160([u8; HASH160_SIZE]);

impl Hash160 {
    pub const fn from_bytes(bytes: [u8; HASH160_SIZE]) -> Self {
        Hash160(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; HASH160_SIZE] = slice.try_into().map_err(|_| SpvError::InvalidLength {
            expected: HASH160_SIZE,
            got: slice.len(),
        })?;
        Ok(Hash160(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; HASH160_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl AsRef<[u8]> for Hash160 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Hash160 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash160({})", self.to_hex())
    }
}

/// A digest embedded in a standard output script. The variant fixes the length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptHash {
    Hash160(Hash160),
    Hash256([u8; HASH256_SIZE]),
}

impl ScriptHash {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            ScriptHash::Hash160(h) => h.as_ref(),
            ScriptHash::Hash256(h) => h,
        }
    }
}

/// Decode hex, tolerating a leading `0x` the way RPC fixtures are often written
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let trimmed = s.strip_prefix("0x").unwrap_or(s);
    Ok(hex::decode(trimmed)?)
}

pub fn raw_header_from_slice(slice: &[u8]) -> Result<RawHeader> {
    slice.try_into().map_err(|_| SpvError::WrongLengthHeader)
}
