//! Hash primitives used by the wire format and Merkle trees

use crate::types::{Hash160, Hash256};
use bitcoin_hashes::{sha256d, Hash as BitcoinHash, HashEngine};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Single SHA256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// RIPEMD160(SHA256(data))
pub fn hash160(data: &[u8]) -> Hash160 {
    let sha = Sha256::digest(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(sha));
    Hash160::from_bytes(out)
}

/// SHA256(SHA256(data))
pub fn hash256(data: &[u8]) -> Hash256 {
    hash256_parts(&[data])
}

/// Double-SHA256 over the concatenation of `parts`, without allocating the
/// concatenation
pub fn hash256_parts(parts: &[&[u8]]) -> Hash256 {
    let mut engine = sha256d::Hash::engine();
    for part in parts {
        engine.input(part);
    }
    Hash256::from_le_bytes(sha256d::Hash::from_engine(engine).into_inner())
}

/// One Merkle tree node: hash256(left || right)
pub fn merkle_step(left: &Hash256, right: &Hash256) -> Hash256 {
    hash256_parts(&[left.as_ref(), right.as_ref()])
}
