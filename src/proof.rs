//! SPV proof records and their assembly from a chain data source
//!
//! A [`ProofRecord`] carries everything a relying party needs to check that
//! a transaction is committed to by a block header: the raw transaction
//! parts, the header, and the Merkle branch between them. Records are
//! produced by [`ProofAssembler`] from any [`ChainSource`] and can be checked
//! offline with [`ProofRecord::validate`].

use crate::block::{extract_merkle_root, extract_prev_block_hash, BlockHeader};
use crate::config::SpvConfig;
use crate::encode::Decodable;
use crate::error::{Result, SpvError};
use crate::hash::hash256_parts;
use crate::merkle::{build_branch, compute_root, verify_branch, MerkleBranch};
use crate::pow::header_meets_target;
use crate::transaction::{parse_vin, parse_vout, Transaction};
use crate::types::{Hash256, RawHeader};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// A block named by height or by hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockRef {
    Height(u32),
    Hash(Hash256),
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Height(h) => write!(f, "height {}", h),
            BlockRef::Hash(h) => write!(f, "block {}", h),
        }
    }
}

/// Header data as reported by a chain source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo {
    pub hash: Hash256,
    pub height: u32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub raw: RawHeader,
}

/// Read access to chain data, typically backed by a node's RPC interface.
///
/// Implementations own transport, retries and caching; failures should be
/// reported as [`SpvError::Source`].
pub trait ChainSource {
    /// Raw transaction hex for `txid`
    fn raw_transaction(&self, txid: &Hash256) -> Result<String>;

    fn block_header(&self, block: &BlockRef) -> Result<HeaderInfo>;

    /// Transaction ids of the block, in block order
    fn block_txids(&self, block: &BlockRef) -> Result<Vec<Hash256>>;
}

impl<S: ChainSource + ?Sized> ChainSource for &S {
    fn raw_transaction(&self, txid: &Hash256) -> Result<String> {
        (**self).raw_transaction(txid)
    }

    fn block_header(&self, block: &BlockRef) -> Result<HeaderInfo> {
        (**self).block_header(block)
    }

    fn block_txids(&self, block: &BlockRef) -> Result<Vec<Hash256>> {
        (**self).block_txids(block)
    }
}

/// Header part of a proof record. Digests appear twice: in display order
/// and, under the `_le` names, in internal byte order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmingHeader {
    #[serde(with = "hex_header")]
    pub raw: RawHeader,
    pub hash: Hash256,
    #[serde(with = "hex_hash_le")]
    pub hash_le: Hash256,
    pub height: u32,
    pub prevhash: Hash256,
    #[serde(with = "hex_hash_le")]
    pub prevhash_le: Hash256,
    pub merkle_root: Hash256,
    #[serde(with = "hex_hash_le")]
    pub merkle_root_le: Hash256,
}

impl ConfirmingHeader {
    /// Derive every field from the raw header
    pub fn from_raw(raw: RawHeader, height: u32) -> Self {
        let header = BlockHeader::from_raw(&raw);
        ConfirmingHeader {
            raw,
            hash: header.hash(),
            hash_le: header.hash(),
            height,
            prevhash: header.prev_block(),
            prevhash_le: header.prev_block(),
            merkle_root: header.merkle_root(),
            merkle_root_le: header.merkle_root(),
        }
    }

    /// Check the derived fields against the raw header
    pub fn validate(&self) -> Result<()> {
        if self.hash != self.hash_le {
            return Err(SpvError::NonMatchingDigests);
        }
        if self.hash != BlockHeader::from_raw(&self.raw).hash() {
            return Err(SpvError::WrongDigest);
        }
        if self.merkle_root != self.merkle_root_le {
            return Err(SpvError::NonMatchingMerkleRoots);
        }
        if self.merkle_root != extract_merkle_root(&self.raw) {
            return Err(SpvError::WrongMerkleRoot);
        }
        if self.prevhash != self.prevhash_le {
            return Err(SpvError::NonMatchingPrevHashes);
        }
        if self.prevhash != extract_prev_block_hash(&self.raw) {
            return Err(SpvError::WrongPrevHash);
        }
        Ok(())
    }
}

/// SPV inclusion proof for one confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofRecord {
    #[serde(with = "hex_u32_le")]
    pub version: u32,
    /// Varint-prefixed raw input vector
    #[serde(with = "hex_bytes")]
    pub vin: Vec<u8>,
    /// Varint-prefixed raw output vector
    #[serde(with = "hex_bytes")]
    pub vout: Vec<u8>,
    #[serde(with = "hex_u32_le")]
    pub locktime: u32,
    pub tx_id: Hash256,
    #[serde(with = "hex_hash_le")]
    pub tx_id_le: Hash256,
    /// Leaf position of the transaction in the block
    pub index: u64,
    pub confirming_header: ConfirmingHeader,
    /// Concatenated sibling hashes, leaf to root, internal byte order
    #[serde(with = "hex_bytes")]
    pub intermediate_nodes: Vec<u8>,
}

impl ProofRecord {
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// hash256(version || vin || vout || locktime)
    pub fn compute_txid(&self) -> Hash256 {
        hash256_parts(&[
            &self.version.to_le_bytes(),
            &self.vin,
            &self.vout,
            &self.locktime.to_le_bytes(),
        ])
    }

    /// Rebuild the (witness-stripped) transaction
    pub fn transaction(&self) -> Result<Transaction> {
        Transaction::from_parts(self.version, &self.vin, &self.vout, self.locktime)
    }

    pub fn branch(&self) -> Result<MerkleBranch> {
        MerkleBranch::from_bytes(&self.intermediate_nodes, self.index)
    }

    /// Validate against the default (mainnet) configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_with(&SpvConfig::default())
    }

    /// Check every part of the record, reporting the first failure
    pub fn validate_with(&self, config: &SpvConfig) -> Result<()> {
        parse_vin(&self.vin)?;
        parse_vout(&self.vout)?;

        if self.tx_id != self.tx_id_le {
            return Err(SpvError::NonMatchingTxIds);
        }
        if self.compute_txid() != self.tx_id {
            return Err(SpvError::WrongTxId);
        }

        self.confirming_header.validate()?;
        if config.check_header_work && !header_meets_target(&self.confirming_header.raw)? {
            return Err(SpvError::InsufficientWork);
        }

        let branch = self.branch()?;
        if !verify_branch(&self.tx_id, &branch, &self.confirming_header.merkle_root)? {
            return Err(SpvError::BadMerkleProof);
        }
        Ok(())
    }
}

/// Builds [`ProofRecord`]s from a [`ChainSource`]
#[derive(Debug)]
pub struct ProofAssembler<S> {
    source: S,
    config: SpvConfig,
}

impl<S: ChainSource> ProofAssembler<S> {
    pub fn new(source: S) -> Self {
        Self::with_config(source, SpvConfig::default())
    }

    pub fn with_config(source: S, config: SpvConfig) -> Self {
        ProofAssembler { source, config }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &SpvConfig {
        &self.config
    }

    /// Assemble a proof that `txid` is confirmed in `block`.
    ///
    /// 1. Fetch and decode the transaction; its txid must match
    /// 2. Fetch the header; the reported fields must match the raw bytes
    /// 3. Fetch the block's txids and locate the transaction
    /// 4. Recompute the Merkle root; it must be unmalleated and match the header
    /// 5. Build the branch
    pub fn assemble(&self, txid: &Hash256, block: &BlockRef) -> Result<ProofRecord> {
        debug!(%txid, %block, "assembling proof");

        let tx = Transaction::from_hex(&self.source.raw_transaction(txid)?)?;
        if tx.txid() != *txid {
            warn!(requested = %txid, decoded = %tx.txid(), "source returned a different transaction");
            return Err(SpvError::WrongTxId);
        }

        let info = self.source.block_header(block)?;
        let header = ConfirmingHeader::from_raw(info.raw, info.height);
        if header.hash != info.hash {
            return Err(SpvError::WrongDigest);
        }
        if header.merkle_root != info.merkle_root {
            return Err(SpvError::WrongMerkleRoot);
        }
        if header.prevhash != info.prev_block {
            return Err(SpvError::WrongPrevHash);
        }
        if self.config.check_header_work && !header_meets_target(&header.raw)? {
            return Err(SpvError::InsufficientWork);
        }

        let txids = self.source.block_txids(block)?;
        let index = txids
            .iter()
            .position(|id| id == txid)
            .ok_or_else(|| SpvError::TxNotInBlock(txid.to_hex()))?;
        debug!(index, leaves = txids.len(), "located transaction in block");

        let computed = compute_root(&txids)?;
        if computed.malleated {
            warn!(block = %header.hash, "block txids form a malleated tree");
            return Err(SpvError::MerkleMalleated);
        }
        if computed.root != header.merkle_root {
            warn!(computed = %computed.root, expected = %header.merkle_root, "merkle root mismatch");
            return Err(SpvError::MerkleRootMismatch);
        }

        let branch = build_branch(&txids, index)?;
        debug!(depth = branch.depth(), "proof assembled");

        Ok(ProofRecord {
            version: tx.version(),
            vin: tx.vin_bytes()?,
            vout: tx.vout_bytes()?,
            locktime: tx.locktime(),
            tx_id: tx.txid(),
            tx_id_le: tx.txid(),
            index: index as u64,
            confirming_header: header,
            intermediate_nodes: branch.to_bytes(),
        })
    }
}

mod hex_bytes {
    use crate::types::decode_hex;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        decode_hex(&s).map_err(serde::de::Error::custom)
    }
}

mod hex_header {
    use crate::types::{decode_hex, raw_header_from_slice, RawHeader};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(raw: &RawHeader, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(raw))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<RawHeader, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = decode_hex(&s).map_err(serde::de::Error::custom)?;
        raw_header_from_slice(&bytes).map_err(serde::de::Error::custom)
    }
}

mod hex_hash_le {
    use crate::types::Hash256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(hash: &Hash256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hash.to_hex_le())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Hash256, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash256::from_hex_le(&s).map_err(serde::de::Error::custom)
    }
}

/// 4-byte little-endian fields written as 8 hex digits, e.g. "01000000"
mod hex_u32_le {
    use crate::types::decode_hex;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u32, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value.to_le_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = decode_hex(&s).map_err(serde::de::Error::custom)?;
        let bytes: [u8; 4] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 4 bytes"))?;
        Ok(u32::from_le_bytes(bytes))
    }
}
