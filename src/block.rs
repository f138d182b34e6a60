//! Block headers, blocks, raw-header field extraction and header-chain
//! validation

use crate::constants::HEADER_SIZE;
use crate::cursor::{Reader, Writer};
use crate::encode::{Decodable, Encodable};
use crate::error::{Result, SpvError};
use crate::hash::hash256;
use crate::merkle::{compute_root, MerkleRoot};
use crate::pow::Target;
use crate::segwit;
use crate::transaction::Transaction;
use crate::types::{raw_header_from_slice, Hash256, RawHeader};
use crate::varint;
use primitive_types::U256;
use tracing::warn;

fn le_u32(header: &RawHeader, at: usize) -> u32 {
    u32::from_le_bytes([header[at], header[at + 1], header[at + 2], header[at + 3]])
}

fn le_hash(header: &RawHeader, at: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&header[at..at + 32]);
    out
}

pub fn extract_version(header: &RawHeader) -> i32 {
    le_u32(header, 0) as i32
}

/// Previous block hash bytes as they appear in the header
pub fn extract_prev_block_hash_le(header: &RawHeader) -> [u8; 32] {
    le_hash(header, 4)
}

pub fn extract_prev_block_hash(header: &RawHeader) -> Hash256 {
    Hash256::from_le_bytes(extract_prev_block_hash_le(header))
}

/// Merkle root bytes as they appear in the header
pub fn extract_merkle_root_le(header: &RawHeader) -> [u8; 32] {
    le_hash(header, 36)
}

pub fn extract_merkle_root(header: &RawHeader) -> Hash256 {
    Hash256::from_le_bytes(extract_merkle_root_le(header))
}

pub fn extract_timestamp(header: &RawHeader) -> u32 {
    le_u32(header, 68)
}

pub fn extract_bits(header: &RawHeader) -> u32 {
    le_u32(header, 72)
}

pub fn extract_nonce(header: &RawHeader) -> u32 {
    le_u32(header, 76)
}

pub fn extract_target(header: &RawHeader) -> Result<Target> {
    Target::from_compact(extract_bits(header))
}

pub fn extract_difficulty(header: &RawHeader) -> Result<U256> {
    extract_target(header)?.difficulty()
}

/// Block header: ℋ = (version, prev_block, merkle_root, time, bits, nonce)
///
/// The hash is computed once at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    version: i32,
    prev_block: Hash256,
    merkle_root: Hash256,
    time: u32,
    bits: u32,
    nonce: u32,
    hash: Hash256,
}

impl BlockHeader {
    pub fn new(version: i32, prev_block: Hash256, merkle_root: Hash256, time: u32, bits: u32, nonce: u32) -> Self {
        let mut header = BlockHeader {
            version,
            prev_block,
            merkle_root,
            time,
            bits,
            nonce,
            hash: Hash256::ZERO,
        };
        header.hash = hash256(&header.to_raw());
        header
    }

    pub fn from_raw(raw: &RawHeader) -> Self {
        BlockHeader {
            version: extract_version(raw),
            prev_block: extract_prev_block_hash(raw),
            merkle_root: extract_merkle_root(raw),
            time: extract_timestamp(raw),
            bits: extract_bits(raw),
            nonce: extract_nonce(raw),
            hash: hash256(raw),
        }
    }

    pub fn to_raw(&self) -> RawHeader {
        let mut raw = [0u8; HEADER_SIZE];
        raw[0..4].copy_from_slice(&self.version.to_le_bytes());
        raw[4..36].copy_from_slice(self.prev_block.as_ref());
        raw[36..68].copy_from_slice(self.merkle_root.as_ref());
        raw[68..72].copy_from_slice(&self.time.to_le_bytes());
        raw[72..76].copy_from_slice(&self.bits.to_le_bytes());
        raw[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        raw
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn prev_block(&self) -> Hash256 {
        self.prev_block
    }

    pub fn merkle_root(&self) -> Hash256 {
        self.merkle_root
    }

    pub fn time(&self) -> u32 {
        self.time
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn hash(&self) -> Hash256 {
        self.hash
    }

    pub fn target(&self) -> Result<Target> {
        Target::from_compact(self.bits)
    }

    pub fn difficulty(&self) -> Result<U256> {
        self.target()?.difficulty()
    }

    /// CheckProofOfWork: hash ≤ target(bits)
    pub fn meets_target(&self) -> Result<bool> {
        Ok(self.target()?.is_met_by(&self.hash))
    }
}

impl Encodable for BlockHeader {
    fn encoded_size(&self) -> usize {
        HEADER_SIZE
    }

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        writer.write_bytes(&self.to_raw())?;
        Ok(())
    }
}

impl Decodable for BlockHeader {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let raw: RawHeader = reader.read_array()?;
        Ok(BlockHeader::from_raw(&raw))
    }
}

/// Block: ℬ = (header, transactions)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Transaction>,
}

impl Block {
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Block { header, transactions }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn hash(&self) -> Hash256 {
        self.header.hash
    }

    pub fn txids(&self) -> Vec<Hash256> {
        self.transactions.iter().map(Transaction::txid).collect()
    }

    /// Size with every transaction in legacy form
    pub fn base_size(&self) -> usize {
        HEADER_SIZE
            + varint::size(self.transactions.len() as u64)
            + self.transactions.iter().map(Transaction::base_size).sum::<usize>()
    }

    pub fn total_size(&self) -> usize {
        HEADER_SIZE
            + varint::size(self.transactions.len() as u64)
            + self.transactions.iter().map(Transaction::total_size).sum::<usize>()
    }

    pub fn weight(&self) -> usize {
        segwit::block_weight(self)
    }

    /// Merkle root over txids (never wtxids)
    pub fn compute_merkle_root(&self) -> Result<MerkleRoot> {
        compute_root(&self.txids())
    }

    /// The recomputed root must be unmalleated and equal the header's
    pub fn check_merkle_root(&self) -> Result<()> {
        let computed = self.compute_merkle_root()?;
        if computed.malleated {
            warn!(block = %self.hash(), "merkle tree malleated");
            return Err(SpvError::MerkleMalleated);
        }
        if computed.root != self.header.merkle_root {
            return Err(SpvError::MerkleRootMismatch);
        }
        Ok(())
    }

    pub fn check_witness_commitment(&self) -> Result<()> {
        segwit::check_witness_commitment(self)
    }
}

impl Encodable for Block {
    fn encoded_size(&self) -> usize {
        self.total_size()
    }

    fn encode(&self, writer: &mut Writer) -> Result<()> {
        self.header.encode(writer)?;
        writer.write_varint(self.transactions.len() as u64)?;
        for tx in &self.transactions {
            tx.encode(writer)?;
        }
        Ok(())
    }
}

impl Decodable for Block {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let header = BlockHeader::decode(reader)?;
        let count = reader.read_varint()?;
        let mut transactions = Vec::with_capacity((count as usize).min(reader.left()));
        for _ in 0..count {
            transactions.push(Transaction::decode(reader)?);
        }
        Ok(Block { header, transactions })
    }
}

/// Validate a run of concatenated raw headers.
///
/// Each header after the first must name its predecessor's hash as
/// `prev_block` (`InvalidChain`), and every header's hash must meet its own
/// target (`InsufficientWork`). Returns the summed difficulty.
pub fn validate_header_chain(headers: &[u8]) -> Result<U256> {
    if headers.len() % HEADER_SIZE != 0 {
        return Err(SpvError::WrongLengthHeader);
    }

    let mut total = U256::zero();
    let mut previous: Option<Hash256> = None;
    for (i, chunk) in headers.chunks_exact(HEADER_SIZE).enumerate() {
        let header = BlockHeader::from_raw(&raw_header_from_slice(chunk)?);

        if let Some(prev) = previous {
            if header.prev_block != prev {
                warn!(index = i, expected = %prev, found = %header.prev_block, "header does not link");
                return Err(SpvError::InvalidChain);
            }
        }

        let target = header.target()?;
        if !target.is_met_by(&header.hash) {
            warn!(index = i, hash = %header.hash, "header does not meet its target");
            return Err(SpvError::InsufficientWork);
        }

        total = total.saturating_add(target.difficulty()?);
        previous = Some(header.hash);
    }
    Ok(total)
}
