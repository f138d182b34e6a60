//! # SPV-Proof
//!
//! Bitcoin wire-format decoding and simplified payment verification.
//!
//! This crate parses raw transactions, scripts and block headers, computes and
//! checks Merkle commitments, evaluates proof of work and difficulty
//! retargeting, and assembles self-contained inclusion proofs that a light
//! client can check without a full node.
//!
//! ## Architecture
//!
//! - Byte layer: [`varint`], [`cursor`], [`encode`]
//! - Data model: [`script`], [`witness`], [`transaction`], [`block`]
//! - Commitments: [`merkle`], [`segwit`]
//! - Work: [`pow`], parameterised by [`config`]
//! - Proofs: [`proof`]
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: decoding and verification are deterministic and side-effect-free
//! 2. **Strict Decoding**: non-canonical or trailing bytes are errors, never ignored
//! 3. **Exact Version Pinning**: hashing and big-integer dependencies pinned to exact versions
//! 4. **Data Source Agnostic**: chain access goes through the [`ChainSource`] trait
//!
//! ## Usage
//!
//! ```rust
//! use spv_proof::SpvProof;
//!
//! let spv = SpvProof::new();
//! let tx = spv.decode_transaction(
//!     "0100000001c997a5e56e104102fa209c6a852dd90660a20b2d9c352423edce25857fcd3704000000004847304402204e45e16932b8af514961a1d3a1a25fdf3f4f7732e9d624c6c61548ab5fb8cd410220181522ec8eca07de4860a4acdd12909d831cc56cbbac4622082221a8768d1d0901ffffffff0200ca9a3b00000000434104ae1a62fe09c5f51b13905f07f06b99a2f7159b2225f374cd378d71302fa28414e7aab37397f554a7df5f142c21c1b7303b8a0626f1baded5c72a704f7e6cd84cac00286bee0000000043410411db93e1dcdb8a016b49840f8c53bc1eb68a382e97b1482ecad7b148a6909a5cb2e0eaddfb84ccf9744464f82e160bfa9b8b64f9d4c03f999b8643f656b412a3ac00000000",
//! ).unwrap();
//! assert_eq!(
//!     tx.txid().to_hex(),
//!     "f4184fc596403b9d638783cf57adfe4c75c605f6356fbc91338530e9831e9e16"
//! );
//! ```

pub mod error;
pub mod constants;
pub mod types;
pub mod hash;
pub mod varint;
pub mod cursor;
pub mod encode;
pub mod opcodes;
pub mod script;
pub mod witness;
pub mod transaction;
pub mod segwit;
pub mod block;
pub mod merkle;
pub mod pow;
pub mod config;
pub mod proof;

// Re-export commonly used types
pub use block::{Block, BlockHeader};
pub use config::{ChainParams, Network, SpvConfig};
pub use encode::{Decodable, Encodable};
pub use error::{Result, SpvError};
pub use merkle::{MerkleBranch, MerkleRoot};
pub use pow::Target;
pub use primitive_types::U256;
pub use proof::{BlockRef, ChainSource, ConfirmingHeader, HeaderInfo, ProofAssembler, ProofRecord};
pub use script::{Op, Script, ScriptType};
pub use transaction::{Input, InputType, Outpoint, Output, Transaction};
pub use types::{Hash160, Hash256, RawHeader, ScriptHash};
pub use witness::Witness;

/// Entry point bundling the verification operations under one configuration
///
/// # Examples
///
/// ```
/// use spv_proof::{SpvConfig, SpvProof};
///
/// let spv = SpvProof::with_config(SpvConfig::for_testing());
/// assert!(!spv.config().check_header_work);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SpvProof {
    config: SpvConfig,
}

impl SpvProof {
    /// Create an instance with mainnet parameters
    ///
    /// # Examples
    ///
    /// ```
    /// use spv_proof::{Network, SpvProof};
    ///
    /// let spv = SpvProof::new();
    /// assert_eq!(spv.config().network, Network::Mainnet);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SpvConfig) -> Self {
        SpvProof { config }
    }

    pub fn config(&self) -> &SpvConfig {
        &self.config
    }

    /// Decode a legacy or segwit transaction from hex
    pub fn decode_transaction(&self, hex: &str) -> Result<Transaction> {
        Transaction::from_hex(hex)
    }

    /// Decode an 80-byte header from hex
    ///
    /// # Examples
    ///
    /// ```
    /// use spv_proof::SpvProof;
    ///
    /// let spv = SpvProof::new();
    /// let header = spv.decode_header(
    ///     "0100000055bd840a78798ad0da853f68974f3d183e2bd1db6a842c1feecf222a00000000ff104ccb05421ab93e63f8c3ce5c2c2e9dbb37de2764b3a3175c8166562cac7d51b96a49ffff001d283e9e70",
    /// ).unwrap();
    /// assert_eq!(header.bits(), 0x1d00ffff);
    /// assert!(spv.check_proof_of_work(&header).unwrap());
    /// ```
    pub fn decode_header(&self, hex: &str) -> Result<BlockHeader> {
        BlockHeader::from_hex(hex)
    }

    /// CheckProofOfWork for a decoded header
    pub fn check_proof_of_work(&self, header: &BlockHeader) -> Result<bool> {
        header.meets_target()
    }

    /// Validate a run of concatenated headers, returning their summed difficulty
    ///
    /// # Examples
    ///
    /// ```
    /// use spv_proof::{SpvProof, U256};
    ///
    /// let spv = SpvProof::new();
    /// assert_eq!(spv.validate_header_chain(&[]).unwrap(), U256::zero());
    /// ```
    pub fn validate_header_chain(&self, headers: &[u8]) -> Result<U256> {
        block::validate_header_chain(headers)
    }

    /// Compact bits for the next period under the configured chain parameters
    ///
    /// # Examples
    ///
    /// ```
    /// use spv_proof::SpvProof;
    ///
    /// let spv = SpvProof::new();
    /// let next = spv.retarget(0x17371ef4, 1545175965, 1546275302).unwrap();
    /// assert_eq!(next, 0x173218a5);
    /// ```
    pub fn retarget(&self, previous_bits: u32, first_timestamp: u32, second_timestamp: u32) -> Result<u32> {
        let previous = Target::from_compact(previous_bits)?;
        Ok(pow::retarget(&previous, first_timestamp, second_timestamp, &self.config.params)?.to_compact())
    }

    /// Merkle root of `leaves`, flagging CVE-2012-2459 malleation
    pub fn merkle_root(&self, leaves: &[Hash256]) -> Result<MerkleRoot> {
        merkle::compute_root(leaves)
    }

    /// Check a Merkle branch given as concatenated sibling hashes
    pub fn verify_merkle_branch(&self, leaf: &Hash256, nodes: &[u8], index: u64, root: &Hash256) -> Result<bool> {
        let branch = MerkleBranch::from_bytes(nodes, index)?;
        merkle::verify_branch(leaf, &branch, root)
    }

    /// Check a full block: Merkle root, then witness commitment
    pub fn validate_block(&self, block: &Block) -> Result<()> {
        block.check_merkle_root()?;
        block.check_witness_commitment()
    }

    /// Check a proof record under the configured parameters
    pub fn validate_proof(&self, proof: &ProofRecord) -> Result<()> {
        proof.validate_with(&self.config)
    }

    /// Assemble a proof for `txid` in `block` from `source`
    pub fn assemble_proof<S: ChainSource>(&self, source: S, txid: &Hash256, block: &BlockRef) -> Result<ProofRecord> {
        ProofAssembler::with_config(source, self.config.clone()).assemble(txid, block)
    }
}
