//! Error types for decoding and SPV verification

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpvError {
    #[error("Out of bounds access at offset {offset}")]
    OutOfBounds { offset: usize },

    #[error("Non-canonical varint at offset {offset}")]
    NonCanonicalVarint { offset: usize },

    #[error("Cannot end without a mark")]
    EmptyMarkStack,

    #[error("Checksum mismatch at offset {offset}")]
    ChecksumMismatch { offset: usize },

    #[error("Unknown witness flag: {0:#04x}")]
    UnknownWitnessFlag(u8),

    #[error("Transaction has zero inputs and non-empty outputs")]
    ZeroInputNonEmptyOutputs,

    #[error("Trailing data after structure: {0} bytes")]
    TrailingData(usize),

    #[error("Invalid length: expected {expected}, got {got}")]
    InvalidLength { expected: usize, got: usize },

    #[error("Script is not a hash script")]
    NotAHashScript,

    #[error("Script is not nulldata")]
    NotNulldata,

    #[error("Non-minimal push at offset {offset}")]
    NonMinimalPush { offset: usize },

    #[error("Push of {size} bytes exceeds the element size limit")]
    PushTooLarge { size: usize },

    #[error("Invalid vin")]
    InvalidVin,

    #[error("Invalid vout")]
    InvalidVout,

    #[error("Empty merkle tree")]
    EmptyMerkleTree,

    #[error("Leaf index {index} out of range for {count} leaves")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Malformed merkle branch: {0}")]
    MalformedBranch(String),

    #[error("Merkle tree is malleated")]
    MerkleMalleated,

    #[error("Merkle root mismatch")]
    MerkleRootMismatch,

    #[error("Witness commitment mismatch")]
    WitnessCommitmentMismatch,

    #[error("Target overflows the proof of work limit")]
    TargetOverflow,

    #[error("Negative compact target")]
    NegativeTarget,

    #[error("Zero target")]
    ZeroTarget,

    #[error("Header not exactly 80 bytes")]
    WrongLengthHeader,

    #[error("Header does not meet its own difficulty target")]
    InsufficientWork,

    #[error("Header does not reference its parent")]
    InvalidChain,

    #[error("Header hash is not the digest of the raw header")]
    WrongDigest,

    #[error("Header hash and hash_le do not match")]
    NonMatchingDigests,

    #[error("Merkle root does not match the raw header")]
    WrongMerkleRoot,

    #[error("Merkle root and merkle_root_le do not match")]
    NonMatchingMerkleRoots,

    #[error("Previous hash does not match the raw header")]
    WrongPrevHash,

    #[error("Previous hash and prevhash_le do not match")]
    NonMatchingPrevHashes,

    #[error("Transaction id is not the digest of the transaction")]
    WrongTxId,

    #[error("Transaction id and tx_id_le do not match")]
    NonMatchingTxIds,

    #[error("Merkle proof does not connect the transaction to the header")]
    BadMerkleProof,

    #[error("Transaction {0} index not found in block")]
    TxNotInBlock(String),

    #[error("Invalid hex: {0}")]
    Hex(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Chain source error: {0}")]
    Source(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<hex::FromHexError> for SpvError {
    fn from(e: hex::FromHexError) -> Self {
        SpvError::Hex(e.to_string())
    }
}

impl From<serde_json::Error> for SpvError {
    fn from(e: serde_json::Error) -> Self {
        SpvError::Json(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SpvError>;
