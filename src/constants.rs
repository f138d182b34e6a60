//! Bitcoin wire and consensus constants

/// Size of a serialized block header
pub const HEADER_SIZE: usize = 80;

/// Size of a double-SHA256 digest
pub const HASH256_SIZE: usize = 32;

/// Size of a RIPEMD160(SHA256) digest
pub const HASH160_SIZE: usize = 20;

/// Outpoint index marking a coinbase input
pub const NULL_OUTPOINT_INDEX: u32 = 0xffffffff;

/// Sequence number for final transaction
pub const SEQUENCE_FINAL: u32 = 0xffffffff;

/// Sequence numbers below this signal replace-by-fee
pub const SEQUENCE_RBF: u32 = 0xfffffffe;

/// Segwit serialization marker byte
pub const WITNESS_MARKER: u8 = 0x00;

/// Segwit serialization flag byte (bit 0 = witness data present)
pub const WITNESS_FLAG: u8 = 0x01;

/// Witness scale factor used in weight calculations
pub const WITNESS_SCALE_FACTOR: usize = 4;

/// Maximum size of a single pushed script element
pub const MAX_SCRIPT_ELEMENT_SIZE: usize = 520;

/// Maximum number of public keys in a standard bare multisig
pub const MAX_MULTISIG_KEYS: u8 = 15;

/// Difficulty adjustment interval: 2016 blocks
pub const DIFFICULTY_ADJUSTMENT_INTERVAL: u64 = 2016;

/// Target time per block: 10 minutes
pub const TARGET_TIME_PER_BLOCK: u64 = 600;

/// Compact form of the difficulty-1 target (mainnet proof of work limit)
pub const MAX_TARGET_BITS: u32 = 0x1d00ffff;

/// Compact form of the regtest proof of work limit
pub const REGTEST_TARGET_BITS: u32 = 0x207fffff;

/// Prefix of the coinbase output carrying the witness commitment:
/// OP_RETURN, push 36, 0xaa21a9ed
pub const WITNESS_COMMITMENT_HEADER: [u8; 6] = [0x6a, 0x24, 0xaa, 0x21, 0xa9, 0xed];
