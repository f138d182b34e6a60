//! Segregated Witness accounting: weight, virtual size, and the coinbase
//! witness commitment

use crate::block::Block;
use crate::constants::{WITNESS_COMMITMENT_HEADER, WITNESS_SCALE_FACTOR};
use crate::error::{Result, SpvError};
use crate::merkle::{compute_root, MerkleRoot};
use crate::transaction::Transaction;
use crate::types::Hash256;
use bitcoin_hashes::{sha256d, Hash as BitcoinHash, HashEngine};

/// Weight(tx) = 3 × |Serialize(tx ∖ witness)| + |Serialize(tx)|
pub fn transaction_weight(tx: &Transaction) -> usize {
    tx.base_size() * (WITNESS_SCALE_FACTOR - 1) + tx.total_size()
}

/// Weight / 4, rounded up
pub fn transaction_vsize(tx: &Transaction) -> usize {
    (transaction_weight(tx) + WITNESS_SCALE_FACTOR - 1) / WITNESS_SCALE_FACTOR
}

pub fn block_weight(block: &Block) -> usize {
    block.base_size() * (WITNESS_SCALE_FACTOR - 1) + block.total_size()
}

/// Merkle root over wtxids, with the coinbase's wtxid taken as zero
pub fn witness_merkle_root(transactions: &[Transaction]) -> Result<MerkleRoot> {
    let leaves: Vec<Hash256> = transactions
        .iter()
        .enumerate()
        .map(|(i, tx)| if i == 0 { Hash256::ZERO } else { tx.wtxid() })
        .collect();
    compute_root(&leaves)
}

/// Commitment = hash256(witness_root || reserved_value)
pub fn witness_commitment(witness_root: &Hash256, reserved_value: &[u8]) -> Hash256 {
    let mut engine = sha256d::Hash::engine();
    engine.input(witness_root.as_ref());
    engine.input(reserved_value);
    Hash256::from_le_bytes(sha256d::Hash::from_engine(engine).into_inner())
}

/// Commitment carried by the last coinbase output starting with
/// `OP_RETURN 0x24 aa21a9ed`
pub fn find_witness_commitment(coinbase: &Transaction) -> Option<Hash256> {
    coinbase
        .outputs()
        .iter()
        .rev()
        .map(|output| output.script_pubkey.as_bytes())
        .find(|script| script.len() >= 38 && script.starts_with(&WITNESS_COMMITMENT_HEADER))
        .and_then(|script| Hash256::from_slice(&script[6..38]).ok())
}

/// Check the coinbase witness commitment against the block's wtxids.
///
/// A block without a commitment is valid only if no transaction carries
/// witness data. With a commitment, the coinbase witness must be a single
/// 32-byte reserved value.
pub fn check_witness_commitment(block: &Block) -> Result<()> {
    let coinbase = match block.transactions().first() {
        Some(tx) => tx,
        None => return Err(SpvError::EmptyMerkleTree),
    };

    let commitment = match find_witness_commitment(coinbase) {
        Some(c) => c,
        None if block.transactions().iter().any(Transaction::has_witness) => {
            return Err(SpvError::WitnessCommitmentMismatch);
        }
        None => return Ok(()),
    };

    let reserved = match coinbase.inputs().first().map(|input| input.witness.items()) {
        Some([value]) if value.len() == 32 => value,
        _ => return Err(SpvError::WitnessCommitmentMismatch),
    };

    let witness_root = witness_merkle_root(block.transactions())?;
    if witness_root.malleated {
        return Err(SpvError::MerkleMalleated);
    }
    if witness_commitment(&witness_root.root, reserved) != commitment {
        return Err(SpvError::WitnessCommitmentMismatch);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockHeader;
    use crate::constants::SEQUENCE_FINAL;
    use crate::script::Script;
    use crate::transaction::{Input, Output, Outpoint};
    use crate::witness::Witness;

    fn spend_with_witness() -> Transaction {
        let input = Input::new(Outpoint::new(Hash256::from_le_bytes([3; 32]), 0), Script::default(), SEQUENCE_FINAL)
            .with_witness(Witness::new(vec![vec![0x30; 72], vec![0x02; 33]]));
        let mut p2wpkh = vec![0x00, 0x14];
        p2wpkh.extend_from_slice(&[0x55; 20]);
        Transaction::new(2, vec![input], vec![Output::new(1_000, Script::new(p2wpkh))], 0).unwrap()
    }

    fn coinbase(commitment: Option<Hash256>, reserved: Vec<Vec<u8>>) -> Transaction {
        let input = Input::new(Outpoint::null(), Script::new(vec![0x01, 0x2a]), SEQUENCE_FINAL)
            .with_witness(Witness::new(reserved));
        let mut outputs = vec![Output::new(50, Script::new(vec![0x51]))];
        if let Some(c) = commitment {
            let mut script = WITNESS_COMMITMENT_HEADER.to_vec();
            script.extend_from_slice(c.as_bytes());
            outputs.push(Output::new(0, Script::new(script)));
        }
        Transaction::new(1, vec![input], outputs, 0).unwrap()
    }

    fn block_of(transactions: Vec<Transaction>) -> Block {
        let txids: Vec<Hash256> = transactions.iter().map(Transaction::txid).collect();
        let root = compute_root(&txids).unwrap().root;
        let header = BlockHeader::new(0x2000_0000, Hash256::ZERO, root, 0, 0x207fffff, 0);
        Block::new(header, transactions)
    }

    #[test]
    fn test_valid_commitment() {
        let spend = spend_with_witness();
        let root = witness_merkle_root(&[coinbase(None, vec![]), spend.clone()]).unwrap().root;
        let commitment = witness_commitment(&root, &[0u8; 32]);
        let block = block_of(vec![coinbase(Some(commitment), vec![vec![0u8; 32]]), spend]);
        assert_eq!(check_witness_commitment(&block), Ok(()));
    }

    #[test]
    fn test_wrong_commitment() {
        let block = block_of(vec![
            coinbase(Some(Hash256::from_le_bytes([1; 32])), vec![vec![0u8; 32]]),
            spend_with_witness(),
        ]);
        assert_eq!(check_witness_commitment(&block), Err(SpvError::WitnessCommitmentMismatch));
    }

    #[test]
    fn test_missing_commitment_with_witness_data() {
        let block = block_of(vec![coinbase(None, vec![]), spend_with_witness()]);
        assert_eq!(check_witness_commitment(&block), Err(SpvError::WitnessCommitmentMismatch));
    }

    #[test]
    fn test_no_commitment_needed_without_witness() {
        let block = block_of(vec![coinbase(None, vec![])]);
        assert_eq!(check_witness_commitment(&block), Ok(()));
    }

    #[test]
    fn test_bad_reserved_value() {
        let spend = spend_with_witness();
        let root = witness_merkle_root(&[coinbase(None, vec![]), spend.clone()]).unwrap().root;
        let commitment = witness_commitment(&root, &[0u8; 32]);
        let block = block_of(vec![coinbase(Some(commitment), vec![vec![0u8; 31]]), spend]);
        assert_eq!(check_witness_commitment(&block), Err(SpvError::WitnessCommitmentMismatch));
    }

    #[test]
    fn test_weight_of_legacy_transaction() {
        let tx = coinbase(None, vec![]);
        assert_eq!(transaction_weight(&tx), tx.base_size() * 4);
        assert_eq!(transaction_vsize(&tx), tx.base_size());
    }

    #[test]
    fn test_witness_discount() {
        let tx = spend_with_witness();
        let witness_bytes = tx.total_size() - tx.base_size();
        assert_eq!(transaction_weight(&tx), tx.base_size() * 4 + witness_bytes);
    }

    #[test]
    fn test_block_weight_sums_transactions() {
        let block = block_of(vec![coinbase(None, vec![]), spend_with_witness()]);
        let tx_weight: usize = block.transactions().iter().map(transaction_weight).sum();
        // header and tx count are non-witness bytes
        assert_eq!(block_weight(&block), tx_weight + (80 + 1) * 4);
    }
}
