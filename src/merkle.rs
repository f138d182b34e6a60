//! Bitcoin Merkle trees: root computation with malleation detection, branch
//! construction and branch verification
//!
//! Nodes are hash256(left || right) over internal-order digests. A level with
//! an odd number of nodes pairs its last node with itself.

use crate::constants::HASH256_SIZE;
use crate::error::{Result, SpvError};
use crate::hash::merkle_step;
use crate::types::{decode_hex, Hash256};
use tracing::debug;

/// Result of [`compute_root`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerkleRoot {
    pub root: Hash256,
    /// Two identical adjacent nodes were paired somewhere in the tree
    /// (CVE-2012-2459). The root must not be trusted when set.
    pub malleated: bool,
}

/// One reduction step: pair adjacent nodes, duplicating a trailing odd node.
/// Returns whether a real (non-padding) pair was identical.
fn reduce(level: &[Hash256]) -> (Vec<Hash256>, bool) {
    let mutated = level.chunks_exact(2).any(|pair| pair[0] == pair[1]);
    let next = level
        .chunks(2)
        .map(|pair| merkle_step(&pair[0], pair.get(1).unwrap_or(&pair[0])))
        .collect();
    (next, mutated)
}

/// ComputeMerkleRoot: [Hash256]⁺ → (Hash256, malleated)
pub fn compute_root(leaves: &[Hash256]) -> Result<MerkleRoot> {
    if leaves.is_empty() {
        return Err(SpvError::EmptyMerkleTree);
    }

    let mut level = leaves.to_vec();
    let mut malleated = false;
    let mut depth = 0;
    while level.len() > 1 {
        let (next, mutated) = reduce(&level);
        if mutated && !malleated {
            debug!(depth, width = level.len(), "identical sibling pair in merkle level");
        }
        malleated |= mutated;
        level = next;
        depth += 1;
    }

    Ok(MerkleRoot {
        root: level[0],
        malleated,
    })
}

/// Sibling hashes from a leaf up to (not including) the root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MerkleBranch {
    nodes: Vec<Hash256>,
    index: u64,
}

impl MerkleBranch {
    pub fn new(nodes: Vec<Hash256>, index: u64) -> Self {
        MerkleBranch { nodes, index }
    }

    /// Parse tightly packed internal-order node hashes
    pub fn from_bytes(bytes: &[u8], index: u64) -> Result<Self> {
        if bytes.len() % HASH256_SIZE != 0 {
            return Err(SpvError::MalformedBranch(format!(
                "{} bytes is not a whole number of hashes",
                bytes.len()
            )));
        }
        let nodes = bytes
            .chunks_exact(HASH256_SIZE)
            .map(Hash256::from_slice)
            .collect::<Result<Vec<_>>>()?;
        Ok(MerkleBranch { nodes, index })
    }

    pub fn from_hex(s: &str, index: u64) -> Result<Self> {
        Self::from_bytes(&decode_hex(s)?, index)
    }

    pub fn nodes(&self) -> &[Hash256] {
        &self.nodes
    }

    /// Leaf position the branch starts from
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn depth(&self) -> usize {
        self.nodes.len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.nodes.iter().flat_map(|n| n.to_le_bytes()).collect()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Fold the branch over `leaf`, returning the implied root
    pub fn root_from(&self, leaf: &Hash256) -> Result<Hash256> {
        if self.nodes.is_empty() && self.index != 0 {
            return Err(SpvError::MalformedBranch(
                "empty branch for a non-zero index".to_string(),
            ));
        }
        if self.nodes.len() < 64 && self.index >> self.nodes.len() != 0 {
            return Err(SpvError::MalformedBranch(format!(
                "index {} does not fit a branch of depth {}",
                self.index,
                self.nodes.len()
            )));
        }

        let mut index = self.index;
        let mut current = *leaf;
        for sibling in &self.nodes {
            current = if index & 1 == 0 {
                merkle_step(&current, sibling)
            } else {
                merkle_step(sibling, &current)
            };
            index >>= 1;
        }
        Ok(current)
    }
}

/// Collect the sibling path for `leaves[index]`
pub fn build_branch(leaves: &[Hash256], index: usize) -> Result<MerkleBranch> {
    if index >= leaves.len() {
        return Err(SpvError::IndexOutOfRange {
            index,
            count: leaves.len(),
        });
    }

    let mut nodes = Vec::new();
    let mut level = leaves.to_vec();
    let mut pos = index;
    while level.len() > 1 {
        let sibling = (pos ^ 1).min(level.len() - 1);
        nodes.push(level[sibling]);
        level = reduce(&level).0;
        pos >>= 1;
    }

    Ok(MerkleBranch {
        nodes,
        index: index as u64,
    })
}

/// VerifyBranch: true iff folding `branch` over `leaf` yields `root`
pub fn verify_branch(leaf: &Hash256, branch: &MerkleBranch, root: &Hash256) -> Result<bool> {
    Ok(branch.root_from(leaf)? == *root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash256;

    fn leaf(n: u8) -> Hash256 {
        hash256(&[n])
    }

    fn leaves(count: u8) -> Vec<Hash256> {
        (0..count).map(leaf).collect()
    }

    #[test]
    fn test_single_leaf() {
        let l = leaf(1);
        let root = compute_root(&[l]).unwrap();
        assert_eq!(root.root, l);
        assert!(!root.malleated);

        let branch = build_branch(&[l], 0).unwrap();
        assert_eq!(branch.depth(), 0);
        assert!(verify_branch(&l, &branch, &root.root).unwrap());
    }

    #[test]
    fn test_two_identical_leaves_are_malleated() {
        let l = leaf(9);
        let root = compute_root(&[l, l]).unwrap();
        assert!(root.malleated);
    }

    #[test]
    fn test_odd_count_duplicates_last_without_malleation() {
        let ls = leaves(3);
        let root = compute_root(&ls).unwrap();
        assert!(!root.malleated);
        let expected = merkle_step(&merkle_step(&ls[0], &ls[1]), &merkle_step(&ls[2], &ls[2]));
        assert_eq!(root.root, expected);
    }

    #[test]
    fn test_cve_2012_2459_duplicate_tail() {
        // [a b c] and [a b c c] share a root; the second must be flagged
        let ls = leaves(3);
        let mut padded = ls.clone();
        padded.push(ls[2]);
        let honest = compute_root(&ls).unwrap();
        let forged = compute_root(&padded).unwrap();
        assert_eq!(honest.root, forged.root);
        assert!(!honest.malleated);
        assert!(forged.malleated);
    }

    #[test]
    fn test_duplicate_subtree_detected_at_higher_level() {
        // six leaves pad to [h01 h23 h45 h45] at level one
        let ls = leaves(6);
        let mut forged = ls.clone();
        forged.extend_from_slice(&ls[4..6]);
        assert!(!compute_root(&ls).unwrap().malleated);
        let result = compute_root(&forged).unwrap();
        assert!(result.malleated);
        assert_eq!(result.root, compute_root(&ls).unwrap().root);
    }

    #[test]
    fn test_every_branch_verifies() {
        for count in 1..=9u8 {
            let ls = leaves(count);
            let root = compute_root(&ls).unwrap().root;
            for i in 0..ls.len() {
                let branch = build_branch(&ls, i).unwrap();
                assert!(verify_branch(&ls[i], &branch, &root).unwrap(), "count {} index {}", count, i);
            }
        }
    }

    #[test]
    fn test_wrong_leaf_fails() {
        let ls = leaves(4);
        let root = compute_root(&ls).unwrap().root;
        let branch = build_branch(&ls, 1).unwrap();
        assert!(!verify_branch(&ls[2], &branch, &root).unwrap());
    }

    #[test]
    fn test_empty_tree() {
        assert_eq!(compute_root(&[]), Err(SpvError::EmptyMerkleTree));
    }

    #[test]
    fn test_index_out_of_range() {
        assert_eq!(
            build_branch(&leaves(3), 3),
            Err(SpvError::IndexOutOfRange { index: 3, count: 3 })
        );
    }

    #[test]
    fn test_malformed_branches() {
        assert!(matches!(MerkleBranch::from_bytes(&[0u8; 33], 0), Err(SpvError::MalformedBranch(_))));

        let empty = MerkleBranch::new(vec![], 1);
        assert!(matches!(verify_branch(&leaf(0), &empty, &leaf(0)), Err(SpvError::MalformedBranch(_))));

        let shallow = MerkleBranch::new(vec![leaf(1), leaf(2)], 4);
        assert!(matches!(verify_branch(&leaf(0), &shallow, &leaf(0)), Err(SpvError::MalformedBranch(_))));
    }

    #[test]
    fn test_branch_bytes_round_trip() {
        let branch = build_branch(&leaves(5), 4).unwrap();
        let parsed = MerkleBranch::from_bytes(&branch.to_bytes(), 4).unwrap();
        assert_eq!(parsed, branch);
        assert_eq!(MerkleBranch::from_hex(&branch.to_hex(), 4).unwrap(), branch);
    }
}
