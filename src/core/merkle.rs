use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use serde::{Deserialize, Serialize};

/// Binary hash tree over an ordered list of transaction ids
///
/// Leaves are the ids themselves. Each parent is `sha256(left || right)`;
/// a level with an odd number of nodes pairs its last node with itself.
/// A single leaf is its own root.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    // levels[0] holds the leaves, the last level holds only the root
    levels: Vec<Vec<Vec<u8>>>,
}

/// Merkle proof for transaction inclusion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Transaction id being proven
    pub transaction_hash: Vec<u8>,
    /// Merkle root the proof resolves to
    pub merkle_root: Vec<u8>,
    /// Sibling hashes from the leaf level upwards
    pub proof_path: Vec<ProofElement>,
    /// Index of the transaction in the block
    pub transaction_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofElement {
    /// Sibling hash
    pub hash: Vec<u8>,
    /// Direction: true if sibling is on the right, false if on the left
    pub is_right: bool,
}

impl MerkleTree {
    /// Build the full tree, keeping every level for proof generation
    pub fn new(leaf_hashes: &[Vec<u8>]) -> Result<Self> {
        if leaf_hashes.is_empty() {
            return Err(BlockchainError::InvalidInput(
                "Cannot build Merkle tree from empty leaf list".to_string(),
            ));
        }

        let mut levels = vec![leaf_hashes.to_vec()];
        while let Some(current) = levels.last().filter(|level| level.len() > 1) {
            let next = Self::next_level(current);
            levels.push(next);
        }

        Ok(MerkleTree { levels })
    }

    pub fn root(&self) -> &[u8] {
        // new() never produces an empty tree
        &self.levels[self.levels.len() - 1][0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Generate a Merkle proof for the leaf at the given index
    pub fn generate_proof(&self, transaction_index: usize) -> Result<MerkleProof> {
        if transaction_index >= self.leaf_count() {
            return Err(BlockchainError::InvalidInput(format!(
                "Transaction index {} out of bounds (leaves: {})",
                transaction_index,
                self.leaf_count()
            )));
        }

        let mut proof_path = Vec::with_capacity(self.levels.len() - 1);
        let mut index = transaction_index;
        for level in &self.levels[..self.levels.len() - 1] {
            let is_right = index % 2 == 0;
            let sibling = if is_right { index + 1 } else { index - 1 };
            let hash = level.get(sibling).unwrap_or(&level[index]).clone();
            proof_path.push(ProofElement { hash, is_right });
            index /= 2;
        }

        Ok(MerkleProof {
            transaction_hash: self.levels[0][transaction_index].clone(),
            merkle_root: self.root().to_vec(),
            proof_path,
            transaction_index,
        })
    }

    /// Verify a Merkle proof against the root it carries
    pub fn verify_proof(proof: &MerkleProof) -> bool {
        let mut current_hash = proof.transaction_hash.clone();

        for element in &proof.proof_path {
            current_hash = if element.is_right {
                Self::hash_pair(&current_hash, &element.hash)
            } else {
                Self::hash_pair(&element.hash, &current_hash)
            };
        }

        current_hash == proof.merkle_root
    }

    /// Compute only the root, without materialising the tree
    pub fn calculate_merkle_root(leaf_hashes: &[Vec<u8>]) -> Result<Vec<u8>> {
        if leaf_hashes.is_empty() {
            return Err(BlockchainError::InvalidInput(
                "Cannot calculate Merkle root from empty leaf list".to_string(),
            ));
        }

        let mut current_level = leaf_hashes.to_vec();
        while current_level.len() > 1 {
            current_level = Self::next_level(&current_level);
        }

        Ok(current_level.swap_remove(0))
    }

    fn next_level(level: &[Vec<u8>]) -> Vec<Vec<u8>> {
        level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => Self::hash_pair(left, right),
                [last] => Self::hash_pair(last, last),
                _ => unreachable!("chunks(2) yields one or two elements"),
            })
            .collect()
    }

    fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
        let mut combined = Vec::with_capacity(left.len() + right.len());
        combined.extend_from_slice(left);
        combined.extend_from_slice(right);
        sha256_digest(&combined)
    }
}
