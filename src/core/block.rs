use crate::config::GLOBAL_CONFIG;
use crate::core::{MerkleProof, MerkleTree, MiningOptions, ProofOfWork, Transaction};
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, deserialize, serialize};
use data_encoding::HEXLOWER;
use log::info;
use serde::{Deserialize, Serialize};

/// Format tag written into every block of this chain generation
pub const BLOCK_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    version: u32,
    timestamp: i64,
    transactions: Vec<Transaction>,
    hash: Vec<u8>,
    pre_block_hash: Vec<u8>, // empty for genesis
    difficulty: u8,
    nonce: u64,
    height: u64,
}

impl Block {
    /// Build and mine a block using the mining settings from the global config
    pub fn new_block(
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        height: u64,
        difficulty: u8,
    ) -> Result<Block> {
        let options = MiningOptions::from_config(&GLOBAL_CONFIG)?;
        Self::new_block_with_options(pre_block_hash, transactions, height, difficulty, options)
    }

    /// Build and mine a block. The returned block always validates.
    pub fn new_block_with_options(
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        height: u64,
        difficulty: u8,
        options: MiningOptions,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(BlockchainError::InvalidInput(
                "Block must contain at least one transaction".to_string(),
            ));
        }

        let mut block = Block {
            version: BLOCK_VERSION,
            timestamp: current_timestamp()?,
            transactions: transactions.to_vec(),
            hash: vec![],
            pre_block_hash,
            difficulty,
            nonce: 0,
            height,
        };

        info!("Starting proof-of-work for block at height {height} with difficulty {difficulty}");
        let pow = ProofOfWork::new_proof_of_work(&block)?.with_options(options);
        let (nonce, hash) = pow.run()?;
        block.nonce = nonce;
        block.hash = hash;
        info!(
            "Proof-of-work completed for block: {} (nonce: {nonce})",
            block.get_hash_hex()
        );

        Ok(block)
    }

    pub fn generate_genesis_block(coinbase: &Transaction, difficulty: u8) -> Result<Block> {
        Block::new_block(vec![], std::slice::from_ref(coinbase), 0, difficulty)
    }

    /// Check the stored nonce/hash pair against the block's difficulty
    pub fn validate(&self) -> bool {
        ProofOfWork::validate(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn get_version(&self) -> u32 {
        self.version
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_hex(&self) -> String {
        HEXLOWER.encode(&self.hash)
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_height(&self) -> u64 {
        self.height
    }

    pub fn get_difficulty(&self) -> u8 {
        self.difficulty
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn is_genesis(&self) -> bool {
        self.pre_block_hash.is_empty()
    }

    /// Merkle root over the ids of this block's transactions
    pub fn hash_transactions(&self) -> Result<Vec<u8>> {
        MerkleTree::calculate_merkle_root(&self.transaction_ids())
    }

    /// Generate a Merkle proof for a transaction in this block
    pub fn generate_merkle_proof(&self, transaction_index: usize) -> Result<MerkleProof> {
        MerkleTree::new(&self.transaction_ids())?.generate_proof(transaction_index)
    }

    /// Verify a Merkle proof against this block's transactions
    pub fn verify_merkle_proof(&self, proof: &MerkleProof) -> Result<bool> {
        if proof.merkle_root != self.hash_transactions()? {
            return Ok(false);
        }
        Ok(MerkleTree::verify_proof(proof))
    }

    fn transaction_ids(&self) -> Vec<Vec<u8>> {
        self.transactions
            .iter()
            .map(|tx| tx.get_id().to_vec())
            .collect()
    }

    #[cfg(test)]
    pub(crate) fn new_unmined(
        pre_block_hash: Vec<u8>,
        transactions: Vec<Transaction>,
        height: u64,
        difficulty: u8,
    ) -> Block {
        Block {
            version: BLOCK_VERSION,
            timestamp: 1_700_000_000,
            transactions,
            hash: vec![],
            pre_block_hash,
            difficulty,
            nonce: 0,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mine(difficulty: u8) -> Block {
        let coinbase_tx = Transaction::new_coinbase_tx(b"miner", 50).unwrap();
        Block::new_block_with_options(
            vec![9; 32],
            &[coinbase_tx],
            1,
            difficulty,
            MiningOptions {
                workers: 2,
                max_nonce: u64::MAX,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_mined_block_validates() {
        let block = mine(8);
        assert!(block.validate());
        assert_eq!(block.get_version(), BLOCK_VERSION);
        assert_eq!(block.get_hash().len(), 32);
        assert!(!block.is_genesis());
    }

    #[test]
    fn test_altered_nonce_fails_validation() {
        let mut block = mine(8);
        block.nonce = block.nonce.wrapping_add(1);
        assert!(!block.validate());
    }

    #[test]
    fn test_altered_payload_fails_validation() {
        let mut block = mine(8);
        block.height += 1;
        assert!(!block.validate());

        let mut block = mine(8);
        block.transactions = vec![Transaction::new_coinbase_tx(b"thief", 50).unwrap()];
        assert!(!block.validate());
    }

    #[test]
    fn test_block_without_transactions_is_rejected() {
        let result = Block::new_block_with_options(vec![], &[], 0, 1, MiningOptions::default());
        assert!(matches!(result, Err(BlockchainError::InvalidInput(_))));

        let mut block = mine(1);
        block.transactions.clear();
        assert!(!block.validate());
    }

    #[test]
    fn test_genesis_block() {
        let coinbase_tx = Transaction::new_coinbase_tx(b"founder", 50).unwrap();
        let genesis = Block::new_block_with_options(
            vec![],
            &[coinbase_tx],
            0,
            4,
            MiningOptions {
                workers: 2,
                max_nonce: u64::MAX,
            },
        )
        .unwrap();

        assert!(genesis.is_genesis());
        assert_eq!(genesis.get_height(), 0);
        assert_eq!(genesis.get_difficulty(), 4);
        assert!(genesis.validate());
    }

    #[test]
    fn test_serialization_preserves_validity() {
        let block = mine(6);
        let bytes = block.serialize().unwrap();
        let decoded = Block::deserialize(&bytes).unwrap();

        assert_eq!(decoded, block);
        assert!(decoded.validate());
        assert!(Block::deserialize(&bytes[..bytes.len() / 2]).is_err());
    }

    #[test]
    fn test_merkle_proof_for_block_transactions() {
        let coinbase_tx = Transaction::new_coinbase_tx(b"miner", 50).unwrap();
        let other = Transaction::new_coinbase_tx(b"other", 5).unwrap();
        let block = Block::new_unmined(vec![], vec![coinbase_tx, other], 0, 0);

        let proof = block.generate_merkle_proof(1).unwrap();
        assert!(block.verify_merkle_proof(&proof).unwrap());

        let foreign = Block::new_unmined(
            vec![],
            vec![Transaction::new_coinbase_tx(b"x", 1).unwrap()],
            0,
            0,
        );
        assert!(!foreign.verify_merkle_proof(&proof).unwrap());
    }
}
