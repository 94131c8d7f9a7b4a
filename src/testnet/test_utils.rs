//! Test utilities for chain and index testing

use crate::core::{Block, Blockchain, Transaction, BLOCK_SUBSIDY};
use crate::error::{BlockchainError, Result};
use crate::storage::UTXOSet;
use tempfile::TempDir;

/// Easy difficulty so tests mine in a few milliseconds
pub const TEST_DIFFICULTY: u8 = 4;

/// Create a temporary directory for testing
pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| BlockchainError::Io(e.to_string()))
}

/// Create a test blockchain whose genesis coinbase pays `genesis_key`
pub fn create_test_blockchain(genesis_key: &[u8]) -> Result<(Blockchain, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let db_path = temp_dir.path().join("test_blockchain");

    let blockchain =
        Blockchain::create_blockchain_with_difficulty(genesis_key, &db_path, TEST_DIFFICULTY)?;

    Ok((blockchain, temp_dir))
}

/// Test chain plus an index already rebuilt at its genesis
pub fn create_indexed_blockchain(genesis_key: &[u8]) -> Result<(UTXOSet, TempDir)> {
    let (blockchain, temp_dir) = create_test_blockchain(genesis_key)?;
    let utxo_set = UTXOSet::new(blockchain)?;
    utxo_set.reindex()?;
    Ok((utxo_set, temp_dir))
}

/// Mine `transactions` on top of the tip and advance the index with the block
pub fn mine_and_update(
    utxo_set: &UTXOSet,
    transactions: &[Transaction],
    miner: &[u8],
) -> Result<Block> {
    let block = utxo_set.get_blockchain().mine_block(transactions, miner)?;
    utxo_set.update_with_block(&block)?;
    Ok(block)
}

/// Mine a coinbase-only block on `parent` without touching any chain
pub fn mine_detached_block(parent: &Block, miner: &[u8]) -> Result<Block> {
    let coinbase_tx = Transaction::new_coinbase_tx(miner, BLOCK_SUBSIDY)?;
    Block::new_block(
        parent.get_hash().to_vec(),
        &[coinbase_tx],
        parent.get_height() + 1,
        TEST_DIFFICULTY,
    )
}

/// Sum of every output `key` can spend according to the index
pub fn balance_of(utxo_set: &UTXOSet, key: &[u8]) -> Result<u64> {
    Ok(utxo_set
        .find_unspent_outputs(key)?
        .iter()
        .map(|out| out.get_value())
        .sum())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_blockchain() {
        let (blockchain, _temp_dir) = create_test_blockchain(b"alice").unwrap();
        assert_eq!(blockchain.get_best_height().unwrap(), 0);
        assert_eq!(blockchain.get_difficulty(), TEST_DIFFICULTY);
    }

    #[test]
    fn test_create_indexed_blockchain() {
        let (utxo_set, _temp_dir) = create_indexed_blockchain(b"alice").unwrap();
        assert!(utxo_set.is_synced().unwrap());
        assert_eq!(balance_of(&utxo_set, b"alice").unwrap(), BLOCK_SUBSIDY);
    }

    #[test]
    fn test_detached_block_is_valid_but_off_chain() {
        let (blockchain, _temp_dir) = create_test_blockchain(b"alice").unwrap();
        let genesis = blockchain.iterator().next().unwrap().unwrap();

        let block = mine_detached_block(&genesis, b"miner").unwrap();
        assert!(block.validate());
        assert_eq!(block.get_pre_block_hash(), genesis.get_hash());
        assert_eq!(blockchain.get_best_height().unwrap(), 0);
    }
}
