// Linear ledger of mined blocks stored in sled.
// Blocks are keyed by their raw hash; fixed keys track the tip and the
// minimum difficulty every block must carry.
// There is no fork choice: a block is appended only if it extends the tip.

use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, TXOutputs, Transaction, BLOCK_SUBSIDY};
use crate::error::{BlockchainError, Result};
use data_encoding::HEXLOWER;
use log::{info, warn};
use sled::{Db, Tree};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

const TIP_BLOCK_HASH_KEY: &str = "tip_block_hash";
const CHAIN_DIFFICULTY_KEY: &str = "chain_difficulty";
const BLOCKS_TREE: &str = "blocks";

#[derive(Clone)]
pub struct Blockchain {
    tip_hash: Arc<RwLock<Vec<u8>>>, // cached copy of the persisted tip
    db: Db,
    db_path: PathBuf,
    difficulty: u8, // bits mined with and required of every block
}

impl Blockchain {
    /// Create (or reopen) the chain under the configured data directory
    pub fn create_blockchain(genesis_pub_key_hash: &[u8]) -> Result<Blockchain> {
        Self::create_blockchain_with_path(genesis_pub_key_hash, &GLOBAL_CONFIG.get_data_dir())
    }

    /// Open an existing chain under the configured data directory
    pub fn new_blockchain() -> Result<Blockchain> {
        Self::new_blockchain_with_path(&GLOBAL_CONFIG.get_data_dir())
    }

    pub fn create_blockchain_with_path(
        genesis_pub_key_hash: &[u8],
        db_path: &Path,
    ) -> Result<Blockchain> {
        let difficulty = GLOBAL_CONFIG.get_mining_difficulty()?;
        Self::create_blockchain_with_difficulty(genesis_pub_key_hash, db_path, difficulty)
    }

    /// Create the chain, mining a genesis block that pays `genesis_pub_key_hash`
    ///
    /// An existing chain at `db_path` is reopened untouched, keeping the
    /// difficulty it was created with.
    pub fn create_blockchain_with_difficulty(
        genesis_pub_key_hash: &[u8],
        db_path: &Path,
        difficulty: u8,
    ) -> Result<Blockchain> {
        let db = sled::open(db_path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks_tree = Self::open_blocks_tree(&db)?;

        let data = blocks_tree
            .get(TIP_BLOCK_HASH_KEY)
            .map_err(|e| BlockchainError::Database(format!("Failed to get tip hash: {e}")))?;

        let (tip_hash, difficulty) = if let Some(data) = data {
            let stored = Self::read_chain_difficulty(&blocks_tree)?;
            if stored != difficulty {
                warn!("Reopening chain at its recorded difficulty {stored}, not {difficulty}");
            }
            (data.to_vec(), stored)
        } else {
            info!(
                "Creating genesis block for {}",
                HEXLOWER.encode(genesis_pub_key_hash)
            );
            let coinbase_tx = Transaction::new_coinbase_tx(genesis_pub_key_hash, BLOCK_SUBSIDY)?;
            let block = Block::generate_genesis_block(&coinbase_tx, difficulty)?;
            blocks_tree
                .insert(CHAIN_DIFFICULTY_KEY, vec![difficulty])
                .map_err(|e| {
                    BlockchainError::Database(format!("Failed to store chain difficulty: {e}"))
                })?;
            Self::update_blocks_tree(&blocks_tree, &block)?;
            (block.get_hash().to_vec(), difficulty)
        };

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_hash)),
            db,
            db_path: db_path.to_path_buf(),
            difficulty,
        })
    }

    pub fn new_blockchain_with_path(db_path: &Path) -> Result<Blockchain> {
        let db = sled::open(db_path)
            .map_err(|e| BlockchainError::Database(format!("Failed to open database: {e}")))?;
        let blocks_tree = Self::open_blocks_tree(&db)?;

        let tip_hash = blocks_tree
            .get(TIP_BLOCK_HASH_KEY)
            .map_err(|e| BlockchainError::Database(format!("Failed to get tip hash: {e}")))?
            .ok_or_else(|| {
                BlockchainError::Database(
                    "No existing blockchain found. Create one first.".to_string(),
                )
            })?;
        let difficulty = Self::read_chain_difficulty(&blocks_tree)?;

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_hash.to_vec())),
            db,
            db_path: db_path.to_path_buf(),
            difficulty,
        })
    }

    fn read_chain_difficulty(blocks_tree: &Tree) -> Result<u8> {
        let data = blocks_tree
            .get(CHAIN_DIFFICULTY_KEY)
            .map_err(|e| BlockchainError::Database(format!("Failed to get chain difficulty: {e}")))?
            .ok_or_else(|| BlockchainError::Database("Chain difficulty not found".to_string()))?;
        match data.as_ref() {
            [difficulty] => Ok(*difficulty),
            _ => Err(BlockchainError::Serialization(
                "Chain difficulty must be a single byte".to_string(),
            )),
        }
    }

    fn open_blocks_tree(db: &Db) -> Result<Tree> {
        db.open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open blocks tree: {e}")))
    }

    // Block and tip pointer are written together or not at all
    fn update_blocks_tree(blocks_tree: &Tree, block: &Block) -> Result<()> {
        let block_hash = block.get_hash();
        let block_data = block.serialize()?;

        blocks_tree
            .transaction(|tx_db| {
                tx_db.insert(block_hash, block_data.as_slice())?;
                tx_db.insert(TIP_BLOCK_HASH_KEY, block_hash)?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError| {
                BlockchainError::Database(format!("Failed to update blocks tree: {e}"))
            })?;

        Ok(())
    }

    pub fn get_db(&self) -> &Db {
        &self.db
    }

    pub fn get_db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn get_difficulty(&self) -> u8 {
        self.difficulty
    }

    pub fn get_tip_hash(&self) -> Vec<u8> {
        self.tip_hash
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_tip_hash(&self, new_tip_hash: &[u8]) {
        let mut tip_hash = self.tip_hash.write().unwrap_or_else(|e| e.into_inner());
        *tip_hash = new_tip_hash.to_vec();
    }

    /// Tip hash as persisted in storage
    pub fn get_last(&self) -> Result<Vec<u8>> {
        let blocks_tree = Self::open_blocks_tree(&self.db)?;
        let tip = blocks_tree
            .get(TIP_BLOCK_HASH_KEY)
            .map_err(|e| BlockchainError::Database(format!("Failed to get tip hash: {e}")))?
            .ok_or_else(|| BlockchainError::Database("Tip hash not found".to_string()))?;
        Ok(tip.to_vec())
    }

    /// Mine `transactions` into a new block paying the subsidy to `miner`
    ///
    /// The coinbase is placed first. Every input must spend an output that is
    /// unspent on the chain or created earlier in the same block.
    pub fn mine_block(&self, transactions: &[Transaction], miner: &[u8]) -> Result<Block> {
        if let Some(i) = transactions.iter().position(|tx| tx.is_coinbase()) {
            return Err(BlockchainError::Transaction(format!(
                "Transaction at index {i} is a coinbase; the miner's coinbase is added automatically"
            )));
        }

        let mut block_transactions = Vec::with_capacity(transactions.len() + 1);
        block_transactions.push(Transaction::new_coinbase_tx(miner, BLOCK_SUBSIDY)?);
        block_transactions.extend_from_slice(transactions);
        self.validate_block_transactions(&block_transactions)?;

        let best_height = self.get_best_height()?;
        let next_height = best_height + 1;

        info!(
            "Mining block at height {} with {} transactions (difficulty: {})",
            next_height,
            block_transactions.len(),
            self.difficulty
        );

        let block = Block::new_block(
            self.get_tip_hash(),
            &block_transactions,
            next_height,
            self.difficulty,
        )?;

        let blocks_tree = Self::open_blocks_tree(&self.db)?;
        Self::update_blocks_tree(&blocks_tree, &block)?;
        self.set_tip_hash(block.get_hash());
        info!("Successfully mined block: {}", block.get_hash_hex());

        Ok(block)
    }

    /// Append a block mined elsewhere
    ///
    /// The block must validate and extend the current tip. Blocks already
    /// stored are accepted as a no-op.
    pub fn add_block(&self, block: &Block) -> Result<()> {
        if self.block_exists(block.get_hash())? {
            return Ok(());
        }

        if !block.validate() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Proof of work does not hold for {}",
                block.get_hash_hex()
            )));
        }

        if block.get_difficulty() < self.difficulty {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} was mined at difficulty {}, chain requires {}",
                block.get_hash_hex(),
                block.get_difficulty(),
                self.difficulty
            )));
        }

        let tip_hash = self.get_tip_hash();
        if block.get_pre_block_hash() != tip_hash.as_slice() {
            return Err(BlockchainError::InvalidBlock(format!(
                "Block {} does not extend tip {}",
                block.get_hash_hex(),
                HEXLOWER.encode(&tip_hash)
            )));
        }

        let expected_height = self.get_best_height()? + 1;
        if block.get_height() != expected_height {
            return Err(BlockchainError::InvalidBlock(format!(
                "Expected height {expected_height}, got {}",
                block.get_height()
            )));
        }

        self.validate_block_transactions(block.get_transactions())?;

        let blocks_tree = Self::open_blocks_tree(&self.db)?;
        Self::update_blocks_tree(&blocks_tree, block)?;
        self.set_tip_hash(block.get_hash());
        info!("Appended block {} at height {}", block.get_hash_hex(), block.get_height());
        Ok(())
    }

    // Coinbase first and only there; every input spends something that
    // exists and has not been spent on chain or earlier in this block.
    fn validate_block_transactions(&self, transactions: &[Transaction]) -> Result<()> {
        match transactions.first() {
            Some(tx) if tx.is_coinbase() => {}
            _ => {
                return Err(BlockchainError::InvalidBlock(
                    "First transaction must be a coinbase".to_string(),
                ))
            }
        }

        Self::check_for_double_spending(transactions)?;

        let mut available = self.find_utxo()?;
        for (tx_index, tx) in transactions.iter().enumerate() {
            if tx_index > 0 {
                if tx.is_coinbase() {
                    return Err(BlockchainError::InvalidBlock(format!(
                        "Unexpected coinbase at index {tx_index}"
                    )));
                }

                let mut input_value = 0u64;
                for input in tx.get_vin() {
                    let spent = available
                        .get_mut(input.get_txid())
                        .and_then(|outs| outs.remove(input.get_vout()))
                        .ok_or_else(|| {
                            BlockchainError::Transaction(format!(
                                "Input {}:{} of transaction {tx_index} is not spendable",
                                HEXLOWER.encode(input.get_txid()),
                                input.get_vout()
                            ))
                        })?;
                    input_value = input_value.checked_add(spent.get_value()).ok_or_else(|| {
                        BlockchainError::Transaction("Input value overflow".to_string())
                    })?;
                }

                let output_value = tx.get_output_value()?;
                if output_value > input_value {
                    return Err(BlockchainError::Transaction(format!(
                        "Transaction {tx_index} spends {output_value} but only has {input_value}"
                    )));
                }
            }

            available.insert(tx.get_id().to_vec(), TXOutputs::from_transaction(tx));
        }

        Ok(())
    }

    // The same output may not be consumed twice within one block
    fn check_for_double_spending(transactions: &[Transaction]) -> Result<()> {
        let mut spent_outputs: HashSet<(&[u8], usize)> = HashSet::new();

        for (tx_index, transaction) in transactions.iter().enumerate() {
            for input in transaction.get_vin() {
                if !spent_outputs.insert((input.get_txid(), input.get_vout())) {
                    return Err(BlockchainError::Transaction(format!(
                        "Double-spending detected in transaction {}: output {}:{} already spent in this block",
                        tx_index,
                        HEXLOWER.encode(input.get_txid()),
                        input.get_vout()
                    )));
                }
            }
        }

        Ok(())
    }

    /// Walk the chain from the tip back to genesis
    pub fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator::new(self.get_tip_hash(), self.db.clone())
    }

    /// Every output not referenced by any input, grouped by transaction id
    ///
    /// Full chain scan; transactions with nothing left unspent are omitted.
    pub fn find_utxo(&self) -> Result<BTreeMap<Vec<u8>, TXOutputs>> {
        let mut utxo: BTreeMap<Vec<u8>, TXOutputs> = BTreeMap::new();
        let mut spent_txos: HashSet<(Vec<u8>, usize)> = HashSet::new();

        for block in self.iterator() {
            for tx in block?.get_transactions() {
                utxo.insert(tx.get_id().to_vec(), TXOutputs::from_transaction(tx));
                if tx.is_coinbase() {
                    continue;
                }
                for txin in tx.get_vin() {
                    spent_txos.insert((txin.get_txid().to_vec(), txin.get_vout()));
                }
            }
        }

        for (txid, vout) in &spent_txos {
            if let Some(outs) = utxo.get_mut(txid) {
                outs.remove(*vout);
            }
        }
        utxo.retain(|_, outs| !outs.is_empty());
        Ok(utxo)
    }

    pub fn find_transaction(&self, txid: &[u8]) -> Result<Option<Transaction>> {
        for block in self.iterator() {
            if let Some(tx) = block?
                .get_transactions()
                .iter()
                .find(|tx| tx.get_id() == txid)
            {
                return Ok(Some(tx.clone()));
            }
        }
        Ok(None)
    }

    pub fn get_best_height(&self) -> Result<u64> {
        let tip_block = self
            .get_block(&self.get_tip_hash())?
            .ok_or_else(|| BlockchainError::Database("Tip block not found".to_string()))?;
        Ok(tip_block.get_height())
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        let block_tree = Self::open_blocks_tree(&self.db)?;

        if let Some(block_bytes) = block_tree
            .get(block_hash)
            .map_err(|e| BlockchainError::Database(format!("Failed to get block: {e}")))?
        {
            return Ok(Some(Block::deserialize(block_bytes.as_ref())?));
        }
        Ok(None)
    }

    pub fn block_exists(&self, block_hash: &[u8]) -> Result<bool> {
        let block_tree = Self::open_blocks_tree(&self.db)?;
        let exists = block_tree
            .contains_key(block_hash)
            .map_err(|e| {
                BlockchainError::Database(format!("Failed to check block existence: {e}"))
            })?;
        Ok(exists)
    }

    /// Every block validates at the chain's difficulty, links to its
    /// predecessor and sits one above it
    pub fn validate_chain(&self) -> Result<bool> {
        let mut expected: Option<(Vec<u8>, u64)> = None;

        for block in self.iterator() {
            let block = block?;
            if block.get_difficulty() < self.difficulty || !block.validate() {
                return Ok(false);
            }
            if let Some((hash, height)) = &expected {
                if block.get_hash() != hash.as_slice() || block.get_height() + 1 != *height {
                    return Ok(false);
                }
            }
            if block.is_genesis() {
                return Ok(block.get_height() == 0);
            }
            expected = Some((block.get_pre_block_hash().to_vec(), block.get_height()));
        }

        // Ran out of stored blocks before reaching genesis
        Ok(false)
    }
}

/// Tip-to-genesis cursor over stored blocks
pub struct BlockchainIterator {
    db: Db,
    current_hash: Vec<u8>,
}

impl BlockchainIterator {
    fn new(tip_hash: Vec<u8>, db: Db) -> BlockchainIterator {
        BlockchainIterator {
            current_hash: tip_hash,
            db,
        }
    }

    fn load(&self) -> Result<Block> {
        let block_tree = Blockchain::open_blocks_tree(&self.db)?;
        let data = block_tree
            .get(&self.current_hash)
            .map_err(|e| BlockchainError::Database(format!("Failed to get block: {e}")))?
            .ok_or_else(|| {
                BlockchainError::Database(format!(
                    "Block {} not found",
                    HEXLOWER.encode(&self.current_hash)
                ))
            })?;
        Block::deserialize(data.as_ref())
    }
}

impl Iterator for BlockchainIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_hash.is_empty() {
            return None;
        }
        match self.load() {
            Ok(block) => {
                self.current_hash = block.get_pre_block_hash().to_vec();
                Some(Ok(block))
            }
            Err(e) => {
                // Stop after reporting the failure
                self.current_hash.clear();
                Some(Err(e))
            }
        }
    }
}
