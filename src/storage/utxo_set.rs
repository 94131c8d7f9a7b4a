use crate::core::{Block, Blockchain, TXOutput, TXOutputs};
use crate::error::{BlockchainError, Result};
use crate::storage::chainstate::{abort, ChainState};
use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Index of unspent outputs derived from the chain
///
/// The index remembers the hash of the block it reflects (its sync point).
/// Blocks are applied one at a time with [`UTXOSet::update_with_block`];
/// whenever the sync point does not match the block's predecessor the index
/// is rebuilt from the chain instead.
///
/// Clones share one lock, so writers never overlap readers or each other.
#[derive(Clone)]
pub struct UTXOSet {
    blockchain: Blockchain,
    chainstate: ChainState,
    lock: Arc<RwLock<()>>,
}

impl UTXOSet {
    pub fn new(blockchain: Blockchain) -> Result<UTXOSet> {
        let chainstate = ChainState::open(blockchain.get_db())?;
        Ok(UTXOSet {
            blockchain,
            chainstate,
            lock: Arc::new(RwLock::new(())),
        })
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    fn read_lock(&self) -> Result<RwLockReadGuard<'_, ()>> {
        self.lock
            .read()
            .map_err(|_| BlockchainError::Database("UTXO set lock poisoned".to_string()))
    }

    fn write_lock(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        self.lock
            .write()
            .map_err(|_| BlockchainError::Database("UTXO set lock poisoned".to_string()))
    }

    /// Hash of the block the index currently reflects
    pub fn get_sync_point(&self) -> Result<Option<Vec<u8>>> {
        let _guard = self.read_lock()?;
        self.chainstate.get_utxo_block()
    }

    /// Whether the index reflects the chain's stored tip
    pub fn is_synced(&self) -> Result<bool> {
        let _guard = self.read_lock()?;
        let tip = self.blockchain.get_last()?;
        Ok(self.chainstate.get_utxo_block()? == Some(tip))
    }

    /// Rebuild the whole index from a full chain scan
    pub fn reindex(&self) -> Result<()> {
        let _guard = self.write_lock()?;
        self.reindex_locked()
    }

    fn reindex_locked(&self) -> Result<()> {
        let tip = self.blockchain.get_last()?;
        info!("Rebuilding UTXO index at tip {}", HEXLOWER.encode(&tip));

        let utxo = self.blockchain.find_utxo()?;
        let written = self.chainstate.replace_all(utxo, &tip)?;

        info!("UTXO index rebuilt with {written} transactions");
        Ok(())
    }

    /// Advance the index by one block
    ///
    /// All outputs of the block are recorded first, then every output spent
    /// by a non-coinbase input is removed, so a block may spend outputs it
    /// creates itself. The sync point and every entry change commit together.
    /// An input referencing an output that is not in the index aborts the
    /// update with `InvalidBlock` and leaves the index untouched.
    pub fn update_with_block(&self, block: &Block) -> Result<()> {
        let _guard = self.write_lock()?;

        let sync_point = self.chainstate.get_utxo_block()?;
        if sync_point.as_deref() != Some(block.get_pre_block_hash()) {
            warn!(
                "UTXO index out of sync for block {} (index at {}), rebuilding",
                block.get_hash_hex(),
                sync_point
                    .map(|hash| HEXLOWER.encode(&hash))
                    .unwrap_or_else(|| "nothing".to_string())
            );
            return self.reindex_locked();
        }

        self.chainstate.atomically(|view| {
            view.update_utxo_block(block.get_hash())?;

            for tx in block.get_transactions() {
                view.add_txo(tx.get_id(), &TXOutputs::from_transaction(tx))?;
            }

            for tx in block.get_transactions() {
                if tx.is_coinbase() {
                    continue;
                }
                for vin in tx.get_vin() {
                    let mut outs = match view.get_utxo(vin.get_txid())? {
                        Some(outs) => outs,
                        None => {
                            return abort(BlockchainError::InvalidBlock(format!(
                                "Input spends unknown transaction {}",
                                HEXLOWER.encode(vin.get_txid())
                            )))
                        }
                    };
                    if outs.remove(vin.get_vout()).is_none() {
                        return abort(BlockchainError::InvalidBlock(format!(
                            "Input spends missing output {}:{}",
                            HEXLOWER.encode(vin.get_txid()),
                            vin.get_vout()
                        )));
                    }

                    if outs.is_empty() {
                        view.delete_utxo(vin.get_txid())?;
                    } else {
                        view.add_txo(vin.get_txid(), &outs)?;
                    }
                }
            }
            Ok(())
        })?;

        debug!(
            "UTXO index advanced to block {} at height {}",
            block.get_hash_hex(),
            block.get_height()
        );
        Ok(())
    }

    /// First-fit selection of outputs locked to `pub_key_hash`
    ///
    /// Entries are scanned in key order and the scan stops as soon as the
    /// running total reaches `amount`. The total may fall short; callers
    /// must check it. Positions are keyed by hex transaction id.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, HashMap<String, Vec<usize>>)> {
        let _guard = self.read_lock()?;
        let mut unspent_outputs: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = 0u64;

        'scan: for item in self.chainstate.utxo_iter() {
            let (txid, outs) = item?;
            let txid_hex = HEXLOWER.encode(&txid);

            for unspent in outs.iter() {
                if accumulated >= amount {
                    break 'scan;
                }
                if !unspent.output.is_locked_with_key(pub_key_hash) {
                    continue;
                }
                accumulated = accumulated
                    .checked_add(unspent.output.get_value())
                    .ok_or_else(|| {
                        BlockchainError::Transaction("Spendable value overflow".to_string())
                    })?;
                unspent_outputs
                    .entry(txid_hex.clone())
                    .or_default()
                    .push(unspent.vout);
            }
        }
        Ok((accumulated, unspent_outputs))
    }

    /// Every unspent output locked to `pub_key_hash`
    pub fn find_unspent_outputs(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let _guard = self.read_lock()?;
        let mut utxos = vec![];

        for item in self.chainstate.utxo_iter() {
            let (_, outs) = item?;
            utxos.extend(
                outs.iter()
                    .filter(|unspent| unspent.output.is_locked_with_key(pub_key_hash))
                    .map(|unspent| unspent.output.clone()),
            );
        }
        Ok(utxos)
    }

    pub fn get_outputs(&self, txid: &[u8]) -> Result<Option<TXOutputs>> {
        let _guard = self.read_lock()?;
        self.chainstate.get_utxo(txid)
    }

    /// Number of transactions with at least one unspent output
    pub fn count_transactions(&self) -> Result<usize> {
        let _guard = self.read_lock()?;
        let mut counter = 0;
        for item in self.chainstate.utxo_iter() {
            item?;
            counter += 1;
        }
        Ok(counter)
    }

    /// Copy of every entry, keyed by raw transaction id
    pub fn snapshot(&self) -> Result<BTreeMap<Vec<u8>, TXOutputs>> {
        let _guard = self.read_lock()?;
        self.chainstate.utxo_iter().collect()
    }
}
