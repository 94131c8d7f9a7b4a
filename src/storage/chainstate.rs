use crate::core::TXOutputs;
use crate::error::{BlockchainError, Result};
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};

const UTXO_TREE: &str = "chainstate";
const UTXO_META_TREE: &str = "chainstate_meta";
const UTXO_BLOCK_KEY: &str = "utxo_block";

/// Result type for work done inside a chainstate transaction
pub type TxResult<T> = std::result::Result<T, ConflictableTransactionError<BlockchainError>>;

/// Shorthand for aborting a chainstate transaction with an error
pub fn abort<T>(err: BlockchainError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

/// Persistent storage behind the UTXO index
///
/// Entries live in the `chainstate` tree keyed by raw transaction id. The
/// sync point (hash of the block the entries reflect) lives in a separate
/// tree so that entry iteration never sees it.
#[derive(Clone)]
pub struct ChainState {
    utxo: Tree,
    meta: Tree,
}

impl ChainState {
    pub fn open(db: &Db) -> Result<ChainState> {
        let utxo = db
            .open_tree(UTXO_TREE)
            .map_err(|e| BlockchainError::Database(format!("Failed to open UTXO tree: {e}")))?;
        let meta = db.open_tree(UTXO_META_TREE).map_err(|e| {
            BlockchainError::Database(format!("Failed to open UTXO metadata tree: {e}"))
        })?;
        Ok(ChainState { utxo, meta })
    }

    /// Block hash the entries reflect, `None` if never synced or mid-rebuild
    pub fn get_utxo_block(&self) -> Result<Option<Vec<u8>>> {
        let value = self
            .meta
            .get(UTXO_BLOCK_KEY)
            .map_err(|e| BlockchainError::Database(format!("Failed to read sync point: {e}")))?;
        Ok(value.map(|v| v.to_vec()))
    }

    pub fn update_utxo_block(&self, block_hash: &[u8]) -> Result<()> {
        self.meta
            .insert(UTXO_BLOCK_KEY, block_hash)
            .map_err(|e| BlockchainError::Database(format!("Failed to write sync point: {e}")))?;
        Ok(())
    }

    pub fn clear_utxo_set(&self) -> Result<()> {
        self.utxo
            .clear()
            .map_err(|e| BlockchainError::Database(format!("Failed to clear UTXO tree: {e}")))
    }

    pub fn add_txo(&self, txid: &[u8], outputs: &TXOutputs) -> Result<()> {
        let bytes = outputs.serialize()?;
        self.utxo
            .insert(txid, bytes)
            .map_err(|e| BlockchainError::Database(format!("Failed to insert UTXO: {e}")))?;
        Ok(())
    }

    pub fn get_utxo(&self, txid: &[u8]) -> Result<Option<TXOutputs>> {
        let value = self
            .utxo
            .get(txid)
            .map_err(|e| BlockchainError::Database(format!("Failed to get UTXO: {e}")))?;
        value.map(|bytes| TXOutputs::deserialize(&bytes)).transpose()
    }

    pub fn delete_utxo(&self, txid: &[u8]) -> Result<()> {
        self.utxo
            .remove(txid)
            .map_err(|e| BlockchainError::Database(format!("Failed to remove UTXO: {e}")))?;
        Ok(())
    }

    /// Fresh cursor over every entry in key order
    ///
    /// Each call starts from the beginning. Mutations made while iterating
    /// may or may not be observed.
    pub fn utxo_iter(&self) -> impl Iterator<Item = Result<(Vec<u8>, TXOutputs)>> {
        self.utxo.iter().map(|item| {
            let (k, v) = item.map_err(|e| {
                BlockchainError::Database(format!("Failed to iterate UTXO tree: {e}"))
            })?;
            Ok((k.to_vec(), TXOutputs::deserialize(&v)?))
        })
    }

    /// Swap the whole index for `entries`, reflecting `sync_point`
    ///
    /// The sync point is dropped first and written last, so an interrupted
    /// rebuild leaves the index marked stale instead of half-filled.
    pub fn replace_all<I>(&self, entries: I, sync_point: &[u8]) -> Result<usize>
    where
        I: IntoIterator<Item = (Vec<u8>, TXOutputs)>,
    {
        self.meta
            .remove(UTXO_BLOCK_KEY)
            .map_err(|e| BlockchainError::Database(format!("Failed to reset sync point: {e}")))?;
        self.clear_utxo_set()?;

        let mut batch = sled::Batch::default();
        let mut count = 0;
        for (txid, outputs) in entries {
            if outputs.is_empty() {
                continue;
            }
            batch.insert(txid, outputs.serialize()?);
            count += 1;
        }
        self.utxo
            .apply_batch(batch)
            .map_err(|e| BlockchainError::Database(format!("Failed to write UTXO batch: {e}")))?;

        self.update_utxo_block(sync_point)?;
        Ok(count)
    }

    /// Run `f` against entries and sync point as one all-or-nothing unit
    ///
    /// `f` may be invoked more than once if sled retries on conflict.
    pub fn atomically<F>(&self, f: F) -> Result<()>
    where
        F: Fn(&ChainStateTx<'_>) -> TxResult<()>,
    {
        (&self.utxo, &self.meta)
            .transaction(|(utxo, meta)| f(&ChainStateTx { utxo, meta }))
            .map_err(BlockchainError::from)
    }
}

/// Transactional view handed to [`ChainState::atomically`]
pub struct ChainStateTx<'a> {
    utxo: &'a TransactionalTree,
    meta: &'a TransactionalTree,
}

impl ChainStateTx<'_> {
    pub fn update_utxo_block(&self, block_hash: &[u8]) -> TxResult<()> {
        self.meta.insert(UTXO_BLOCK_KEY, block_hash)?;
        Ok(())
    }

    pub fn add_txo(&self, txid: &[u8], outputs: &TXOutputs) -> TxResult<()> {
        let bytes = outputs
            .serialize()
            .map_err(ConflictableTransactionError::Abort)?;
        self.utxo.insert(txid, bytes)?;
        Ok(())
    }

    pub fn get_utxo(&self, txid: &[u8]) -> TxResult<Option<TXOutputs>> {
        match self.utxo.get(txid)? {
            Some(bytes) => TXOutputs::deserialize(&bytes)
                .map(Some)
                .map_err(ConflictableTransactionError::Abort),
            None => Ok(None),
        }
    }

    pub fn delete_utxo(&self, txid: &[u8]) -> TxResult<()> {
        self.utxo.remove(txid)?;
        Ok(())
    }
}
