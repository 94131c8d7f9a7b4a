//! Data storage and persistence
//!
//! The chain's blocks live in the ledger itself (`core::blockchain`). This
//! module holds the derived UTXO index and the sled trees behind it.

pub mod chainstate;
pub mod utxo_set;

pub use chainstate::{ChainState, ChainStateTx};
pub use utxo_set::UTXOSet;
