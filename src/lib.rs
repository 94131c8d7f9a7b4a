//! # powchain - proof-of-work chain with a UTXO index
//!
//! A small single-node blockchain. When coming back to this code, here is
//! the map:
//!
//! ## What is here
//! - **Proof of Work**: blocks are mined by a parallel nonce search until the
//!   SHA-256 of the block payload falls below `2^(256 - bits)`
//! - **Merkle commitment**: the payload commits to the block's transactions
//!   through a Merkle root; inclusion proofs come for free
//! - **UTXO index**: a derived table of unspent outputs, advanced block by
//!   block and rebuilt from the chain whenever its sync point goes stale
//!
//! ## Layout
//! - `core/`: blocks, mining, Merkle tree, transactions, the ledger
//! - `storage/`: the UTXO index and the sled trees behind it
//! - `config/`: environment-driven settings
//! - `utils/`: hashing, timestamps, bincode helpers
//! - `cli/`: command-line parsing for the `powchain` binary
//!
//! ## Starting points
//! 1. `core/proof_of_work.rs` for the payload layout and the nonce search
//! 2. `storage/utxo_set.rs` for incremental update versus reindex
//! 3. `core/blockchain.rs` for how blocks are appended

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt, OwnerKeyArg};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    Block, Blockchain, BlockchainIterator, MerkleProof, MerkleTree, MiningOptions, ProofOfWork,
    TXInput, TXOutput, TXOutputs, Transaction, BLOCK_SUBSIDY,
};
pub use error::{BlockchainError, Result};
pub use storage::UTXOSet;
pub use utils::{current_timestamp, sha256_digest};
