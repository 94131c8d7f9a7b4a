//! Core blockchain functionality
//!
//! Blocks and their proof of work, the Merkle commitment over a block's
//! transactions, the transaction model and the ledger that stores blocks.

pub mod block;
pub mod blockchain;
pub mod merkle;
pub mod proof_of_work;
pub mod transaction;

pub use block::{Block, BLOCK_VERSION};
pub use blockchain::{Blockchain, BlockchainIterator};
pub use merkle::{MerkleProof, MerkleTree, ProofElement};
pub use proof_of_work::{MiningOptions, ProofOfWork};
pub use transaction::{TXInput, TXOutput, TXOutputs, Transaction, UnspentOutput, BLOCK_SUBSIDY};
