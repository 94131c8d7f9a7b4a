//! Blockchain integration tests
//!
//! Drives the public API end to end: mining, the ledger, and keeping the
//! UTXO index consistent with the chain tip.

use powchain::core::{Block, Blockchain, MiningOptions, ProofOfWork, Transaction};
use powchain::storage::UTXOSet;
use powchain::{BlockchainError, BLOCK_SUBSIDY};
use std::thread;
use tempfile::{tempdir, TempDir};

const DIFFICULTY: u8 = 6;

fn new_chain(owner: &[u8]) -> (UTXOSet, TempDir) {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("test_blockchain");
    let blockchain =
        Blockchain::create_blockchain_with_difficulty(owner, &db_path, DIFFICULTY).unwrap();
    let utxo_set = UTXOSet::new(blockchain).unwrap();
    utxo_set.reindex().unwrap();
    (utxo_set, temp_dir)
}

fn balance(utxo_set: &UTXOSet, owner: &[u8]) -> u64 {
    utxo_set
        .find_unspent_outputs(owner)
        .unwrap()
        .iter()
        .map(|out| out.get_value())
        .sum()
}

fn transfer(utxo_set: &UTXOSet, from: &[u8], to: &[u8], amount: u64, miner: &[u8]) -> Block {
    let tx = Transaction::new_utxo_transaction(from, to, amount, utxo_set).unwrap();
    let block = utxo_set.get_blockchain().mine_block(&[tx], miner).unwrap();
    utxo_set.update_with_block(&block).unwrap();
    block
}

#[test]
fn test_proof_of_work_validation() {
    let coinbase_tx = Transaction::new_coinbase_tx(b"miner", BLOCK_SUBSIDY).unwrap();
    let block = Block::new_block_with_options(
        vec![0x11; 32],
        &[coinbase_tx],
        1,
        DIFFICULTY,
        MiningOptions {
            workers: 4,
            max_nonce: u64::MAX,
        },
    )
    .unwrap();

    assert!(ProofOfWork::validate(&block));
    assert!(ProofOfWork::hash_meets_target(
        block.get_hash(),
        &ProofOfWork::target_for(DIFFICULTY)
    ));

    let proof = block.generate_merkle_proof(0).unwrap();
    assert!(block.verify_merkle_proof(&proof).unwrap());
}

#[test]
fn test_block_survives_storage_round_trip() {
    let (utxo_set, _dir) = new_chain(b"alice");
    let blockchain = utxo_set.get_blockchain();
    let block = blockchain.mine_block(&[], b"bob").unwrap();

    let stored = blockchain.get_block(block.get_hash()).unwrap().unwrap();
    assert_eq!(stored, block);
    assert!(stored.validate());
}

#[test]
fn test_transfers_update_balances() {
    let (utxo_set, _dir) = new_chain(b"alice");
    assert_eq!(balance(&utxo_set, b"alice"), BLOCK_SUBSIDY);

    transfer(&utxo_set, b"alice", b"bob", 30, b"alice");
    assert_eq!(balance(&utxo_set, b"alice"), BLOCK_SUBSIDY - 30 + BLOCK_SUBSIDY);
    assert_eq!(balance(&utxo_set, b"bob"), 30);

    transfer(&utxo_set, b"bob", b"carol", 30, b"dave");
    assert_eq!(balance(&utxo_set, b"bob"), 0);
    assert_eq!(balance(&utxo_set, b"carol"), 30);
    assert_eq!(balance(&utxo_set, b"dave"), BLOCK_SUBSIDY);

    assert!(utxo_set.is_synced().unwrap());
    assert!(utxo_set.get_blockchain().validate_chain().unwrap());
    assert_eq!(utxo_set.get_blockchain().get_best_height().unwrap(), 2);
}

#[test]
fn test_insufficient_funds() {
    let (utxo_set, _dir) = new_chain(b"alice");
    let result = Transaction::new_utxo_transaction(b"alice", b"bob", BLOCK_SUBSIDY + 1, &utxo_set);
    assert_eq!(
        result,
        Err(BlockchainError::InsufficientFunds {
            required: BLOCK_SUBSIDY + 1,
            available: BLOCK_SUBSIDY,
        })
    );
}

#[test]
fn test_incremental_index_matches_rebuild() {
    let (utxo_set, _dir) = new_chain(b"alice");
    transfer(&utxo_set, b"alice", b"bob", 20, b"carol");
    transfer(&utxo_set, b"bob", b"carol", 5, b"alice");
    transfer(&utxo_set, b"carol", b"alice", 55, b"bob");

    let incremental = utxo_set.snapshot().unwrap();
    utxo_set.reindex().unwrap();
    assert_eq!(utxo_set.snapshot().unwrap(), incremental);
}

#[test]
fn test_index_recovers_after_missed_blocks() {
    let (utxo_set, _dir) = new_chain(b"alice");
    let blockchain = utxo_set.get_blockchain().clone();

    // Blocks appended without telling the index
    blockchain.mine_block(&[], b"bob").unwrap();
    blockchain.mine_block(&[], b"bob").unwrap();
    assert!(!utxo_set.is_synced().unwrap());

    let block = blockchain.mine_block(&[], b"carol").unwrap();
    utxo_set.update_with_block(&block).unwrap();

    assert!(utxo_set.is_synced().unwrap());
    assert_eq!(balance(&utxo_set, b"bob"), 2 * BLOCK_SUBSIDY);
    assert_eq!(balance(&utxo_set, b"carol"), BLOCK_SUBSIDY);
}

#[test]
fn test_index_persists_across_reopen() {
    let temp_dir = tempdir().unwrap();
    let db_path = temp_dir.path().join("test_blockchain");

    let snapshot = {
        let blockchain =
            Blockchain::create_blockchain_with_difficulty(b"alice", &db_path, DIFFICULTY).unwrap();
        let utxo_set = UTXOSet::new(blockchain).unwrap();
        utxo_set.reindex().unwrap();
        transfer(&utxo_set, b"alice", b"bob", 10, b"alice");
        utxo_set.snapshot().unwrap()
    };

    let blockchain = Blockchain::new_blockchain_with_path(&db_path).unwrap();
    assert_eq!(blockchain.get_difficulty(), DIFFICULTY);
    let utxo_set = UTXOSet::new(blockchain).unwrap();
    assert!(utxo_set.is_synced().unwrap());
    assert_eq!(utxo_set.snapshot().unwrap(), snapshot);
    assert_eq!(balance(&utxo_set, b"bob"), 10);
}

#[test]
fn test_concurrent_readers() {
    let (utxo_set, _dir) = new_chain(b"alice");
    transfer(&utxo_set, b"alice", b"bob", 25, b"alice");

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let reader = utxo_set.clone();
            thread::spawn(move || {
                let alice = balance(&reader, b"alice");
                let (total, _) = reader.find_spendable_outputs(b"bob", 25).unwrap();
                (alice, total)
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), (BLOCK_SUBSIDY - 25 + BLOCK_SUBSIDY, 25));
    }
}

#[test]
fn test_add_block_rejects_easier_blocks() {
    let (utxo_set, _dir) = new_chain(b"alice");
    let blockchain = utxo_set.get_blockchain();
    let tip = blockchain.get_tip_hash();

    // Nonce 0 passes at difficulty 0, far below the chain's requirement
    let coinbase_tx = Transaction::new_coinbase_tx(b"mallory", BLOCK_SUBSIDY).unwrap();
    let forged = Block::new_block(tip.clone(), &[coinbase_tx], 1, 0).unwrap();
    assert!(forged.validate());
    assert!(matches!(
        blockchain.add_block(&forged),
        Err(BlockchainError::InvalidBlock(_))
    ));

    assert_eq!(balance(&utxo_set, b"mallory"), 0);
    assert_eq!(blockchain.get_tip_hash(), tip);
    assert!(blockchain.validate_chain().unwrap());
}

#[test]
fn test_add_block_checks_linkage_and_height() {
    let (utxo_set, _dir) = new_chain(b"alice");
    let blockchain = utxo_set.get_blockchain();

    let coinbase_tx = Transaction::new_coinbase_tx(b"miner", BLOCK_SUBSIDY).unwrap();
    let next = Block::new_block(blockchain.get_tip_hash(), &[coinbase_tx], 1, DIFFICULTY).unwrap();
    blockchain.add_block(&next).unwrap();

    let wrong_height = Block::new_block(
        blockchain.get_tip_hash(),
        &[Transaction::new_coinbase_tx(b"miner", BLOCK_SUBSIDY).unwrap()],
        7,
        DIFFICULTY,
    )
    .unwrap();
    assert!(matches!(
        blockchain.add_block(&wrong_height),
        Err(BlockchainError::InvalidBlock(_))
    ));
    assert_eq!(blockchain.get_tip_hash(), next.get_hash());
}
