// Entry point for the powchain CLI
use clap::Parser;
use data_encoding::HEXLOWER;
use log::{error, LevelFilter};
use powchain::{Blockchain, Command, Opt, Transaction, UTXOSet};
use std::process;

fn main() {
    // Info level shows mining and reindex progress without per-block noise
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();

    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

// Every command opens the chain under the configured data directory
fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Createblockchain { owner } => {
            let blockchain = Blockchain::create_blockchain(owner.as_bytes())?;
            // Build the index so balances can be read right away
            let utxo_set = UTXOSet::new(blockchain)?;
            utxo_set.reindex()?;
            println!("Done!");
        }
        Command::GetBalance { owner } => {
            let blockchain = Blockchain::new_blockchain()?;
            let utxo_set = UTXOSet::new(blockchain)?;
            if !utxo_set.is_synced()? {
                utxo_set.reindex()?;
            }
            let balance: u64 = utxo_set
                .find_unspent_outputs(owner.as_bytes())?
                .iter()
                .map(|out| out.get_value())
                .sum();
            println!("Balance of {owner}: {balance}");
        }
        Command::Send { from, to, amount } => {
            if amount == 0 {
                return Err("Amount must be positive".into());
            }

            let blockchain = Blockchain::new_blockchain()?;
            let utxo_set = UTXOSet::new(blockchain.clone())?;
            if !utxo_set.is_synced()? {
                utxo_set.reindex()?;
            }

            let transaction =
                Transaction::new_utxo_transaction(from.as_bytes(), to.as_bytes(), amount, &utxo_set)?;
            // The sender mines the transfer and collects the reward
            let block = blockchain.mine_block(&[transaction], from.as_bytes())?;
            utxo_set.update_with_block(&block)?;
            println!("Success! Block {}", block.get_hash_hex());
        }
        Command::Mine { owner } => {
            let blockchain = Blockchain::new_blockchain()?;
            let utxo_set = UTXOSet::new(blockchain.clone())?;
            let block = blockchain.mine_block(&[], owner.as_bytes())?;
            utxo_set.update_with_block(&block)?;
            println!(
                "Mined block {} at height {}",
                block.get_hash_hex(),
                block.get_height()
            );
        }
        Command::Printchain => {
            for block in Blockchain::new_blockchain()?.iterator() {
                let block = block?;
                println!("Height: {}", block.get_height());
                println!("Pre block hash: {}", HEXLOWER.encode(block.get_pre_block_hash()));
                println!("Cur block hash: {}", block.get_hash_hex());
                println!("Timestamp: {}", block.get_timestamp());
                println!(
                    "Difficulty: {} Nonce: {} Valid: {}",
                    block.get_difficulty(),
                    block.get_nonce(),
                    block.validate()
                );

                for tx in block.get_transactions() {
                    println!("- Transaction txid_hex: {}", HEXLOWER.encode(tx.get_id()));

                    if !tx.is_coinbase() {
                        for input in tx.get_vin() {
                            println!(
                                "-- Input txid = {}, vout = {}, from = {}",
                                HEXLOWER.encode(input.get_txid()),
                                input.get_vout(),
                                HEXLOWER.encode(input.get_pub_key()),
                            )
                        }
                    }
                    for output in tx.get_vout() {
                        println!(
                            "-- Output value = {}, to = {}",
                            output.get_value(),
                            HEXLOWER.encode(output.get_pub_key_hash()),
                        )
                    }
                }
                println!()
            }
        }
        Command::Reindexutxo => {
            let blockchain = Blockchain::new_blockchain()?;
            let utxo_set = UTXOSet::new(blockchain)?;
            utxo_set.reindex()?;
            let count = utxo_set.count_transactions()?;
            println!("Done! There are {count} transactions in the UTXO set.");
        }
        Command::Validatechain => {
            let blockchain = Blockchain::new_blockchain()?;
            if blockchain.validate_chain()? {
                println!(
                    "Chain is valid up to height {}",
                    blockchain.get_best_height()?
                );
            } else {
                return Err("Chain failed validation".into());
            }
        }
    }
    Ok(())
}
