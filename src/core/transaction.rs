// Minimal UTXO transaction model: outputs lock value to a key hash, inputs
// point back at a previous transaction's output by (txid, vout).
// Signatures are not modelled here; an input only carries the credential
// of whoever spends it.

use crate::error::{BlockchainError, Result};
use crate::storage::UTXOSet;
use crate::utils::{deserialize, serialize, sha256_digest};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reward paid by every coinbase transaction
pub const BLOCK_SUBSIDY: u64 = 50;

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXInput {
    txid: Vec<u8>,    // Transaction holding the output being spent
    vout: usize,      // Position of that output
    pub_key: Vec<u8>, // Spending credential
}

impl TXInput {
    pub fn new(txid: &[u8], vout: usize, pub_key: &[u8]) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            pub_key: pub_key.to_vec(),
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> usize {
        self.vout
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    pub_key_hash: Vec<u8>, // Key hash that may spend this output
}

impl TXOutput {
    pub fn new(value: u64, pub_key_hash: &[u8]) -> Result<TXOutput> {
        if value == 0 {
            return Err(BlockchainError::Transaction(
                "Output value must be positive".to_string(),
            ));
        }
        if pub_key_hash.is_empty() {
            return Err(BlockchainError::Transaction(
                "Output must be locked to a key hash".to_string(),
            ));
        }

        Ok(TXOutput {
            value,
            pub_key_hash: pub_key_hash.to_vec(),
        })
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

/// Output still unspent, tagged with its position in the creating transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct UnspentOutput {
    pub vout: usize,
    pub output: TXOutput,
}

/// The unspent outputs of one transaction, as stored in the UTXO index
///
/// Positions are the original output indices, so removing one output never
/// changes how the remaining ones are referenced.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXOutputs {
    outputs: Vec<UnspentOutput>,
}

impl TXOutputs {
    /// Every output of a freshly included transaction
    pub fn from_transaction(tx: &Transaction) -> TXOutputs {
        TXOutputs {
            outputs: tx
                .get_vout()
                .iter()
                .enumerate()
                .map(|(vout, output)| UnspentOutput {
                    vout,
                    output: output.clone(),
                })
                .collect(),
        }
    }

    pub fn push(&mut self, vout: usize, output: TXOutput) {
        self.outputs.push(UnspentOutput { vout, output });
    }

    /// Drop the output at original position `vout`, returning it if present
    pub fn remove(&mut self, vout: usize) -> Option<TXOutput> {
        let position = self.outputs.iter().position(|out| out.vout == vout)?;
        Some(self.outputs.remove(position).output)
    }

    pub fn get(&self, vout: usize) -> Option<&TXOutput> {
        self.outputs
            .iter()
            .find(|out| out.vout == vout)
            .map(|out| &out.output)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnspentOutput> {
        self.outputs.iter()
    }

    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<TXOutputs> {
        deserialize(bytes)
    }
}

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
    coinbase_data: Vec<u8>, // Random bytes keeping coinbase ids unique
}

impl Transaction {
    /// Mint `reward` to `to`. Coinbase transactions have no inputs.
    pub fn new_coinbase_tx(to: &[u8], reward: u64) -> Result<Transaction> {
        let mut tx = Transaction {
            id: vec![],
            vin: vec![],
            vout: vec![TXOutput::new(reward, to)?],
            coinbase_data: Uuid::new_v4().as_bytes().to_vec(),
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Build a transfer from explicit inputs and outputs
    pub fn new(vin: Vec<TXInput>, vout: Vec<TXOutput>) -> Result<Transaction> {
        if vin.is_empty() {
            return Err(BlockchainError::Transaction(
                "A transfer needs at least one input".to_string(),
            ));
        }
        if vout.is_empty() {
            return Err(BlockchainError::Transaction(
                "A transfer needs at least one output".to_string(),
            ));
        }

        let mut tx = Transaction {
            id: vec![],
            vin,
            vout,
            coinbase_data: vec![],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Spend `amount` from `from` to `to`, paying any change back to `from`
    pub fn new_utxo_transaction(
        from: &[u8],
        to: &[u8],
        amount: u64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(BlockchainError::Transaction(
                "Amount must be positive".to_string(),
            ));
        }

        let (accumulated, valid_outputs) = utxo_set.find_spendable_outputs(from, amount)?;
        if accumulated < amount {
            return Err(BlockchainError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = vec![];
        for (txid_hex, outs) in valid_outputs {
            let txid = HEXLOWER.decode(txid_hex.as_bytes()).map_err(|e| {
                BlockchainError::Transaction(format!("Invalid transaction ID: {e}"))
            })?;
            for out in outs {
                inputs.push(TXInput::new(&txid, out, from));
            }
        }
        // HashMap order is arbitrary; keep the encoding reproducible
        inputs.sort_by(|a, b| (&a.txid, a.vout).cmp(&(&b.txid, b.vout)));

        let mut outputs = vec![TXOutput::new(amount, to)?];
        let change = accumulated - amount;
        if change > 0 {
            outputs.push(TXOutput::new(change, from)?);
        }

        Transaction::new(inputs, outputs)
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.is_empty()
    }

    fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
            coinbase_data: self.coinbase_data.clone(),
        };
        Ok(sha256_digest(&tx_copy.serialize()?))
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn get_output_value(&self) -> Result<u64> {
        self.vout.iter().try_fold(0u64, |total, out| {
            total
                .checked_add(out.get_value())
                .ok_or_else(|| BlockchainError::Transaction("Output value overflow".to_string()))
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }
}
