use crate::config::Config;
use crate::core::Block;
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::{debug, info};
use num_bigint::{BigInt, Sign};
use once_cell::sync::OnceCell;
use std::ops::ShlAssign;
use std::sync::atomic::{AtomicBool, Ordering};

/// How a nonce search is spread out and bounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningOptions {
    /// Parallel workers; worker `w` of `n` tries `w, w + n, w + 2n, ...`
    pub workers: usize,
    /// Inclusive upper bound of the nonce space
    pub max_nonce: u64,
}

impl Default for MiningOptions {
    fn default() -> Self {
        MiningOptions {
            workers: 1,
            max_nonce: u64::MAX,
        }
    }
}

impl MiningOptions {
    pub fn from_config(config: &Config) -> Result<MiningOptions> {
        Ok(MiningOptions {
            workers: config.get_mining_workers()?,
            max_nonce: config.get_mining_max_nonce()?,
        })
    }
}

/// Nonce search over a block's canonical payload
///
/// The payload is the concatenation of version, timestamp, Merkle root,
/// previous hash, difficulty bits, nonce and height. Integers are written as
/// lowercase base-16 text, hashes as raw bytes. A SHA-256 of the payload
/// read as a big-endian integer must be strictly below `2^(256 - bits)`.
pub struct ProofOfWork {
    prefix: Vec<u8>, // everything before the nonce
    suffix: Vec<u8>, // everything after the nonce
    target: BigInt,
    difficulty: u8,
    options: MiningOptions,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: &Block) -> Result<ProofOfWork> {
        let difficulty = block.get_difficulty();

        let mut prefix = vec![];
        prefix.extend(format!("{:x}", block.get_version()).as_bytes());
        prefix.extend(format!("{:x}", block.get_timestamp() as u64).as_bytes());
        prefix.extend(block.hash_transactions()?);
        prefix.extend(block.get_pre_block_hash());
        prefix.extend(format!("{difficulty:x}").as_bytes());
        let suffix = format!("{:x}", block.get_height()).into_bytes();

        Ok(ProofOfWork {
            prefix,
            suffix,
            target: Self::target_for(difficulty),
            difficulty,
            options: MiningOptions::default(),
        })
    }

    pub fn with_options(mut self, options: MiningOptions) -> ProofOfWork {
        self.options = MiningOptions {
            workers: options.workers.max(1),
            max_nonce: options.max_nonce,
        };
        self
    }

    /// `2^(256 - difficulty)`
    pub fn target_for(difficulty: u8) -> BigInt {
        let mut target = BigInt::from(1);
        target.shl_assign(256 - u32::from(difficulty));
        target
    }

    pub fn get_target(&self) -> &BigInt {
        &self.target
    }

    pub fn hash_meets_target(hash: &[u8], target: &BigInt) -> bool {
        BigInt::from_bytes_be(Sign::Plus, hash) < *target
    }

    /// Recompute the hash from the block's stored nonce and check it
    ///
    /// The recomputed hash must equal the stored one and fall below the
    /// block's target. A block whose payload cannot be built (no
    /// transactions) is simply invalid.
    pub fn validate(block: &Block) -> bool {
        let pow = match ProofOfWork::new_proof_of_work(block) {
            Ok(pow) => pow,
            Err(_) => return false,
        };
        let hash = sha256_digest(&pow.prepare_data(block.get_nonce()));
        hash == block.get_hash() && Self::hash_meets_target(&hash, &pow.target)
    }

    pub fn prepare_data(&self, nonce: u64) -> Vec<u8> {
        let mut data_bytes = Vec::with_capacity(self.prefix.len() + 16 + self.suffix.len());
        data_bytes.extend_from_slice(&self.prefix);
        data_bytes.extend(format!("{nonce:x}").as_bytes());
        data_bytes.extend_from_slice(&self.suffix);
        data_bytes
    }

    /// Race the configured workers over the nonce space
    ///
    /// The first worker to find a hash below target claims the stop flag and
    /// fills the result slot; everyone else stops at their next iteration.
    pub fn run(&self) -> Result<(u64, Vec<u8>)> {
        let found = AtomicBool::new(false);
        let winner: OnceCell<(u64, Vec<u8>)> = OnceCell::new();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers)
            .thread_name(|i| format!("pow-worker-{i}"))
            .build()
            .map_err(|e| BlockchainError::Config(format!("Failed to start mining workers: {e}")))?;

        info!(
            "Mining with {} workers at difficulty {}",
            self.options.workers, self.difficulty
        );
        pool.broadcast(|ctx| {
            self.search(
                ctx.index() as u64,
                ctx.num_threads() as u64,
                &found,
                &winner,
            )
        });

        match winner.into_inner() {
            Some((nonce, hash)) => {
                info!("Found nonce {nonce}: {}", HEXLOWER.encode(&hash));
                Ok((nonce, hash))
            }
            None => Err(BlockchainError::MiningExhausted {
                max_nonce: self.options.max_nonce,
            }),
        }
    }

    fn search(
        &self,
        start: u64,
        stride: u64,
        found: &AtomicBool,
        winner: &OnceCell<(u64, Vec<u8>)>,
    ) {
        let mut nonce = start;
        while nonce <= self.options.max_nonce && !found.load(Ordering::Relaxed) {
            let hash = sha256_digest(&self.prepare_data(nonce));
            if Self::hash_meets_target(&hash, &self.target) {
                if !found.swap(true, Ordering::AcqRel) {
                    let _ = winner.set((nonce, hash));
                }
                return;
            }
            nonce = match nonce.checked_add(stride) {
                Some(next) => next,
                None => break,
            };
        }
        debug!("Worker {start} stopped at nonce {nonce}");
    }
}
