use crate::error::{BlockchainError, Result};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

static DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_MINING_DIFFICULTY: u8 = 16;

const DATA_DIR_KEY: &str = "POWCHAIN_DATA_DIR";
const MINING_DIFFICULTY_KEY: &str = "MINING_DIFFICULTY";
const MINING_WORKERS_KEY: &str = "MINING_WORKERS";
const MINING_MAX_NONCE_KEY: &str = "MINING_MAX_NONCE";

/// Process-wide settings, seeded from the environment
pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let mut map = HashMap::new();
        for key in [
            DATA_DIR_KEY,
            MINING_DIFFICULTY_KEY,
            MINING_WORKERS_KEY,
            MINING_MAX_NONCE_KEY,
        ] {
            if let Ok(value) = env::var(key) {
                map.insert(String::from(key), value);
            }
        }

        Config {
            inner: RwLock::new(map),
        }
    }

    /// Config with no environment overrides
    pub fn empty() -> Config {
        Config {
            inner: RwLock::new(HashMap::new()),
        }
    }

    // Settings are plain strings, a poisoned lock still holds a usable map
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, String>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, String>> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.read().get(key) {
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| BlockchainError::Config(format!("Invalid value for {key}: {raw}"))),
            None => Ok(None),
        }
    }

    pub fn get_data_dir(&self) -> PathBuf {
        self.read()
            .get(DATA_DIR_KEY)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    pub fn set_data_dir(&self, dir: String) {
        self.write().insert(String::from(DATA_DIR_KEY), dir);
    }

    /// Difficulty bits for newly mined blocks
    pub fn get_mining_difficulty(&self) -> Result<u8> {
        Ok(self
            .parse::<u8>(MINING_DIFFICULTY_KEY)?
            .unwrap_or(DEFAULT_MINING_DIFFICULTY))
    }

    pub fn set_mining_difficulty(&self, difficulty: u8) {
        self.write()
            .insert(String::from(MINING_DIFFICULTY_KEY), difficulty.to_string());
    }

    /// Number of parallel nonce workers, never zero
    pub fn get_mining_workers(&self) -> Result<usize> {
        match self.parse::<usize>(MINING_WORKERS_KEY)? {
            Some(0) => Err(BlockchainError::Config(format!(
                "{MINING_WORKERS_KEY} must be at least 1"
            ))),
            Some(workers) => Ok(workers),
            None => Ok(std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)),
        }
    }

    pub fn set_mining_workers(&self, workers: usize) {
        self.write()
            .insert(String::from(MINING_WORKERS_KEY), workers.to_string());
    }

    /// Inclusive upper bound of the nonce search
    pub fn get_mining_max_nonce(&self) -> Result<u64> {
        Ok(self
            .parse::<u64>(MINING_MAX_NONCE_KEY)?
            .unwrap_or(u64::MAX))
    }

    pub fn set_mining_max_nonce(&self, max_nonce: u64) {
        self.write()
            .insert(String::from(MINING_MAX_NONCE_KEY), max_nonce.to_string());
    }
}
