//! Configuration management
//!
//! Data directory and mining settings, read from the environment once and
//! adjustable at runtime.

pub mod settings;

pub use settings::{Config, DEFAULT_MINING_DIFFICULTY, GLOBAL_CONFIG};
