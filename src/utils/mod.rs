//! Utility functions and helpers
//!
//! Hashing, timestamps and the bincode helpers used for every
//! persisted value.

pub mod crypto;
pub mod serialization;

pub use crypto::{current_timestamp, sha256_digest};

pub use serialization::{deserialize, serialize};
