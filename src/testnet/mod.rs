//! Throwaway chains and indexes for unit tests
//!
//! Everything here lives under a `TempDir` and mines at a trivial difficulty.

pub mod test_utils;

pub use test_utils::*;
