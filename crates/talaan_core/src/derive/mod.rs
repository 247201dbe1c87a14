//! Derived record state: classification rules and recompute hooks.
//!
//! # Responsibility
//! - Pure classification functions for income class and sectoral flags.
//! - Transactional hooks that write recomputed values back to storage.
//!
//! # Invariants
//! - Classification functions are pure and total over their inputs.
//! - Write-back happens only through [`engine`], inside the mutating
//!   transaction.

pub mod engine;
pub mod income;
pub mod sectoral;
