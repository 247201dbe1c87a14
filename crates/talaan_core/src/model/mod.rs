//! Domain model for the civil-registry core.
//!
//! # Responsibility
//! - Define canonical data structures for geography, households,
//!   residents and access principals.
//! - Keep validation rules next to the shapes they protect.
//!
//! # Invariants
//! - Geo codes and household codes are immutable once issued.
//! - Deletion is represented by soft-delete tombstones, not hard delete.
//! - Derived fields are written only by `crate::derive`.

pub mod date;
pub mod geo;
pub mod household;
pub mod principal;
pub mod resident;
