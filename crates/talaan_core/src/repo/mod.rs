//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts.
//! - Isolate SQLite query details from service/business orchestration.
//!
//! # Invariants
//! - Repository writes must enforce model `validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `DuplicateCode`,
//!   `SequenceExhausted`) in addition to DB transport errors.
//! - Listing repositories push the caller's scope condition into SQL so
//!   out-of-scope rows never reach the process.
//!
//! # See also
//! - [`crate::access`] for the scope predicate and its SQL form.
//! - [`crate::service`] for transactional orchestration on top of repos.

pub mod catalog_repo;
pub mod geo_repo;
pub mod household_repo;
pub mod resident_repo;
pub mod sequence_repo;
