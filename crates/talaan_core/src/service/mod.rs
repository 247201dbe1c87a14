//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Own the unit-of-work boundary: one IMMEDIATE transaction per
//!   mutating operation, covering writes and derived-state recompute.
//! - Apply the caller's scope before any data crosses the boundary.
//!
//! # See also
//! - [`crate::access`] for the scope predicate services enforce.
//! - [`crate::derive::engine`] for the recompute hooks services invoke.

pub mod household_service;
pub mod resident_service;
