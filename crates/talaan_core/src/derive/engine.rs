//! Transactional recompute hooks for derived record state.
//!
//! # Responsibility
//! - Rebuild household aggregates and resident sectoral flags from their
//!   source rows after a mutation, inside the caller's transaction.
//!
//! # Invariants
//! - Hooks are explicit function calls on the write path. No triggers, no
//!   deferred jobs.
//! - Hooks write derived columns only. Identifiers, geo codes and
//!   membership edges stay untouched.
//! - A dependency missing mid-recompute fails the hook, which aborts the
//!   enclosing transaction. Derived state is never left partial.
//! - Re-running a hook on unchanged source rows writes identical values.

use crate::derive::income::income_class_for;
use crate::derive::sectoral::profile_for;
use crate::model::date::CivilDate;
use crate::model::household::HouseholdCode;
use crate::model::resident::ResidentId;
use crate::repo::household_repo::{
    HouseholdRepoError, HouseholdRepository, SqliteHouseholdRepository,
};
use crate::repo::resident_repo::{
    ResidentRepoError, ResidentRepository, SqliteResidentRepository,
};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type DeriveResult<T> = Result<T, DeriveError>;

/// Errors from derived-state recomputation.
#[derive(Debug)]
pub enum DeriveError {
    /// Household persistence failed during recompute.
    Household(HouseholdRepoError),
    /// Resident persistence failed during recompute.
    Resident(ResidentRepoError),
    /// A recompute dependency vanished inside the transaction. The caller
    /// must roll back.
    RecomputeFailure { entity: &'static str, key: String },
}

impl Display for DeriveError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Household(err) => write!(f, "{err}"),
            Self::Resident(err) => write!(f, "{err}"),
            Self::RecomputeFailure { entity, key } => write!(
                f,
                "derived state recompute failed: {entity} `{key}` missing mid-transaction"
            ),
        }
    }
}

impl Error for DeriveError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Household(err) => Some(err),
            Self::Resident(err) => Some(err),
            Self::RecomputeFailure { .. } => None,
        }
    }
}

impl From<HouseholdRepoError> for DeriveError {
    fn from(value: HouseholdRepoError) -> Self {
        Self::Household(value)
    }
}

impl From<ResidentRepoError> for DeriveError {
    fn from(value: ResidentRepoError) -> Self {
        Self::Resident(value)
    }
}

/// Rebuilds one household's aggregate columns from its active member
/// edges. Call after any edge or member-attribute mutation, on the same
/// connection (typically a transaction) that performed it.
pub fn on_household_membership_changed(
    conn: &Connection,
    code: &HouseholdCode,
) -> DeriveResult<()> {
    let households = SqliteHouseholdRepository::try_new(conn)?;
    let rollup = households.member_rollup(code)?;
    let income_class = income_class_for(rollup.monthly_income_total);
    if let Err(err) = households.write_aggregates(code, &rollup, income_class) {
        return Err(match err {
            HouseholdRepoError::HouseholdNotFound(key) => DeriveError::RecomputeFailure {
                entity: "household",
                key,
            },
            other => DeriveError::Household(other),
        });
    }
    Ok(())
}

/// Rebuilds one resident's sectoral flags for the given evaluation date,
/// then refreshes the assigned household's aggregates so income and
/// migrant changes flow through in the same transaction.
pub fn on_resident_attributes_changed(
    conn: &Connection,
    resident_id: ResidentId,
    as_of: CivilDate,
) -> DeriveResult<()> {
    let residents = SqliteResidentRepository::try_new(conn)?;
    let resident = residents.get_resident(resident_id, false)?.ok_or_else(|| {
        DeriveError::RecomputeFailure {
            entity: "resident",
            key: resident_id.to_string(),
        }
    })?;

    let profile = profile_for(&resident, as_of);
    if let Err(err) = residents.write_sectoral(resident_id, &profile) {
        return Err(match err {
            ResidentRepoError::ResidentNotFound(id) => DeriveError::RecomputeFailure {
                entity: "resident",
                key: id.to_string(),
            },
            other => DeriveError::Resident(other),
        });
    }

    if let Some(code) = &resident.household_code {
        on_household_membership_changed(conn, code)?;
    }
    Ok(())
}
