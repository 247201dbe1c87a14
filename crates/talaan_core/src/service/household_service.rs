//! Household use-case service.
//!
//! # Responsibility
//! - Orchestrate household creation (ancestry resolution, code allocation,
//!   insert) and membership mutations as single units of work.
//! - Enforce the caller's scope on every operation: reads mask denied rows
//!   as absent, writes fail before any mutation.
//!
//! # Invariants
//! - Every mutating operation runs one IMMEDIATE transaction covering the
//!   row writes, the counter bumps and the derived-state recompute.
//! - A household with active members is never soft-deleted.
//! - The head must be an active member; removing the head clears it.

use crate::access::scope_allows;
use crate::db::{is_busy_error, DbError};
use crate::derive::engine::{self, DeriveError};
use crate::model::geo::GeoAncestry;
use crate::model::household::{Household, HouseholdCode, HouseholdCodeError};
use crate::model::principal::{AccessPrincipal, RecordScope};
use crate::model::resident::ResidentId;
use crate::repo::geo_repo::{GeoRepoError, GeoTreeRepository, SqliteGeoTreeRepository};
use crate::repo::household_repo::{
    HouseholdListQuery, HouseholdRepoError, HouseholdRepository, SqliteHouseholdRepository,
};
use crate::repo::resident_repo::{
    ResidentRepoError, ResidentRepository, SqliteResidentRepository,
};
use crate::repo::sequence_repo::{
    house_scope_key, street_scope_key, subdivision_scope_key, SequenceAllocator, SequenceError,
    SqliteSequenceAllocator,
};
use log::{error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Errors from household service operations.
#[derive(Debug)]
pub enum HouseholdServiceError {
    /// Principal's scope does not cover the target record.
    AccessDenied,
    /// Referenced geographic code missing or inactive.
    UnknownGeoCode(String),
    /// Numbering scope has handed out all 9999 numbers.
    SequenceExhausted { scope_key: String },
    /// A write-lock race was lost; caller retries with a fresh
    /// transaction. `scope_key` names the contested numbering scope, or
    /// `db` when the database write lock itself was contested.
    ConcurrentConflict { scope_key: String },
    /// Target household does not exist or is soft-deleted.
    HouseholdNotFound(String),
    /// Target resident does not exist or is soft-deleted.
    ResidentNotFound(ResidentId),
    /// Resident already holds an active membership.
    AlreadyMember {
        resident_id: ResidentId,
        household_code: HouseholdCode,
    },
    /// Resident has no active membership in this household.
    NotAMember {
        resident_id: ResidentId,
        household_code: HouseholdCode,
    },
    /// Head candidate is not an active member of this household.
    HeadNotMember {
        resident_id: ResidentId,
        household_code: HouseholdCode,
    },
    /// Household still has active members and cannot be deleted.
    HasActiveMembers {
        household_code: HouseholdCode,
        member_count: u32,
    },
    /// Allocated sequence did not fit the code format.
    Code(HouseholdCodeError),
    /// Derived-state recompute failed; the transaction was rolled back.
    Recompute(DeriveError),
    /// Geographic catalog failure.
    Geo(GeoRepoError),
    /// Sequence persistence failure.
    Sequence(SequenceError),
    /// Household persistence failure.
    Household(HouseholdRepoError),
    /// Resident persistence failure.
    Resident(ResidentRepoError),
    /// Transaction-level SQLite failure.
    Db(DbError),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl Display for HouseholdServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessDenied => write!(f, "access denied"),
            Self::UnknownGeoCode(code) => write!(f, "unknown geographic code: {code}"),
            Self::SequenceExhausted { scope_key } => {
                write!(f, "sequence scope exhausted: {scope_key}")
            }
            Self::ConcurrentConflict { scope_key } => {
                write!(f, "concurrent allocation conflict in scope {scope_key}")
            }
            Self::HouseholdNotFound(code) => write!(f, "household not found: {code}"),
            Self::ResidentNotFound(id) => write!(f, "resident not found: {id}"),
            Self::AlreadyMember {
                resident_id,
                household_code,
            } => write!(
                f,
                "resident {resident_id} already has an active membership in {household_code}"
            ),
            Self::NotAMember {
                resident_id,
                household_code,
            } => write!(
                f,
                "resident {resident_id} is not an active member of {household_code}"
            ),
            Self::HeadNotMember {
                resident_id,
                household_code,
            } => write!(
                f,
                "head candidate {resident_id} is not an active member of {household_code}"
            ),
            Self::HasActiveMembers {
                household_code,
                member_count,
            } => write!(
                f,
                "household {household_code} still has {member_count} active member(s)"
            ),
            Self::Code(err) => write!(f, "{err}"),
            Self::Recompute(err) => write!(f, "{err}"),
            Self::Geo(err) => write!(f, "{err}"),
            Self::Sequence(err) => write!(f, "{err}"),
            Self::Household(err) => write!(f, "{err}"),
            Self::Resident(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => {
                write!(f, "inconsistent household state: {details}")
            }
        }
    }
}

impl Error for HouseholdServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Code(err) => Some(err),
            Self::Recompute(err) => Some(err),
            Self::Geo(err) => Some(err),
            Self::Sequence(err) => Some(err),
            Self::Household(err) => Some(err),
            Self::Resident(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<GeoRepoError> for HouseholdServiceError {
    fn from(value: GeoRepoError) -> Self {
        match value {
            GeoRepoError::UnknownGeoCode(code) => Self::UnknownGeoCode(code),
            other => Self::Geo(other),
        }
    }
}

impl From<SequenceError> for HouseholdServiceError {
    fn from(value: SequenceError) -> Self {
        match value {
            SequenceError::SequenceExhausted { scope_key } => {
                Self::SequenceExhausted { scope_key }
            }
            SequenceError::ConcurrentConflict { scope_key } => {
                Self::ConcurrentConflict { scope_key }
            }
            other => Self::Sequence(other),
        }
    }
}

impl From<HouseholdRepoError> for HouseholdServiceError {
    fn from(value: HouseholdRepoError) -> Self {
        match value {
            HouseholdRepoError::HouseholdNotFound(code) => Self::HouseholdNotFound(code),
            other => Self::Household(other),
        }
    }
}

impl From<ResidentRepoError> for HouseholdServiceError {
    fn from(value: ResidentRepoError) -> Self {
        match value {
            ResidentRepoError::ResidentNotFound(id) => Self::ResidentNotFound(id),
            other => Self::Resident(other),
        }
    }
}

impl From<DeriveError> for HouseholdServiceError {
    fn from(value: DeriveError) -> Self {
        Self::Recompute(value)
    }
}

impl From<HouseholdCodeError> for HouseholdServiceError {
    fn from(value: HouseholdCodeError) -> Self {
        Self::Code(value)
    }
}

impl From<rusqlite::Error> for HouseholdServiceError {
    fn from(value: rusqlite::Error) -> Self {
        // Covers the lock race at `BEGIN IMMEDIATE` and at commit.
        if is_busy_error(&value) {
            return Self::ConcurrentConflict {
                scope_key: "db".to_string(),
            };
        }
        Self::Db(DbError::Sqlite(value))
    }
}

/// Household service facade over one migrated connection.
pub struct HouseholdService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> HouseholdService<'conn> {
    /// Creates the service on a migrated connection.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates one household in the given barangay, allocating its code.
    ///
    /// `subdivision_id`/`street_id` are the caller's stable identifiers for
    /// the optional address levels; each maps to a per-scope number that is
    /// reused for the same identifier and advances for new ones.
    pub fn create_household(
        &self,
        principal: &AccessPrincipal,
        barangay_code: &str,
        subdivision_id: Option<&str>,
        street_id: Option<&str>,
    ) -> Result<Household, HouseholdServiceError> {
        let started_at = Instant::now();
        match self.create_household_tx(principal, barangay_code, subdivision_id, street_id) {
            Ok(household) => {
                info!(
                    "event=household_create module=household_service status=ok code={} duration_ms={}",
                    household.code,
                    started_at.elapsed().as_millis()
                );
                Ok(household)
            }
            Err(err) => {
                error!(
                    "event=household_create module=household_service status=error barangay={barangay_code} duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    error_code(&err),
                    err
                );
                Err(err)
            }
        }
    }

    /// Gets one household. Out-of-scope or missing both read as `None`.
    pub fn get_household(
        &self,
        principal: &AccessPrincipal,
        code: &HouseholdCode,
    ) -> Result<Option<Household>, HouseholdServiceError> {
        let households = SqliteHouseholdRepository::try_new(self.conn)?;
        let household = match households.get_household(code, false)? {
            Some(household) => household,
            None => return Ok(None),
        };
        if !scope_allows(principal, &RecordScope::from(&household)) {
            return Ok(None);
        }
        Ok(Some(household))
    }

    /// Lists households inside the principal's scope.
    pub fn list_households(
        &self,
        principal: &AccessPrincipal,
        query: &HouseholdListQuery,
    ) -> Result<Vec<Household>, HouseholdServiceError> {
        let households = SqliteHouseholdRepository::try_new(self.conn)?;
        households.list_households(principal, query).map_err(Into::into)
    }

    /// Soft-deletes one household. Refused while active members remain.
    pub fn soft_delete_household(
        &self,
        principal: &AccessPrincipal,
        code: &HouseholdCode,
    ) -> Result<(), HouseholdServiceError> {
        let started_at = Instant::now();
        match self.soft_delete_household_tx(principal, code) {
            Ok(()) => {
                info!(
                    "event=household_delete module=household_service status=ok code={code} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=household_delete module=household_service status=error code={code} duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    error_code(&err),
                    err
                );
                Err(err)
            }
        }
    }

    /// Adds one resident to the household and recomputes its aggregates.
    pub fn add_member(
        &self,
        principal: &AccessPrincipal,
        code: &HouseholdCode,
        resident_id: ResidentId,
    ) -> Result<Household, HouseholdServiceError> {
        let started_at = Instant::now();
        match self.add_member_tx(principal, code, resident_id) {
            Ok(household) => {
                info!(
                    "event=member_add module=household_service status=ok code={code} resident={resident_id} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(household)
            }
            Err(err) => {
                error!(
                    "event=member_add module=household_service status=error code={code} resident={resident_id} duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    error_code(&err),
                    err
                );
                Err(err)
            }
        }
    }

    /// Removes one resident from the household and recomputes its
    /// aggregates. The resident row survives detached.
    pub fn remove_member(
        &self,
        principal: &AccessPrincipal,
        code: &HouseholdCode,
        resident_id: ResidentId,
    ) -> Result<Household, HouseholdServiceError> {
        let started_at = Instant::now();
        match self.remove_member_tx(principal, code, resident_id) {
            Ok(household) => {
                info!(
                    "event=member_remove module=household_service status=ok code={code} resident={resident_id} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(household)
            }
            Err(err) => {
                error!(
                    "event=member_remove module=household_service status=error code={code} resident={resident_id} duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    error_code(&err),
                    err
                );
                Err(err)
            }
        }
    }

    /// Assigns or clears the household head.
    pub fn set_head(
        &self,
        principal: &AccessPrincipal,
        code: &HouseholdCode,
        head_resident_id: Option<ResidentId>,
    ) -> Result<Household, HouseholdServiceError> {
        let started_at = Instant::now();
        match self.set_head_tx(principal, code, head_resident_id) {
            Ok(household) => {
                info!(
                    "event=head_set module=household_service status=ok code={code} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(household)
            }
            Err(err) => {
                error!(
                    "event=head_set module=household_service status=error code={code} duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    error_code(&err),
                    err
                );
                Err(err)
            }
        }
    }

    fn create_household_tx(
        &self,
        principal: &AccessPrincipal,
        barangay_code: &str,
        subdivision_id: Option<&str>,
        street_id: Option<&str>,
    ) -> Result<Household, HouseholdServiceError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let geo = SqliteGeoTreeRepository::try_new(&tx)?;
        let ancestry = geo.resolve_barangay_ancestry(barangay_code)?;
        if !scope_allows(principal, &RecordScope::from(&ancestry)) {
            return Err(HouseholdServiceError::AccessDenied);
        }

        let allocator = SqliteSequenceAllocator::try_new(&tx)?;
        let subdivision_seq = match subdivision_id {
            Some(id) => allocator.assigned_number(&subdivision_scope_key(barangay_code), id)?,
            None => 0,
        };
        let street_seq = match street_id {
            Some(id) => {
                allocator.assigned_number(&street_scope_key(barangay_code, subdivision_seq), id)?
            }
            None => 0,
        };
        let house_seq =
            allocator.next_number(&house_scope_key(barangay_code, subdivision_seq, street_seq))?;

        let code = HouseholdCode::compose(&ancestry, subdivision_seq, street_seq, house_seq)?;
        let households = SqliteHouseholdRepository::try_new(&tx)?;
        let household = households.insert_household(&code, &ancestry, subdivision_id, street_id)?;

        tx.commit()?;
        Ok(household)
    }

    fn soft_delete_household_tx(
        &self,
        principal: &AccessPrincipal,
        code: &HouseholdCode,
    ) -> Result<(), HouseholdServiceError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let households = SqliteHouseholdRepository::try_new(&tx)?;
        let household = self.load_household_for_write(&households, principal, code)?;

        let member_count = households.active_member_count(code)?;
        if member_count > 0 {
            return Err(HouseholdServiceError::HasActiveMembers {
                household_code: household.code,
                member_count,
            });
        }

        households.soft_delete_household(code)?;
        tx.commit()?;
        Ok(())
    }

    fn add_member_tx(
        &self,
        principal: &AccessPrincipal,
        code: &HouseholdCode,
        resident_id: ResidentId,
    ) -> Result<Household, HouseholdServiceError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let households = SqliteHouseholdRepository::try_new(&tx)?;
        let household = self.load_household_for_write(&households, principal, code)?;

        let residents = SqliteResidentRepository::try_new(&tx)?;
        let resident = residents
            .get_resident(resident_id, false)?
            .ok_or(HouseholdServiceError::ResidentNotFound(resident_id))?;
        if let Some(existing) = resident.household_code {
            return Err(HouseholdServiceError::AlreadyMember {
                resident_id,
                household_code: existing,
            });
        }

        let ancestry = GeoAncestry {
            region_code: household.region_code.clone(),
            province_code: household.province_code.clone(),
            city_code: household.city_code.clone(),
            barangay_code: household.barangay_code.clone(),
        };
        households.upsert_member_edge(code, resident_id)?;
        residents.assign_household(resident_id, code, &ancestry)?;
        engine::on_household_membership_changed(&tx, code)?;

        let refreshed = households.get_household(code, false)?.ok_or(
            HouseholdServiceError::InconsistentState("household missing after member add"),
        )?;
        tx.commit()?;
        Ok(refreshed)
    }

    fn remove_member_tx(
        &self,
        principal: &AccessPrincipal,
        code: &HouseholdCode,
        resident_id: ResidentId,
    ) -> Result<Household, HouseholdServiceError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let households = SqliteHouseholdRepository::try_new(&tx)?;
        let household = self.load_household_for_write(&households, principal, code)?;

        let edge_is_active = households
            .get_member_edge(code, resident_id)?
            .map(|edge| edge.is_active)
            .unwrap_or(false);
        if !edge_is_active {
            return Err(HouseholdServiceError::NotAMember {
                resident_id,
                household_code: household.code,
            });
        }

        households.deactivate_member_edge(code, resident_id)?;
        let residents = SqliteResidentRepository::try_new(&tx)?;
        residents.clear_household(resident_id)?;
        if household.head_resident_id == Some(resident_id) {
            households.set_head(code, None)?;
        }
        engine::on_household_membership_changed(&tx, code)?;

        let refreshed = households.get_household(code, false)?.ok_or(
            HouseholdServiceError::InconsistentState("household missing after member remove"),
        )?;
        tx.commit()?;
        Ok(refreshed)
    }

    fn set_head_tx(
        &self,
        principal: &AccessPrincipal,
        code: &HouseholdCode,
        head_resident_id: Option<ResidentId>,
    ) -> Result<Household, HouseholdServiceError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;

        let households = SqliteHouseholdRepository::try_new(&tx)?;
        let household = self.load_household_for_write(&households, principal, code)?;

        if let Some(resident_id) = head_resident_id {
            let edge_is_active = households
                .get_member_edge(code, resident_id)?
                .map(|edge| edge.is_active)
                .unwrap_or(false);
            if !edge_is_active {
                return Err(HouseholdServiceError::HeadNotMember {
                    resident_id,
                    household_code: household.code,
                });
            }
        }

        households.set_head(code, head_resident_id)?;

        let refreshed = households.get_household(code, false)?.ok_or(
            HouseholdServiceError::InconsistentState("household missing after head change"),
        )?;
        tx.commit()?;
        Ok(refreshed)
    }

    fn load_household_for_write(
        &self,
        households: &SqliteHouseholdRepository<'_>,
        principal: &AccessPrincipal,
        code: &HouseholdCode,
    ) -> Result<Household, HouseholdServiceError> {
        let household = households
            .get_household(code, false)?
            .ok_or_else(|| HouseholdServiceError::HouseholdNotFound(code.as_str().to_string()))?;
        if !scope_allows(principal, &RecordScope::from(&household)) {
            return Err(HouseholdServiceError::AccessDenied);
        }
        Ok(household)
    }
}

fn error_code(err: &HouseholdServiceError) -> &'static str {
    match err {
        HouseholdServiceError::AccessDenied => "access_denied",
        HouseholdServiceError::UnknownGeoCode(_) => "unknown_geo_code",
        HouseholdServiceError::SequenceExhausted { .. } => "sequence_exhausted",
        HouseholdServiceError::ConcurrentConflict { .. } => "concurrent_conflict",
        HouseholdServiceError::HouseholdNotFound(_) => "household_not_found",
        HouseholdServiceError::ResidentNotFound(_) => "resident_not_found",
        HouseholdServiceError::AlreadyMember { .. } => "already_member",
        HouseholdServiceError::NotAMember { .. } => "not_a_member",
        HouseholdServiceError::HeadNotMember { .. } => "head_not_member",
        HouseholdServiceError::HasActiveMembers { .. } => "has_active_members",
        HouseholdServiceError::Code(_) => "code_compose_failed",
        HouseholdServiceError::Recompute(_) => "derived_state_recompute_failed",
        HouseholdServiceError::Geo(_)
        | HouseholdServiceError::Sequence(_)
        | HouseholdServiceError::Household(_)
        | HouseholdServiceError::Resident(_)
        | HouseholdServiceError::Db(_) => "storage_failed",
        HouseholdServiceError::InconsistentState(_) => "inconsistent_state",
    }
}
