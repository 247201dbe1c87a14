//! Resident use-case service.
//!
//! # Responsibility
//! - Orchestrate resident lifecycle operations, including optional
//!   household assignment at creation, as single units of work.
//! - Enforce the caller's scope on every operation: reads mask denied rows
//!   as absent, writes fail before any mutation.
//!
//! # Invariants
//! - Creating with a household writes the resident row, the membership
//!   edge and the recomputed aggregates in one IMMEDIATE transaction.
//! - Attribute updates recompute sectoral flags and, when assigned, the
//!   household aggregates before commit.
//! - Soft delete detaches the membership edge and recomputes the former
//!   household in the same transaction.

use crate::access::scope_allows;
use crate::db::{is_busy_error, DbError};
use crate::derive::engine::{self, DeriveError};
use crate::model::date::CivilDate;
use crate::model::household::HouseholdCode;
use crate::model::principal::{AccessPrincipal, RecordScope};
use crate::model::resident::{
    EducationLevel, EducationStatus, EmploymentStatus, Resident, ResidentId,
    ResidentValidationError, SectoralProfile, Sex,
};
use crate::repo::catalog_repo::{
    CatalogRepoError, OccupationCatalogRepository, SqliteOccupationCatalogRepository,
};
use crate::repo::household_repo::{
    HouseholdRepoError, HouseholdRepository, SqliteHouseholdRepository,
};
use crate::repo::resident_repo::{
    ResidentListQuery, ResidentRepoError, ResidentRepository, SqliteResidentRepository,
};
use log::{error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

/// Caller-supplied resident attributes for create and update.
#[derive(Debug, Clone)]
pub struct ResidentInput {
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub sex: Sex,
    pub birthdate: CivilDate,
    pub monthly_income: Option<Decimal>,
    pub occupation_code: Option<String>,
    pub employment_status: EmploymentStatus,
    pub education_status: EducationStatus,
    pub education_level: Option<EducationLevel>,
    pub is_migrant: bool,
}

/// Errors from resident service operations.
#[derive(Debug)]
pub enum ResidentServiceError {
    /// Principal's scope does not cover the target record.
    AccessDenied,
    /// A write-lock race was lost; caller retries with a fresh
    /// transaction.
    ConcurrentConflict,
    /// Target resident does not exist or is soft-deleted.
    ResidentNotFound(ResidentId),
    /// Assignment target household does not exist or is soft-deleted.
    HouseholdNotFound(String),
    /// Resident state violates model consistency rules.
    Validation(ResidentValidationError),
    /// Derived-state recompute failed; the transaction was rolled back.
    Recompute(DeriveError),
    /// Household persistence failure.
    Household(HouseholdRepoError),
    /// Resident persistence failure.
    Resident(ResidentRepoError),
    /// Occupation catalog persistence failure.
    Catalog(CatalogRepoError),
    /// Transaction-level SQLite failure.
    Db(DbError),
    /// Internal consistency mismatch between write and read-back.
    InconsistentState(&'static str),
}

impl Display for ResidentServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AccessDenied => write!(f, "access denied"),
            Self::ConcurrentConflict => write!(f, "concurrent write conflict"),
            Self::ResidentNotFound(id) => write!(f, "resident not found: {id}"),
            Self::HouseholdNotFound(code) => write!(f, "household not found: {code}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Recompute(err) => write!(f, "{err}"),
            Self::Household(err) => write!(f, "{err}"),
            Self::Resident(err) => write!(f, "{err}"),
            Self::Catalog(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::InconsistentState(details) => {
                write!(f, "inconsistent resident state: {details}")
            }
        }
    }
}

impl Error for ResidentServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Recompute(err) => Some(err),
            Self::Household(err) => Some(err),
            Self::Resident(err) => Some(err),
            Self::Catalog(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<HouseholdRepoError> for ResidentServiceError {
    fn from(value: HouseholdRepoError) -> Self {
        match value {
            HouseholdRepoError::HouseholdNotFound(code) => Self::HouseholdNotFound(code),
            other => Self::Household(other),
        }
    }
}

impl From<ResidentRepoError> for ResidentServiceError {
    fn from(value: ResidentRepoError) -> Self {
        match value {
            ResidentRepoError::ResidentNotFound(id) => Self::ResidentNotFound(id),
            ResidentRepoError::Validation(err) => Self::Validation(err),
            other => Self::Resident(other),
        }
    }
}

impl From<CatalogRepoError> for ResidentServiceError {
    fn from(value: CatalogRepoError) -> Self {
        Self::Catalog(value)
    }
}

impl From<DeriveError> for ResidentServiceError {
    fn from(value: DeriveError) -> Self {
        Self::Recompute(value)
    }
}

impl From<rusqlite::Error> for ResidentServiceError {
    fn from(value: rusqlite::Error) -> Self {
        // Covers the lock race at `BEGIN IMMEDIATE` and at commit.
        if is_busy_error(&value) {
            return Self::ConcurrentConflict;
        }
        Self::Db(DbError::Sqlite(value))
    }
}

/// Resident service facade over one migrated connection.
pub struct ResidentService<'conn> {
    conn: &'conn Connection,
}

impl<'conn> ResidentService<'conn> {
    /// Creates the service on a migrated connection.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Creates one resident, standalone or directly under a household.
    ///
    /// `as_of` is the evaluation date for the age-derived flags. With a
    /// household, the row, the membership edge and the recomputed
    /// aggregates commit together.
    pub fn create_resident(
        &self,
        principal: &AccessPrincipal,
        input: ResidentInput,
        household_code: Option<&HouseholdCode>,
        as_of: CivilDate,
    ) -> Result<Resident, ResidentServiceError> {
        let started_at = Instant::now();
        match self.create_resident_tx(principal, input, household_code, as_of) {
            Ok(resident) => {
                info!(
                    "event=resident_create module=resident_service status=ok resident={} duration_ms={}",
                    resident.id,
                    started_at.elapsed().as_millis()
                );
                Ok(resident)
            }
            Err(err) => {
                error!(
                    "event=resident_create module=resident_service status=error duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    error_code(&err),
                    err
                );
                Err(err)
            }
        }
    }

    /// Replaces one resident's attributes and recomputes derived state.
    pub fn update_resident(
        &self,
        principal: &AccessPrincipal,
        resident_id: ResidentId,
        input: ResidentInput,
        as_of: CivilDate,
    ) -> Result<Resident, ResidentServiceError> {
        let started_at = Instant::now();
        match self.update_resident_tx(principal, resident_id, input, as_of) {
            Ok(resident) => {
                info!(
                    "event=resident_update module=resident_service status=ok resident={resident_id} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(resident)
            }
            Err(err) => {
                error!(
                    "event=resident_update module=resident_service status=error resident={resident_id} duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    error_code(&err),
                    err
                );
                Err(err)
            }
        }
    }

    /// Gets one resident. Out-of-scope or missing both read as `None`.
    pub fn get_resident(
        &self,
        principal: &AccessPrincipal,
        resident_id: ResidentId,
    ) -> Result<Option<Resident>, ResidentServiceError> {
        let residents = SqliteResidentRepository::try_new(self.conn)?;
        let resident = match residents.get_resident(resident_id, false)? {
            Some(resident) => resident,
            None => return Ok(None),
        };
        if !scope_allows(principal, &RecordScope::from(&resident)) {
            return Ok(None);
        }
        Ok(Some(resident))
    }

    /// Lists residents inside the principal's scope.
    pub fn list_residents(
        &self,
        principal: &AccessPrincipal,
        query: &ResidentListQuery,
    ) -> Result<Vec<Resident>, ResidentServiceError> {
        let residents = SqliteResidentRepository::try_new(self.conn)?;
        residents.list_residents(principal, query).map_err(Into::into)
    }

    /// Soft-deletes one resident, detaching any active membership.
    pub fn soft_delete_resident(
        &self,
        principal: &AccessPrincipal,
        resident_id: ResidentId,
    ) -> Result<(), ResidentServiceError> {
        let started_at = Instant::now();
        match self.soft_delete_resident_tx(principal, resident_id) {
            Ok(()) => {
                info!(
                    "event=resident_delete module=resident_service status=ok resident={resident_id} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=resident_delete module=resident_service status=error resident={resident_id} duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    error_code(&err),
                    err
                );
                Err(err)
            }
        }
    }

    /// Inserts or refreshes one occupation catalog entry.
    ///
    /// The catalog is nationwide reference data, so writes require a
    /// national principal.
    pub fn upsert_occupation(
        &self,
        principal: &AccessPrincipal,
        code: &str,
        title: &str,
    ) -> Result<(), ResidentServiceError> {
        if !scope_allows(principal, &RecordScope::default()) {
            return Err(ResidentServiceError::AccessDenied);
        }
        let catalog = SqliteOccupationCatalogRepository::try_new(self.conn)?;
        catalog.upsert_occupation(code, title)?;
        info!("event=occupation_upsert module=resident_service status=ok code={code}");
        Ok(())
    }

    /// Resolves an occupation code to its display title.
    pub fn occupation_title(&self, code: &str) -> Result<Option<String>, ResidentServiceError> {
        let catalog = SqliteOccupationCatalogRepository::try_new(self.conn)?;
        catalog.occupation_title(code).map_err(Into::into)
    }

    fn create_resident_tx(
        &self,
        principal: &AccessPrincipal,
        input: ResidentInput,
        household_code: Option<&HouseholdCode>,
        as_of: CivilDate,
    ) -> Result<Resident, ResidentServiceError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let residents = SqliteResidentRepository::try_new(&tx)?;

        let resident_id = match household_code {
            Some(code) => {
                let households = SqliteHouseholdRepository::try_new(&tx)?;
                let household = households.get_household(code, false)?.ok_or_else(|| {
                    ResidentServiceError::HouseholdNotFound(code.as_str().to_string())
                })?;
                if !scope_allows(principal, &RecordScope::from(&household)) {
                    return Err(ResidentServiceError::AccessDenied);
                }

                let resident = Resident {
                    household_code: Some(household.code.clone()),
                    barangay_code: Some(household.barangay_code.clone()),
                    city_code: Some(household.city_code.clone()),
                    province_code: household.province_code.clone(),
                    region_code: Some(household.region_code.clone()),
                    ..blank_resident(input)
                };
                let resident_id = residents.insert_resident(&resident)?;
                households.upsert_member_edge(code, resident_id)?;
                resident_id
            }
            None => {
                if !scope_allows(principal, &RecordScope::default()) {
                    return Err(ResidentServiceError::AccessDenied);
                }
                residents.insert_resident(&blank_resident(input))?
            }
        };

        engine::on_resident_attributes_changed(&tx, resident_id, as_of)?;

        let refreshed = residents.get_resident(resident_id, false)?.ok_or(
            ResidentServiceError::InconsistentState("created resident not found in read-back"),
        )?;
        tx.commit()?;
        Ok(refreshed)
    }

    fn update_resident_tx(
        &self,
        principal: &AccessPrincipal,
        resident_id: ResidentId,
        input: ResidentInput,
        as_of: CivilDate,
    ) -> Result<Resident, ResidentServiceError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let residents = SqliteResidentRepository::try_new(&tx)?;

        let current = residents
            .get_resident(resident_id, false)?
            .ok_or(ResidentServiceError::ResidentNotFound(resident_id))?;
        if !scope_allows(principal, &RecordScope::from(&current)) {
            return Err(ResidentServiceError::AccessDenied);
        }

        let updated = Resident {
            last_name: input.last_name,
            first_name: input.first_name,
            middle_name: input.middle_name,
            sex: input.sex,
            birthdate: input.birthdate,
            monthly_income: input.monthly_income,
            occupation_code: input.occupation_code,
            employment_status: input.employment_status,
            education_status: input.education_status,
            education_level: input.education_level,
            is_migrant: input.is_migrant,
            ..current
        };
        residents.update_attributes(&updated)?;
        engine::on_resident_attributes_changed(&tx, resident_id, as_of)?;

        let refreshed = residents.get_resident(resident_id, false)?.ok_or(
            ResidentServiceError::InconsistentState("updated resident not found in read-back"),
        )?;
        tx.commit()?;
        Ok(refreshed)
    }

    fn soft_delete_resident_tx(
        &self,
        principal: &AccessPrincipal,
        resident_id: ResidentId,
    ) -> Result<(), ResidentServiceError> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let residents = SqliteResidentRepository::try_new(&tx)?;

        let current = residents
            .get_resident(resident_id, false)?
            .ok_or(ResidentServiceError::ResidentNotFound(resident_id))?;
        if !scope_allows(principal, &RecordScope::from(&current)) {
            return Err(ResidentServiceError::AccessDenied);
        }

        match current.household_code {
            Some(code) => {
                let households = SqliteHouseholdRepository::try_new(&tx)?;
                households.deactivate_member_edge(&code, resident_id)?;
                if let Some(household) = households.get_household(&code, false)? {
                    if household.head_resident_id == Some(resident_id) {
                        households.set_head(&code, None)?;
                    }
                }
                residents.clear_household(resident_id)?;
                residents.soft_delete_resident(resident_id)?;
                engine::on_household_membership_changed(&tx, &code)?;
            }
            None => {
                residents.soft_delete_resident(resident_id)?;
            }
        }

        tx.commit()?;
        Ok(())
    }
}

/// Builds an unassigned resident row from caller input. Derived flags
/// start false and are recomputed before commit; timestamps come from
/// column defaults.
fn blank_resident(input: ResidentInput) -> Resident {
    Resident {
        id: Uuid::new_v4(),
        last_name: input.last_name,
        first_name: input.first_name,
        middle_name: input.middle_name,
        sex: input.sex,
        birthdate: input.birthdate,
        monthly_income: input.monthly_income,
        occupation_code: input.occupation_code,
        employment_status: input.employment_status,
        education_status: input.education_status,
        education_level: input.education_level,
        is_migrant: input.is_migrant,
        household_code: None,
        barangay_code: None,
        city_code: None,
        province_code: None,
        region_code: None,
        sectoral: SectoralProfile::default(),
        is_deleted: false,
        created_at: 0,
        updated_at: 0,
    }
}

fn error_code(err: &ResidentServiceError) -> &'static str {
    match err {
        ResidentServiceError::AccessDenied => "access_denied",
        ResidentServiceError::ConcurrentConflict => "concurrent_conflict",
        ResidentServiceError::ResidentNotFound(_) => "resident_not_found",
        ResidentServiceError::HouseholdNotFound(_) => "household_not_found",
        ResidentServiceError::Validation(_) => "validation_failed",
        ResidentServiceError::Recompute(_) => "derived_state_recompute_failed",
        ResidentServiceError::Household(_)
        | ResidentServiceError::Resident(_)
        | ResidentServiceError::Catalog(_)
        | ResidentServiceError::Db(_) => "storage_failed",
        ResidentServiceError::InconsistentState(_) => "inconsistent_state",
    }
}
