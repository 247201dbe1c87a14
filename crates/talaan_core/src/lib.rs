//! Core domain logic for Talaan, a civil-registry record engine.
//! This crate is the single source of truth for business invariants.

pub mod access;
pub mod db;
pub mod derive;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use access::{scope_allows, scope_condition, ScopeCondition};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::date::CivilDate;
pub use model::geo::{GeoAncestry, GeoNode, GeoTier, GeoValidationError};
pub use model::household::{Household, HouseholdCode, HouseholdCodeError, IncomeClass};
pub use model::principal::{AccessPrincipal, AccessTier, RecordScope};
pub use model::resident::{
    EducationLevel, EducationStatus, EmploymentStatus, Resident, ResidentId, SectoralProfile, Sex,
};
pub use repo::catalog_repo::{OccupationCatalogRepository, SqliteOccupationCatalogRepository};
pub use repo::geo_repo::{GeoTreeRepository, SqliteGeoTreeRepository};
pub use repo::household_repo::HouseholdListQuery;
pub use repo::resident_repo::ResidentListQuery;
pub use service::household_service::{HouseholdService, HouseholdServiceError};
pub use service::resident_service::{ResidentInput, ResidentService, ResidentServiceError};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
