//! Access principals and record scopes.
//!
//! # Responsibility
//! - Define the externally supplied caller identity (`AccessPrincipal`)
//!   and the geographic scope a stored record belongs to (`RecordScope`).
//!
//! # Invariants
//! - Tier parsing is closed: an unrecognized tier string never becomes a
//!   principal, so unknown callers see nothing.
//! - `RecordScope` carries full codes only; a missing code at some level
//!   means the record is invisible to principals scoped at that level.
//!
//! # See also
//! - `crate::access` for the predicate that consumes both types.

use crate::model::geo::{GeoAncestry, GeoTier};
use crate::model::household::Household;
use crate::model::resident::Resident;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Administrative level a principal is assigned to.
///
/// `National` has no geographic scope; the other four mirror [`GeoTier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    National,
    Region,
    Province,
    CityMunicipality,
    Barangay,
}

impl AccessTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::National => "national",
            Self::Region => "region",
            Self::Province => "province",
            Self::CityMunicipality => "city_municipality",
            Self::Barangay => "barangay",
        }
    }

    /// Parses the stable tier string. Unknown values yield `None`, which
    /// callers must treat as an unusable principal.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "national" => Some(Self::National),
            "region" => Some(Self::Region),
            "province" => Some(Self::Province),
            "city_municipality" => Some(Self::CityMunicipality),
            "barangay" => Some(Self::Barangay),
            _ => None,
        }
    }

    /// The geo tier a scoped principal's code must resolve to.
    /// `None` for National.
    pub fn geo_tier(self) -> Option<GeoTier> {
        match self {
            Self::National => None,
            Self::Region => Some(GeoTier::Region),
            Self::Province => Some(GeoTier::Province),
            Self::CityMunicipality => Some(GeoTier::CityMunicipality),
            Self::Barangay => Some(GeoTier::Barangay),
        }
    }
}

impl Display for AccessTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller identity supplied by the authentication layer.
///
/// Read-only here; this crate never creates, stores or verifies
/// principals. `scope_code` is `None` for National and required for every
/// other tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPrincipal {
    /// Opaque caller identifier, used for logging only.
    pub id: String,
    pub tier: AccessTier,
    /// Full geo code of the assigned scope; ignored (`None`) for National.
    pub scope_code: Option<String>,
}

impl AccessPrincipal {
    /// A principal with unrestricted national scope.
    pub fn national(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tier: AccessTier::National,
            scope_code: None,
        }
    }

    /// A principal scoped to one geographic unit.
    pub fn scoped(id: impl Into<String>, tier: AccessTier, scope_code: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tier,
            scope_code: Some(scope_code.into()),
        }
    }
}

/// The geographic position of a stored record, one full code per level.
///
/// Standalone residents have no codes at all; households under an
/// independent city have no province code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordScope {
    pub region_code: Option<String>,
    pub province_code: Option<String>,
    pub city_code: Option<String>,
    pub barangay_code: Option<String>,
}

impl RecordScope {
    /// The record's code at the given tier, if any. National has no code.
    pub fn code_at(&self, tier: AccessTier) -> Option<&str> {
        match tier {
            AccessTier::National => None,
            AccessTier::Region => self.region_code.as_deref(),
            AccessTier::Province => self.province_code.as_deref(),
            AccessTier::CityMunicipality => self.city_code.as_deref(),
            AccessTier::Barangay => self.barangay_code.as_deref(),
        }
    }
}

impl From<&Household> for RecordScope {
    fn from(household: &Household) -> Self {
        Self {
            region_code: Some(household.region_code.clone()),
            province_code: household.province_code.clone(),
            city_code: Some(household.city_code.clone()),
            barangay_code: Some(household.barangay_code.clone()),
        }
    }
}

impl From<&Resident> for RecordScope {
    fn from(resident: &Resident) -> Self {
        Self {
            region_code: resident.region_code.clone(),
            province_code: resident.province_code.clone(),
            city_code: resident.city_code.clone(),
            barangay_code: resident.barangay_code.clone(),
        }
    }
}

impl From<&GeoAncestry> for RecordScope {
    fn from(ancestry: &GeoAncestry) -> Self {
        Self {
            region_code: Some(ancestry.region_code.clone()),
            province_code: ancestry.province_code.clone(),
            city_code: Some(ancestry.city_code.clone()),
            barangay_code: Some(ancestry.barangay_code.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AccessPrincipal, AccessTier, RecordScope};
    use crate::model::geo::GeoTier;

    #[test]
    fn tier_strings_round_trip() {
        for tier in [
            AccessTier::National,
            AccessTier::Region,
            AccessTier::Province,
            AccessTier::CityMunicipality,
            AccessTier::Barangay,
        ] {
            assert_eq!(AccessTier::parse(tier.as_str()), Some(tier));
        }
        assert_eq!(AccessTier::parse("galactic"), None);
    }

    #[test]
    fn scoped_tiers_map_to_geo_tiers() {
        assert_eq!(AccessTier::National.geo_tier(), None);
        assert_eq!(AccessTier::Region.geo_tier(), Some(GeoTier::Region));
        assert_eq!(
            AccessTier::CityMunicipality.geo_tier(),
            Some(GeoTier::CityMunicipality)
        );
    }

    #[test]
    fn national_principal_has_no_scope_code() {
        let principal = AccessPrincipal::national("auditor-1");
        assert_eq!(principal.tier, AccessTier::National);
        assert!(principal.scope_code.is_none());
    }

    #[test]
    fn record_scope_reads_the_code_for_each_tier() {
        let scope = RecordScope {
            region_code: Some("04".to_string()),
            province_code: Some("0421".to_string()),
            city_code: Some("042114".to_string()),
            barangay_code: Some("042114014".to_string()),
        };
        assert_eq!(scope.code_at(AccessTier::National), None);
        assert_eq!(scope.code_at(AccessTier::Region), Some("04"));
        assert_eq!(scope.code_at(AccessTier::Barangay), Some("042114014"));

        let empty = RecordScope::default();
        assert_eq!(empty.code_at(AccessTier::Barangay), None);
    }
}
