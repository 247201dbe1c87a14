//! Resident domain model.
//!
//! # Responsibility
//! - Define the resident read model, its status enums and the derived
//!   sectoral profile.
//!
//! # Invariants
//! - Geo columns are present exactly when `household_code` is present,
//!   and always mirror the assigned household's codes.
//! - `sectoral` is written only by the derived-state engine.

use crate::model::date::CivilDate;
use crate::model::household::HouseholdCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Resident identifier (UUID v4).
pub type ResidentId = Uuid;

/// Sex recorded at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }
}

impl Display for Sex {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Employment situation used by the labor-force rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    Employed,
    SelfEmployed,
    Unemployed,
    Underemployed,
    LookingForWork,
    Student,
    Retired,
    NotInLaborForce,
}

impl EmploymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Employed => "employed",
            Self::SelfEmployed => "self_employed",
            Self::Unemployed => "unemployed",
            Self::Underemployed => "underemployed",
            Self::LookingForWork => "looking_for_work",
            Self::Student => "student",
            Self::Retired => "retired",
            Self::NotInLaborForce => "not_in_labor_force",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "employed" => Some(Self::Employed),
            "self_employed" => Some(Self::SelfEmployed),
            "unemployed" => Some(Self::Unemployed),
            "underemployed" => Some(Self::Underemployed),
            "looking_for_work" => Some(Self::LookingForWork),
            "student" => Some(Self::Student),
            "retired" => Some(Self::Retired),
            "not_in_labor_force" => Some(Self::NotInLaborForce),
            _ => None,
        }
    }
}

impl Display for EmploymentStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current schooling situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EducationStatus {
    Studying,
    NotStudying,
    DroppedOut,
    Graduated,
}

impl EducationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Studying => "studying",
            Self::NotStudying => "not_studying",
            Self::DroppedOut => "dropped_out",
            Self::Graduated => "graduated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "studying" => Some(Self::Studying),
            "not_studying" => Some(Self::NotStudying),
            "dropped_out" => Some(Self::DroppedOut),
            "graduated" => Some(Self::Graduated),
            _ => None,
        }
    }
}

impl Display for EducationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Highest education level reached, when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EducationLevel {
    Elementary,
    HighSchool,
    SeniorHighSchool,
    Vocational,
    College,
    PostGraduate,
}

impl EducationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Elementary => "elementary",
            Self::HighSchool => "high_school",
            Self::SeniorHighSchool => "senior_high_school",
            Self::Vocational => "vocational",
            Self::College => "college",
            Self::PostGraduate => "post_graduate",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "elementary" => Some(Self::Elementary),
            "high_school" => Some(Self::HighSchool),
            "senior_high_school" => Some(Self::SeniorHighSchool),
            "vocational" => Some(Self::Vocational),
            "college" => Some(Self::College),
            "post_graduate" => Some(Self::PostGraduate),
            _ => None,
        }
    }
}

impl Display for EducationLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived sectoral classification flags.
///
/// Recomputed as a whole on every relevant write; `Default` is the
/// all-false profile of a freshly created resident before recompute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectoralProfile {
    pub is_senior_citizen: bool,
    pub is_out_of_school_child: bool,
    pub is_out_of_school_youth: bool,
    pub is_in_labor_force: bool,
    pub is_employed: bool,
    pub is_unemployed: bool,
}

/// Resident read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resident {
    pub id: ResidentId,
    pub last_name: String,
    pub first_name: String,
    pub middle_name: Option<String>,
    pub sex: Sex,
    pub birthdate: CivilDate,
    /// Monthly income in PHP; `None` means not reported.
    pub monthly_income: Option<Decimal>,
    /// Occupation catalog code, display-only.
    pub occupation_code: Option<String>,
    pub employment_status: EmploymentStatus,
    pub education_status: EducationStatus,
    pub education_level: Option<EducationLevel>,
    /// Stored attribute counted by the household `migrant_count`.
    pub is_migrant: bool,
    /// Active household assignment, if any.
    pub household_code: Option<HouseholdCode>,
    /// Inherited from the household; all `None` when standalone.
    pub barangay_code: Option<String>,
    pub city_code: Option<String>,
    pub province_code: Option<String>,
    pub region_code: Option<String>,
    /// Derived flags, engine-owned.
    pub sectoral: SectoralProfile,
    pub is_deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Consistency failures in resident data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResidentValidationError {
    /// A required name field is empty or whitespace.
    BlankName { field: &'static str },
    /// Reported income is negative.
    NegativeIncome,
    /// Geo columns populated without a household assignment.
    GeoWithoutHousehold,
    /// Household assigned but geo columns missing.
    HouseholdWithoutGeo,
    /// Barangay column disagrees with the household code prefix.
    GeoPrefixMismatch,
}

impl Display for ResidentValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName { field } => write!(f, "resident {field} must not be blank"),
            Self::NegativeIncome => write!(f, "monthly income must not be negative"),
            Self::GeoWithoutHousehold => {
                write!(f, "geo columns are set but no household is assigned")
            }
            Self::HouseholdWithoutGeo => {
                write!(f, "a household is assigned but geo columns are missing")
            }
            Self::GeoPrefixMismatch => {
                write!(f, "barangay column disagrees with the household code prefix")
            }
        }
    }
}

impl Error for ResidentValidationError {}

impl Resident {
    /// Checks name, income and household/geo consistency.
    pub fn validate(&self) -> Result<(), ResidentValidationError> {
        if self.last_name.trim().is_empty() {
            return Err(ResidentValidationError::BlankName { field: "last_name" });
        }
        if self.first_name.trim().is_empty() {
            return Err(ResidentValidationError::BlankName { field: "first_name" });
        }
        if let Some(income) = self.monthly_income {
            if income.is_sign_negative() && !income.is_zero() {
                return Err(ResidentValidationError::NegativeIncome);
            }
        }
        match (&self.household_code, &self.barangay_code) {
            (Some(code), Some(barangay)) => {
                if barangay.as_str() != code.geo_prefix() {
                    return Err(ResidentValidationError::GeoPrefixMismatch);
                }
                if self.city_code.is_none() || self.region_code.is_none() {
                    return Err(ResidentValidationError::HouseholdWithoutGeo);
                }
            }
            (Some(_), None) => return Err(ResidentValidationError::HouseholdWithoutGeo),
            (None, Some(_)) => return Err(ResidentValidationError::GeoWithoutHousehold),
            (None, None) => {
                if self.city_code.is_some()
                    || self.province_code.is_some()
                    || self.region_code.is_some()
                {
                    return Err(ResidentValidationError::GeoWithoutHousehold);
                }
            }
        }
        Ok(())
    }

    /// True while the resident is assigned to a household.
    pub fn is_assigned(&self) -> bool {
        self.household_code.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        EducationLevel, EducationStatus, EmploymentStatus, Resident, ResidentValidationError,
        SectoralProfile, Sex,
    };
    use crate::model::date::CivilDate;
    use crate::model::household::HouseholdCode;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn sample_resident() -> Resident {
        Resident {
            id: Uuid::from_u128(7),
            last_name: "Reyes".to_string(),
            first_name: "Maria".to_string(),
            middle_name: None,
            sex: Sex::Female,
            birthdate: CivilDate::new(1990, 4, 12).unwrap(),
            monthly_income: Some(Decimal::new(18_500, 0)),
            occupation_code: None,
            employment_status: EmploymentStatus::Employed,
            education_status: EducationStatus::Graduated,
            education_level: Some(EducationLevel::College),
            is_migrant: false,
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

    #[test]
    fn status_strings_round_trip() {
        for status in [
            EmploymentStatus::Employed,
            EmploymentStatus::SelfEmployed,
            EmploymentStatus::Unemployed,
            EmploymentStatus::Underemployed,
            EmploymentStatus::LookingForWork,
            EmploymentStatus::Student,
            EmploymentStatus::Retired,
            EmploymentStatus::NotInLaborForce,
        ] {
            assert_eq!(EmploymentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(EmploymentStatus::parse("idle"), None);
        for status in [
            EducationStatus::Studying,
            EducationStatus::NotStudying,
            EducationStatus::DroppedOut,
            EducationStatus::Graduated,
        ] {
            assert_eq!(EducationStatus::parse(status.as_str()), Some(status));
        }
        for level in [
            EducationLevel::Elementary,
            EducationLevel::HighSchool,
            EducationLevel::SeniorHighSchool,
            EducationLevel::Vocational,
            EducationLevel::College,
            EducationLevel::PostGraduate,
        ] {
            assert_eq!(EducationLevel::parse(level.as_str()), Some(level));
        }
        assert_eq!(Sex::parse("male"), Some(Sex::Male));
        assert_eq!(Sex::parse("other"), None);
    }

    #[test]
    fn standalone_resident_validates() {
        assert!(sample_resident().validate().is_ok());
    }

    #[test]
    fn blank_last_name_is_rejected() {
        let mut resident = sample_resident();
        resident.last_name = "   ".to_string();
        assert!(matches!(
            resident.validate(),
            Err(ResidentValidationError::BlankName { field: "last_name" })
        ));
    }

    #[test]
    fn negative_income_is_rejected() {
        let mut resident = sample_resident();
        resident.monthly_income = Some(Decimal::new(-1, 0));
        assert!(matches!(
            resident.validate(),
            Err(ResidentValidationError::NegativeIncome)
        ));
    }

    #[test]
    fn household_assignment_requires_geo_columns() {
        let mut resident = sample_resident();
        resident.household_code =
            Some(HouseholdCode::parse("042114014-0000-0000-0001").unwrap());
        assert!(matches!(
            resident.validate(),
            Err(ResidentValidationError::HouseholdWithoutGeo)
        ));

        resident.barangay_code = Some("042114014".to_string());
        resident.city_code = Some("042114".to_string());
        resident.province_code = Some("0421".to_string());
        resident.region_code = Some("04".to_string());
        assert!(resident.validate().is_ok());
    }

    #[test]
    fn geo_columns_without_household_are_rejected() {
        let mut resident = sample_resident();
        resident.barangay_code = Some("042114014".to_string());
        assert!(matches!(
            resident.validate(),
            Err(ResidentValidationError::GeoWithoutHousehold)
        ));
    }

    #[test]
    fn mismatched_barangay_prefix_is_rejected() {
        let mut resident = sample_resident();
        resident.household_code =
            Some(HouseholdCode::parse("042114014-0000-0000-0001").unwrap());
        resident.barangay_code = Some("042114015".to_string());
        resident.city_code = Some("042114".to_string());
        resident.region_code = Some("04".to_string());
        assert!(matches!(
            resident.validate(),
            Err(ResidentValidationError::GeoPrefixMismatch)
        ));
    }

    #[test]
    fn resident_serializes_with_snake_case_fields() {
        let resident = sample_resident();
        let json = serde_json::to_value(&resident).unwrap();
        assert_eq!(json["last_name"], "Reyes");
        assert_eq!(json["employment_status"], "employed");
        assert_eq!(json["education_level"], "college");
        assert_eq!(json["sectoral"]["is_senior_citizen"], false);
        assert!(json["household_code"].is_null());
    }
}
