//! Household domain model and hierarchical code type.
//!
//! # Responsibility
//! - Define the immutable household code (`prefix-subd-street-house`).
//! - Define the household read model with its derived aggregate fields.
//!
//! # Invariants
//! - A parsed `HouseholdCode` always matches `^\d{9}-\d{4}-\d{4}-\d{4}$`.
//! - The nine-digit prefix equals the owning barangay's full code.
//! - Derived fields (`member_count`, `migrant_count`,
//!   `monthly_income_total`, `income_class`) are written only by the
//!   derived-state engine; geo columns never change after creation.

use crate::model::geo::{GeoAncestry, ABSENT_PROVINCE_SEGMENT};
use crate::model::resident::ResidentId;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};

static HOUSEHOLD_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{9}-\d{4}-\d{4}-\d{4}$").expect("valid household code regex"));

/// Highest sequence number representable in one four-digit code group.
pub const MAX_SEQUENCE_NUMBER: u16 = 9_999;

/// Errors from household code parsing and composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HouseholdCodeError {
    /// Input does not match the four-group hyphenated shape.
    InvalidFormat(String),
    /// A sequence number does not fit a four-digit group.
    SequenceOutOfRange { value: u16 },
}

impl Display for HouseholdCodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFormat(value) => write!(
                f,
                "invalid household code `{value}`, expected NNNNNNNNN-NNNN-NNNN-NNNN"
            ),
            Self::SequenceOutOfRange { value } => {
                write!(f, "sequence number {value} exceeds the 9999 code ceiling")
            }
        }
    }
}

impl Error for HouseholdCodeError {}

/// Immutable hierarchical household identifier.
///
/// Nine geographic digits (region 2, province 2, city 2, barangay 3) and
/// three zero-padded sequence groups for subdivision, street and house.
/// `0000` marks an absent subdivision or street.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HouseholdCode(String);

impl HouseholdCode {
    /// Parses and validates the canonical string form.
    pub fn parse(value: &str) -> Result<Self, HouseholdCodeError> {
        if !HOUSEHOLD_CODE_RE.is_match(value) {
            return Err(HouseholdCodeError::InvalidFormat(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }

    /// Composes a code from resolved ancestry and allocated sequence
    /// numbers.
    ///
    /// `subdivision_seq`/`street_seq` may be zero (absent level); the house
    /// number is always positive within its scope.
    pub fn compose(
        ancestry: &GeoAncestry,
        subdivision_seq: u16,
        street_seq: u16,
        house_seq: u16,
    ) -> Result<Self, HouseholdCodeError> {
        for value in [subdivision_seq, street_seq, house_seq] {
            if value > MAX_SEQUENCE_NUMBER {
                return Err(HouseholdCodeError::SequenceOutOfRange { value });
            }
        }
        Ok(Self(format!(
            "{}-{subdivision_seq:04}-{street_seq:04}-{house_seq:04}",
            ancestry.geo_prefix()
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Nine-digit geographic prefix.
    pub fn geo_prefix(&self) -> &str {
        &self.0[0..9]
    }

    /// The owning barangay's full code (identical to the prefix).
    pub fn barangay_code(&self) -> &str {
        self.geo_prefix()
    }

    /// Four-digit subdivision group (`0000` when absent).
    pub fn subdivision_segment(&self) -> &str {
        &self.0[10..14]
    }

    /// Four-digit street group (`0000` when absent).
    pub fn street_segment(&self) -> &str {
        &self.0[15..19]
    }

    /// Four-digit house group (always non-zero).
    pub fn house_segment(&self) -> &str {
        &self.0[20..24]
    }
}

impl Display for HouseholdCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for HouseholdCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for HouseholdCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(SerdeError::custom)
    }
}

/// Seven-class income bracket derived from the household income total.
///
/// Variant order is ascending, so `Ord` gives the natural Poor→Rich
/// ordering used by the monotonicity property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomeClass {
    Poor,
    LowIncome,
    LowerMiddleClass,
    MiddleClass,
    UpperMiddleIncome,
    HighIncome,
    Rich,
}

impl IncomeClass {
    /// Stable storage string for this class.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Poor => "poor",
            Self::LowIncome => "low_income",
            Self::LowerMiddleClass => "lower_middle_class",
            Self::MiddleClass => "middle_class",
            Self::UpperMiddleIncome => "upper_middle_income",
            Self::HighIncome => "high_income",
            Self::Rich => "rich",
        }
    }

    /// Parses the stable storage string. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "poor" => Some(Self::Poor),
            "low_income" => Some(Self::LowIncome),
            "lower_middle_class" => Some(Self::LowerMiddleClass),
            "middle_class" => Some(Self::MiddleClass),
            "upper_middle_income" => Some(Self::UpperMiddleIncome),
            "high_income" => Some(Self::HighIncome),
            "rich" => Some(Self::Rich),
            _ => None,
        }
    }
}

impl Display for IncomeClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Household read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Household {
    /// Immutable hierarchical identifier.
    pub code: HouseholdCode,
    /// Full barangay code (equals the code prefix).
    pub barangay_code: String,
    /// Full city/municipality code.
    pub city_code: String,
    /// Full province code. `None` under an independent city.
    pub province_code: Option<String>,
    /// Full region code.
    pub region_code: String,
    /// Subdivision identifier supplied at allocation, if any.
    pub subdivision_id: Option<String>,
    /// Street identifier supplied at allocation, if any.
    pub street_id: Option<String>,
    /// Count of active membership edges. Derived.
    pub member_count: u32,
    /// Count of active members flagged as migrants. Derived.
    pub migrant_count: u32,
    /// Sum of member incomes (absent incomes contribute zero). Derived.
    pub monthly_income_total: Decimal,
    /// Bracket of `monthly_income_total`. Derived.
    pub income_class: IncomeClass,
    /// Designated head, if assigned. Must be an active member.
    pub head_resident_id: Option<ResidentId>,
    /// Soft-delete tombstone; the code is never recycled.
    pub is_deleted: bool,
    /// Epoch ms creation timestamp.
    pub created_at: i64,
    /// Epoch ms update timestamp.
    pub updated_at: i64,
}

/// Consistency failures in persisted household rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HouseholdValidationError {
    /// A geo column disagrees with the code prefix.
    GeoColumnMismatch { code: String, column: &'static str },
}

impl Display for HouseholdValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GeoColumnMismatch { code, column } => {
                write!(f, "household {code}: {column} disagrees with the code prefix")
            }
        }
    }
}

impl Error for HouseholdValidationError {}

impl Household {
    /// Checks that denormalized geo columns agree with the code prefix.
    pub fn validate(&self) -> Result<(), HouseholdValidationError> {
        let prefix = self.code.geo_prefix();
        let mismatch = |column: &'static str| HouseholdValidationError::GeoColumnMismatch {
            code: self.code.as_str().to_string(),
            column,
        };

        if self.barangay_code != prefix {
            return Err(mismatch("barangay_code"));
        }
        if self.city_code != prefix[0..6] {
            return Err(mismatch("city_code"));
        }
        if self.region_code != prefix[0..2] {
            return Err(mismatch("region_code"));
        }
        match &self.province_code {
            Some(province) => {
                if province.as_str() != &prefix[0..4] {
                    return Err(mismatch("province_code"));
                }
            }
            None => {
                if &prefix[2..4] != ABSENT_PROVINCE_SEGMENT {
                    return Err(mismatch("province_code"));
                }
            }
        }
        Ok(())
    }
}
