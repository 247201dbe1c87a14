//! Administrative geography domain model.
//!
//! # Responsibility
//! - Define the four-tier geographic node shape and its code scheme.
//! - Validate hierarchical-prefix consistency between a node and its parent.
//! - Carry resolved barangay ancestry for code allocation and scoping.
//!
//! # Invariants
//! - Codes are hierarchical prefixes: region 2 digits, province 4, city 6,
//!   barangay 9; every child code starts with its parent's code.
//! - An independent city embeds the literal `00` province segment and hangs
//!   directly off a region.
//! - Codes are immutable once created.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

static REGION_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{2}$").expect("valid region code regex"));
static PROVINCE_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}$").expect("valid province code regex"));
static CITY_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{6}$").expect("valid city code regex"));
static BARANGAY_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{9}$").expect("valid barangay code regex"));

/// Province segment value marking an independent city's skipped province.
pub const ABSENT_PROVINCE_SEGMENT: &str = "00";

/// Administrative tier of one geographic node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoTier {
    Region,
    Province,
    CityMunicipality,
    Barangay,
}

impl GeoTier {
    /// Stable storage string for this tier.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Region => "region",
            Self::Province => "province",
            Self::CityMunicipality => "city_municipality",
            Self::Barangay => "barangay",
        }
    }

    /// Parses the stable storage string. Unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "region" => Some(Self::Region),
            "province" => Some(Self::Province),
            "city_municipality" => Some(Self::CityMunicipality),
            "barangay" => Some(Self::Barangay),
            _ => None,
        }
    }

    /// Digit length of a full code at this tier.
    pub fn code_len(self) -> usize {
        match self {
            Self::Region => 2,
            Self::Province => 4,
            Self::CityMunicipality => 6,
            Self::Barangay => 9,
        }
    }

    fn code_regex(self) -> &'static Regex {
        match self {
            Self::Region => &REGION_CODE_RE,
            Self::Province => &PROVINCE_CODE_RE,
            Self::CityMunicipality => &CITY_CODE_RE,
            Self::Barangay => &BARANGAY_CODE_RE,
        }
    }
}

impl Display for GeoTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation failures for geographic nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeoValidationError {
    /// Node name is blank after trim.
    BlankName { code: String },
    /// Code digits do not match the tier's required shape.
    CodeShape { code: String, tier: GeoTier },
    /// Non-region node is missing its parent code.
    ParentRequired { code: String },
    /// Region node carries a parent code.
    ParentForbidden { code: String },
    /// Parent code is not the expected prefix of the node code.
    ParentPrefixMismatch { code: String, parent_code: String },
    /// Independent-city marker disagrees with the embedded province segment.
    IndependentSegmentMismatch { code: String },
    /// Independent-city marker set on a non-city tier.
    MarkerOnNonCity { code: String, tier: GeoTier },
}

impl Display for GeoValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName { code } => write!(f, "geo node {code} has a blank name"),
            Self::CodeShape { code, tier } => {
                write!(f, "geo code `{code}` does not match the {tier} code shape")
            }
            Self::ParentRequired { code } => {
                write!(f, "geo node {code} requires a parent code")
            }
            Self::ParentForbidden { code } => {
                write!(f, "region node {code} must not carry a parent code")
            }
            Self::ParentPrefixMismatch { code, parent_code } => {
                write!(f, "geo node {code} is not contained in parent {parent_code}")
            }
            Self::IndependentSegmentMismatch { code } => write!(
                f,
                "city code {code} disagrees with its independent-city marker"
            ),
            Self::MarkerOnNonCity { code, tier } => {
                write!(f, "{tier} node {code} cannot be an independent city")
            }
        }
    }
}

impl Error for GeoValidationError {}

/// One node of the administrative geographic tree.
///
/// Reference data administered outside this core; the engine only reads it
/// once seeded, and never rewrites a code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoNode {
    /// Full hierarchical code (see tier shapes).
    pub code: String,
    /// Display name.
    pub name: String,
    /// Administrative tier.
    pub tier: GeoTier,
    /// Containing node code. `None` only for regions.
    pub parent_code: Option<String>,
    /// City attached directly to a region, skipping the province tier.
    pub is_independent_city: bool,
    /// Inactive nodes are invisible to resolution.
    pub is_active: bool,
}

impl GeoNode {
    /// Creates an active node and validates its shape.
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        tier: GeoTier,
        parent_code: Option<String>,
        is_independent_city: bool,
    ) -> Result<Self, GeoValidationError> {
        let node = Self {
            code: code.into(),
            name: name.into(),
            tier,
            parent_code,
            is_independent_city,
            is_active: true,
        };
        node.validate()?;
        Ok(node)
    }

    /// Checks code shape, parent prefix containment and marker consistency.
    pub fn validate(&self) -> Result<(), GeoValidationError> {
        if self.name.trim().is_empty() {
            return Err(GeoValidationError::BlankName {
                code: self.code.clone(),
            });
        }
        if !self.tier.code_regex().is_match(&self.code) {
            return Err(GeoValidationError::CodeShape {
                code: self.code.clone(),
                tier: self.tier,
            });
        }
        if self.is_independent_city && self.tier != GeoTier::CityMunicipality {
            return Err(GeoValidationError::MarkerOnNonCity {
                code: self.code.clone(),
                tier: self.tier,
            });
        }

        match self.tier {
            GeoTier::Region => {
                if self.parent_code.is_some() {
                    return Err(GeoValidationError::ParentForbidden {
                        code: self.code.clone(),
                    });
                }
                Ok(())
            }
            GeoTier::Province => self.check_parent_prefix(2),
            GeoTier::CityMunicipality => {
                let embeds_absent_province = &self.code[2..4] == ABSENT_PROVINCE_SEGMENT;
                if embeds_absent_province != self.is_independent_city {
                    return Err(GeoValidationError::IndependentSegmentMismatch {
                        code: self.code.clone(),
                    });
                }
                if self.is_independent_city {
                    // Parent skips the province tier and names the region.
                    self.check_parent_prefix(2)
                } else {
                    self.check_parent_prefix(4)
                }
            }
            GeoTier::Barangay => self.check_parent_prefix(6),
        }
    }

    fn check_parent_prefix(&self, parent_len: usize) -> Result<(), GeoValidationError> {
        let parent_code = self
            .parent_code
            .as_deref()
            .ok_or_else(|| GeoValidationError::ParentRequired {
                code: self.code.clone(),
            })?;
        if parent_code.len() != parent_len || !self.code.starts_with(parent_code) {
            return Err(GeoValidationError::ParentPrefixMismatch {
                code: self.code.clone(),
                parent_code: parent_code.to_string(),
            });
        }
        Ok(())
    }
}

/// Fully resolved ancestry of one barangay.
///
/// `province_code` is `None` when the barangay sits under an independent
/// city; the composed prefix then carries the `00` province segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoAncestry {
    pub region_code: String,
    pub province_code: Option<String>,
    pub city_code: String,
    pub barangay_code: String,
}

impl GeoAncestry {
    /// Two-digit region segment.
    pub fn region_segment(&self) -> &str {
        &self.region_code
    }

    /// Two-digit province segment, `00` when the province tier is skipped.
    pub fn province_segment(&self) -> &str {
        match &self.province_code {
            Some(code) => &code[2..4],
            None => ABSENT_PROVINCE_SEGMENT,
        }
    }

    /// Two-digit city segment.
    pub fn city_segment(&self) -> &str {
        &self.city_code[4..6]
    }

    /// Three-digit barangay segment.
    pub fn barangay_segment(&self) -> &str {
        &self.barangay_code[6..9]
    }

    /// Nine-digit geographic prefix for household codes.
    ///
    /// Always equal to the barangay code itself; composed from segments so
    /// the structure stays explicit at the one place codes are minted.
    pub fn geo_prefix(&self) -> String {
        format!(
            "{}{}{}{}",
            self.region_segment(),
            self.province_segment(),
            self.city_segment(),
            self.barangay_segment()
        )
    }
}

/// Returns whether `code` is a well-formed barangay code.
pub fn is_barangay_code(code: &str) -> bool {
    BARANGAY_CODE_RE.is_match(code)
}
