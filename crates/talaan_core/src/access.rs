//! Tiered access-scope evaluation.
//!
//! # Responsibility
//! - Decide whether a principal may see or touch one record (pure
//!   predicate, no storage access).
//! - Produce the equivalent SQL equality condition for list queries.
//!
//! # Invariants
//! - Fail closed: a scoped principal without a scope code, or a record
//!   without a code at the principal's tier, is always denied.
//! - The SQL condition and the predicate agree on every record; a NULL
//!   column never satisfies the pushed-down equality, mirroring the
//!   predicate's treatment of missing codes.
//!
//! # See also
//! - `crate::model::principal` for the input types.

use crate::model::principal::{AccessPrincipal, AccessTier, RecordScope};

/// Table column holding the record's code at the given tier.
/// `None` for National, which filters on nothing.
pub fn scope_column(tier: AccessTier) -> Option<&'static str> {
    match tier {
        AccessTier::National => None,
        AccessTier::Region => Some("region_code"),
        AccessTier::Province => Some("province_code"),
        AccessTier::CityMunicipality => Some("city_code"),
        AccessTier::Barangay => Some("barangay_code"),
    }
}

/// True when the principal's scope covers the record.
///
/// National covers everything. Every other tier requires exact equality
/// between the principal's scope code and the record's code at that same
/// tier.
pub fn scope_allows(principal: &AccessPrincipal, scope: &RecordScope) -> bool {
    if principal.tier == AccessTier::National {
        return true;
    }
    match (principal.scope_code.as_deref(), scope.code_at(principal.tier)) {
        (Some(own), Some(record)) => own == record,
        _ => false,
    }
}

/// One WHERE condition plus its bound parameter, ready to splice into a
/// list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeCondition {
    /// SQL boolean expression (`1` passes all rows, `0` passes none).
    pub clause: String,
    /// Parameter for the single `?` in `clause`, when present.
    pub param: Option<String>,
}

/// Builds the list-query condition equivalent to [`scope_allows`] for
/// rows of `table`.
pub fn scope_condition(principal: &AccessPrincipal, table: &str) -> ScopeCondition {
    if principal.tier == AccessTier::National {
        return ScopeCondition {
            clause: "1".to_string(),
            param: None,
        };
    }
    match (principal.scope_code.as_deref(), scope_column(principal.tier)) {
        (Some(code), Some(column)) => ScopeCondition {
            clause: format!("{table}.{column} = ?"),
            param: Some(code.to_string()),
        },
        _ => ScopeCondition {
            clause: "0".to_string(),
            param: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{scope_allows, scope_condition, scope_column, ScopeCondition};
    use crate::model::principal::{AccessPrincipal, AccessTier, RecordScope};

    fn naic_scope() -> RecordScope {
        RecordScope {
            region_code: Some("04".to_string()),
            province_code: Some("0421".to_string()),
            city_code: Some("042114".to_string()),
            barangay_code: Some("042114014".to_string()),
        }
    }

    /// Evaluates a condition the way SQLite would against one record.
    fn condition_passes(condition: &ScopeCondition, scope: &RecordScope) -> bool {
        match condition.clause.as_str() {
            "1" => true,
            "0" => false,
            clause => {
                let column = clause
                    .rsplit_once(" = ?")
                    .and_then(|(lhs, _)| lhs.rsplit_once('.'))
                    .map(|(_, column)| column)
                    .expect("equality clause");
                let record_code = match column {
                    "region_code" => scope.region_code.as_deref(),
                    "province_code" => scope.province_code.as_deref(),
                    "city_code" => scope.city_code.as_deref(),
                    "barangay_code" => scope.barangay_code.as_deref(),
                    other => panic!("unexpected column {other}"),
                };
                record_code == condition.param.as_deref()
            }
        }
    }

    #[test]
    fn national_sees_every_record() {
        let national = AccessPrincipal::national("auditor");
        assert!(scope_allows(&national, &naic_scope()));
        assert!(scope_allows(&national, &RecordScope::default()));
    }

    #[test]
    fn scoped_tiers_require_exact_code_equality() {
        let scope = naic_scope();
        for (tier, matching, foreign) in [
            (AccessTier::Region, "04", "13"),
            (AccessTier::Province, "0421", "0434"),
            (AccessTier::CityMunicipality, "042114", "042108"),
            (AccessTier::Barangay, "042114014", "042114015"),
        ] {
            let insider = AccessPrincipal::scoped("insider", tier, matching);
            let outsider = AccessPrincipal::scoped("outsider", tier, foreign);
            assert!(scope_allows(&insider, &scope), "{tier}");
            assert!(!scope_allows(&outsider, &scope), "{tier}");
        }
    }

    #[test]
    fn missing_record_code_is_always_denied() {
        let standalone = RecordScope::default();
        for tier in [
            AccessTier::Region,
            AccessTier::Province,
            AccessTier::CityMunicipality,
            AccessTier::Barangay,
        ] {
            let principal = AccessPrincipal::scoped("p", tier, "042114014");
            assert!(!scope_allows(&principal, &standalone), "{tier}");
        }
    }

    #[test]
    fn provinceless_record_is_hidden_from_province_principals() {
        let mut scope = naic_scope();
        scope.province_code = None;
        let principal = AccessPrincipal::scoped("p", AccessTier::Province, "0421");
        assert!(!scope_allows(&principal, &scope));
    }

    #[test]
    fn principal_without_scope_code_is_denied() {
        let broken = AccessPrincipal {
            id: "broken".to_string(),
            tier: AccessTier::Barangay,
            scope_code: None,
        };
        assert!(!scope_allows(&broken, &naic_scope()));
        let condition = scope_condition(&broken, "households");
        assert_eq!(condition.clause, "0");
        assert!(condition.param.is_none());
    }

    #[test]
    fn condition_matches_predicate_for_every_tier_and_record() {
        let records = [
            naic_scope(),
            RecordScope::default(),
            RecordScope {
                region_code: Some("13".to_string()),
                province_code: None,
                city_code: Some("130001".to_string()),
                barangay_code: Some("130001003".to_string()),
            },
        ];
        let principals = [
            AccessPrincipal::national("n"),
            AccessPrincipal::scoped("r", AccessTier::Region, "04"),
            AccessPrincipal::scoped("p", AccessTier::Province, "0421"),
            AccessPrincipal::scoped("c", AccessTier::CityMunicipality, "130001"),
            AccessPrincipal::scoped("b", AccessTier::Barangay, "042114014"),
        ];
        for principal in &principals {
            let condition = scope_condition(principal, "t");
            for record in &records {
                assert_eq!(
                    condition_passes(&condition, record),
                    scope_allows(principal, record),
                    "principal {} on {record:?}",
                    principal.id,
                );
            }
        }
    }

    #[test]
    fn scope_columns_cover_all_scoped_tiers() {
        assert_eq!(scope_column(AccessTier::National), None);
        assert_eq!(scope_column(AccessTier::Region), Some("region_code"));
        assert_eq!(scope_column(AccessTier::Province), Some("province_code"));
        assert_eq!(scope_column(AccessTier::CityMunicipality), Some("city_code"));
        assert_eq!(scope_column(AccessTier::Barangay), Some("barangay_code"));
    }
}
