//! Sectoral classification rules.
//!
//! # Responsibility
//! - Compute the full set of sectoral flags from resident attributes and
//!   a reference date.
//!
//! # Invariants
//! - Pure: same inputs, same profile.
//! - Age is completed whole years as of the reference date; an age
//!   outside a flag's window forces that flag false.

use crate::model::date::CivilDate;
use crate::model::resident::{
    EducationLevel, EducationStatus, EmploymentStatus, Resident, SectoralProfile,
};

const SENIOR_MIN_AGE: i32 = 60;
const OUT_OF_SCHOOL_CHILD_AGES: std::ops::RangeInclusive<i32> = 6..=14;
const OUT_OF_SCHOOL_YOUTH_AGES: std::ops::RangeInclusive<i32> = 15..=24;

fn in_labor_force(status: EmploymentStatus) -> bool {
    matches!(
        status,
        EmploymentStatus::Employed
            | EmploymentStatus::SelfEmployed
            | EmploymentStatus::Unemployed
            | EmploymentStatus::Underemployed
            | EmploymentStatus::LookingForWork
    )
}

fn is_working(status: EmploymentStatus) -> bool {
    matches!(
        status,
        EmploymentStatus::Employed | EmploymentStatus::SelfEmployed
    )
}

fn out_of_school(status: EducationStatus) -> bool {
    matches!(
        status,
        EducationStatus::NotStudying | EducationStatus::DroppedOut
    )
}

fn finished_tertiary(level: Option<EducationLevel>) -> bool {
    matches!(
        level,
        Some(EducationLevel::College) | Some(EducationLevel::PostGraduate)
    )
}

/// Computes all sectoral flags for the given attributes.
pub fn classify(
    age: i32,
    employment: EmploymentStatus,
    education_status: EducationStatus,
    education_level: Option<EducationLevel>,
) -> SectoralProfile {
    SectoralProfile {
        is_senior_citizen: age >= SENIOR_MIN_AGE,
        is_out_of_school_child: OUT_OF_SCHOOL_CHILD_AGES.contains(&age)
            && out_of_school(education_status),
        is_out_of_school_youth: OUT_OF_SCHOOL_YOUTH_AGES.contains(&age)
            && out_of_school(education_status)
            && !finished_tertiary(education_level)
            && !is_working(employment),
        is_in_labor_force: in_labor_force(employment),
        is_employed: is_working(employment),
        is_unemployed: employment == EmploymentStatus::Unemployed,
    }
}

/// Profile for one resident as of the reference date.
pub fn profile_for(resident: &Resident, as_of: CivilDate) -> SectoralProfile {
    classify(
        resident.birthdate.age_on(as_of),
        resident.employment_status,
        resident.education_status,
        resident.education_level,
    )
}

#[cfg(test)]
mod tests {
    use super::classify;
    use crate::model::resident::{EducationLevel, EducationStatus, EmploymentStatus};

    #[test]
    fn senior_flag_flips_at_sixty() {
        let at_59 = classify(
            59,
            EmploymentStatus::Retired,
            EducationStatus::Graduated,
            None,
        );
        let at_60 = classify(
            60,
            EmploymentStatus::Retired,
            EducationStatus::Graduated,
            None,
        );
        assert!(!at_59.is_senior_citizen);
        assert!(at_60.is_senior_citizen);
    }

    #[test]
    fn out_of_school_child_requires_the_age_window() {
        for (age, expected) in [(5, false), (6, true), (14, true), (15, false)] {
            let profile = classify(
                age,
                EmploymentStatus::NotInLaborForce,
                EducationStatus::NotStudying,
                None,
            );
            assert_eq!(profile.is_out_of_school_child, expected, "age {age}");
        }
    }

    #[test]
    fn studying_child_is_not_out_of_school() {
        let profile = classify(
            10,
            EmploymentStatus::NotInLaborForce,
            EducationStatus::Studying,
            Some(EducationLevel::Elementary),
        );
        assert!(!profile.is_out_of_school_child);
    }

    #[test]
    fn out_of_school_youth_requires_the_age_window() {
        for (age, expected) in [(14, false), (15, true), (24, true), (25, false)] {
            let profile = classify(
                age,
                EmploymentStatus::LookingForWork,
                EducationStatus::DroppedOut,
                Some(EducationLevel::HighSchool),
            );
            assert_eq!(profile.is_out_of_school_youth, expected, "age {age}");
        }
    }

    #[test]
    fn employment_disqualifies_out_of_school_youth() {
        let profile = classify(
            20,
            EmploymentStatus::Employed,
            EducationStatus::NotStudying,
            Some(EducationLevel::HighSchool),
        );
        assert!(!profile.is_out_of_school_youth);
        assert!(profile.is_employed);
    }

    #[test]
    fn college_graduates_are_not_out_of_school_youth() {
        let profile = classify(
            22,
            EmploymentStatus::LookingForWork,
            EducationStatus::Graduated,
            Some(EducationLevel::College),
        );
        assert!(!profile.is_out_of_school_youth);

        let dropped_out_of_college = classify(
            22,
            EmploymentStatus::LookingForWork,
            EducationStatus::DroppedOut,
            Some(EducationLevel::College),
        );
        assert!(!dropped_out_of_college.is_out_of_school_youth);
    }

    #[test]
    fn labor_force_follows_employment_status_only() {
        for (status, in_force) in [
            (EmploymentStatus::Employed, true),
            (EmploymentStatus::SelfEmployed, true),
            (EmploymentStatus::Unemployed, true),
            (EmploymentStatus::Underemployed, true),
            (EmploymentStatus::LookingForWork, true),
            (EmploymentStatus::Student, false),
            (EmploymentStatus::Retired, false),
            (EmploymentStatus::NotInLaborForce, false),
        ] {
            let profile = classify(30, status, EducationStatus::Graduated, None);
            assert_eq!(profile.is_in_labor_force, in_force, "{status}");
        }
    }

    #[test]
    fn unemployed_flag_is_exact() {
        let unemployed = classify(30, EmploymentStatus::Unemployed, EducationStatus::Graduated, None);
        assert!(unemployed.is_unemployed);
        assert!(!unemployed.is_employed);

        let underemployed = classify(
            30,
            EmploymentStatus::Underemployed,
            EducationStatus::Graduated,
            None,
        );
        assert!(!underemployed.is_unemployed);
        assert!(underemployed.is_in_labor_force);
    }

    #[test]
    fn infants_and_future_birthdates_gain_no_windowed_flags() {
        let infant = classify(
            0,
            EmploymentStatus::NotInLaborForce,
            EducationStatus::NotStudying,
            None,
        );
        assert!(!infant.is_out_of_school_child);
        assert!(!infant.is_out_of_school_youth);
        assert!(!infant.is_senior_citizen);

        let unborn = classify(
            -1,
            EmploymentStatus::NotInLaborForce,
            EducationStatus::NotStudying,
            None,
        );
        assert!(!unborn.is_out_of_school_child);
    }
}
