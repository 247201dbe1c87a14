use rusqlite::Connection;
use std::collections::BTreeSet;
use talaan_core::db::open_db_in_memory;
use talaan_core::{
    scope_allows, AccessPrincipal, AccessTier, CivilDate, EducationLevel, EducationStatus,
    EmploymentStatus, GeoNode, GeoTier, GeoTreeRepository, Household, HouseholdListQuery,
    HouseholdService, HouseholdServiceError, RecordScope, Resident, ResidentInput,
    ResidentListQuery, ResidentService, ResidentServiceError, Sex, SqliteGeoTreeRepository,
};

struct Records {
    province_household: Household,
    neighbor_household: Household,
    independent_household: Household,
    province_resident: Resident,
    independent_resident: Resident,
    standalone_resident: Resident,
}

#[test]
fn national_principals_see_every_record() {
    let conn = seeded_db();
    let records = populate(&conn);
    let admin = AccessPrincipal::national("auditor");
    let households = HouseholdService::new(&conn);
    let residents = ResidentService::new(&conn);

    let listed = households
        .list_households(&admin, &HouseholdListQuery::default())
        .unwrap();
    assert_eq!(listed.len(), 3);

    let listed = residents
        .list_residents(&admin, &ResidentListQuery::default())
        .unwrap();
    assert_eq!(listed.len(), 3);

    assert!(residents
        .get_resident(&admin, records.standalone_resident.id)
        .unwrap()
        .is_some());
}

#[test]
fn city_scope_covers_all_barangays_of_the_city() {
    let conn = seeded_db();
    let records = populate(&conn);
    let clerk = AccessPrincipal::scoped("clerk", AccessTier::CityMunicipality, "043405");
    let households = HouseholdService::new(&conn);
    let residents = ResidentService::new(&conn);

    let codes = household_codes(
        &households
            .list_households(&clerk, &HouseholdListQuery::default())
            .unwrap(),
    );
    assert!(codes.contains(records.province_household.code.as_str()));
    assert!(codes.contains(records.neighbor_household.code.as_str()));
    assert!(!codes.contains(records.independent_household.code.as_str()));

    assert!(households
        .get_household(&clerk, &records.independent_household.code)
        .unwrap()
        .is_none());

    let visible = residents
        .list_residents(&clerk, &ResidentListQuery::default())
        .unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, records.province_resident.id);
}

#[test]
fn barangay_scope_is_exact() {
    let conn = seeded_db();
    let records = populate(&conn);
    let clerk = AccessPrincipal::scoped("clerk", AccessTier::Barangay, "043405012");
    let households = HouseholdService::new(&conn);

    let listed = households
        .list_households(&clerk, &HouseholdListQuery::default())
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].code, records.province_household.code);

    assert!(households
        .get_household(&clerk, &records.neighbor_household.code)
        .unwrap()
        .is_none());
}

#[test]
fn independent_city_records_are_invisible_to_province_principals() {
    let conn = seeded_db();
    let records = populate(&conn);
    let clerk = AccessPrincipal::scoped("clerk", AccessTier::Province, "0434");
    let households = HouseholdService::new(&conn);
    let residents = ResidentService::new(&conn);

    // No province code on the record, so no province tier can match it.
    assert!(households
        .get_household(&clerk, &records.independent_household.code)
        .unwrap()
        .is_none());
    assert!(residents
        .get_resident(&clerk, records.independent_resident.id)
        .unwrap()
        .is_none());

    let codes = household_codes(
        &households
            .list_households(&clerk, &HouseholdListQuery::default())
            .unwrap(),
    );
    assert!(!codes.contains(records.independent_household.code.as_str()));
}

#[test]
fn region_scopes_split_along_region_lines() {
    let conn = seeded_db();
    let records = populate(&conn);
    let luzon = AccessPrincipal::scoped("luzon", AccessTier::Region, "04");
    let capital = AccessPrincipal::scoped("capital", AccessTier::Region, "13");
    let households = HouseholdService::new(&conn);

    let luzon_codes = household_codes(
        &households
            .list_households(&luzon, &HouseholdListQuery::default())
            .unwrap(),
    );
    assert_eq!(luzon_codes.len(), 2);
    assert!(!luzon_codes.contains(records.independent_household.code.as_str()));

    let capital_codes = household_codes(
        &households
            .list_households(&capital, &HouseholdListQuery::default())
            .unwrap(),
    );
    assert_eq!(capital_codes.len(), 1);
    assert!(capital_codes.contains(records.independent_household.code.as_str()));
}

#[test]
fn out_of_scope_writes_are_denied_before_any_mutation() {
    let conn = seeded_db();
    let records = populate(&conn);
    let outsider = AccessPrincipal::scoped("outsider", AccessTier::Barangay, "130001001");
    let admin = AccessPrincipal::national("auditor");
    let households = HouseholdService::new(&conn);
    let residents = ResidentService::new(&conn);

    let err = households
        .create_household(&outsider, "043405012", None, None)
        .unwrap_err();
    assert!(matches!(err, HouseholdServiceError::AccessDenied));

    let err = households
        .add_member(
            &outsider,
            &records.province_household.code,
            records.standalone_resident.id,
        )
        .unwrap_err();
    assert!(matches!(err, HouseholdServiceError::AccessDenied));

    let err = households
        .soft_delete_household(&outsider, &records.province_household.code)
        .unwrap_err();
    assert!(matches!(err, HouseholdServiceError::AccessDenied));

    let err = residents
        .update_resident(
            &outsider,
            records.province_resident.id,
            default_input("Intruso"),
            as_of(),
        )
        .unwrap_err();
    assert!(matches!(err, ResidentServiceError::AccessDenied));

    let err = residents
        .create_resident(
            &outsider,
            default_input("Intruso"),
            Some(&records.province_household.code),
            as_of(),
        )
        .unwrap_err();
    assert!(matches!(err, ResidentServiceError::AccessDenied));

    // Nothing moved.
    let untouched = households
        .get_household(&admin, &records.province_household.code)
        .unwrap()
        .unwrap();
    assert_eq!(untouched.member_count, 1);
    let survivor = residents
        .get_resident(&admin, records.province_resident.id)
        .unwrap()
        .unwrap();
    assert_eq!(survivor.last_name, records.province_resident.last_name);
}

#[test]
fn standalone_residents_are_visible_only_to_national() {
    let conn = seeded_db();
    let records = populate(&conn);
    let residents = ResidentService::new(&conn);

    for principal in [
        AccessPrincipal::scoped("r", AccessTier::Region, "04"),
        AccessPrincipal::scoped("p", AccessTier::Province, "0434"),
        AccessPrincipal::scoped("c", AccessTier::CityMunicipality, "043405"),
        AccessPrincipal::scoped("b", AccessTier::Barangay, "043405012"),
    ] {
        assert!(
            residents
                .get_resident(&principal, records.standalone_resident.id)
                .unwrap()
                .is_none(),
            "tier {}",
            principal.tier
        );
        let listed = residents
            .list_residents(&principal, &ResidentListQuery::default())
            .unwrap();
        assert!(
            listed.iter().all(|r| r.id != records.standalone_resident.id),
            "tier {}",
            principal.tier
        );
    }
}

#[test]
fn list_pushdown_agrees_with_the_predicate() {
    let conn = seeded_db();
    populate(&conn);
    let admin = AccessPrincipal::national("auditor");
    let households = HouseholdService::new(&conn);
    let residents = ResidentService::new(&conn);

    let all_households = households
        .list_households(&admin, &HouseholdListQuery::default())
        .unwrap();
    let all_residents = residents
        .list_residents(&admin, &ResidentListQuery::default())
        .unwrap();

    let principals = [
        AccessPrincipal::national("n"),
        AccessPrincipal::scoped("r04", AccessTier::Region, "04"),
        AccessPrincipal::scoped("r13", AccessTier::Region, "13"),
        AccessPrincipal::scoped("p", AccessTier::Province, "0434"),
        AccessPrincipal::scoped("c", AccessTier::CityMunicipality, "043405"),
        AccessPrincipal::scoped("b1", AccessTier::Barangay, "043405012"),
        AccessPrincipal::scoped("b2", AccessTier::Barangay, "130001001"),
    ];
    for principal in &principals {
        let expected: BTreeSet<String> = all_households
            .iter()
            .filter(|h| scope_allows(principal, &RecordScope::from(*h)))
            .map(|h| h.code.as_str().to_string())
            .collect();
        let actual = household_codes(
            &households
                .list_households(principal, &HouseholdListQuery::default())
                .unwrap(),
        );
        assert_eq!(actual, expected, "households for {}", principal.id);

        let expected: BTreeSet<String> = all_residents
            .iter()
            .filter(|r| scope_allows(principal, &RecordScope::from(*r)))
            .map(|r| r.id.to_string())
            .collect();
        let actual: BTreeSet<String> = residents
            .list_residents(principal, &ResidentListQuery::default())
            .unwrap()
            .iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(actual, expected, "residents for {}", principal.id);
    }
}

#[test]
fn deleted_households_surface_only_on_request() {
    let conn = seeded_db();
    let records = populate(&conn);
    let admin = AccessPrincipal::national("auditor");
    let households = HouseholdService::new(&conn);

    households
        .soft_delete_household(&admin, &records.neighbor_household.code)
        .unwrap();

    let visible = household_codes(
        &households
            .list_households(&admin, &HouseholdListQuery::default())
            .unwrap(),
    );
    assert!(!visible.contains(records.neighbor_household.code.as_str()));

    let with_deleted = household_codes(
        &households
            .list_households(
                &admin,
                &HouseholdListQuery {
                    include_deleted: true,
                    ..HouseholdListQuery::default()
                },
            )
            .unwrap(),
    );
    assert!(with_deleted.contains(records.neighbor_household.code.as_str()));
}

fn household_codes(households: &[Household]) -> BTreeSet<String> {
    households
        .iter()
        .map(|h| h.code.as_str().to_string())
        .collect()
}

fn as_of() -> CivilDate {
    CivilDate::new(2026, 1, 15).unwrap()
}

fn default_input(last_name: &str) -> ResidentInput {
    ResidentInput {
        last_name: last_name.to_string(),
        first_name: "Ana".to_string(),
        middle_name: None,
        sex: Sex::Female,
        birthdate: CivilDate::new(1988, 11, 3).unwrap(),
        monthly_income: None,
        occupation_code: None,
        employment_status: EmploymentStatus::Employed,
        education_status: EducationStatus::Graduated,
        education_level: Some(EducationLevel::College),
        is_migrant: false,
    }
}

fn populate(conn: &Connection) -> Records {
    let admin = AccessPrincipal::national("seed");
    let households = HouseholdService::new(conn);
    let residents = ResidentService::new(conn);

    let province_household = households
        .create_household(&admin, "043405012", None, None)
        .unwrap();
    let neighbor_household = households
        .create_household(&admin, "043405013", None, None)
        .unwrap();
    let independent_household = households
        .create_household(&admin, "130001001", None, None)
        .unwrap();

    let province_resident = residents
        .create_resident(
            &admin,
            default_input("Navarro"),
            Some(&province_household.code),
            as_of(),
        )
        .unwrap();
    let independent_resident = residents
        .create_resident(
            &admin,
            default_input("Torres"),
            Some(&independent_household.code),
            as_of(),
        )
        .unwrap();
    let standalone_resident = residents
        .create_resident(&admin, default_input("Solo"), None, as_of())
        .unwrap();

    Records {
        province_household,
        neighbor_household,
        independent_household,
        province_resident,
        independent_resident,
        standalone_resident,
    }
}

fn seeded_db() -> Connection {
    let conn = open_db_in_memory().unwrap();
    let geo = SqliteGeoTreeRepository::try_new(&conn).unwrap();

    geo.insert_node(&GeoNode::new("04", "Calabarzon", GeoTier::Region, None, false).unwrap())
        .unwrap();
    geo.insert_node(
        &GeoNode::new("0434", "Laguna", GeoTier::Province, Some("04".to_string()), false).unwrap(),
    )
    .unwrap();
    geo.insert_node(
        &GeoNode::new(
            "043405",
            "Calamba",
            GeoTier::CityMunicipality,
            Some("0434".to_string()),
            false,
        )
        .unwrap(),
    )
    .unwrap();
    geo.insert_node(
        &GeoNode::new(
            "043405012",
            "Parian",
            GeoTier::Barangay,
            Some("043405".to_string()),
            false,
        )
        .unwrap(),
    )
    .unwrap();
    geo.insert_node(
        &GeoNode::new(
            "043405013",
            "Real",
            GeoTier::Barangay,
            Some("043405".to_string()),
            false,
        )
        .unwrap(),
    )
    .unwrap();

    geo.insert_node(
        &GeoNode::new("13", "National Capital Region", GeoTier::Region, None, false).unwrap(),
    )
    .unwrap();
    geo.insert_node(
        &GeoNode::new(
            "130001",
            "Taguig",
            GeoTier::CityMunicipality,
            Some("13".to_string()),
            true,
        )
        .unwrap(),
    )
    .unwrap();
    geo.insert_node(
        &GeoNode::new(
            "130001001",
            "Bagumbayan",
            GeoTier::Barangay,
            Some("130001".to_string()),
            false,
        )
        .unwrap(),
    )
    .unwrap();

    conn
}
