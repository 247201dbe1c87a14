//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `talaan_core` linkage.
//! - Walk one in-memory registry scenario for quick local sanity checks.

use talaan_core::db::open_db_in_memory;
use talaan_core::model::geo::{GeoNode, GeoTier};
use talaan_core::repo::geo_repo::{GeoTreeRepository, SqliteGeoTreeRepository};
use talaan_core::{AccessPrincipal, HouseholdService};

fn main() {
    println!("talaan_core ping={}", talaan_core::ping());
    println!("talaan_core version={}", talaan_core::core_version());

    match smoke_scenario() {
        Ok(code) => println!("talaan_core sample_household={code}"),
        Err(err) => {
            eprintln!("smoke scenario failed: {err}");
            std::process::exit(1);
        }
    }
}

/// Seeds a minimal geographic chain in memory and allocates one household
/// code under it.
fn smoke_scenario() -> Result<String, Box<dyn std::error::Error>> {
    let conn = open_db_in_memory()?;

    let geo = SqliteGeoTreeRepository::try_new(&conn)?;
    geo.insert_node(&GeoNode::new(
        "13",
        "National Capital Region",
        GeoTier::Region,
        None,
        false,
    )?)?;
    geo.insert_node(&GeoNode::new(
        "130001",
        "Taguig",
        GeoTier::CityMunicipality,
        Some("13".to_string()),
        true,
    )?)?;
    geo.insert_node(&GeoNode::new(
        "130001001",
        "Bagumbayan",
        GeoTier::Barangay,
        Some("130001".to_string()),
        false,
    )?)?;

    let households = HouseholdService::new(&conn);
    let admin = AccessPrincipal::national("smoke-probe");
    let household = households.create_household(&admin, "130001001", None, None)?;
    Ok(household.code.to_string())
}
