//! Resident repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist resident rows, their household assignment columns and the
//!   derived sectoral flags.
//! - Push the caller's scope condition into list queries.
//!
//! # Invariants
//! - Geo columns change only through `assign_household`/`clear_household`
//!   and always mirror the assigned household's codes.
//! - Sectoral flags are written only through `write_sectoral`.
//! - Listing is deterministic: `last_name ASC, first_name ASC, id ASC`.

use crate::access::scope_condition;
use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::date::CivilDate;
use crate::model::geo::GeoAncestry;
use crate::model::household::HouseholdCode;
use crate::model::principal::AccessPrincipal;
use crate::model::resident::{
    EducationLevel, EducationStatus, EmploymentStatus, Resident, ResidentId,
    ResidentValidationError, SectoralProfile, Sex,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

const RESIDENT_SELECT_SQL: &str = "SELECT
    id,
    last_name,
    first_name,
    middle_name,
    sex,
    birthdate,
    monthly_income,
    occupation_code,
    employment_status,
    education_status,
    education_level,
    is_migrant,
    household_code,
    barangay_code,
    city_code,
    province_code,
    region_code,
    is_senior_citizen,
    is_out_of_school_child,
    is_out_of_school_youth,
    is_in_labor_force,
    is_employed,
    is_unemployed,
    is_deleted,
    created_at,
    updated_at
FROM residents";

pub type ResidentRepoResult<T> = Result<T, ResidentRepoError>;

/// Errors from resident persistence operations.
#[derive(Debug)]
pub enum ResidentRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Resident state violates model consistency rules.
    Validation(ResidentValidationError),
    /// Resident missing or soft-deleted.
    ResidentNotFound(ResidentId),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Required column is missing from expected table.
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
    /// Persisted data cannot be converted to a valid read model.
    InvalidData(String),
}

impl Display for ResidentRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::ResidentNotFound(id) => write!(f, "resident not found: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "resident repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "resident repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "resident repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid resident data: {message}"),
        }
    }
}

impl Error for ResidentRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::ResidentNotFound(_) => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<ResidentValidationError> for ResidentRepoError {
    fn from(value: ResidentValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for ResidentRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for ResidentRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Query options for listing residents.
#[derive(Debug, Clone, Default)]
pub struct ResidentListQuery {
    pub include_deleted: bool,
    /// Restrict to members of one household.
    pub household_code: Option<HouseholdCode>,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Repository interface for resident rows.
pub trait ResidentRepository {
    /// Inserts one validated resident row.
    fn insert_resident(&self, resident: &Resident) -> ResidentRepoResult<ResidentId>;
    /// Rewrites mutable attribute columns. Assignment, sectoral and
    /// tombstone columns are untouched.
    fn update_attributes(&self, resident: &Resident) -> ResidentRepoResult<()>;
    /// Loads one resident by id.
    fn get_resident(
        &self,
        id: ResidentId,
        include_deleted: bool,
    ) -> ResidentRepoResult<Option<Resident>>;
    /// Lists residents visible to the principal, scope pushed into SQL.
    fn list_residents(
        &self,
        principal: &AccessPrincipal,
        query: &ResidentListQuery,
    ) -> ResidentRepoResult<Vec<Resident>>;
    /// Soft-deletes one resident row.
    fn soft_delete_resident(&self, id: ResidentId) -> ResidentRepoResult<()>;
    /// Points the resident at a household, mirroring its geo codes.
    fn assign_household(
        &self,
        id: ResidentId,
        code: &HouseholdCode,
        ancestry: &GeoAncestry,
    ) -> ResidentRepoResult<()>;
    /// Clears the household pointer and all geo columns.
    fn clear_household(&self, id: ResidentId) -> ResidentRepoResult<()>;
    /// Writes derived sectoral flags. Engine use only.
    fn write_sectoral(
        &self,
        id: ResidentId,
        profile: &SectoralProfile,
    ) -> ResidentRepoResult<()>;
}

/// SQLite-backed resident repository.
#[derive(Debug)]
pub struct SqliteResidentRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteResidentRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> ResidentRepoResult<Self> {
        ensure_resident_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl ResidentRepository for SqliteResidentRepository<'_> {
    fn insert_resident(&self, resident: &Resident) -> ResidentRepoResult<ResidentId> {
        resident.validate()?;

        self.conn.execute(
            "INSERT INTO residents (
                id,
                last_name,
                first_name,
                middle_name,
                sex,
                birthdate,
                monthly_income,
                occupation_code,
                employment_status,
                education_status,
                education_level,
                is_migrant,
                household_code,
                barangay_code,
                city_code,
                province_code,
                region_code,
                is_senior_citizen,
                is_out_of_school_child,
                is_out_of_school_youth,
                is_in_labor_force,
                is_employed,
                is_unemployed,
                is_deleted
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                      ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24);",
            params![
                resident.id.to_string(),
                resident.last_name,
                resident.first_name,
                resident.middle_name.as_deref(),
                resident.sex.as_str(),
                resident.birthdate.to_string(),
                resident.monthly_income.map(|value| value.to_string()),
                resident.occupation_code.as_deref(),
                resident.employment_status.as_str(),
                resident.education_status.as_str(),
                resident.education_level.map(EducationLevel::as_str),
                bool_to_int(resident.is_migrant),
                resident.household_code.as_ref().map(|code| code.as_str()),
                resident.barangay_code.as_deref(),
                resident.city_code.as_deref(),
                resident.province_code.as_deref(),
                resident.region_code.as_deref(),
                bool_to_int(resident.sectoral.is_senior_citizen),
                bool_to_int(resident.sectoral.is_out_of_school_child),
                bool_to_int(resident.sectoral.is_out_of_school_youth),
                bool_to_int(resident.sectoral.is_in_labor_force),
                bool_to_int(resident.sectoral.is_employed),
                bool_to_int(resident.sectoral.is_unemployed),
                bool_to_int(resident.is_deleted),
            ],
        )?;

        Ok(resident.id)
    }

    fn update_attributes(&self, resident: &Resident) -> ResidentRepoResult<()> {
        resident.validate()?;

        let changed = self.conn.execute(
            "UPDATE residents
             SET
                last_name = ?1,
                first_name = ?2,
                middle_name = ?3,
                sex = ?4,
                birthdate = ?5,
                monthly_income = ?6,
                occupation_code = ?7,
                employment_status = ?8,
                education_status = ?9,
                education_level = ?10,
                is_migrant = ?11,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?12
               AND is_deleted = 0;",
            params![
                resident.last_name,
                resident.first_name,
                resident.middle_name.as_deref(),
                resident.sex.as_str(),
                resident.birthdate.to_string(),
                resident.monthly_income.map(|value| value.to_string()),
                resident.occupation_code.as_deref(),
                resident.employment_status.as_str(),
                resident.education_status.as_str(),
                resident.education_level.map(EducationLevel::as_str),
                bool_to_int(resident.is_migrant),
                resident.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(ResidentRepoError::ResidentNotFound(resident.id));
        }
        Ok(())
    }

    fn get_resident(
        &self,
        id: ResidentId,
        include_deleted: bool,
    ) -> ResidentRepoResult<Option<Resident>> {
        let mut stmt = self.conn.prepare(&format!(
            "{RESIDENT_SELECT_SQL}
             WHERE id = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;
        let mut rows = stmt.query(params![id.to_string(), bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_resident_row(row)?));
        }
        Ok(None)
    }

    fn list_residents(
        &self,
        principal: &AccessPrincipal,
        query: &ResidentListQuery,
    ) -> ResidentRepoResult<Vec<Resident>> {
        let condition = scope_condition(principal, "residents");
        let mut sql = format!("{RESIDENT_SELECT_SQL} WHERE {}", condition.clause);
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(param) = condition.param {
            bind_values.push(Value::Text(param));
        }

        if !query.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }

        if let Some(code) = &query.household_code {
            sql.push_str(" AND household_code = ?");
            bind_values.push(Value::Text(code.as_str().to_string()));
        }

        sql.push_str(" ORDER BY last_name ASC, first_name ASC, id ASC");

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut residents = Vec::new();
        while let Some(row) = rows.next()? {
            residents.push(parse_resident_row(row)?);
        }
        Ok(residents)
    }

    fn soft_delete_resident(&self, id: ResidentId) -> ResidentRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE residents
             SET is_deleted = 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND is_deleted = 0;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(ResidentRepoError::ResidentNotFound(id));
        }
        Ok(())
    }

    fn assign_household(
        &self,
        id: ResidentId,
        code: &HouseholdCode,
        ancestry: &GeoAncestry,
    ) -> ResidentRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE residents
             SET household_code = ?2,
                 barangay_code = ?3,
                 city_code = ?4,
                 province_code = ?5,
                 region_code = ?6,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND is_deleted = 0;",
            params![
                id.to_string(),
                code.as_str(),
                ancestry.barangay_code,
                ancestry.city_code,
                ancestry.province_code.as_deref(),
                ancestry.region_code,
            ],
        )?;
        if changed == 0 {
            return Err(ResidentRepoError::ResidentNotFound(id));
        }
        Ok(())
    }

    fn clear_household(&self, id: ResidentId) -> ResidentRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE residents
             SET household_code = NULL,
                 barangay_code = NULL,
                 city_code = NULL,
                 province_code = NULL,
                 region_code = NULL,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND is_deleted = 0;",
            [id.to_string()],
        )?;
        if changed == 0 {
            return Err(ResidentRepoError::ResidentNotFound(id));
        }
        Ok(())
    }

    fn write_sectoral(
        &self,
        id: ResidentId,
        profile: &SectoralProfile,
    ) -> ResidentRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE residents
             SET is_senior_citizen = ?2,
                 is_out_of_school_child = ?3,
                 is_out_of_school_youth = ?4,
                 is_in_labor_force = ?5,
                 is_employed = ?6,
                 is_unemployed = ?7,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1
               AND is_deleted = 0;",
            params![
                id.to_string(),
                bool_to_int(profile.is_senior_citizen),
                bool_to_int(profile.is_out_of_school_child),
                bool_to_int(profile.is_out_of_school_youth),
                bool_to_int(profile.is_in_labor_force),
                bool_to_int(profile.is_employed),
                bool_to_int(profile.is_unemployed),
            ],
        )?;
        if changed == 0 {
            return Err(ResidentRepoError::ResidentNotFound(id));
        }
        Ok(())
    }
}

fn parse_resident_row(row: &Row<'_>) -> ResidentRepoResult<Resident> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "residents.id")?;

    let sex_text: String = row.get("sex")?;
    let sex = Sex::parse(&sex_text).ok_or_else(|| {
        ResidentRepoError::InvalidData(format!("invalid sex `{sex_text}` in residents.sex"))
    })?;

    let birthdate_text: String = row.get("birthdate")?;
    let birthdate = CivilDate::parse(&birthdate_text).map_err(|err| {
        ResidentRepoError::InvalidData(format!(
            "invalid birthdate `{birthdate_text}` in residents.birthdate: {err}"
        ))
    })?;

    let monthly_income = match row.get::<_, Option<String>>("monthly_income")? {
        Some(value) => Some(Decimal::from_str(&value).map_err(|_| {
            ResidentRepoError::InvalidData(format!(
                "invalid decimal `{value}` in residents.monthly_income"
            ))
        })?),
        None => None,
    };

    let employment_text: String = row.get("employment_status")?;
    let employment_status = EmploymentStatus::parse(&employment_text).ok_or_else(|| {
        ResidentRepoError::InvalidData(format!(
            "invalid employment status `{employment_text}` in residents.employment_status"
        ))
    })?;

    let education_text: String = row.get("education_status")?;
    let education_status = EducationStatus::parse(&education_text).ok_or_else(|| {
        ResidentRepoError::InvalidData(format!(
            "invalid education status `{education_text}` in residents.education_status"
        ))
    })?;

    let education_level = match row.get::<_, Option<String>>("education_level")? {
        Some(value) => Some(EducationLevel::parse(&value).ok_or_else(|| {
            ResidentRepoError::InvalidData(format!(
                "invalid education level `{value}` in residents.education_level"
            ))
        })?),
        None => None,
    };

    let household_code = match row.get::<_, Option<String>>("household_code")? {
        Some(value) => Some(HouseholdCode::parse(&value).map_err(|err| {
            ResidentRepoError::InvalidData(format!(
                "invalid code `{value}` in residents.household_code: {err}"
            ))
        })?),
        None => None,
    };

    let sectoral = SectoralProfile {
        is_senior_citizen: parse_flag(
            row.get("is_senior_citizen")?,
            "residents.is_senior_citizen",
        )?,
        is_out_of_school_child: parse_flag(
            row.get("is_out_of_school_child")?,
            "residents.is_out_of_school_child",
        )?,
        is_out_of_school_youth: parse_flag(
            row.get("is_out_of_school_youth")?,
            "residents.is_out_of_school_youth",
        )?,
        is_in_labor_force: parse_flag(
            row.get("is_in_labor_force")?,
            "residents.is_in_labor_force",
        )?,
        is_employed: parse_flag(row.get("is_employed")?, "residents.is_employed")?,
        is_unemployed: parse_flag(row.get("is_unemployed")?, "residents.is_unemployed")?,
    };

    let resident = Resident {
        id,
        last_name: row.get("last_name")?,
        first_name: row.get("first_name")?,
        middle_name: row.get("middle_name")?,
        sex,
        birthdate,
        monthly_income,
        occupation_code: row.get("occupation_code")?,
        employment_status,
        education_status,
        education_level,
        is_migrant: parse_flag(row.get("is_migrant")?, "residents.is_migrant")?,
        household_code,
        barangay_code: row.get("barangay_code")?,
        city_code: row.get("city_code")?,
        province_code: row.get("province_code")?,
        region_code: row.get("region_code")?,
        sectoral,
        is_deleted: parse_flag(row.get("is_deleted")?, "residents.is_deleted")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    resident.validate()?;
    Ok(resident)
}

fn parse_uuid(value: &str, column: &'static str) -> ResidentRepoResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        ResidentRepoError::InvalidData(format!("invalid uuid `{value}` in {column}"))
    })
}

fn parse_flag(value: i64, column: &'static str) -> ResidentRepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ResidentRepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn ensure_resident_connection_ready(conn: &Connection) -> ResidentRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(ResidentRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "residents")? {
        return Err(ResidentRepoError::MissingRequiredTable("residents"));
    }
    for column in [
        "id",
        "last_name",
        "first_name",
        "middle_name",
        "sex",
        "birthdate",
        "monthly_income",
        "occupation_code",
        "employment_status",
        "education_status",
        "education_level",
        "is_migrant",
        "household_code",
        "barangay_code",
        "city_code",
        "province_code",
        "region_code",
        "is_senior_citizen",
        "is_out_of_school_child",
        "is_out_of_school_youth",
        "is_in_labor_force",
        "is_employed",
        "is_unemployed",
        "is_deleted",
        "created_at",
        "updated_at",
    ] {
        if !table_has_column(conn, "residents", column)? {
            return Err(ResidentRepoError::MissingRequiredColumn {
                table: "residents",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> ResidentRepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> ResidentRepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
