//! Household repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist household rows and membership edges.
//! - Expose the member rollup and aggregate write-back used by derived
//!   recomputation.
//! - Push the caller's scope condition into list queries.
//!
//! # Invariants
//! - Household codes and geo columns never change after insert.
//! - Aggregate columns are written only through `write_aggregates`.
//! - One edge per (household, resident); re-joining reactivates it.
//! - Listing is deterministic: `code ASC`.

use crate::access::scope_condition;
use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::geo::GeoAncestry;
use crate::model::household::{
    Household, HouseholdCode, HouseholdValidationError, IncomeClass,
};
use crate::model::principal::AccessPrincipal;
use crate::model::resident::ResidentId;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};
use rust_decimal::Decimal;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

const HOUSEHOLD_SELECT_SQL: &str = "SELECT
    code,
    barangay_code,
    city_code,
    province_code,
    region_code,
    subdivision_id,
    street_id,
    member_count,
    migrant_count,
    monthly_income_total,
    income_class,
    head_resident_id,
    is_deleted,
    created_at,
    updated_at
FROM households";

pub type HouseholdRepoResult<T> = Result<T, HouseholdRepoError>;

/// Errors from household persistence operations.
#[derive(Debug)]
pub enum HouseholdRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Persisted row disagrees with its own code prefix.
    Validation(HouseholdValidationError),
    /// Household missing or soft-deleted.
    HouseholdNotFound(String),
    /// No edge exists for the (household, resident) pair.
    MemberEdgeNotFound {
        household_code: String,
        resident_id: ResidentId,
    },
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

impl Display for HouseholdRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::HouseholdNotFound(code) => write!(f, "household not found: {code}"),
            Self::MemberEdgeNotFound {
                household_code,
                resident_id,
            } => write!(
                f,
                "no membership edge for resident {resident_id} in household {household_code}"
            ),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "household repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "household repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "household repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid household data: {message}"),
        }
    }
}

impl Error for HouseholdRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::HouseholdNotFound(_) => None,
            Self::MemberEdgeNotFound { .. } => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<HouseholdValidationError> for HouseholdRepoError {
    fn from(value: HouseholdValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for HouseholdRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for HouseholdRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Query options for listing households.
#[derive(Debug, Clone, Default)]
pub struct HouseholdListQuery {
    pub include_deleted: bool,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// One membership edge read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HouseholdMemberEdge {
    pub household_code: HouseholdCode,
    pub resident_id: ResidentId,
    pub is_active: bool,
    /// Epoch ms of the most recent join.
    pub joined_at: i64,
    /// Epoch ms of leaving; `None` while active.
    pub left_at: Option<i64>,
}

/// Aggregates scanned from active member edges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRollup {
    pub member_count: u32,
    pub migrant_count: u32,
    /// Sum of reported member incomes; absent incomes contribute zero.
    pub monthly_income_total: Decimal,
}

/// Repository interface for household rows and membership edges.
pub trait HouseholdRepository {
    /// Inserts one household row with zeroed aggregates and reads it back.
    fn insert_household(
        &self,
        code: &HouseholdCode,
        ancestry: &GeoAncestry,
        subdivision_id: Option<&str>,
        street_id: Option<&str>,
    ) -> HouseholdRepoResult<Household>;
    /// Loads one household by code.
    fn get_household(
        &self,
        code: &HouseholdCode,
        include_deleted: bool,
    ) -> HouseholdRepoResult<Option<Household>>;
    /// Lists households visible to the principal, scope pushed into SQL.
    fn list_households(
        &self,
        principal: &AccessPrincipal,
        query: &HouseholdListQuery,
    ) -> HouseholdRepoResult<Vec<Household>>;
    /// Soft-deletes one household row. The code is never reused.
    fn soft_delete_household(&self, code: &HouseholdCode) -> HouseholdRepoResult<()>;
    /// Assigns or clears the household head.
    fn set_head(
        &self,
        code: &HouseholdCode,
        head_resident_id: Option<ResidentId>,
    ) -> HouseholdRepoResult<()>;
    /// Loads the edge for one (household, resident) pair, active or not.
    fn get_member_edge(
        &self,
        code: &HouseholdCode,
        resident_id: ResidentId,
    ) -> HouseholdRepoResult<Option<HouseholdMemberEdge>>;
    /// Creates the edge, or reactivates it with a fresh join timestamp.
    fn upsert_member_edge(
        &self,
        code: &HouseholdCode,
        resident_id: ResidentId,
    ) -> HouseholdRepoResult<()>;
    /// Deactivates the active edge, stamping `left_at`.
    fn deactivate_member_edge(
        &self,
        code: &HouseholdCode,
        resident_id: ResidentId,
    ) -> HouseholdRepoResult<()>;
    /// Counts active edges.
    fn active_member_count(&self, code: &HouseholdCode) -> HouseholdRepoResult<u32>;
    /// Scans active edges joined to resident rows for recomputation.
    fn member_rollup(&self, code: &HouseholdCode) -> HouseholdRepoResult<MemberRollup>;
    /// Writes derived aggregate columns. Engine use only.
    fn write_aggregates(
        &self,
        code: &HouseholdCode,
        rollup: &MemberRollup,
        income_class: IncomeClass,
    ) -> HouseholdRepoResult<()>;
}

/// SQLite-backed household repository.
#[derive(Debug)]
pub struct SqliteHouseholdRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteHouseholdRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> HouseholdRepoResult<Self> {
        ensure_household_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl HouseholdRepository for SqliteHouseholdRepository<'_> {
    fn insert_household(
        &self,
        code: &HouseholdCode,
        ancestry: &GeoAncestry,
        subdivision_id: Option<&str>,
        street_id: Option<&str>,
    ) -> HouseholdRepoResult<Household> {
        self.conn.execute(
            "INSERT INTO households (
                code,
                barangay_code,
                city_code,
                province_code,
                region_code,
                subdivision_id,
                street_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                code.as_str(),
                ancestry.barangay_code,
                ancestry.city_code,
                ancestry.province_code.as_deref(),
                ancestry.region_code,
                subdivision_id,
                street_id,
            ],
        )?;
        load_required_household(self.conn, code)
    }

    fn get_household(
        &self,
        code: &HouseholdCode,
        include_deleted: bool,
    ) -> HouseholdRepoResult<Option<Household>> {
        let mut stmt = self.conn.prepare(&format!(
            "{HOUSEHOLD_SELECT_SQL}
             WHERE code = ?1
               AND (?2 = 1 OR is_deleted = 0);"
        ))?;
        let mut rows = stmt.query(params![code.as_str(), bool_to_int(include_deleted)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_household_row(row)?));
        }
        Ok(None)
    }

    fn list_households(
        &self,
        principal: &AccessPrincipal,
        query: &HouseholdListQuery,
    ) -> HouseholdRepoResult<Vec<Household>> {
        let condition = scope_condition(principal, "households");
        let mut sql = format!("{HOUSEHOLD_SELECT_SQL} WHERE {}", condition.clause);
        let mut bind_values: Vec<Value> = Vec::new();
        if let Some(param) = condition.param {
            bind_values.push(Value::Text(param));
        }

        if !query.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }

        sql.push_str(" ORDER BY code ASC");

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
        let mut households = Vec::new();
        while let Some(row) = rows.next()? {
            households.push(parse_household_row(row)?);
        }
        Ok(households)
    }

    fn soft_delete_household(&self, code: &HouseholdCode) -> HouseholdRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE households
             SET is_deleted = 1,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE code = ?1
               AND is_deleted = 0;",
            [code.as_str()],
        )?;
        if changed == 0 {
            return Err(HouseholdRepoError::HouseholdNotFound(
                code.as_str().to_string(),
            ));
        }
        Ok(())
    }

    fn set_head(
        &self,
        code: &HouseholdCode,
        head_resident_id: Option<ResidentId>,
    ) -> HouseholdRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE households
             SET head_resident_id = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE code = ?1
               AND is_deleted = 0;",
            params![
                code.as_str(),
                head_resident_id.map(|value| value.to_string()),
            ],
        )?;
        if changed == 0 {
            return Err(HouseholdRepoError::HouseholdNotFound(
                code.as_str().to_string(),
            ));
        }
        Ok(())
    }

    fn get_member_edge(
        &self,
        code: &HouseholdCode,
        resident_id: ResidentId,
    ) -> HouseholdRepoResult<Option<HouseholdMemberEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                household_code,
                resident_id,
                is_active,
                joined_at,
                left_at
             FROM household_members
             WHERE household_code = ?1
               AND resident_id = ?2;",
        )?;
        let mut rows = stmt.query(params![code.as_str(), resident_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_member_edge_row(row)?));
        }
        Ok(None)
    }

    fn upsert_member_edge(
        &self,
        code: &HouseholdCode,
        resident_id: ResidentId,
    ) -> HouseholdRepoResult<()> {
        self.conn.execute(
            "INSERT INTO household_members (household_code, resident_id, is_active, left_at)
             VALUES (?1, ?2, 1, NULL)
             ON CONFLICT(household_code, resident_id) DO UPDATE SET
                 is_active = 1,
                 joined_at = (strftime('%s', 'now') * 1000),
                 left_at = NULL;",
            params![code.as_str(), resident_id.to_string()],
        )?;
        Ok(())
    }

    fn deactivate_member_edge(
        &self,
        code: &HouseholdCode,
        resident_id: ResidentId,
    ) -> HouseholdRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE household_members
             SET is_active = 0,
                 left_at = (strftime('%s', 'now') * 1000)
             WHERE household_code = ?1
               AND resident_id = ?2
               AND is_active = 1;",
            params![code.as_str(), resident_id.to_string()],
        )?;
        if changed == 0 {
            return Err(HouseholdRepoError::MemberEdgeNotFound {
                household_code: code.as_str().to_string(),
                resident_id,
            });
        }
        Ok(())
    }

    fn active_member_count(&self, code: &HouseholdCode) -> HouseholdRepoResult<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM household_members
             WHERE household_code = ?1
               AND is_active = 1;",
            [code.as_str()],
            |row| row.get(0),
        )?;
        parse_count(count, "household_members count")
    }

    fn member_rollup(&self, code: &HouseholdCode) -> HouseholdRepoResult<MemberRollup> {
        let mut stmt = self.conn.prepare(
            "SELECT
                r.monthly_income,
                r.is_migrant
             FROM household_members m
             INNER JOIN residents r ON r.id = m.resident_id
             WHERE m.household_code = ?1
               AND m.is_active = 1
               AND r.is_deleted = 0;",
        )?;
        let mut rows = stmt.query([code.as_str()])?;

        let mut member_count: u32 = 0;
        let mut migrant_count: u32 = 0;
        let mut monthly_income_total = Decimal::ZERO;
        while let Some(row) = rows.next()? {
            member_count += 1;
            if parse_flag(row.get("is_migrant")?, "residents.is_migrant")? {
                migrant_count += 1;
            }
            if let Some(income_text) = row.get::<_, Option<String>>("monthly_income")? {
                monthly_income_total +=
                    parse_decimal(&income_text, "residents.monthly_income")?;
            }
        }

        Ok(MemberRollup {
            member_count,
            migrant_count,
            monthly_income_total,
        })
    }

    fn write_aggregates(
        &self,
        code: &HouseholdCode,
        rollup: &MemberRollup,
        income_class: IncomeClass,
    ) -> HouseholdRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE households
             SET member_count = ?2,
                 migrant_count = ?3,
                 monthly_income_total = ?4,
                 income_class = ?5,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE code = ?1
               AND is_deleted = 0;",
            params![
                code.as_str(),
                i64::from(rollup.member_count),
                i64::from(rollup.migrant_count),
                rollup.monthly_income_total.to_string(),
                income_class.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(HouseholdRepoError::HouseholdNotFound(
                code.as_str().to_string(),
            ));
        }
        Ok(())
    }
}

fn load_required_household(
    conn: &Connection,
    code: &HouseholdCode,
) -> HouseholdRepoResult<Household> {
    let mut stmt = conn.prepare(&format!(
        "{HOUSEHOLD_SELECT_SQL}
         WHERE code = ?1
           AND is_deleted = 0;"
    ))?;
    let mut rows = stmt.query([code.as_str()])?;
    if let Some(row) = rows.next()? {
        return parse_household_row(row);
    }
    Err(HouseholdRepoError::HouseholdNotFound(
        code.as_str().to_string(),
    ))
}

fn parse_household_row(row: &Row<'_>) -> HouseholdRepoResult<Household> {
    let code_text: String = row.get("code")?;
    let code = HouseholdCode::parse(&code_text).map_err(|err| {
        HouseholdRepoError::InvalidData(format!(
            "invalid code `{code_text}` in households.code: {err}"
        ))
    })?;

    let income_text: String = row.get("monthly_income_total")?;
    let monthly_income_total = parse_decimal(&income_text, "households.monthly_income_total")?;

    let class_text: String = row.get("income_class")?;
    let income_class = IncomeClass::parse(&class_text).ok_or_else(|| {
        HouseholdRepoError::InvalidData(format!(
            "invalid income class `{class_text}` in households.income_class"
        ))
    })?;

    let head_resident_id = row
        .get::<_, Option<String>>("head_resident_id")?
        .map(|value| parse_uuid(&value, "households.head_resident_id"))
        .transpose()?;

    let household = Household {
        code,
        barangay_code: row.get("barangay_code")?,
        city_code: row.get("city_code")?,
        province_code: row.get("province_code")?,
        region_code: row.get("region_code")?,
        subdivision_id: row.get("subdivision_id")?,
        street_id: row.get("street_id")?,
        member_count: parse_count(row.get("member_count")?, "households.member_count")?,
        migrant_count: parse_count(row.get("migrant_count")?, "households.migrant_count")?,
        monthly_income_total,
        income_class,
        head_resident_id,
        is_deleted: parse_flag(row.get("is_deleted")?, "households.is_deleted")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    };
    household.validate()?;
    Ok(household)
}

fn parse_member_edge_row(row: &Row<'_>) -> HouseholdRepoResult<HouseholdMemberEdge> {
    let code_text: String = row.get("household_code")?;
    let household_code = HouseholdCode::parse(&code_text).map_err(|err| {
        HouseholdRepoError::InvalidData(format!(
            "invalid code `{code_text}` in household_members.household_code: {err}"
        ))
    })?;
    let resident_text: String = row.get("resident_id")?;
    let resident_id = parse_uuid(&resident_text, "household_members.resident_id")?;

    Ok(HouseholdMemberEdge {
        household_code,
        resident_id,
        is_active: parse_flag(row.get("is_active")?, "household_members.is_active")?,
        joined_at: row.get("joined_at")?,
        left_at: row.get("left_at")?,
    })
}

fn parse_decimal(value: &str, column: &'static str) -> HouseholdRepoResult<Decimal> {
    Decimal::from_str(value).map_err(|_| {
        HouseholdRepoError::InvalidData(format!("invalid decimal `{value}` in {column}"))
    })
}

fn parse_uuid(value: &str, column: &'static str) -> HouseholdRepoResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| {
        HouseholdRepoError::InvalidData(format!("invalid uuid `{value}` in {column}"))
    })
}

fn parse_count(value: i64, column: &'static str) -> HouseholdRepoResult<u32> {
    u32::try_from(value).map_err(|_| {
        HouseholdRepoError::InvalidData(format!("invalid count `{value}` in {column}"))
    })
}

fn parse_flag(value: i64, column: &'static str) -> HouseholdRepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(HouseholdRepoError::InvalidData(format!(
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

fn ensure_household_connection_ready(conn: &Connection) -> HouseholdRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(HouseholdRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "households")? {
        return Err(HouseholdRepoError::MissingRequiredTable("households"));
    }
    for column in [
        "code",
        "barangay_code",
        "city_code",
        "province_code",
        "region_code",
        "subdivision_id",
        "street_id",
        "member_count",
        "migrant_count",
        "monthly_income_total",
        "income_class",
        "head_resident_id",
        "is_deleted",
        "created_at",
        "updated_at",
    ] {
        if !table_has_column(conn, "households", column)? {
            return Err(HouseholdRepoError::MissingRequiredColumn {
                table: "households",
                column,
            });
        }
    }

    if !table_exists(conn, "household_members")? {
        return Err(HouseholdRepoError::MissingRequiredTable("household_members"));
    }
    for column in [
        "household_code",
        "resident_id",
        "is_active",
        "joined_at",
        "left_at",
    ] {
        if !table_has_column(conn, "household_members", column)? {
            return Err(HouseholdRepoError::MissingRequiredColumn {
                table: "household_members",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> HouseholdRepoResult<bool> {
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

fn table_has_column(conn: &Connection, table: &str, column: &str) -> HouseholdRepoResult<bool> {
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
