//! Geographic catalog repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Persist and resolve the four-tier administrative tree.
//! - Keep prefix-consistency and activity checks inside the storage
//!   boundary.
//!
//! # Invariants
//! - Inserted nodes pass `GeoNode::validate()` and reference an existing
//!   active parent of the expected tier.
//! - Resolution never crosses an inactive node; any inactive link in the
//!   chain makes the whole code unknown.
//! - Child listing is deterministic: `code ASC`.

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::geo::{is_barangay_code, GeoAncestry, GeoNode, GeoTier, GeoValidationError};
use crate::model::principal::AccessPrincipal;
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};

const GEO_NODE_SELECT_SQL: &str = "SELECT
    code,
    name,
    tier,
    parent_code,
    is_independent_city,
    is_active
FROM geo_nodes";

pub type GeoRepoResult<T> = Result<T, GeoRepoError>;

/// Errors from geographic catalog operations.
#[derive(Debug)]
pub enum GeoRepoError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Node shape or prefix consistency violation.
    Validation(GeoValidationError),
    /// Code already present in the catalog.
    DuplicateCode(String),
    /// Code missing, inactive, or reached through an inactive ancestor.
    UnknownGeoCode(String),
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

impl Display for GeoRepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::DuplicateCode(code) => write!(f, "geo code already exists: {code}"),
            Self::UnknownGeoCode(code) => write!(f, "unknown geo code: {code}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "geo repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "geo repository requires table `{table}`")
            }
            Self::MissingRequiredColumn { table, column } => write!(
                f,
                "geo repository requires column `{column}` in table `{table}`"
            ),
            Self::InvalidData(message) => write!(f, "invalid geo catalog data: {message}"),
        }
    }
}

impl Error for GeoRepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::DuplicateCode(_) => None,
            Self::UnknownGeoCode(_) => None,
            Self::UninitializedConnection { .. } => None,
            Self::MissingRequiredTable(_) => None,
            Self::MissingRequiredColumn { .. } => None,
            Self::InvalidData(_) => None,
        }
    }
}

impl From<GeoValidationError> for GeoRepoError {
    fn from(value: GeoValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for GeoRepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for GeoRepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for the administrative geographic tree.
pub trait GeoTreeRepository {
    /// Inserts one validated node under its existing active parent.
    fn insert_node(&self, node: &GeoNode) -> GeoRepoResult<()>;
    /// Loads one node by full code.
    fn get_node(&self, code: &str, include_inactive: bool) -> GeoRepoResult<Option<GeoNode>>;
    /// Activates or retires one node.
    fn set_node_active(&self, code: &str, is_active: bool) -> GeoRepoResult<()>;
    /// Lists direct children of one parent; `None` lists regions.
    fn list_children(
        &self,
        parent_code: Option<&str>,
        include_inactive: bool,
    ) -> GeoRepoResult<Vec<GeoNode>>;
    /// Resolves the full active ancestor chain of one barangay.
    fn resolve_barangay_ancestry(&self, barangay_code: &str) -> GeoRepoResult<GeoAncestry>;
    /// Checks that the principal's scope code names an active node of the
    /// matching tier. National principals always pass.
    fn principal_scope_exists(&self, principal: &AccessPrincipal) -> GeoRepoResult<bool>;
}

/// SQLite-backed geographic catalog repository.
#[derive(Debug)]
pub struct SqliteGeoTreeRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGeoTreeRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> GeoRepoResult<Self> {
        ensure_geo_connection_ready(conn)?;
        Ok(Self { conn })
    }
}

impl GeoTreeRepository for SqliteGeoTreeRepository<'_> {
    fn insert_node(&self, node: &GeoNode) -> GeoRepoResult<()> {
        node.validate()?;

        if let Some(parent_code) = node.parent_code.as_deref() {
            let parent = load_active_node(self.conn, parent_code)?
                .ok_or_else(|| GeoRepoError::UnknownGeoCode(parent_code.to_string()))?;
            let expected = expected_parent_tier(node);
            if Some(parent.tier) != expected {
                return Err(GeoRepoError::InvalidData(format!(
                    "geo node {} expects a {} parent, found {} node {}",
                    node.code,
                    expected.map_or("none", GeoTier::as_str),
                    parent.tier,
                    parent.code
                )));
            }
        }

        if load_node(self.conn, &node.code)?.is_some() {
            return Err(GeoRepoError::DuplicateCode(node.code.clone()));
        }

        self.conn.execute(
            "INSERT INTO geo_nodes (
                code,
                name,
                tier,
                parent_code,
                is_independent_city,
                is_active
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                node.code,
                node.name,
                node.tier.as_str(),
                node.parent_code.as_deref(),
                bool_to_int(node.is_independent_city),
                bool_to_int(node.is_active),
            ],
        )?;
        Ok(())
    }

    fn get_node(&self, code: &str, include_inactive: bool) -> GeoRepoResult<Option<GeoNode>> {
        let mut stmt = self.conn.prepare(&format!(
            "{GEO_NODE_SELECT_SQL}
             WHERE code = ?1
               AND (?2 = 1 OR is_active = 1);"
        ))?;
        let mut rows = stmt.query(params![code, bool_to_int(include_inactive)])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_geo_node_row(row)?));
        }
        Ok(None)
    }

    fn set_node_active(&self, code: &str, is_active: bool) -> GeoRepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE geo_nodes
             SET is_active = ?2,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE code = ?1;",
            params![code, bool_to_int(is_active)],
        )?;
        if changed == 0 {
            return Err(GeoRepoError::UnknownGeoCode(code.to_string()));
        }
        Ok(())
    }

    fn list_children(
        &self,
        parent_code: Option<&str>,
        include_inactive: bool,
    ) -> GeoRepoResult<Vec<GeoNode>> {
        let mut nodes = Vec::new();
        if let Some(parent_code) = parent_code {
            let mut stmt = self.conn.prepare(&format!(
                "{GEO_NODE_SELECT_SQL}
                 WHERE parent_code = ?1
                   AND (?2 = 1 OR is_active = 1)
                 ORDER BY code ASC;"
            ))?;
            let mut rows = stmt.query(params![parent_code, bool_to_int(include_inactive)])?;
            while let Some(row) = rows.next()? {
                nodes.push(parse_geo_node_row(row)?);
            }
        } else {
            let mut stmt = self.conn.prepare(&format!(
                "{GEO_NODE_SELECT_SQL}
                 WHERE parent_code IS NULL
                   AND (?1 = 1 OR is_active = 1)
                 ORDER BY code ASC;"
            ))?;
            let mut rows = stmt.query(params![bool_to_int(include_inactive)])?;
            while let Some(row) = rows.next()? {
                nodes.push(parse_geo_node_row(row)?);
            }
        }
        Ok(nodes)
    }

    fn resolve_barangay_ancestry(&self, barangay_code: &str) -> GeoRepoResult<GeoAncestry> {
        if !is_barangay_code(barangay_code) {
            return Err(GeoRepoError::UnknownGeoCode(barangay_code.to_string()));
        }

        let barangay = require_active_node(self.conn, barangay_code, GeoTier::Barangay)?;
        let city_code = required_parent(&barangay)?;
        let city = require_active_node(self.conn, &city_code, GeoTier::CityMunicipality)?;

        let (province_code, region_code) = if city.is_independent_city {
            let region_code = required_parent(&city)?;
            require_active_node(self.conn, &region_code, GeoTier::Region)?;
            (None, region_code)
        } else {
            let province_code = required_parent(&city)?;
            let province = require_active_node(self.conn, &province_code, GeoTier::Province)?;
            let region_code = required_parent(&province)?;
            require_active_node(self.conn, &region_code, GeoTier::Region)?;
            (Some(province_code), region_code)
        };

        Ok(GeoAncestry {
            region_code,
            province_code,
            city_code: city.code,
            barangay_code: barangay.code,
        })
    }

    fn principal_scope_exists(&self, principal: &AccessPrincipal) -> GeoRepoResult<bool> {
        let geo_tier = match principal.tier.geo_tier() {
            Some(tier) => tier,
            None => return Ok(true),
        };
        let code = match principal.scope_code.as_deref() {
            Some(code) => code,
            None => return Ok(false),
        };

        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM geo_nodes
                WHERE code = ?1
                  AND tier = ?2
                  AND is_active = 1
            );",
            params![code, geo_tier.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }
}

/// Tier the node's parent row must carry. `None` only for regions.
fn expected_parent_tier(node: &GeoNode) -> Option<GeoTier> {
    match node.tier {
        GeoTier::Region => None,
        GeoTier::Province => Some(GeoTier::Region),
        GeoTier::CityMunicipality => {
            if node.is_independent_city {
                Some(GeoTier::Region)
            } else {
                Some(GeoTier::Province)
            }
        }
        GeoTier::Barangay => Some(GeoTier::CityMunicipality),
    }
}

fn required_parent(node: &GeoNode) -> GeoRepoResult<String> {
    node.parent_code.clone().ok_or_else(|| {
        GeoRepoError::InvalidData(format!(
            "geo node {} is missing its parent_code",
            node.code
        ))
    })
}

fn require_active_node(
    conn: &Connection,
    code: &str,
    expected_tier: GeoTier,
) -> GeoRepoResult<GeoNode> {
    let node = load_active_node(conn, code)?
        .ok_or_else(|| GeoRepoError::UnknownGeoCode(code.to_string()))?;
    if node.tier != expected_tier {
        return Err(GeoRepoError::InvalidData(format!(
            "geo node {code} has tier {}, expected {expected_tier}",
            node.tier
        )));
    }
    Ok(node)
}

fn load_node(conn: &Connection, code: &str) -> GeoRepoResult<Option<GeoNode>> {
    let mut stmt = conn.prepare(&format!("{GEO_NODE_SELECT_SQL} WHERE code = ?1;"))?;
    let mut rows = stmt.query([code])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_geo_node_row(row)?));
    }
    Ok(None)
}

fn load_active_node(conn: &Connection, code: &str) -> GeoRepoResult<Option<GeoNode>> {
    let mut stmt = conn.prepare(&format!(
        "{GEO_NODE_SELECT_SQL}
         WHERE code = ?1
           AND is_active = 1;"
    ))?;
    let mut rows = stmt.query([code])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_geo_node_row(row)?));
    }
    Ok(None)
}

fn parse_geo_node_row(row: &Row<'_>) -> GeoRepoResult<GeoNode> {
    let tier_text: String = row.get("tier")?;
    let tier = GeoTier::parse(&tier_text).ok_or_else(|| {
        GeoRepoError::InvalidData(format!("invalid tier `{tier_text}` in geo_nodes.tier"))
    })?;

    Ok(GeoNode {
        code: row.get("code")?,
        name: row.get("name")?,
        tier,
        parent_code: row.get("parent_code")?,
        is_independent_city: parse_flag(
            row.get("is_independent_city")?,
            "geo_nodes.is_independent_city",
        )?,
        is_active: parse_flag(row.get("is_active")?, "geo_nodes.is_active")?,
    })
}

fn parse_flag(value: i64, column: &'static str) -> GeoRepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(GeoRepoError::InvalidData(format!(
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

fn ensure_geo_connection_ready(conn: &Connection) -> GeoRepoResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(GeoRepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    if !table_exists(conn, "geo_nodes")? {
        return Err(GeoRepoError::MissingRequiredTable("geo_nodes"));
    }

    for column in [
        "code",
        "name",
        "tier",
        "parent_code",
        "is_independent_city",
        "is_active",
        "created_at",
        "updated_at",
    ] {
        if !table_has_column(conn, "geo_nodes", column)? {
            return Err(GeoRepoError::MissingRequiredColumn {
                table: "geo_nodes",
                column,
            });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> GeoRepoResult<bool> {
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

fn table_has_column(conn: &Connection, table: &str, column: &str) -> GeoRepoResult<bool> {
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
