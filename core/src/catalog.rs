use anyhow::{ensure, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::query::{Category, Query};

// ---------------------------------------------------------------------------
// Data structs
// ---------------------------------------------------------------------------

/// One catalog row. `category` holds the canonical uppercase form of a
/// [`Category`]; validation happens at the insert/update boundary so rows
/// read back are already well-formed.
#[derive(Debug, Clone, Serialize)]
pub struct FixRecord {
    pub group_id: i64,
    pub category: String,
    pub cat_rating: i64,
    pub content_path: String,
}

/// Identity plus content reference, as returned by query execution. The
/// selection set and assembler never need the full record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixRef {
    pub group_id: i64,
    pub content_path: String,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open (or create) the catalog database at `path` and run migrations.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open catalog at {path}"))?;
        let catalog = Self { conn };
        catalog.apply_pragmas()?;
        catalog.migrate()?;
        Ok(catalog)
    }

    /// In-memory catalog for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory catalog")?;
        let catalog = Self { conn };
        catalog.apply_pragmas()?;
        catalog.migrate()?;
        Ok(catalog)
    }

    fn apply_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS fixes (
                group_id     INTEGER PRIMARY KEY,
                category     TEXT NOT NULL,
                cat_rating   INTEGER NOT NULL,
                content_path TEXT NOT NULL,
                CHECK (cat_rating >= 1 AND cat_rating <= 3)
            );

            CREATE INDEX IF NOT EXISTS idx_fixes_category   ON fixes(category);
            CREATE INDEX IF NOT EXISTS idx_fixes_cat_rating ON fixes(cat_rating);
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Fix CRUD
    // -----------------------------------------------------------------------

    /// Insert a new fix. `group_id` is the primary identity; inserting an
    /// existing id is an error, not an upsert.
    pub fn insert_fix(
        &self,
        group_id: i64,
        category: Category,
        cat_rating: i64,
        content_path: &str,
    ) -> Result<()> {
        ensure!(
            (1..=3).contains(&cat_rating),
            "CAT rating must be between 1 and 3, got {cat_rating}"
        );
        self.conn
            .execute(
                "INSERT INTO fixes (group_id, category, cat_rating, content_path)
                 VALUES (?1, ?2, ?3, ?4)",
                params![group_id, category.as_str(), cat_rating, content_path],
            )
            .with_context(|| format!("failed to insert fix {group_id}"))?;
        Ok(())
    }

    /// Returns false if no fix with `group_id` exists.
    pub fn update_category(&self, group_id: i64, category: Category) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE fixes SET category = ?1 WHERE group_id = ?2",
            params![category.as_str(), group_id],
        )?;
        Ok(changed > 0)
    }

    /// Returns false if no fix with `group_id` exists.
    pub fn update_rating(&self, group_id: i64, cat_rating: i64) -> Result<bool> {
        ensure!(
            (1..=3).contains(&cat_rating),
            "CAT rating must be between 1 and 3, got {cat_rating}"
        );
        let changed = self.conn.execute(
            "UPDATE fixes SET cat_rating = ?1 WHERE group_id = ?2",
            params![cat_rating, group_id],
        )?;
        Ok(changed > 0)
    }

    /// Returns false if no fix with `group_id` existed.
    pub fn delete_fix(&self, group_id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM fixes WHERE group_id = ?1", params![group_id])?;
        Ok(deleted > 0)
    }

    pub fn fix_exists(&self, group_id: i64) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT group_id FROM fixes WHERE group_id = ?1",
                params![group_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Full table dump in catalog order, for the `--list` surfaces.
    pub fn all_fixes(&self) -> Result<Vec<FixRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT group_id, category, cat_rating, content_path
             FROM fixes ORDER BY group_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(FixRecord {
                group_id: row.get(0)?,
                category: row.get(1)?,
                cat_rating: row.get(2)?,
                content_path: row.get(3)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    // -----------------------------------------------------------------------
    // Query execution
    // -----------------------------------------------------------------------

    /// Execute a validated query: exactly one single-attribute predicate,
    /// results in catalog order (`group_id` is the table's rowid, so this is
    /// plain iteration order — ties are never broken further).
    ///
    /// Category matching is exact against the stored uppercase form; the
    /// typed query already carries the canonical casing.
    pub fn select_fixes(&self, query: &Query) -> Result<Vec<FixRef>> {
        // The operator text comes from the closed Operator enum, never from
        // raw input; values are always bound as parameters.
        let sql = match query {
            Query::Category(_) => {
                "SELECT group_id, content_path FROM fixes
                 WHERE category = ?1 ORDER BY group_id"
                    .to_string()
            }
            Query::CatRating { operator, .. } => format!(
                "SELECT group_id, content_path FROM fixes
                 WHERE cat_rating {} ?1 ORDER BY group_id",
                operator.as_str()
            ),
            Query::GroupId(_) => {
                "SELECT group_id, content_path FROM fixes
                 WHERE group_id = ?1 ORDER BY group_id"
                    .to_string()
            }
        };

        let mut stmt = self
            .conn
            .prepare(&sql)
            .with_context(|| format!("failed to prepare lookup for {query}"))?;

        fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FixRef> {
            Ok(FixRef {
                group_id: row.get(0)?,
                content_path: row.get(1)?,
            })
        }
        let rows = match query {
            Query::Category(category) => stmt.query_map(params![category.as_str()], map_row)?,
            Query::CatRating { value, .. } => stmt.query_map(params![value], map_row)?,
            Query::GroupId(id) => stmt.query_map(params![id], map_row)?,
        };

        let refs = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("lookup failed for {query}"))?;
        tracing::debug!(query = %query, matches = refs.len(), "executed catalog lookup");
        Ok(refs)
    }

    /// Introspection helper used by the schema tests.
    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table'
             AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}
