use anyhow::{bail, Context, Result};
use rusqlite::{params, types::Type, Connection};
use tracing::info;

/// Offset added to every schema version stored in `PRAGMA user_version`, so a
/// database that was never stamped by us (user_version 0) is rejected.
pub const BASE_DB_VERSION: usize = 99999;

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Only mutated when optional field assignments are passed
            #[allow(unused_mut)]
            let mut column = Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                is_autoincrement: false,
                non_null: false,
                default_value: None,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
}

impl SqlType {
    fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
        }
    }

    fn from_sql(s: &str) -> Option<&'static SqlType> {
        match s {
            "TEXT" => Some(&SqlType::Text),
            "INTEGER" => Some(&SqlType::Integer),
            "REAL" => Some(&SqlType::Real),
            "BLOB" => Some(&SqlType::Blob),
            _ => None,
        }
    }
}

pub struct Column<'a, S: AsRef<str>> {
    pub name: S,
    pub sql_type: &'a SqlType,
    pub is_primary_key: bool,
    /// Only meaningful on an INTEGER primary key; keeps ids strictly increasing
    /// even after the highest row is deleted.
    pub is_autoincrement: bool,
    pub non_null: bool,
    pub default_value: Option<S>,
}

impl<S: AsRef<str>> Column<'_, S> {
    fn definition(&self) -> String {
        let mut sql = format!("{} {}", self.name.as_ref(), self.sql_type.as_sql());
        if self.is_primary_key {
            sql.push_str(" PRIMARY KEY");
            if self.is_autoincrement {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        if self.non_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default_value) = &self.default_value {
            sql.push_str(&format!(" DEFAULT {}", default_value.as_ref()));
        }
        sql
    }
}

pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column<'static, &'static str>],
    pub indices: &'static [(&'static str, &'static str)],
}

impl Table {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        let columns = self
            .columns
            .iter()
            .map(|c| c.definition())
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute(&format!("CREATE TABLE {} ({});", self.name, columns), params![])?;

        for (index_name, column_names) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({});",
                    index_name, self.name, column_names
                ),
                params![],
            )?;
        }
        Ok(())
    }

    /// Appends one of this table's columns to an existing table created from
    /// an older definition. Used by migrations.
    pub fn add_column(&self, conn: &Connection, column_name: &str) -> Result<()> {
        let column = self
            .columns
            .iter()
            .find(|c| c.name == column_name)
            .with_context(|| format!("Table {} has no column {}", self.name, column_name))?;
        conn.execute(
            &format!("ALTER TABLE {} ADD COLUMN {};", self.name, column.definition()),
            params![],
        )?;
        Ok(())
    }

    fn validate(&self, conn: &Connection) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let actual_columns: Vec<Column<'_, String>> = stmt
            .query_map(params![], |row| {
                let sql_type_name = row.get::<_, String>(2)?;
                let sql_type = SqlType::from_sql(&sql_type_name).ok_or_else(|| {
                    rusqlite::Error::InvalidColumnType(2, sql_type_name.clone(), Type::Text)
                })?;
                Ok(Column {
                    name: row.get::<_, String>(1)?,
                    sql_type,
                    non_null: row.get::<_, i32>(3)? == 1,
                    default_value: row.get::<_, Option<String>>(4)?,
                    is_primary_key: row.get::<_, i32>(5)? == 1,
                    is_autoincrement: false,
                })
            })?
            .collect::<rusqlite::Result<_>>()
            .with_context(|| format!("Failed to read columns of table {}", self.name))?;

        if actual_columns.is_empty() {
            bail!("Table {} does not exist", self.name);
        }
        if actual_columns.len() != self.columns.len() {
            bail!(
                "Table {} has {} columns, expected {}. Found: {}, expected: {}",
                self.name,
                actual_columns.len(),
                self.columns.len(),
                actual_columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        for (actual, expected) in actual_columns.iter().zip(self.columns.iter()) {
            if actual.name != expected.name {
                bail!(
                    "Table {} column name mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    actual.name
                );
            }
            if actual.sql_type != expected.sql_type {
                bail!(
                    "Table {} column {} type mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected.name,
                    expected.sql_type,
                    actual.sql_type
                );
            }
            if actual.non_null != expected.non_null {
                bail!(
                    "Table {} column {} non-null mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.non_null,
                    actual.non_null
                );
            }
            // SQLite may report defaults wrapped in parentheses
            if actual
                .default_value
                .as_ref()
                .map(strip_leading_and_trailing_parentheses)
                != expected
                    .default_value
                    .map(strip_leading_and_trailing_parentheses)
            {
                bail!(
                    "Table {} column {} default value mismatch: expected {:?}, got {:?}",
                    self.name,
                    expected.name,
                    expected.default_value,
                    actual.default_value
                );
            }
            if actual.is_primary_key != expected.is_primary_key {
                bail!(
                    "Table {} column {} primary key mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.is_primary_key,
                    actual.is_primary_key
                );
            }
        }

        for (index_name, _columns) in self.indices {
            let index_exists: bool = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, self.name],
                    |_| Ok(true),
                )
                .unwrap_or(false);
            if !index_exists {
                bail!("Table {} is missing index '{}'", self.name, index_name);
            }
        }
        Ok(())
    }
}

pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    /// Brings a database at `version - 1` up to this version.
    pub migration: Option<fn(&Connection) -> Result<()>>,
}

fn strip_leading_and_trailing_parentheses<S: AsRef<str>>(s: S) -> String {
    let s = s.as_ref();
    if s.starts_with('(') && s.ends_with(')') {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + self.version),
            [],
        )?;
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> Result<()> {
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}

/// Reads the version stamped in `PRAGMA user_version`, checks the tables
/// against that version's definition and runs every later migration.
///
/// Returns the version the database was found at.
pub fn validate_and_migrate(
    conn: &Connection,
    schemas: &[VersionedSchema],
    db_name: &str,
) -> Result<usize> {
    let stored = conn
        .query_row("PRAGMA user_version;", [], |row| row.get::<_, i64>(0))
        .context("Failed to read database version")?
        - BASE_DB_VERSION as i64;

    if stored < 0 {
        bail!(
            "{} database version {} does not contain base db version {}",
            db_name,
            stored,
            BASE_DB_VERSION
        );
    }
    let version = stored as usize;
    let latest = schemas.len().checked_sub(1).context("No schemas defined")?;
    if version > latest {
        bail!(
            "{} database version {} is too new (max supported: {})",
            db_name,
            version,
            latest
        );
    }

    schemas[version].validate(conn)?;

    if version < latest {
        info!(
            "Migrating {} database from version {} to {}",
            db_name, version, latest
        );
        for schema in schemas.iter().skip(version + 1) {
            if let Some(migration) = schema.migration {
                info!("Running {} migration to version {}", db_name, schema.version);
                migration(conn)?;
            }
        }
        conn.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest),
            [],
        )?;
        schemas[latest].validate(conn)?;
    }
    Ok(version)
}

/// Runs `PRAGMA integrity_check` and fails unless SQLite reports "ok".
pub fn check_integrity(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare("PRAGMA integrity_check;")?;
    let problems: Vec<String> = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<_>>()?;
    if problems.len() == 1 && problems[0] == "ok" {
        Ok(())
    } else {
        bail!("Integrity check failed: {}", problems.join("; "))
    }
}
