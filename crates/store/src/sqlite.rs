//! SQLite-backed reference table
//!
//! The table is rebuilt from a SQL script at startup and read back with a
//! fresh read-only connection on every lookup.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use tabinfer_model::{FeatureRow, FeatureValue};
use tracing::{debug, info, warn};

use crate::{ReferenceRow, ReferenceStore, StoreError, TableLayout};

/// Recreate the store at `db_path` from the statements in `script_path`
///
/// Any existing database file is removed first so every start begins from
/// the script's contents.
pub fn initialize<P: AsRef<Path>, Q: AsRef<Path>>(
    script_path: P,
    db_path: Q,
) -> Result<(), StoreError> {
    let script_path = script_path.as_ref();
    let db_path = db_path.as_ref();

    if !script_path.is_file() {
        return Err(StoreError::ScriptNotFound(script_path.to_path_buf()));
    }
    let script = fs::read_to_string(script_path)?;

    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    if db_path.exists() {
        debug!(path = %db_path.display(), "removing previous reference store");
        fs::remove_file(db_path)?;
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch(&script)?;
    conn.close().map_err(|(_, err)| err)?;

    info!(
        script = %script_path.display(),
        db = %db_path.display(),
        "reference store initialized"
    );
    Ok(())
}

/// Reference table stored in a SQLite file
#[derive(Debug, Clone)]
pub struct SqliteReferenceStore {
    db_path: PathBuf,
    layout: TableLayout,
}

impl SqliteReferenceStore {
    pub fn new<P: Into<PathBuf>>(db_path: P, layout: TableLayout) -> Result<Self, StoreError> {
        layout.validate()?;
        Ok(Self {
            db_path: db_path.into(),
            layout,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    fn open(&self) -> Result<Connection, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        Ok(Connection::open_with_flags(&self.db_path, flags)?)
    }

    /// Number of rows in the reference table
    pub fn row_count(&self) -> Result<u64, StoreError> {
        let conn = self.open()?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&self.layout.table));
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

impl ReferenceStore for SqliteReferenceStore {
    fn load_all(&self) -> Result<Vec<ReferenceRow>, StoreError> {
        let conn = self.open()?;
        let sql = format!("SELECT * FROM {}", quote_ident(&self.layout.table));
        let mut stmt = conn.prepare(&sql)?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let id_idx = column_index(&columns, &self.layout.id_column)?;
        let outcome_idx = column_index(&columns, &self.layout.outcome_column)?;

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();

        while let Some(row) = rows.next()? {
            let id = match read_id(&self.layout.id_column, row.get_ref(id_idx)?) {
                Ok(id) => id,
                Err(err) => {
                    warn!(table = %self.layout.table, "skipping reference row: {err}");
                    continue;
                }
            };
            let mut outcome = FeatureValue::Missing;
            let mut features = FeatureRow::new();

            for (idx, name) in columns.iter().enumerate() {
                if idx == id_idx {
                    continue;
                }
                let value = read_cell(name, row.get_ref(idx)?)?;
                if idx == outcome_idx {
                    outcome = value;
                } else {
                    features.insert(name.clone(), value);
                }
            }

            out.push(ReferenceRow {
                id,
                outcome,
                features,
            });
        }

        debug!(rows = out.len(), table = %self.layout.table, "loaded reference table");
        Ok(out)
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_index(columns: &[String], name: &str) -> Result<usize, StoreError> {
    columns
        .iter()
        .position(|c| c == name)
        .ok_or_else(|| StoreError::MissingColumn(name.to_string()))
}

fn read_id(column: &str, value: ValueRef<'_>) -> Result<i64, StoreError> {
    match value {
        ValueRef::Integer(v) => Ok(v),
        ValueRef::Real(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Ok(v as i64),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            text.trim()
                .parse::<i64>()
                .map_err(|_| StoreError::InvalidId(format!("{column} = '{text}'")))
        }
        ValueRef::Null => Err(StoreError::InvalidId(format!("{column} is NULL"))),
        other => Err(StoreError::InvalidId(format!(
            "{column} has type {}",
            other.data_type()
        ))),
    }
}

fn read_cell(column: &str, value: ValueRef<'_>) -> Result<FeatureValue, StoreError> {
    match value {
        ValueRef::Null => Ok(FeatureValue::Missing),
        ValueRef::Integer(v) => Ok(FeatureValue::Number(v as f64)),
        ValueRef::Real(v) => Ok(FeatureValue::Number(v)),
        ValueRef::Text(bytes) => Ok(FeatureValue::Text(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        ValueRef::Blob(_) => Err(StoreError::UnsupportedValue(column.to_string())),
    }
}
