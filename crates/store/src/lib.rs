use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tabinfer_model::{FeatureRow, FeatureValue};

pub mod sqlite;

pub use sqlite::{initialize, SqliteReferenceStore};

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Initialization script not found: {0}")]
    ScriptNotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Column '{0}' not found in reference table")]
    MissingColumn(String),
    #[error("Invalid identifier in row: {0}")]
    InvalidId(String),
    #[error("Unsupported value in column '{0}'")]
    UnsupportedValue(String),
    #[error("Invalid table layout: {0}")]
    InvalidLayout(String),
}

/// One record of the reference table, split into its parts
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRow {
    pub id: i64,
    pub outcome: FeatureValue,
    /// Every column except the identifier and outcome, in table order
    pub features: FeatureRow,
}

/// Names of the reference table and its special columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    pub table: String,
    pub id_column: String,
    pub outcome_column: String,
}

impl Default for TableLayout {
    fn default() -> Self {
        Self {
            table: "model".to_string(),
            id_column: "id".to_string(),
            outcome_column: "Outcome".to_string(),
        }
    }
}

impl TableLayout {
    pub fn validate(&self) -> Result<(), StoreError> {
        for (label, value) in [
            ("table", &self.table),
            ("id column", &self.id_column),
            ("outcome column", &self.outcome_column),
        ] {
            if value.trim().is_empty() {
                return Err(StoreError::InvalidLayout(format!("{label} must not be empty")));
            }
        }
        if self.id_column == self.outcome_column {
            return Err(StoreError::InvalidLayout(
                "id and outcome columns must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read access to the reference table
pub trait ReferenceStore: Send + Sync {
    /// Full scan of the reference table
    fn load_all(&self) -> Result<Vec<ReferenceRow>, StoreError>;
}

/// Locate the row with the given identifier
pub fn find_row(rows: &[ReferenceRow], id: i64) -> Option<&ReferenceRow> {
    rows.iter().find(|row| row.id == id)
}

/// In-memory reference table
#[derive(Clone, Default)]
pub struct MemoryReferenceStore {
    rows: Arc<RwLock<Vec<ReferenceRow>>>,
}

impl MemoryReferenceStore {
    pub fn new(rows: Vec<ReferenceRow>) -> Self {
        Self {
            rows: Arc::new(RwLock::new(rows)),
        }
    }

    pub fn insert(&self, row: ReferenceRow) {
        self.rows.write().push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

impl ReferenceStore for MemoryReferenceStore {
    fn load_all(&self) -> Result<Vec<ReferenceRow>, StoreError> {
        Ok(self.rows.read().clone())
    }
}
