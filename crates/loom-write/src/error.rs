use loom_primitives::{ColId, IndexId, TableId};
use loom_value::Tuple;
use thiserror::Error;

/// Errors raised while staging edits into a single index (§6 `UniqueViolation`).
#[derive(Debug, Error)]
pub enum IndexWriterError {
    #[error("unique constraint violation on `{name}`: key {key_str} already present")]
    UniqueViolation {
        name: String,
        key_str: String,
        existing_key: Tuple,
        existing_value: Tuple,
        is_primary_key: bool,
    },
    #[error("index `{0:?}` not found")]
    NotFound(IndexId),
    #[error("unique constraint violation on secondary `{name}`: prefix {prefix_str} already present")]
    SecondaryUniqueViolation {
        name: String,
        prefix_str: String,
        existing_pk: Tuple,
    },
}

/// Errors raised while decomposing a row into its index edits (§6).
#[derive(Debug, Error)]
pub enum TableWriterError {
    #[error(transparent)]
    Index(#[from] IndexWriterError),
    #[error("foreign key `{fk_name}` violated: no row in `{parent_table}` matches child `{child_table}` key {key_str}")]
    ForeignKeyChildViolation {
        fk_name: String,
        child_table: String,
        parent_table: String,
        key_str: String,
    },
    #[error("foreign key `{fk_name}` violated: `{parent_table}` row is still referenced by `{child_table}`")]
    ForeignKeyParentViolation {
        fk_name: String,
        child_table: String,
        parent_table: String,
        key_str: String,
    },
    #[error("column `{column:?}` of table `{table}` is NOT NULL; cannot SET NULL for fk `{fk_name}`")]
    NotNullViolation {
        table: String,
        column: ColId,
        fk_name: String,
    },
    #[error("table `{0:?}` not found")]
    TableNotFound(TableId),
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors raised by `WriteSession` operations (§6).
#[derive(Debug, Error)]
pub enum WriteSessionError {
    #[error(transparent)]
    Table(#[from] TableWriterError),
    #[error("table `{0:?}` not found")]
    TableNotFound(TableId),
    #[error("schema changed for table `{0:?}`; writer must be reloaded")]
    SchemaChanged(TableId),
    #[error("working set ref mismatch: expected `{expected}`, got `{actual}`")]
    WorkingSetRefMismatch { expected: String, actual: String },
    #[error(transparent)]
    AutoIncrement(#[from] AutoIncrementError),
    #[error("operation cancelled")]
    Cancelled,
}

/// Errors raised by `AutoIncrementTracker` operations (§4.4).
#[derive(Debug, Error)]
pub enum AutoIncrementError {
    #[error("table `{0:?}` has no registered auto-increment sequence")]
    NotFound(TableId),
    #[error("auto-increment value must be non-negative, got {0}")]
    Negative(f64),
    #[error("auto-increment column values must be numeric")]
    NotNumeric,
}

/// Crate-level umbrella error, mirroring the teacher's `DBError` layering:
/// narrow per-component enums folded in via `#[from]`.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("IndexWriterError: {0}")]
    Index(#[from] IndexWriterError),
    #[error("TableWriterError: {0}")]
    Table(#[from] TableWriterError),
    #[error("WriteSessionError: {0}")]
    Session(#[from] WriteSessionError),
    #[error("AutoIncrementError: {0}")]
    AutoIncrement(#[from] AutoIncrementError),
    #[error("store I/O error: {0}")]
    StoreIo(String),
    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T, E = WriteError> = std::result::Result<T, E>;
