//! Write-path core of a versioned, branchable relational store: projecting
//! rows into index edits, enforcing uniqueness/FK/auto-increment invariants,
//! and folding staged edits into a new database root on flush.
//!
//! Layered the way the teacher layers `locking_tx_datastore`: narrow
//! single-index writers (`index_writer`) compose into one writer per table
//! (`table_writer`), which `write_session` mediates across to enforce
//! invariants that span more than one table.

pub mod auto_increment;
pub mod cancellation;
pub mod error;
pub mod index_writer;
pub mod metrics;
pub mod schema;
pub mod table_writer;
pub mod write_session;

pub use auto_increment::{AutoIncrementTracker, BranchEnumerator, NoBranches};
pub use cancellation::CancellationToken;
pub use error::{AutoIncrementError, IndexWriterError, Result, TableWriterError, WriteError, WriteSessionError};
pub use index_writer::{IndexWriter, KeylessContext};
pub use metrics::{Metrics, NoopMetrics, PrometheusMetrics};
pub use schema::{ColumnDef, FkAction, ForeignKey, IndexColumn, IndexDefinition, Root, Schema, Table, WorkingSet};
pub use table_writer::{TableWriter, PRIMARY_INDEX_ID};
pub use write_session::{RootSetter, WriteSession, WriteSessionConfig};
