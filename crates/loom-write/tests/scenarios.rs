//! End-to-end scenarios exercising the write path the way a SQL engine
//! would drive it: build a schema, stage rows through a `TableWriter` or a
//! `WriteSession`, and check the materialized result.

use std::collections::HashMap;
use std::sync::Arc;

use loom_primitives::{BranchId, ColId, ColList, IndexId, TableId};
use loom_value::{FieldKind, Tuple, Value};
use loom_write::{
    AutoIncrementTracker, CancellationToken, ColumnDef, FkAction, ForeignKey, IndexColumn, IndexDefinition, IndexWriterError, NoBranches,
    NoopMetrics, Root, Schema, TableWriter, TableWriterError, WorkingSet, WriteSession, WriteSessionConfig, WriteSessionError,
    PRIMARY_INDEX_ID,
};

fn scenario_a_schema() -> Arc<Schema> {
    Arc::new(Schema {
        table_id: TableId(1),
        table_name: "t".into(),
        keyless: false,
        columns: vec![
            ColumnDef {
                name: "id".into(),
                col_id: ColId(0),
                kind: FieldKind::I64,
                nullable: false,
                auto_increment: false,
            },
            ColumnDef {
                name: "v".into(),
                col_id: ColId(1),
                kind: FieldKind::Str { prefix_len: None },
                nullable: true,
                auto_increment: false,
            },
        ],
        pk_cols: ColList::new([ColId(0)]),
        indexes: vec![],
        auto_increment_col: None,
    })
}

#[test]
fn scenario_a_pk_uniqueness() {
    let schema = scenario_a_schema();
    let mut writer = TableWriter::empty(schema.clone());

    writer.insert_row(&Tuple::new(vec![Value::Int(1), Value::Str("a".into())])).unwrap();
    writer.insert_row(&Tuple::new(vec![Value::Int(2), Value::Str("b".into())])).unwrap();

    let err = writer.insert_row(&Tuple::new(vec![Value::Int(1), Value::Str("c".into())])).unwrap_err();
    match err {
        TableWriterError::Index(IndexWriterError::UniqueViolation {
            is_primary_key,
            key_str,
            existing_value,
            ..
        }) => {
            assert!(is_primary_key);
            assert_eq!(key_str, "[1]");
            assert_eq!(existing_value.get_field(0), &Value::Str("a".into()));
        }
        other => panic!("expected a primary-key UniqueViolation, got {other:?}"),
    }

    writer.commit();
    let table = writer.materialize();
    assert_eq!(table.primary.len(), 2);
    let row1 = table.primary.get(&Tuple::new(vec![Value::Int(1)])).unwrap();
    assert_eq!(row1.get_field(0), &Value::Str("a".into()));
    let row2 = table.primary.get(&Tuple::new(vec![Value::Int(2)])).unwrap();
    assert_eq!(row2.get_field(0), &Value::Str("b".into()));
}

fn scenario_b_schema() -> Arc<Schema> {
    Arc::new(Schema {
        table_id: TableId(2),
        table_name: "t".into(),
        keyless: false,
        columns: vec![
            ColumnDef {
                name: "id".into(),
                col_id: ColId(0),
                kind: FieldKind::I64,
                nullable: false,
                auto_increment: false,
            },
            ColumnDef {
                name: "email".into(),
                col_id: ColId(1),
                kind: FieldKind::Str { prefix_len: None },
                nullable: true,
                auto_increment: false,
            },
        ],
        pk_cols: ColList::new([ColId(0)]),
        indexes: vec![IndexDefinition {
            index_id: IndexId(1),
            name: "email_unique".into(),
            cols: vec![IndexColumn {
                col_id: ColId(1),
                prefix_len: None,
            }],
            unique: true,
        }],
        auto_increment_col: None,
    })
}

#[test]
fn scenario_b_unique_secondary_with_null() {
    let schema = scenario_b_schema();
    let mut writer = TableWriter::empty(schema);

    writer.insert_row(&Tuple::new(vec![Value::Int(1), Value::Null])).unwrap();
    writer.insert_row(&Tuple::new(vec![Value::Int(2), Value::Null])).unwrap();
    writer.insert_row(&Tuple::new(vec![Value::Int(3), Value::Str("x@y".into())])).unwrap();

    let err = writer.insert_row(&Tuple::new(vec![Value::Int(4), Value::Str("x@y".into())])).unwrap_err();
    match err {
        TableWriterError::Index(IndexWriterError::UniqueViolation {
            is_primary_key, key_str, ..
        }) => {
            assert!(!is_primary_key);
            assert_eq!(key_str, "[x@y]");
        }
        other => panic!("expected a secondary UniqueViolation, got {other:?}"),
    }
}

fn scenario_c_schema() -> Arc<Schema> {
    Arc::new(Schema {
        table_id: TableId(3),
        table_name: "t".into(),
        keyless: true,
        columns: vec![ColumnDef {
            name: "a".into(),
            col_id: ColId(0),
            kind: FieldKind::I64,
            nullable: false,
            auto_increment: false,
        }],
        pk_cols: ColList::new([ColId(0)]), // unused for a keyless schema
        indexes: vec![],
        auto_increment_col: None,
    })
}

#[test]
fn scenario_c_keyless_cardinality() {
    let schema = scenario_c_schema();
    let mut writer = TableWriter::empty(schema);

    let row = Tuple::new(vec![Value::Int(7)]);
    writer.insert_row(&row).unwrap();
    writer.insert_row(&row).unwrap();
    writer.insert_row(&row).unwrap();

    let table = writer.materialize();
    assert_eq!(table.primary.len(), 1, "one logical entry regardless of multiplicity");

    writer.delete_row(&row);
    let table = writer.materialize();
    assert_eq!(table.primary.len(), 1, "cardinality 2 still keeps the row present");

    writer.delete_row(&row);
    writer.delete_row(&row);
    let table = writer.materialize();
    assert_eq!(table.primary.len(), 0, "cardinality 0 removes the row entirely");
}

fn scenario_f_schema() -> Arc<Schema> {
    Arc::new(Schema {
        table_id: TableId(4),
        table_name: "t".into(),
        keyless: false,
        columns: vec![
            ColumnDef {
                name: "id".into(),
                col_id: ColId(0),
                kind: FieldKind::I64,
                nullable: false,
                auto_increment: false,
            },
            ColumnDef {
                name: "s".into(),
                col_id: ColId(1),
                kind: FieldKind::Str { prefix_len: None },
                nullable: false,
                auto_increment: false,
            },
        ],
        pk_cols: ColList::new([ColId(0)]),
        indexes: vec![IndexDefinition {
            index_id: IndexId(1),
            name: "k".into(),
            cols: vec![IndexColumn {
                col_id: ColId(1),
                prefix_len: Some(4),
            }],
            unique: true,
        }],
        auto_increment_col: None,
    })
}

#[test]
fn scenario_f_unique_prefix_key() {
    let schema = scenario_f_schema();
    let mut writer = TableWriter::empty(schema);

    writer.insert_row(&Tuple::new(vec![Value::Int(1), Value::Str("abcdef".into())])).unwrap();

    let err = writer
        .insert_row(&Tuple::new(vec![Value::Int(2), Value::Str("abcd123".into())]))
        .unwrap_err();
    match err {
        TableWriterError::Index(IndexWriterError::UniqueViolation { key_str, .. }) => {
            assert_eq!(key_str, "[abcd]");
        }
        other => panic!("expected a prefix UniqueViolation, got {other:?}"),
    }
}

fn fk_schemas() -> (TableId, Arc<Schema>) {
    let t = TableId(5);
    let schema = Arc::new(Schema {
        table_id: t,
        table_name: "nodes".into(),
        keyless: false,
        columns: vec![
            ColumnDef {
                name: "id".into(),
                col_id: ColId(0),
                kind: FieldKind::I64,
                nullable: false,
                auto_increment: false,
            },
            ColumnDef {
                name: "parent".into(),
                col_id: ColId(1),
                kind: FieldKind::I64,
                nullable: true,
                auto_increment: false,
            },
        ],
        pk_cols: ColList::new([ColId(0)]),
        indexes: vec![],
        auto_increment_col: None,
    });
    (t, schema)
}

#[test]
fn scenario_e_fk_cascade_delete_on_self_reference() {
    let (t, schema) = fk_schemas();
    let mut schemas = HashMap::new();
    schemas.insert(t, schema);

    let fk = ForeignKey {
        name: "parent_fk".into(),
        child_table: t,
        child_cols: ColList::new([ColId(1)]),
        parent_table: t,
        parent_index: PRIMARY_INDEX_ID,
        on_delete: FkAction::Cascade,
        on_update: FkAction::Restrict,
    };
    let mut root = Root::empty();
    root.foreign_keys = vec![fk];
    let ws = WorkingSet::new(BranchId("main".into()), root, Root::empty());

    let mut session = WriteSession::new(
        ws,
        false,
        schemas,
        Arc::new(AutoIncrementTracker::new(Arc::new(NoBranches), Arc::new(NoopMetrics))),
        Arc::new(|_| {}),
        WriteSessionConfig::default(),
        Arc::new(NoopMetrics),
    );
    let cancel = CancellationToken::new();

    session.insert_row(t, Tuple::new(vec![Value::Int(1), Value::Null])).unwrap();
    session.insert_row(t, Tuple::new(vec![Value::Int(2), Value::Int(1)])).unwrap();
    session.insert_row(t, Tuple::new(vec![Value::Int(3), Value::Int(2)])).unwrap();
    session.insert_row(t, Tuple::new(vec![Value::Int(4), Value::Int(3)])).unwrap();

    session.delete_row(t, Tuple::new(vec![Value::Int(1), Value::Null]), &cancel).unwrap();

    let ws = session.flush(&cancel).unwrap();
    let table = ws.working_root.get_table(t).unwrap();
    assert_eq!(table.primary.len(), 0, "the whole self-referential chain cascades away");
}

#[test]
fn scenario_d_auto_increment_end_to_end_through_a_session() {
    struct FixedBranches;
    impl loom_write::BranchEnumerator for FixedBranches {
        fn ai_values_for_table(&self, _table: TableId) -> Vec<u64> {
            vec![10, 15]
        }
    }

    let t = TableId(6);
    let schema = Arc::new(Schema {
        table_id: t,
        table_name: "t".into(),
        keyless: false,
        columns: vec![ColumnDef {
            name: "id".into(),
            col_id: ColId(0),
            kind: FieldKind::I64,
            nullable: true,
            auto_increment: true,
        }],
        pk_cols: ColList::new([ColId(0)]),
        indexes: vec![],
        auto_increment_col: Some(ColId(0)),
    });
    let mut schemas = HashMap::new();
    schemas.insert(t, schema);

    let tracker = Arc::new(AutoIncrementTracker::new(Arc::new(FixedBranches), Arc::new(NoopMetrics)));
    assert_eq!(tracker.current(t), 15);

    let ws = WorkingSet::new(BranchId("main".into()), Root::empty(), Root::empty());
    let mut session = WriteSession::new(
        ws,
        false,
        schemas,
        tracker.clone(),
        Arc::new(|_| {}),
        WriteSessionConfig::default(),
        Arc::new(NoopMetrics),
    );

    session.insert_row(t, Tuple::new(vec![Value::Null])).unwrap();
    assert_eq!(tracker.current(t), 16);
}

#[test]
fn restrict_blocks_delete_through_a_session_error() {
    let (t, schema) = fk_schemas();
    let mut schemas = HashMap::new();
    schemas.insert(t, schema);

    let fk = ForeignKey {
        name: "parent_fk".into(),
        child_table: t,
        child_cols: ColList::new([ColId(1)]),
        parent_table: t,
        parent_index: PRIMARY_INDEX_ID,
        on_delete: FkAction::Restrict,
        on_update: FkAction::Restrict,
    };
    let mut root = Root::empty();
    root.foreign_keys = vec![fk];
    let ws = WorkingSet::new(BranchId("main".into()), root, Root::empty());

    let mut session = WriteSession::new(
        ws,
        false,
        schemas,
        Arc::new(AutoIncrementTracker::new(Arc::new(NoBranches), Arc::new(NoopMetrics))),
        Arc::new(|_| {}),
        WriteSessionConfig::default(),
        Arc::new(NoopMetrics),
    );
    let cancel = CancellationToken::new();

    session.insert_row(t, Tuple::new(vec![Value::Int(1), Value::Null])).unwrap();
    session.insert_row(t, Tuple::new(vec![Value::Int(2), Value::Int(1)])).unwrap();

    let err = session.delete_row(t, Tuple::new(vec![Value::Int(1), Value::Null]), &cancel).unwrap_err();
    assert!(matches!(err, WriteSessionError::Table(TableWriterError::ForeignKeyParentViolation { .. })));
}
