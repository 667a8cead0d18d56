//! Property tests for reconciliation.
//!
//! Declared schemas are generated as declaration sources and run through the
//! real parser and translator. The live schema is derived from the declared
//! one by dropping tables, columns and foreign keys, retyping columns,
//! flipping nullability and adding unrelated objects.

use proptest::prelude::*;
use protomig::{Column, Schema, SemanticType, Table, check_plan, reconcile, translate};
use protomig_sql::PG_IDENT_MAX;
use std::collections::{BTreeMap, HashSet};

const FIELD_TYPES: &[&str] = &[
    "int32",
    "uint64",
    "double",
    "float",
    "bool",
    "string",
    "bytes",
    "google.protobuf.Timestamp",
    "Unmapped",
];

const MODIFIERS: &[&str] = &["", "optional ", "required ", "repeated "];

fn arb_semantic_type() -> impl Strategy<Value = SemanticType> {
    prop_oneof![
        Just(SemanticType::Int32),
        Just(SemanticType::Int64),
        Just(SemanticType::Float),
        Just(SemanticType::Double),
        Just(SemanticType::Bool),
        Just(SemanticType::String),
        Just(SemanticType::Bytes),
        Just(SemanticType::Timestamp),
        Just(SemanticType::SerialId),
        "[a-z]{3,8}( varying)?".prop_map(|s| SemanticType::Other(s.to_uppercase())),
    ]
}

/// A declaration source: 1-4 uniquely named messages with up to 6 fields.
fn arb_source() -> impl Strategy<Value = String> {
    let field = ("[a-z]{1,6}", 0..FIELD_TYPES.len(), 0..MODIFIERS.len());
    let message = prop::collection::vec(field, 0..6);
    prop::collection::btree_map("[A-Z][a-z]{2,6}", message, 1..4).prop_map(render_source)
}

fn render_source(messages: BTreeMap<String, Vec<(String, usize, usize)>>) -> String {
    let mut out = String::from("syntax = \"proto3\";\n\n");
    for (name, fields) in messages {
        out.push_str(&format!("message {name} {{\n"));
        for (i, (field, ty, modifier)) in fields.iter().enumerate() {
            out.push_str(&format!(
                "  {}{} {} = {};\n",
                MODIFIERS[*modifier],
                FIELD_TYPES[*ty],
                field,
                i + 1
            ));
        }
        out.push_str("}\n");
    }
    out
}

/// Declared schemas that translate cleanly (no table name collisions).
fn arb_declared() -> impl Strategy<Value = Schema> {
    arb_source().prop_filter_map("table names collide", |source| {
        translate("gen", &protomig_proto::parse(&source)).ok()
    })
}

/// How to derive the live schema from the declared one.
#[derive(Debug, Clone)]
struct Drift {
    /// One decision byte per (table, column) slot, cycled.
    decisions: Vec<u8>,
    retypes: Vec<SemanticType>,
    extra_table: bool,
}

fn arb_drift() -> impl Strategy<Value = Drift> {
    (
        prop::collection::vec(any::<u8>(), 1..64),
        prop::collection::vec(arb_semantic_type(), 1..8),
        any::<bool>(),
    )
        .prop_map(|(decisions, retypes, extra_table)| Drift {
            decisions,
            retypes,
            extra_table,
        })
}

fn apply_drift(declared: &Schema, drift: &Drift) -> Schema {
    let mut next = drift.decisions.iter().copied().cycle();
    let mut retypes = drift.retypes.iter().cloned().cycle();
    let mut current = Schema::new();

    for table in declared.iter_tables() {
        let decision = next.next().unwrap_or_default();
        if decision % 4 == 0 {
            continue; // table missing entirely
        }

        let mut live = Table::new(&table.name);
        for column in &table.columns {
            let decision = next.next().unwrap_or_default();
            match decision % 6 {
                0 => continue, // column missing
                1 => live.columns.push(Column {
                    nullable: !column.nullable,
                    ..column.clone()
                }),
                2 => live.columns.push(Column {
                    sql_type: retypes.next().unwrap_or(SemanticType::String),
                    ..column.clone()
                }),
                _ => live.columns.push(column.clone()),
            }
        }
        if decision % 2 == 0 {
            live.foreign_keys = table.foreign_keys.clone();
        }
        if decision % 3 == 0 {
            live.columns
                .push(Column::new("legacy_only", SemanticType::Bool, true));
        }
        current.insert(live);
    }

    if drift.extra_table {
        current.insert(
            Table::new("unrelated")
                .with_column(Column::serial_primary_key("id"))
                .with_column(Column::new(
                    "note",
                    SemanticType::Other("CHARACTER VARYING".to_string()),
                    true,
                )),
        );
    }

    current
}

fn arb_pair() -> impl Strategy<Value = (Schema, Schema)> {
    (arb_declared(), arb_drift()).prop_map(|(declared, drift)| {
        let current = apply_drift(&declared, &drift);
        (declared, current)
    })
}

proptest! {
    #[test]
    fn reconcile_never_drops((declared, current) in arb_pair()) {
        for statement in reconcile(&declared, &current).statements() {
            let upper = statement.to_uppercase();
            prop_assert!(!upper.contains("DROP TABLE"), "{}", statement);
            prop_assert!(!upper.contains("DROP COLUMN"), "{}", statement);
            prop_assert!(!upper.contains("DROP CONSTRAINT"), "{}", statement);
        }
    }

    #[test]
    fn reconcile_is_deterministic((declared, current) in arb_pair()) {
        let first = reconcile(&declared, &current).statements();
        let second = reconcile(&declared.clone(), &current.clone()).statements();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn applied_plan_reconciles_to_nothing((declared, current) in arb_pair()) {
        let diff = reconcile(&declared, &current);
        let after = check_plan(&current, &diff).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let again = reconcile(&declared, &after);
        prop_assert!(again.is_empty(), "second pass was not empty:\n{}", again);
    }

    #[test]
    fn declared_schema_is_up_to_date_with_itself(declared in arb_declared()) {
        prop_assert!(reconcile(&declared, &declared).is_empty());
    }

    #[test]
    fn constraint_names_are_unique_and_short(declared in arb_declared()) {
        let mut names = HashSet::new();
        for statement in reconcile(&declared, &Schema::new()).statements() {
            let Some(rest) = statement.split("ADD CONSTRAINT \"").nth(1) else {
                continue;
            };
            let name = rest.split('"').next().unwrap_or_default().to_string();
            prop_assert!(name.len() <= PG_IDENT_MAX, "{}", name);
            prop_assert!(names.insert(name.clone()), "duplicate constraint name {}", name);
        }
    }
}
