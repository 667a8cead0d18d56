//! Reconcile protobuf-style message declarations with a live Postgres schema.
//!
//! The pipeline for one source file:
//!
//! 1. [`protomig_proto::parse`] the declarations,
//! 2. [`translate`] them into the declared [`Schema`] (repeated fields become
//!    child tables),
//! 3. introspect the live schema ([`Database::introspect`]),
//! 4. [`reconcile`] the two into an additive [`SchemaDiff`],
//! 5. validate the plan with the [`VirtualSchema`] solver, and
//! 6. write a [`Transcript`] and execute the statements in one transaction.
//!
//! [`migrate_source`] runs all of it.

mod db;
mod diff;
mod error;
mod introspect;
mod migrate;
mod solver;
mod traced;
mod transcript;
mod translate;

pub use db::{DEFAULT_SCHEMA, Database, PgDatabase};
pub use diff::{Change, ColumnShape, SchemaDiff, TableDiff, create_table_sql, reconcile};
pub use error::{BoxError, Error, Result};
pub use introspect::introspect_schema;
pub use migrate::{MigrateOptions, Outcome, load_declared, migrate_source};
pub use solver::{SolverError, VirtualSchema, check_plan};
pub use traced::{Connection, ConnectionExt, TracedConn};
pub use transcript::Transcript;
pub use translate::{
    ID_COLUMN, PARENT_ID_COLUMN, TranslateError, VALUE_COLUMN, child_table_name,
    message_table_name, semantic_type, table_base_name, translate,
};

// Re-export the schema model so users don't need a separate dependency.
pub use protomig_schema::{Column, ForeignKey, Schema, SemanticType, Table};
