//! Migration solver - validates a plan before anything touches the database.
//!
//! The solver replays a [`SchemaDiff`] against a virtual copy of the live
//! schema, checking each change's preconditions at its position in the plan:
//!
//! ```text
//! -- This fails:
//! ALTER TABLE "comment" ADD CONSTRAINT ... REFERENCES "post" ("id");  -- "post" doesn't exist!
//! CREATE TABLE "post" (...);
//! ```
//!
//! The simulated end state is available through
//! [`VirtualSchema::into_schema`], which is what a successful migration
//! should leave behind.

use crate::{Change, SchemaDiff};
use protomig_schema::{Schema, Table};

/// Error when migration cannot be executed.
#[derive(Debug, Clone, PartialEq)]
pub enum SolverError {
    /// A change requires a table that doesn't exist.
    TableNotFound { change: String, table: String },
    /// A change requires a table to NOT exist, but it does.
    TableAlreadyExists { change: String, table: String },
    /// A change requires a column that doesn't exist.
    ColumnNotFound {
        change: String,
        table: String,
        column: String,
    },
    /// A change requires a column to NOT exist, but it does.
    ColumnAlreadyExists {
        change: String,
        table: String,
        column: String,
    },
    /// A foreign key references a table that doesn't exist.
    ForeignKeyTargetNotFound {
        change: String,
        source_table: String,
        target_table: String,
    },
    /// A foreign key references a column that isn't its table's primary key.
    ForeignKeyTargetNotKey {
        change: String,
        target_table: String,
        target_column: String,
    },
    /// A change adds a primary key to a table that already has one.
    PrimaryKeyAlreadyExists {
        change: String,
        table: String,
        existing: String,
    },
}

impl std::fmt::Display for SolverError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolverError::TableNotFound { change, table } => {
                write!(f, "{}: table '{}' does not exist", change, table)
            }
            SolverError::TableAlreadyExists { change, table } => {
                write!(f, "{}: table '{}' already exists", change, table)
            }
            SolverError::ColumnNotFound {
                change,
                table,
                column,
            } => {
                write!(f, "{}: column '{}.{}' does not exist", change, table, column)
            }
            SolverError::ColumnAlreadyExists {
                change,
                table,
                column,
            } => {
                write!(f, "{}: column '{}.{}' already exists", change, table, column)
            }
            SolverError::ForeignKeyTargetNotFound {
                change,
                source_table,
                target_table,
            } => {
                write!(
                    f,
                    "{}: foreign key from '{}' references non-existent table '{}'",
                    change, source_table, target_table
                )
            }
            SolverError::ForeignKeyTargetNotKey {
                change,
                target_table,
                target_column,
            } => {
                write!(
                    f,
                    "{}: '{}.{}' is not a primary key",
                    change, target_table, target_column
                )
            }
            SolverError::PrimaryKeyAlreadyExists {
                change,
                table,
                existing,
            } => {
                write!(
                    f,
                    "{}: table '{}' already has primary key '{}'",
                    change, table, existing
                )
            }
        }
    }
}

impl std::error::Error for SolverError {}

/// Virtual schema state for simulating migrations.
#[derive(Debug, Clone, Default)]
pub struct VirtualSchema {
    schema: Schema,
}

impl VirtualSchema {
    /// An empty database.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an introspected schema.
    pub fn from_schema(schema: &Schema) -> Self {
        Self {
            schema: schema.clone(),
        }
    }

    /// Check if a table exists.
    pub fn table_exists(&self, name: &str) -> bool {
        self.schema.contains_table(name)
    }

    /// Check if a column exists in a table.
    pub fn column_exists(&self, table: &str, column: &str) -> bool {
        self.schema
            .get_table(table)
            .is_some_and(|t| t.has_column(column))
    }

    /// Apply a change to the virtual schema, validating preconditions.
    pub fn apply(&mut self, table_context: &str, change: &Change) -> Result<(), SolverError> {
        let change_desc = format!("{}", change);

        match change {
            Change::AddTable(t) => {
                if self.table_exists(&t.name) {
                    return Err(SolverError::TableAlreadyExists {
                        change: change_desc,
                        table: t.name.clone(),
                    });
                }
                // Foreign keys arrive as their own changes.
                self.schema.insert(Table {
                    foreign_keys: Vec::new(),
                    ..t.clone()
                });
            }

            Change::AddColumn(col) => {
                self.require_table(table_context, &change_desc)?;
                if self.column_exists(table_context, &col.name) {
                    return Err(SolverError::ColumnAlreadyExists {
                        change: change_desc,
                        table: table_context.to_string(),
                        column: col.name.clone(),
                    });
                }
                if col.primary_key {
                    self.require_no_primary_key(table_context, &change_desc)?;
                }
                if let Some(table) = self.schema.tables.get_mut(table_context) {
                    table.columns.push(col.clone());
                }
            }

            Change::AlterColumn { name, from, to } => {
                self.require_column(table_context, name, &change_desc)?;
                if to.primary_key && !from.primary_key {
                    self.require_no_primary_key(table_context, &change_desc)?;
                }
                if let Some(column) = self
                    .schema
                    .tables
                    .get_mut(table_context)
                    .and_then(|t| t.columns.iter_mut().find(|c| &c.name == name))
                {
                    column.sql_type = to.sql_type.clone();
                    column.nullable = to.nullable;
                    column.primary_key |= to.primary_key;
                }
            }

            Change::AddForeignKey(fk) => {
                self.require_column(table_context, &fk.column, &change_desc)?;
                if !self.table_exists(&fk.references_table) {
                    return Err(SolverError::ForeignKeyTargetNotFound {
                        change: change_desc,
                        source_table: table_context.to_string(),
                        target_table: fk.references_table.clone(),
                    });
                }
                self.require_column(&fk.references_table, &fk.references_column, &change_desc)?;
                let target_is_key = self
                    .schema
                    .get_table(&fk.references_table)
                    .and_then(|t| t.column(&fk.references_column))
                    .is_some_and(|c| c.primary_key);
                if !target_is_key {
                    return Err(SolverError::ForeignKeyTargetNotKey {
                        change: change_desc,
                        target_table: fk.references_table.clone(),
                        target_column: fk.references_column.clone(),
                    });
                }
                if let Some(table) = self.schema.tables.get_mut(table_context) {
                    table.add_foreign_key(fk.clone());
                }
            }
        }

        Ok(())
    }

    /// Apply every change of a diff, in order.
    pub fn apply_diff(&mut self, diff: &SchemaDiff) -> Result<(), SolverError> {
        for table_diff in &diff.table_diffs {
            for change in &table_diff.changes {
                self.apply(&table_diff.table, change)?;
            }
        }
        Ok(())
    }

    /// The simulated schema.
    pub fn into_schema(self) -> Schema {
        self.schema
    }

    fn require_table(&self, table: &str, change: &str) -> Result<(), SolverError> {
        if self.table_exists(table) {
            Ok(())
        } else {
            Err(SolverError::TableNotFound {
                change: change.to_string(),
                table: table.to_string(),
            })
        }
    }

    fn require_no_primary_key(&self, table: &str, change: &str) -> Result<(), SolverError> {
        match self.schema.get_table(table).and_then(Table::primary_key) {
            Some(existing) => Err(SolverError::PrimaryKeyAlreadyExists {
                change: change.to_string(),
                table: table.to_string(),
                existing: existing.name.clone(),
            }),
            None => Ok(()),
        }
    }

    fn require_column(&self, table: &str, column: &str, change: &str) -> Result<(), SolverError> {
        self.require_table(table, change)?;
        if self.column_exists(table, column) {
            Ok(())
        } else {
            Err(SolverError::ColumnNotFound {
                change: change.to_string(),
                table: table.to_string(),
                column: column.to_string(),
            })
        }
    }
}

/// Validate `diff` against `current`, returning the schema it would produce.
pub fn check_plan(current: &Schema, diff: &SchemaDiff) -> Result<Schema, SolverError> {
    let mut virtual_schema = VirtualSchema::from_schema(current);
    virtual_schema.apply_diff(diff)?;
    Ok(virtual_schema.into_schema())
}
