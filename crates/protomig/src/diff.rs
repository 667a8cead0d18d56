//! Schema reconciliation: compare the declared schema against the live one.
//!
//! [`reconcile`] produces a [`SchemaDiff`]: per declared table, the ordered
//! list of changes that brings the live schema in line with the declaration.
//! Changes are strictly additive. Nothing is ever dropped: columns and tables
//! that exist only in the database are left alone.
//!
//! For each table, in declaration order:
//!
//! 1. a missing table is created, then its foreign keys are added;
//! 2. otherwise missing columns are added (declaration order),
//! 3. columns whose type or nullability drifted are altered, and
//! 4. missing foreign keys are added.
//!
//! ```sql
//! ALTER TABLE "widget" ADD COLUMN "age" INTEGER NULL;
//! ALTER TABLE "widget" ALTER COLUMN "size" TYPE BIGINT USING "size"::BIGINT, ALTER COLUMN "size" SET NOT NULL;
//! ```

use protomig_schema::{Column, ForeignKey, Schema, SemanticType, Table};
use protomig_sql::{foreign_key_name, quote_ident};
use std::collections::HashSet;
use std::fmt;

/// A diff between two schemas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    /// Changes organized by table, in declaration order.
    pub table_diffs: Vec<TableDiff>,
}

impl SchemaDiff {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.table_diffs.is_empty()
    }

    /// Count total number of changes.
    pub fn change_count(&self) -> usize {
        self.table_diffs.iter().map(|t| t.changes.len()).sum()
    }

    /// The SQL statements for this diff, in execution order.
    pub fn statements(&self) -> Vec<String> {
        self.table_diffs
            .iter()
            .flat_map(|td| td.changes.iter().map(|c| c.to_sql(&td.table)))
            .collect()
    }
}

/// Changes for a single table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDiff {
    /// Table name.
    pub table: String,
    /// List of changes.
    pub changes: Vec<Change>,
}

/// The parts of a column that can drift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnShape {
    pub sql_type: SemanticType,
    pub nullable: bool,
    pub primary_key: bool,
}

impl ColumnShape {
    pub fn of(column: &Column) -> Self {
        Self {
            sql_type: column.sql_type.clone(),
            nullable: column.nullable,
            primary_key: column.primary_key,
        }
    }

    /// Whether a live column of shape `self` satisfies the `declared` one.
    ///
    /// Types match when their cast targets do, so a declared serial key is
    /// satisfied by any BIGINT column. A live primary key that isn't declared
    /// is left alone.
    fn satisfies(&self, declared: &ColumnShape) -> bool {
        self.type_matches(declared)
            && self.nullable == declared.nullable
            && !self.gains_primary_key(declared)
    }

    fn gains_primary_key(&self, declared: &ColumnShape) -> bool {
        declared.primary_key && !self.primary_key
    }

    fn type_matches(&self, declared: &ColumnShape) -> bool {
        self.sql_type == declared.sql_type
            || self.sql_type.cast_name() == declared.sql_type.cast_name()
    }
}

impl fmt::Display for ColumnShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.sql_type, null_keyword(self.nullable))?;
        if self.primary_key {
            write!(f, " PRIMARY KEY")?;
        }
        Ok(())
    }
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Create a new table (foreign keys follow as separate changes).
    AddTable(Table),
    /// Add a new column.
    AddColumn(Column),
    /// Change a column's type and/or nullability.
    AlterColumn {
        name: String,
        from: ColumnShape,
        to: ColumnShape,
    },
    /// Add a foreign key constraint.
    AddForeignKey(ForeignKey),
}

impl Change {
    /// Generate the SQL statement for this change.
    ///
    /// The `table_name` is required for column-level changes.
    pub fn to_sql(&self, table_name: &str) -> String {
        match self {
            Change::AddTable(t) => create_table_sql(t),
            Change::AddColumn(col) => format!(
                "ALTER TABLE {} ADD COLUMN {} {} {}{};",
                quote_ident(table_name),
                quote_ident(&col.name),
                col.sql_type.sql_name(),
                null_keyword(col.nullable),
                primary_key_keyword(col.primary_key)
            ),
            Change::AlterColumn { name, from, to } => {
                let column = quote_ident(name);
                let mut clauses = Vec::new();
                if !from.type_matches(to) {
                    let target = to.sql_type.cast_name();
                    clauses.push(format!(
                        "ALTER COLUMN {column} TYPE {target} USING {column}::{target}"
                    ));
                }
                if from.nullable != to.nullable {
                    let action = if to.nullable { "DROP" } else { "SET" };
                    clauses.push(format!("ALTER COLUMN {column} {action} NOT NULL"));
                }
                if from.gains_primary_key(to) {
                    clauses.push(format!("ADD PRIMARY KEY ({column})"));
                }
                format!("ALTER TABLE {} {};", quote_ident(table_name), clauses.join(", "))
            }
            Change::AddForeignKey(fk) => format!(
                "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({});",
                quote_ident(table_name),
                quote_ident(&foreign_key_name(
                    table_name,
                    &fk.column,
                    &fk.references_table,
                    &fk.references_column
                )),
                quote_ident(&fk.column),
                quote_ident(&fk.references_table),
                quote_ident(&fk.references_column)
            ),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::AddTable(t) => write!(f, "+ table {}", t.name),
            Change::AddColumn(col) => {
                let nullable = if col.nullable { " (nullable)" } else { "" };
                write!(f, "+ {}: {}{}", col.name, col.sql_type, nullable)
            }
            Change::AlterColumn { name, from, to } => write!(f, "~ {}: {} -> {}", name, from, to),
            Change::AddForeignKey(fk) => write!(
                f,
                "+ FOREIGN KEY ({}) -> {}.{}",
                fk.column, fk.references_table, fk.references_column
            ),
        }
    }
}

fn null_keyword(nullable: bool) -> &'static str {
    if nullable { "NULL" } else { "NOT NULL" }
}

fn primary_key_keyword(primary_key: bool) -> &'static str {
    if primary_key { " PRIMARY KEY" } else { "" }
}

/// `CREATE TABLE` with every column, without foreign keys.
pub fn create_table_sql(table: &Table) -> String {
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|col| {
            format!(
                "    {} {} {}{}",
                quote_ident(&col.name),
                col.sql_type.sql_name(),
                null_keyword(col.nullable),
                primary_key_keyword(col.primary_key)
            )
        })
        .collect();

    format!(
        "CREATE TABLE {} (\n{}\n);",
        quote_ident(&table.name),
        columns.join(",\n")
    )
}

/// Compute the changes that bring `current` in line with `declared`.
///
/// Pure and deterministic: the same inputs always give the same diff.
pub fn reconcile(declared: &Schema, current: &Schema) -> SchemaDiff {
    let mut table_diffs = Vec::new();

    for table in declared.iter_tables() {
        let changes = match current.get_table(&table.name) {
            None => {
                let mut changes = vec![Change::AddTable(table.clone())];
                changes.extend(table.foreign_keys.iter().cloned().map(Change::AddForeignKey));
                changes
            }
            Some(existing) => diff_table(table, existing),
        };

        if !changes.is_empty() {
            table_diffs.push(TableDiff {
                table: table.name.clone(),
                changes,
            });
        }
    }

    SchemaDiff { table_diffs }
}

/// Diff a declared table against its live counterpart.
fn diff_table(declared: &Table, current: &Table) -> Vec<Change> {
    let mut changes = diff_columns(&declared.columns, current);
    changes.extend(diff_foreign_keys(
        &declared.foreign_keys,
        &current.foreign_keys,
    ));
    changes
}

fn diff_columns(declared: &[Column], current: &Table) -> Vec<Change> {
    let mut changes = Vec::new();

    // Columns to add
    for col in declared {
        if !current.has_column(&col.name) {
            changes.push(Change::AddColumn(col.clone()));
        }
    }

    // Columns in both - check for drift
    for col in declared {
        if let Some(existing) = current.column(&col.name) {
            let from = ColumnShape::of(existing);
            let to = ColumnShape::of(col);
            if !from.satisfies(&to) {
                changes.push(Change::AlterColumn {
                    name: col.name.clone(),
                    from,
                    to,
                });
            }
        }
    }

    changes
}

fn diff_foreign_keys(declared: &[ForeignKey], current: &[ForeignKey]) -> Vec<Change> {
    let existing: HashSet<&ForeignKey> = current.iter().collect();
    declared
        .iter()
        .filter(|fk| !existing.contains(fk))
        .cloned()
        .map(Change::AddForeignKey)
        .collect()
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            writeln!(f, "No changes detected.")?;
        } else {
            writeln!(f, "Changes detected:\n")?;
            for table_diff in &self.table_diffs {
                writeln!(f, "  {}:", table_diff.table)?;
                for change in &table_diff.changes {
                    writeln!(f, "    {}", change)?;
                }
            }
        }
        Ok(())
    }
}
