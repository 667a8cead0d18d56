//! Database schema types for protomig.
//!
//! This crate contains the schema model shared by the declaration translator
//! (the *declared* schema), the live-database introspection (the *current*
//! schema) and the reconciler that compares the two.
//!
//! Column types are [`SemanticType`]s rather than raw SQL strings, so that a
//! declared `int32` and an introspected `integer` compare equal.

use indexmap::IndexMap;
use std::fmt;

/// Dialect-independent column types.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SemanticType {
    /// 32-bit integer (INTEGER)
    Int32,
    /// 64-bit integer (BIGINT)
    Int64,
    /// Single precision float (REAL)
    Float,
    /// Double precision float (DOUBLE PRECISION)
    Double,
    /// BOOLEAN
    Bool,
    /// TEXT
    String,
    /// BYTEA (binary)
    Bytes,
    /// TIMESTAMP (without time zone)
    Timestamp,
    /// Auto-incrementing 64-bit surrogate key (BIGSERIAL)
    SerialId,
    /// A live column type with no semantic counterpart, kept verbatim
    /// (upper-cased) so drift against it is still detected.
    Other(String),
}

impl SemanticType {
    /// The type used in column definitions (CREATE TABLE, ADD COLUMN).
    pub fn sql_name(&self) -> &str {
        match self {
            SemanticType::Int32 => "INTEGER",
            SemanticType::Int64 => "BIGINT",
            SemanticType::Float => "REAL",
            SemanticType::Double => "DOUBLE PRECISION",
            SemanticType::Bool => "BOOLEAN",
            SemanticType::String => "TEXT",
            SemanticType::Bytes => "BYTEA",
            SemanticType::Timestamp => "TIMESTAMP",
            SemanticType::SerialId => "BIGSERIAL",
            SemanticType::Other(raw) => raw,
        }
    }

    /// The type used as a cast target (`ALTER COLUMN .. TYPE T USING c::T`).
    ///
    /// Serial pseudo-types are only valid in column definitions, so a serial
    /// column is altered to its underlying integer type.
    pub fn cast_name(&self) -> &str {
        match self {
            SemanticType::SerialId => "BIGINT",
            other => other.sql_name(),
        }
    }

    /// Map a catalog type (`information_schema.columns.data_type`) back to a
    /// semantic type.
    ///
    /// Integer columns whose default draws from a sequence are serial keys.
    pub fn from_catalog(data_type: &str, default: Option<&str>) -> Self {
        let data_type = data_type.trim().to_lowercase();
        let sequence_default = default.is_some_and(|d| d.to_lowercase().contains("nextval("));

        match data_type.as_str() {
            "integer" | "bigint" if sequence_default => SemanticType::SerialId,
            "integer" => SemanticType::Int32,
            "bigint" => SemanticType::Int64,
            "real" => SemanticType::Float,
            "double precision" => SemanticType::Double,
            "boolean" => SemanticType::Bool,
            "text" => SemanticType::String,
            "bytea" => SemanticType::Bytes,
            "timestamp without time zone" | "timestamp" => SemanticType::Timestamp,
            _ => SemanticType::Other(data_type.to_uppercase()),
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_name())
    }
}

/// A database column definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Semantic type
    pub sql_type: SemanticType,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Whether this is the primary key
    pub primary_key: bool,
}

impl Column {
    /// A regular (non-key) column.
    pub fn new(name: impl Into<String>, sql_type: SemanticType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            sql_type,
            nullable,
            primary_key: false,
        }
    }

    /// The synthesized surrogate key every generated table starts with.
    pub fn serial_primary_key(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: SemanticType::SerialId,
            nullable: false,
            primary_key: true,
        }
    }
}

/// A single-column foreign key relationship.
///
/// Equality covers all three fields, so declared and introspected
/// relationships can be compared as sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    /// Column in this table
    pub column: String,
    /// Referenced table
    pub references_table: String,
    /// Referenced column
    pub references_column: String,
}

impl ForeignKey {
    pub fn new(
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
        }
    }
}

impl fmt::Display for ForeignKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {}.{}",
            self.column, self.references_table, self.references_column
        )
    }
}

/// A database table definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Columns, in declaration order
    pub columns: Vec<Column>,
    /// Foreign keys, in declaration order, without duplicates
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Builder-style column append.
    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Builder-style foreign key append.
    pub fn with_foreign_key(mut self, fk: ForeignKey) -> Self {
        self.add_foreign_key(fk);
        self
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check if a column exists.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// The primary key column, if any.
    pub fn primary_key(&self) -> Option<&Column> {
        self.columns.iter().find(|c| c.primary_key)
    }

    /// Add a foreign key unless an identical one is already present.
    ///
    /// Returns `false` if it was a duplicate.
    pub fn add_foreign_key(&mut self, fk: ForeignKey) -> bool {
        if self.foreign_keys.contains(&fk) {
            return false;
        }
        self.foreign_keys.push(fk);
        true
    }
}

/// A complete database schema.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    /// Tables in the schema, indexed by name, in insertion order
    pub tables: IndexMap<String, Table>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Check if a table exists.
    pub fn contains_table(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Iterate over all tables in insertion order.
    pub fn iter_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Insert a table, returning the table it replaced (if any).
    ///
    /// A replaced table keeps its original position.
    pub fn insert(&mut self, table: Table) -> Option<Table> {
        self.tables.insert(table.name.clone(), table)
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if there are no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<Table> for Schema {
    fn from_iter<I: IntoIterator<Item = Table>>(iter: I) -> Self {
        let mut schema = Schema::new();
        for table in iter {
            schema.insert(table);
        }
        schema
    }
}
