//! Declaration translator: parsed messages to the declared [`Schema`].
//!
//! Every message becomes a table named after the source file and the
//! message path. Every table starts with a synthesized `id` key. Repeated
//! fields become child tables:
//!
//! ```text
//! // widget.proto
//! message Root { string name = 1; repeated string tags = 2; }
//!
//! widget      (id BIGSERIAL PK, name TEXT NULL)
//! widget_tags (id BIGSERIAL PK, parent_id BIGINT NOT NULL, value TEXT NOT NULL)
//!             parent_id -> widget.id
//! ```

use camino::Utf8Path;
use protomig_proto::{Message, ProtoFile};
use protomig_schema::{Column, ForeignKey, Schema, SemanticType, Table};
use protomig_sql::bounded_ident;
use std::collections::HashMap;
use thiserror::Error;

/// Name of the synthesized primary key column.
pub const ID_COLUMN: &str = "id";

/// Name of the column linking a child table row to its parent row.
pub const PARENT_ID_COLUMN: &str = "parent_id";

/// Name of the column holding one element of a repeated field.
pub const VALUE_COLUMN: &str = "value";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranslateError {
    #[error("table `{table}` would be generated by both {first} and {second}")]
    TableNameCollision {
        table: String,
        first: String,
        second: String,
    },
}

/// The table base name for a source file: its lower-cased file stem.
pub fn table_base_name(path: &Utf8Path) -> String {
    path.file_stem().unwrap_or(path.as_str()).to_lowercase()
}

/// Map a declared field type to a column type.
///
/// Types without a mapping (message references, enums, ...) are stored as
/// TEXT.
pub fn semantic_type(proto_type: &str) -> SemanticType {
    match proto_type {
        "double" => SemanticType::Double,
        "float" => SemanticType::Float,
        "int32" | "uint32" | "sint32" | "fixed32" | "sfixed32" => SemanticType::Int32,
        "int64" | "uint64" | "sint64" | "fixed64" | "sfixed64" => SemanticType::Int64,
        "bool" => SemanticType::Bool,
        "string" => SemanticType::String,
        "bytes" => SemanticType::Bytes,
        "timestamp" | "google.protobuf.Timestamp" | ".google.protobuf.Timestamp" => {
            SemanticType::Timestamp
        }
        other => {
            tracing::debug!(proto_type = %other, "no column type mapping, using TEXT");
            SemanticType::String
        }
    }
}

/// Table name for a message path.
///
/// A top-level `Root` message maps to the base name itself, and a leading
/// `Root` segment is dropped for messages nested in it. Names longer than
/// PostgreSQL keeps are shortened with [`bounded_ident`].
pub fn message_table_name(base: &str, path: &[String]) -> String {
    let segments = match path {
        [first, rest @ ..] if first.eq_ignore_ascii_case("root") => rest,
        _ => path,
    };

    let mut name = base.to_string();
    for segment in segments {
        name.push('_');
        name.push_str(&segment.to_lowercase());
    }
    bounded_ident(&name)
}

/// Table name for the elements of repeated field `field` of `parent`.
pub fn child_table_name(parent: &str, field: &str) -> String {
    bounded_ident(&format!("{}_{}", parent, field))
}

/// Translate a parsed source into its declared schema.
///
/// Parent tables are inserted before their child tables, so iterating the
/// result never meets a foreign key whose target comes later.
pub fn translate(source_name: &str, file: &ProtoFile) -> Result<Schema, TranslateError> {
    let base = source_name.to_lowercase();
    let mut schema = Schema::new();
    let mut origins: HashMap<String, String> = HashMap::new();

    for message in &file.messages {
        let table_name = message_table_name(&base, &message.path);
        claim(
            &mut origins,
            &table_name,
            format!("message `{}`", message.path.join(".")),
        )?;

        let (table, children) = translate_message(&table_name, message, &mut origins)?;
        schema.insert(table);
        for child in children {
            schema.insert(child);
        }
    }

    Ok(schema)
}

fn translate_message(
    table_name: &str,
    message: &Message,
    origins: &mut HashMap<String, String>,
) -> Result<(Table, Vec<Table>), TranslateError> {
    let mut table = Table::new(table_name).with_column(Column::serial_primary_key(ID_COLUMN));
    let mut children = Vec::new();

    for field in &message.fields {
        if field.is_repeated() {
            let child_name = child_table_name(table_name, &field.name);
            claim(
                origins,
                &child_name,
                format!(
                    "repeated field `{}.{}`",
                    message.path.join("."),
                    field.name
                ),
            )?;
            children.push(child_table(
                &child_name,
                table_name,
                semantic_type(&field.type_name),
            ));
            continue;
        }

        let column_name = bounded_ident(&field.name);
        if table.has_column(&column_name) {
            tracing::warn!(
                table = %table_name,
                column = %column_name,
                line = field.span.line,
                "duplicate column, keeping the first definition"
            );
            continue;
        }

        table.columns.push(Column::new(
            column_name,
            semantic_type(&field.type_name),
            !field.is_required(),
        ));
    }

    Ok((table, children))
}

/// Child table holding the elements of a repeated field.
fn child_table(name: &str, parent: &str, element_type: SemanticType) -> Table {
    Table::new(name)
        .with_column(Column::serial_primary_key(ID_COLUMN))
        .with_column(Column::new(PARENT_ID_COLUMN, SemanticType::Int64, false))
        .with_column(Column::new(VALUE_COLUMN, element_type, false))
        .with_foreign_key(ForeignKey::new(PARENT_ID_COLUMN, parent, ID_COLUMN))
}

fn claim(
    origins: &mut HashMap<String, String>,
    table: &str,
    origin: String,
) -> Result<(), TranslateError> {
    if let Some(first) = origins.get(table) {
        return Err(TranslateError::TableNameCollision {
            table: table.to_string(),
            first: first.clone(),
            second: origin,
        });
    }
    origins.insert(table.to_string(), origin);
    Ok(())
}
