//! Live schema reader.
//!
//! Reads tables, columns, primary keys and foreign keys of one Postgres
//! schema into a [`Schema`]: the first three from `information_schema`,
//! foreign keys from `pg_constraint`.
//!
//! Catalog columns are cast to `text` in the queries: they are declared with
//! `information_schema` domain types, which don't decode as strings.

use crate::{Connection, ConnectionExt};
use protomig_schema::{Column, ForeignKey, Schema, SemanticType, Table};
use std::collections::HashSet;

const TABLES_SQL: &str = "\
SELECT table_name::text
FROM information_schema.tables
WHERE table_schema::text = $1 AND table_type = 'BASE TABLE'
ORDER BY table_name";

const COLUMNS_SQL: &str = "\
SELECT table_name::text, column_name::text, data_type::text, is_nullable::text, column_default::text
FROM information_schema.columns
WHERE table_schema::text = $1
ORDER BY table_name, ordinal_position";

const PRIMARY_KEYS_SQL: &str = "\
SELECT kcu.table_name::text, kcu.column_name::text
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON tc.constraint_name = kcu.constraint_name
 AND tc.table_schema = kcu.table_schema
 AND tc.table_name = kcu.table_name
WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema::text = $1";

// Read from `pg_constraint`: constraint names are only unique per table, so
// joining `information_schema` views on the name can pair up columns of
// unrelated constraints.
const FOREIGN_KEYS_SQL: &str = "\
SELECT cl.relname::text, att.attname::text, fcl.relname::text, fatt.attname::text
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class cl ON cl.oid = con.conrelid
JOIN pg_catalog.pg_namespace ns ON ns.oid = cl.relnamespace
JOIN pg_catalog.pg_class fcl ON fcl.oid = con.confrelid
CROSS JOIN LATERAL unnest(con.conkey, con.confkey) WITH ORDINALITY AS k(attnum, fattnum, ord)
JOIN pg_catalog.pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = k.attnum
JOIN pg_catalog.pg_attribute fatt ON fatt.attrelid = con.confrelid AND fatt.attnum = k.fattnum
WHERE con.contype = 'f' AND ns.nspname::text = $1
ORDER BY cl.relname, con.conname, k.ord";

/// Introspect the live structure of `schema_name`.
///
/// Tables come back ordered by name, columns by ordinal position. Composite
/// foreign keys are reported column by column.
pub async fn introspect_schema<C: Connection>(
    conn: &C,
    schema_name: &str,
) -> Result<Schema, tokio_postgres::Error> {
    let conn = conn.traced();
    let mut schema = Schema::new();

    for row in conn.query(TABLES_SQL, &[&schema_name]).await? {
        let name: String = row.try_get(0)?;
        schema.insert(Table::new(name));
    }

    let mut primary_keys: HashSet<(String, String)> = HashSet::new();
    for row in conn.query(PRIMARY_KEYS_SQL, &[&schema_name]).await? {
        primary_keys.insert((row.try_get(0)?, row.try_get(1)?));
    }

    for row in conn.query(COLUMNS_SQL, &[&schema_name]).await? {
        let table_name: String = row.try_get(0)?;
        let column_name: String = row.try_get(1)?;
        let data_type: String = row.try_get(2)?;
        let is_nullable: String = row.try_get(3)?;
        let default: Option<String> = row.try_get(4)?;

        // Views and other relations show up in `columns` too.
        let Some(table) = schema.tables.get_mut(&table_name) else {
            continue;
        };

        let primary_key = primary_keys.contains(&(table_name.clone(), column_name.clone()));
        table.columns.push(Column {
            name: column_name,
            sql_type: SemanticType::from_catalog(&data_type, default.as_deref()),
            nullable: is_nullable == "YES",
            primary_key,
        });
    }

    for row in conn.query(FOREIGN_KEYS_SQL, &[&schema_name]).await? {
        let table_name: String = row.try_get(0)?;
        let fk = ForeignKey {
            column: row.try_get(1)?,
            references_table: row.try_get(2)?,
            references_column: row.try_get(3)?,
        };
        if let Some(table) = schema.tables.get_mut(&table_name) {
            table.add_foreign_key(fk);
        }
    }

    tracing::debug!(
        schema = %schema_name,
        tables = schema.len(),
        "introspected live schema"
    );

    Ok(schema)
}
