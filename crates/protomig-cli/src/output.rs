//! Human-readable terminal output.

use camino::Utf8Path;
use owo_colors::OwoColorize;
use protomig::{Change, Outcome, Schema, SchemaDiff};

pub fn print_outcome(path: &Utf8Path, outcome: &Outcome) {
    match outcome {
        Outcome::UpToDate => println!("{} {}: up to date", "=".dimmed(), path),
        Outcome::Planned(diff) => print_diff(path, diff),
        Outcome::Applied {
            transcript,
            statements,
        } => {
            println!(
                "{} {}: applied {} statement(s)",
                "✓".green(),
                path,
                statements.len()
            );
            if let Some(transcript) = transcript {
                println!("  transcript: {}", transcript.dimmed());
            }
        }
    }
}

pub fn print_diff(path: &Utf8Path, diff: &SchemaDiff) {
    println!(
        "{} {}: {} change(s)",
        "~".yellow(),
        path.bold(),
        diff.change_count()
    );
    for table_diff in &diff.table_diffs {
        println!("  {}:", table_diff.table.bold());
        for change in &table_diff.changes {
            let line = change.to_string();
            match change {
                Change::AlterColumn { .. } => println!("    {}", line.yellow()),
                _ => println!("    {}", line.green()),
            }
        }
    }
}

/// Print the declared model of one source file.
pub fn print_schema(path: &Utf8Path, schema: &Schema) {
    println!("{} ({} tables):", path.bold(), schema.len());
    println!();
    for table in schema.iter_tables() {
        println!("  {} ({} columns)", table.name.bold(), table.columns.len());
        for col in &table.columns {
            let mut attrs = Vec::new();
            if col.primary_key {
                attrs.push("PK");
            }
            if !col.nullable {
                attrs.push("NOT NULL");
            }

            let attrs_str = if attrs.is_empty() {
                String::new()
            } else {
                format!(" [{}]", attrs.join(", "))
            };

            println!("    {}: {}{}", col.name, col.sql_type.sql_name(), attrs_str);
        }

        for fk in &table.foreign_keys {
            println!("    FK: {}", fk);
        }
        println!();
    }
}
