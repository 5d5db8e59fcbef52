//! Show command implementation

use colored::Colorize;
use schema_engine::Engine;
use schema_model::{ColumnSnapshot, SchemaSnapshot};

use super::handling_name;
use crate::context::Context;
use crate::error::{CliError, Result};

/// Run the show command
pub fn run_show(context: &Context, connection: &str, table: Option<&str>, json: bool) -> Result<()> {
    let target = table.map(split_table).transpose()?;
    let engine = context.engine()?;

    match target {
        Some((schema, table)) => {
            let columns = engine.read_columns(connection, schema, table)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&columns)?);
            } else {
                print_columns(schema, table, &columns);
            }
        }
        None => {
            let snapshot = read_snapshot(&engine, connection)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_snapshot(connection, &snapshot);
            }
        }
    }
    Ok(())
}

fn read_snapshot(engine: &Engine, connection: &str) -> Result<SchemaSnapshot> {
    Ok(engine.read_schemas(connection)?)
}

/// Split `schema.table` at the first dot.
fn split_table(value: &str) -> Result<(&str, &str)> {
    match value.split_once('.') {
        Some((schema, table)) if !schema.is_empty() && !table.is_empty() => Ok((schema, table)),
        _ => Err(CliError::user(format!(
            "Invalid table '{value}': expected SCHEMA.TABLE"
        ))),
    }
}

fn marker(enabled: bool) -> colored::ColoredString {
    if enabled { "+".green() } else { "-".red() }
}

fn print_snapshot(connection: &str, snapshot: &SchemaSnapshot) {
    println!("{} {}", "Connection".bold(), connection.cyan());
    if let Some(handling) = snapshot.schema_change_handling {
        println!("{}: {}", "Schema change handling".dimmed(), handling_name(handling));
    }
    println!();

    if snapshot.is_empty() {
        println!("  {} (try {})", "No schemas".dimmed(), "schemactl reload".cyan());
        return;
    }
    for (name, schema) in &snapshot.schemas {
        println!("  {} {}", marker(schema.enabled), name.bold());
        for (table_name, table) in &schema.tables {
            println!("      {} {}", marker(table.enabled), table_name);
        }
    }
}

fn print_columns(schema: &str, table: &str, columns: &ColumnSnapshot) {
    println!("{} {}.{}", "Table".bold(), schema.cyan(), table.cyan());
    println!();
    if columns.columns.is_empty() {
        println!("  {}", "No columns".dimmed());
        return;
    }
    for (name, column) in &columns.columns {
        let mut flags = Vec::new();
        if column.is_primary_key {
            flags.push("primary key");
        }
        if column.hashed {
            flags.push("hashed");
        }
        if flags.is_empty() {
            println!("  {} {}", marker(column.enabled), name);
        } else {
            println!("  {} {} ({})", marker(column.enabled), name, flags.join(", ").dimmed());
        }
    }
}
