//! Table-level DDL for history tables.
//!
//! These statements are dialect independent apart from identifier quoting,
//! which the descriptors already carry.

use crate::dialect::trigger_names;
use crate::schema::{Column, TableDescriptor};

/// `CREATE TABLE` for a history table, keyed by its primary-key columns.
pub fn create_table(history: &TableDescriptor) -> String {
    let primary_keys = history.quoted_primary_key_names();
    let mut definitions = history.column_definitions();

    if !primary_keys.is_empty() {
        definitions.push(format!("PRIMARY KEY ({})", primary_keys.join(",")));
    }

    format!(
        "CREATE TABLE {} ({})",
        history.quoted_table_name,
        definitions.join(",")
    )
}

/// `ALTER TABLE ... ADD` for a single column.
pub fn add_column(history: &TableDescriptor, column: &Column) -> String {
    format!(
        "ALTER TABLE {} ADD {}",
        history.quoted_table_name, column.definition
    )
}

/// `DROP TRIGGER IF EXISTS` for each of the four history triggers.
pub fn drop_triggers(original: &TableDescriptor, history: &TableDescriptor) -> Vec<String> {
    trigger_names(original, history)
        .iter()
        .map(|name| format!("DROP TRIGGER IF EXISTS {}", name))
        .collect()
}
