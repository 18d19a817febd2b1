//! SQL dialects and trigger synthesis.
//!
//! Each supported database engine is a variant of [`Dialect`]. A dialect
//! knows how to quote identifiers and how to synthesize the four triggers
//! that feed a history table. Which dialects are available at runtime is
//! decided by the [`DialectRegistry`] handed to the manager.

mod mysql;
mod sqlite;

use crate::schema::TableDescriptor;

/// A database engine the change history can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Mysql,
    Sqlite,
}

impl Dialect {
    /// Name the dialect is registered under.
    pub fn name(&self) -> &'static str {
        match self {
            Dialect::Mysql => "mysql",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Quote an identifier, doubling embedded quote characters.
    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{}`", name.replace('`', "``")),
            Dialect::Sqlite => quote_ansi(name),
        }
    }

    /// DDL creating the triggers that record inserts, updates and deletes
    /// of `original` into `history`.
    ///
    /// `change_author_column` is excluded from change detection and is not
    /// copied on delete. `updated_at_column` is excluded from change
    /// detection only. Tables without a primary key get no triggers.
    pub fn synthesize(
        &self,
        original: &TableDescriptor,
        history: &TableDescriptor,
        change_author_column: &str,
        updated_at_column: &str,
    ) -> Vec<String> {
        match self {
            Dialect::Mysql => {
                mysql::build_triggers(original, history, change_author_column, updated_at_column)
            }
            Dialect::Sqlite => {
                sqlite::build_triggers(original, history, change_author_column, updated_at_column)
            }
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Standard SQL identifier quoting, used when no dialect is registered.
pub fn quote_ansi(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Names of the triggers maintained for a pair of tables.
pub fn trigger_names(original: &TableDescriptor, history: &TableDescriptor) -> [String; 4] {
    [
        format!("{}_ai", original.table_name),
        format!("{}_au", original.table_name),
        format!("{}_bd", original.table_name),
        format!("{}_revai", history.table_name),
    ]
}

/// Registry of dialects available to the manager.
///
/// Built explicitly at startup and passed to the manager, so the set of
/// dialects with trigger support is visible at construction.
///
/// ```
/// use change_history::dialect::{Dialect, DialectRegistry};
///
/// let registry = DialectRegistry::with_builtins();
/// assert_eq!(registry.lookup("mysql"), Some(Dialect::Mysql));
/// assert_eq!(registry.lookup("postgres"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DialectRegistry {
    dialects: Vec<Dialect>,
}

impl DialectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with MySQL and SQLite registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Dialect::Mysql);
        registry.register(Dialect::Sqlite);
        registry
    }

    pub fn register(&mut self, dialect: Dialect) {
        if !self.dialects.contains(&dialect) {
            self.dialects.push(dialect);
        }
    }

    /// Find a registered dialect by name. `sqlite3` is accepted as an alias.
    pub fn lookup(&self, name: &str) -> Option<Dialect> {
        let name = match name.to_ascii_lowercase().as_str() {
            "sqlite3" => "sqlite".to_string(),
            "mariadb" => "mysql".to_string(),
            other => other.to_string(),
        };

        self.dialects.iter().copied().find(|d| d.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.dialects.iter().map(|d| d.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(Dialect::Mysql.quote_ident("order"), "`order`");
        assert_eq!(Dialect::Mysql.quote_ident("we`ird"), "`we``ird`");
        assert_eq!(Dialect::Sqlite.quote_ident("order"), "\"order\"");
        assert_eq!(quote_ansi("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_registry_lookup() {
        let registry = DialectRegistry::with_builtins();
        assert_eq!(registry.lookup("MySQL"), Some(Dialect::Mysql));
        assert_eq!(registry.lookup("mariadb"), Some(Dialect::Mysql));
        assert_eq!(registry.lookup("sqlite3"), Some(Dialect::Sqlite));
        assert_eq!(registry.lookup("postgres"), None);
        assert_eq!(registry.names(), vec!["mysql", "sqlite"]);
    }

    #[test]
    fn test_empty_registry() {
        let registry = DialectRegistry::new();
        assert_eq!(registry.lookup("mysql"), None);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut registry = DialectRegistry::new();
        registry.register(Dialect::Sqlite);
        registry.register(Dialect::Sqlite);
        assert_eq!(registry.names(), vec!["sqlite"]);
    }
}
