//! Table descriptors for change-history migrations.
//!
//! A [`TableDescriptor`] is a snapshot of one table: the columns an entity
//! wants, quoted for the target dialect, each marked with whether the live
//! database already has it. Descriptors are rebuilt on every migration pass.
//!
//! # Example
//! ```
//! use change_history::schema::{Entity, FieldSpec, TableDescriptor};
//!
//! let entity = Entity::new("Order", "orders", vec![
//!     FieldSpec::new("id", "INT", true),
//!     FieldSpec::new("value", "INT", false),
//! ]);
//!
//! let live = vec!["id".to_string()];
//! let table = TableDescriptor::new(&entity.table, &entity.fields, &live, &|n: &str| format!("`{}`", n));
//!
//! assert!(table.exists);
//! assert_eq!(table.first_missing_column().unwrap().name, "value");
//! ```

use serde::{Deserialize, Serialize};

/// Name of the history column holding `insert`, `update` or `delete`.
pub const COLUMN_ACTION: &str = "change_history_action";
/// Name of the history column holding the per-key revision.
pub const COLUMN_REVISION: &str = "change_history_revision";
/// Name of the history column holding the time of the change.
pub const COLUMN_ACTION_AT: &str = "change_history_action_at";

/// Type tokens that must not be copied onto history columns.
const STRIPPED_TYPE_TOKENS: [&str; 3] = ["AUTO_INCREMENT", "AUTOINCREMENT", "UNIQUE"];

/// One resolved entity field: the column it maps to and its SQL type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub sql_type: String,
    #[serde(default)]
    pub primary_key: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>, primary_key: bool) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            primary_key,
        }
    }
}

impl std::str::FromStr for FieldSpec {
    type Err = crate::error::HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parser::parse_field(s)
    }
}

/// An application entity mapped to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Type name, used to give errors and logs context.
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldSpec>,
}

impl Entity {
    pub fn new(name: impl Into<String>, table: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            fields,
        }
    }

    /// Add a field at the end of the declared field list.
    pub fn field(mut self, name: &str, sql_type: &str) -> Self {
        self.fields.push(FieldSpec::new(name, sql_type, false));
        self
    }

    /// Name of the history table: `<table>_<suffix>`.
    pub fn history_table(&self, suffix: &str) -> String {
        format!("{}_{}", self.table, suffix)
    }

    /// Fields of the history table: the bookkeeping columns followed by
    /// every entity field.
    ///
    /// Delete entries leave `change_author_column` out, so its history column
    /// is always nullable and has no default.
    pub fn history_fields(&self, change_author_column: &str) -> Vec<FieldSpec> {
        let mut fields = bookkeeping_fields();
        fields.extend(self.fields.iter().map(|f| {
            let mut sql_type = history_column_type(&f.sql_type);
            if f.name.eq_ignore_ascii_case(change_author_column) {
                sql_type = nullable_column_type(&sql_type);
            }
            FieldSpec {
                name: f.name.clone(),
                sql_type,
                primary_key: f.primary_key,
            }
        }));
        fields
    }
}

/// The three bookkeeping columns every history table starts with.
pub fn bookkeeping_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new(COLUMN_ACTION, "VARCHAR(8) NOT NULL DEFAULT 'insert'", false),
        FieldSpec::new(COLUMN_REVISION, "INT NOT NULL", true),
        FieldSpec::new(
            COLUMN_ACTION_AT,
            "DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP",
            false,
        ),
    ]
}

/// History rows repeat key values, so identity, uniqueness and inline
/// primary-key markers are dropped.
fn history_column_type(sql_type: &str) -> String {
    let tokens: Vec<&str> = sql_type
        .split_whitespace()
        .filter(|token| {
            !STRIPPED_TYPE_TOKENS
                .iter()
                .any(|stripped| token.eq_ignore_ascii_case(stripped))
        })
        .collect();

    remove_pairs(&tokens, "PRIMARY", |next| next.eq_ignore_ascii_case("KEY")).join(" ")
}

/// Drop `NOT NULL` and `DEFAULT <value>` from a column type.
fn nullable_column_type(sql_type: &str) -> String {
    let tokens: Vec<&str> = sql_type.split_whitespace().collect();
    let tokens = remove_pairs(&tokens, "NOT", |next| next.eq_ignore_ascii_case("NULL"));
    remove_pairs(&tokens, "DEFAULT", |_| true).join(" ")
}

/// Remove every `first` token (case-insensitive) together with the token
/// following it, when `second` accepts that token.
fn remove_pairs<'a>(tokens: &[&'a str], first: &str, second: impl Fn(&str) -> bool) -> Vec<&'a str> {
    let mut kept = Vec::with_capacity(tokens.len());
    let mut i = 0;

    while i < tokens.len() {
        if tokens[i].eq_ignore_ascii_case(first) && tokens.get(i + 1).is_some_and(|t| second(t)) {
            i += 2;
        } else {
            kept.push(tokens[i]);
            i += 1;
        }
    }

    kept
}

/// A column of a table descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub quoted_name: String,
    /// `<quoted name> <SQL type>`, as used in CREATE and ALTER statements.
    pub definition: String,
    pub primary_key: bool,
    /// Whether the live table already has this column.
    pub exists: bool,
}

/// Desired columns of a table, marked against the live schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub table_name: String,
    pub quoted_table_name: String,
    pub columns: Vec<Column>,
    /// Whether the live database has this table at all.
    pub exists: bool,
}

impl TableDescriptor {
    /// Build a descriptor from the desired fields and the live column names.
    ///
    /// An empty `live_columns` means the table does not exist. Column names
    /// are matched case-insensitively.
    pub fn new(
        table_name: &str,
        fields: &[FieldSpec],
        live_columns: &[String],
        quote: &dyn Fn(&str) -> String,
    ) -> Self {
        let columns = fields
            .iter()
            .map(|field| {
                let quoted_name = quote(&field.name);
                Column {
                    definition: format!("{} {}", quoted_name, field.sql_type),
                    quoted_name,
                    name: field.name.clone(),
                    primary_key: field.primary_key,
                    exists: live_columns
                        .iter()
                        .any(|live| live.eq_ignore_ascii_case(&field.name)),
                }
            })
            .collect();

        Self {
            table_name: table_name.to_string(),
            quoted_table_name: quote(table_name),
            columns,
            exists: !live_columns.is_empty(),
        }
    }

    /// Quoted column names in declared order, minus the excluded names.
    pub fn quoted_column_names(&self, excluding: &[&str]) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| !excluding.iter().any(|e| e.eq_ignore_ascii_case(&c.name)))
            .map(|c| c.quoted_name.clone())
            .collect()
    }

    /// Quoted primary-key column names in declared order.
    pub fn quoted_primary_key_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.quoted_name.clone())
            .collect()
    }

    /// `name TYPE` definitions in declared order.
    pub fn column_definitions(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.definition.clone()).collect()
    }

    /// Columns the live table does not have yet, in declared order.
    pub fn missing_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.exists)
    }

    pub fn first_missing_column(&self) -> Option<&Column> {
        self.missing_columns().next()
    }

    pub fn has_primary_key(&self) -> bool {
        self.columns.iter().any(|c| c.primary_key)
    }
}
