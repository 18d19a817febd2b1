//! # change-history
//!
//! > **Every insert, update and delete, kept.**
//!
//! For each entity, change-history maintains a `<table>_history` table and
//! the triggers that copy every change of the original table into it, one
//! row per change, numbered per primary key.
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use change_history::prelude::*;
//!
//! let db = HistoryDb::connect("mysql://root@localhost/app", 1).await?;
//! let settings = HistorySettings {
//!     change_author_column: "author_email".into(),
//!     ..Default::default()
//! };
//!
//! let mut manager = ChangeHistoryManager::new(db, DialectRegistry::with_builtins(), settings);
//! manager.add_entities([Entity::new("Order", "orders", vec![
//!     "id INT PRIMARY KEY".parse()?,
//!     "value INT".parse()?,
//!     "updated_at DATETIME".parse()?,
//!     "author_email VARCHAR(255)".parse()?,
//! ])]);
//!
//! manager.run_migrations().await?;
//! ```
//!
//! ## History columns
//!
//! | Column                     | Meaning                                  |
//! |----------------------------|------------------------------------------|
//! | `change_history_action`    | `insert`, `update` or `delete`           |
//! | `change_history_revision`  | 1, 2, 3, ... per primary key             |
//! | `change_history_action_at` | Time of the change                       |
//! | *entity columns*           | Row values after (or, on delete, before) |

pub mod config;
pub mod ddl;
pub mod dialect;
pub mod engine;
pub mod error;
pub mod manager;
pub mod parser;
pub mod schema;

pub mod prelude {
    pub use crate::config::{Config, HistorySettings};
    pub use crate::dialect::{Dialect, DialectRegistry};
    pub use crate::engine::{Database, HistoryDb, QueryValue};
    pub use crate::error::*;
    pub use crate::manager::{ChangeHistoryManager, HistoryEntry, MigrationOutcome, MigrationPlan};
    pub use crate::schema::{Entity, FieldSpec, TableDescriptor};
}

/// Parse a field declaration such as `"id INT PRIMARY KEY"`.
///
/// # Example
///
/// ```
/// use change_history::parse_field;
///
/// let field = parse_field("id INT UNSIGNED PRIMARY KEY").unwrap();
/// assert_eq!(field.sql_type, "INT UNSIGNED");
/// assert!(field.primary_key);
/// ```
pub fn parse_field(input: &str) -> Result<schema::FieldSpec, error::HistoryError> {
    parser::parse_field(input)
}
