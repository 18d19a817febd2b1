//! Error types for change-history migrations.

use thiserror::Error;

/// The main error type for change-history operations.
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A field declaration could not be parsed.
    #[error("Invalid field declaration at position {position}: {message}")]
    FieldSpec { position: usize, message: String },

    /// Probing the live schema failed.
    #[error("Can not read schema of table {table} for {entity}: {message}")]
    Probe {
        entity: String,
        table: String,
        message: String,
    },

    /// A DDL statement failed; nothing after it was executed.
    #[error("Could not migrate change history for {entity}: {message}\n  SQL: {sql}")]
    Statement {
        entity: String,
        sql: String,
        message: String,
    },

    /// Migration of one entity in a batch failed.
    #[error("Can not run migration for entity {entity}: {source}")]
    Migration {
        entity: String,
        #[source]
        source: Box<HistoryError>,
    },

    /// No entity with this name is registered.
    #[error("Unknown entity: '{0}'")]
    UnknownEntity(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query error outside of migrations (history inspection).
    #[error("Query error: {0}")]
    Query(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML decoding error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HistoryError {
    /// Create a field declaration error at the given position.
    pub fn field_spec(position: usize, message: impl Into<String>) -> Self {
        Self::FieldSpec {
            position,
            message: message.into(),
        }
    }

    /// Create a schema probe error.
    pub fn probe(
        entity: impl Into<String>,
        table: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Probe {
            entity: entity.into(),
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a statement execution error carrying the failing SQL.
    pub fn statement(
        entity: impl Into<String>,
        sql: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Statement {
            entity: entity.into(),
            sql: sql.into(),
            message: message.into(),
        }
    }

    /// Wrap an error with the entity whose migration produced it.
    pub fn migration(entity: impl Into<String>, source: HistoryError) -> Self {
        Self::Migration {
            entity: entity.into(),
            source: Box::new(source),
        }
    }

    /// The failing SQL statement, if this error (or the error it wraps) has one.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Self::Statement { sql, .. } => Some(sql),
            Self::Migration { source, .. } => source.sql(),
            _ => None,
        }
    }
}

/// Result type alias for change-history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;
