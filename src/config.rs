//! Configuration loading and validation.
//!
//! ```toml
//! [database]
//! url = "mysql://root@localhost/app"
//!
//! [change_history]
//! change_author_column = "author_email"
//!
//! [[entities]]
//! name = "Order"
//! table = "orders"
//! fields = ["id INT PRIMARY KEY", "value INT", "author_email VARCHAR(255)"]
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HistoryError, HistoryResult};
use crate::parser::parse_field;
use crate::schema::{Entity, FieldSpec};

/// File looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "change-history.toml";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub change_history: HistorySettings,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
}

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    1
}

/// Settings of the change-history migrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySettings {
    /// Column naming the author of a change. Not part of change detection
    /// and not copied on delete.
    #[serde(default)]
    pub change_author_column: String,
    /// History tables are named `<table>_<table_suffix>`.
    #[serde(default = "default_table_suffix")]
    pub table_suffix: String,
    /// Bookkeeping timestamp, not part of change detection.
    #[serde(default = "default_updated_at_column")]
    pub updated_at_column: String,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            change_author_column: String::new(),
            table_suffix: default_table_suffix(),
            updated_at_column: default_updated_at_column(),
        }
    }
}

fn default_table_suffix() -> String {
    "history".to_string()
}

fn default_updated_at_column() -> String {
    "updated_at".to_string()
}

/// An entity as written in the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldDecl>,
}

/// A field, either compact (`"id INT PRIMARY KEY"`) or as a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldDecl {
    Compact(String),
    Full(FieldSpec),
}

impl FieldDecl {
    pub fn resolve(&self) -> HistoryResult<FieldSpec> {
        match self {
            FieldDecl::Compact(decl) => parse_field(decl),
            FieldDecl::Full(spec) => Ok(spec.clone()),
        }
    }
}

impl EntityConfig {
    pub fn to_entity(&self) -> HistoryResult<Entity> {
        let fields = self
            .fields
            .iter()
            .map(FieldDecl::resolve)
            .collect::<HistoryResult<Vec<_>>>()?;

        Ok(Entity::new(&self.name, &self.table, fields))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> HistoryResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> HistoryResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> HistoryResult<()> {
        if self.change_history.change_author_column.trim().is_empty() {
            return Err(HistoryError::Config(
                "change_history.change_author_column is required".to_string(),
            ));
        }

        if self.change_history.table_suffix.trim().is_empty() {
            return Err(HistoryError::Config(
                "change_history.table_suffix must not be empty".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for entity in &self.entities {
            if entity.table.trim().is_empty() {
                return Err(HistoryError::Config(format!(
                    "entity {} has no table",
                    entity.name
                )));
            }
            if entity.fields.is_empty() {
                return Err(HistoryError::Config(format!(
                    "entity {} has no fields",
                    entity.name
                )));
            }
            if !names.insert(entity.name.as_str()) {
                return Err(HistoryError::Config(format!(
                    "entity {} is declared twice",
                    entity.name
                )));
            }
            entity.to_entity()?;
        }

        Ok(())
    }

    /// All configured entities, in declared order.
    pub fn entities(&self) -> HistoryResult<Vec<Entity>> {
        self.entities.iter().map(EntityConfig::to_entity).collect()
    }

    /// `change-history.toml` in the working directory, falling back to
    /// `<config dir>/change-history/config.toml`.
    pub fn default_path() -> PathBuf {
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        if local.exists() {
            return local;
        }

        dirs::config_dir()
            .map(|dir| dir.join("change-history").join("config.toml"))
            .unwrap_or(local)
    }
}
