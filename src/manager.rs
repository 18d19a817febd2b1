//! Change-history migrations.
//!
//! [`ChangeHistoryManager`] keeps, for each registered entity, a history
//! table and the triggers feeding it in line with the entity's fields:
//!
//! - no history table: create it and its triggers
//! - history table missing a column: add the first missing column (in
//!   declared order) and recreate the triggers
//! - otherwise: nothing to do
//!
//! Only one column is added per run, so an entity with N new fields needs N
//! runs to converge. Statements run one by one; the first failure stops the
//! run and leaves earlier statements applied. Running again picks up from
//! whatever the database now looks like.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::HistorySettings;
use crate::ddl;
use crate::dialect::{quote_ansi, Dialect, DialectRegistry};
use crate::engine::{Database, QueryValue, RowMap};
use crate::error::{HistoryError, HistoryResult};
use crate::schema::{
    Entity, TableDescriptor, COLUMN_ACTION, COLUMN_ACTION_AT, COLUMN_REVISION,
};

/// What a migration run did (or would do) for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// The history table was created along with its triggers.
    Created,
    /// One column was added and the triggers were recreated.
    Updated { column: String },
    /// The history table already matched the entity.
    UpToDate,
}

impl std::fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationOutcome::Created => write!(f, "created"),
            MigrationOutcome::Updated { column } => write!(f, "added column {}", column),
            MigrationOutcome::UpToDate => write!(f, "up to date"),
        }
    }
}

/// Statements one migration pass would execute for an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub entity: String,
    pub outcome: MigrationOutcome,
    pub statements: Vec<String>,
}

/// One row of a history table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub action: String,
    pub revision: Option<i64>,
    pub action_at: Option<NaiveDateTime>,
    /// The entity's columns as recorded by the trigger.
    pub values: BTreeMap<String, serde_json::Value>,
}

impl HistoryEntry {
    fn from_row(mut row: RowMap) -> Self {
        let mut take = |column: &str| match row.remove(column) {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let action = take(COLUMN_ACTION).unwrap_or_default();
        let revision = take(COLUMN_REVISION).and_then(|r| r.parse().ok());
        let action_at = take(COLUMN_ACTION_AT).and_then(|t| parse_timestamp(&t));

        Self {
            action,
            revision,
            action_at,
            values: row.into_iter().collect(),
        }
    }
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
}

/// Coordinates change-history migrations for a set of entities.
pub struct ChangeHistoryManager<D: Database> {
    db: D,
    registry: DialectRegistry,
    settings: HistorySettings,
    entities: Vec<Entity>,
}

impl<D: Database> ChangeHistoryManager<D> {
    pub fn new(db: D, registry: DialectRegistry, settings: HistorySettings) -> Self {
        Self {
            db,
            registry,
            settings,
            entities: Vec::new(),
        }
    }

    /// Register entities; [`run_migrations`](Self::run_migrations) handles
    /// them in registration order.
    pub fn add_entities(&mut self, entities: impl IntoIterator<Item = Entity>) {
        self.entities.extend(entities);
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Find a registered entity by name.
    pub fn entity(&self, name: &str) -> HistoryResult<&Entity> {
        self.entities
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| HistoryError::UnknownEntity(name.to_string()))
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    pub fn registry(&self) -> &DialectRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &HistorySettings {
        &self.settings
    }

    /// The registered dialect matching the database, if any.
    pub fn dialect(&self) -> Option<Dialect> {
        self.registry.lookup(self.db.dialect_name())
    }

    fn quote(&self, name: &str) -> String {
        match self.dialect() {
            Some(dialect) => dialect.quote_ident(name),
            None => quote_ansi(name),
        }
    }

    /// Build the original and history descriptors from the live schema.
    pub async fn describe(&self, entity: &Entity) -> HistoryResult<(TableDescriptor, TableDescriptor)> {
        let quote = |name: &str| self.quote(name);
        let history_table = entity.history_table(&self.settings.table_suffix);

        let original_columns = self.probe(entity, &entity.table).await?;
        let history_columns = self.probe(entity, &history_table).await?;

        let original = TableDescriptor::new(&entity.table, &entity.fields, &original_columns, &quote);
        let history = TableDescriptor::new(
            &history_table,
            &entity.history_fields(&self.settings.change_author_column),
            &history_columns,
            &quote,
        );

        if !original.has_primary_key() {
            warn!(
                entity = %entity.name,
                "entity has no primary key, no triggers will be created"
            );
        }

        Ok((original, history))
    }

    async fn probe(&self, entity: &Entity, table: &str) -> HistoryResult<Vec<String>> {
        self.db
            .table_columns(table)
            .await
            .map_err(|e| HistoryError::probe(&entity.name, table, e.to_string()))
    }

    /// Statements dropping and recreating the triggers of an entity. Empty
    /// when the database's dialect is not registered.
    pub fn trigger_statements(&self, original: &TableDescriptor, history: &TableDescriptor) -> Vec<String> {
        let Some(dialect) = self.dialect() else {
            warn!(
                dialect = self.db.dialect_name(),
                "no trigger support for dialect, changes will not be recorded"
            );
            return Vec::new();
        };

        let mut statements = ddl::drop_triggers(original, history);
        statements.extend(dialect.synthesize(
            original,
            history,
            &self.settings.change_author_column,
            &self.settings.updated_at_column,
        ));
        statements
    }

    /// Work out what a migration run would do, without executing anything.
    pub async fn plan(&self, entity: &Entity) -> HistoryResult<MigrationPlan> {
        let (original, history) = self.describe(entity).await?;
        let mut statements = Vec::new();

        let outcome = if !history.exists {
            statements.push(ddl::create_table(&history));
            MigrationOutcome::Created
        } else if let Some(column) = history.first_missing_column() {
            statements.push(ddl::add_column(&history, column));
            MigrationOutcome::Updated {
                column: column.name.clone(),
            }
        } else {
            MigrationOutcome::UpToDate
        };

        if outcome != MigrationOutcome::UpToDate {
            statements.extend(self.trigger_statements(&original, &history));
        }

        Ok(MigrationPlan {
            entity: entity.name.clone(),
            outcome,
            statements,
        })
    }

    /// Bring the history table and triggers of one entity up to date.
    pub async fn run_migration(&self, entity: &Entity) -> HistoryResult<MigrationOutcome> {
        let plan = self.plan(entity).await?;

        match &plan.outcome {
            MigrationOutcome::Created => {
                info!(entity = %entity.name, "creating change history setup")
            }
            MigrationOutcome::Updated { column } => {
                info!(entity = %entity.name, column = %column, "updating change history setup")
            }
            MigrationOutcome::UpToDate => {
                info!(entity = %entity.name, "change history setup was already up to date");
                return Ok(plan.outcome);
            }
        }

        self.execute(entity, &plan.statements).await?;
        info!(entity = %entity.name, "change history setup is now up to date");

        Ok(plan.outcome)
    }

    /// Migrate every registered entity in registration order, stopping at
    /// the first failure.
    pub async fn run_migrations(&self) -> HistoryResult<Vec<(String, MigrationOutcome)>> {
        let mut outcomes = Vec::with_capacity(self.entities.len());

        for entity in &self.entities {
            let outcome = self
                .run_migration(entity)
                .await
                .map_err(|e| HistoryError::migration(&entity.name, e))?;
            outcomes.push((entity.name.clone(), outcome));
        }

        Ok(outcomes)
    }

    async fn execute(&self, entity: &Entity, statements: &[String]) -> HistoryResult<()> {
        for statement in statements {
            debug!(entity = %entity.name, sql = %statement, "executing");

            if let Err(e) = self.db.execute(statement).await {
                error!(entity = %entity.name, sql = %statement, error = %e, "could not migrate change history");
                return Err(HistoryError::statement(&entity.name, statement, e.to_string()));
            }
        }

        Ok(())
    }

    /// History rows of one entity row, ordered by revision. `key` holds one
    /// value per primary-key column, in declared order.
    pub async fn history(&self, entity: &Entity, key: &[QueryValue]) -> HistoryResult<Vec<HistoryEntry>> {
        let (original, history) = self.describe(entity).await?;

        if !history.exists {
            return Ok(Vec::new());
        }

        let primary_keys = original.quoted_primary_key_names();
        if primary_keys.len() != key.len() {
            return Err(HistoryError::Query(format!(
                "{} has {} primary key column(s), got {} key value(s)",
                entity.name,
                primary_keys.len(),
                key.len()
            )));
        }

        // Casts are aliased back to the column names, so filter and order on
        // the qualified columns to keep revisions numeric.
        let columns: Vec<String> = history
            .columns
            .iter()
            .filter(|c| c.exists)
            .map(|c| {
                let cast = self.db.text_cast(&format!("h.{}", c.quoted_name));
                format!("{} AS {}", cast, c.quoted_name)
            })
            .collect();
        let conditions: Vec<String> = primary_keys
            .iter()
            .enumerate()
            .map(|(i, pk)| format!("h.{} = {}", pk, self.db.placeholder(i + 1)))
            .collect();

        let mut sql = format!(
            "SELECT {} FROM {} AS h",
            columns.join(", "),
            history.quoted_table_name
        );
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY h.{}", self.quote(COLUMN_REVISION)));

        let rows = self.db.fetch_all(&sql, key).await?;

        Ok(rows.into_iter().map(HistoryEntry::from_row).collect())
    }
}
