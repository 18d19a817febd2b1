//! Change-history migrations against an in-memory SQLite database.
//!
//! SQLite gets history tables but no triggers, so these tests cover table
//! creation, column additions and history queries.

use change_history::prelude::*;
use pretty_assertions::assert_eq;

const ORDERS: &str = "CREATE TABLE orders (id INTEGER PRIMARY KEY, value INT, \
                      updated_at DATETIME, author_email VARCHAR(255))";

fn settings() -> HistorySettings {
    HistorySettings {
        change_author_column: "author_email".to_string(),
        ..Default::default()
    }
}

fn order() -> HistoryResult<Entity> {
    Ok(Entity::new(
        "Order",
        "orders",
        vec![
            "id INTEGER PRIMARY KEY".parse()?,
            "value INT".parse()?,
            "updated_at DATETIME".parse()?,
            "author_email VARCHAR(255)".parse()?,
        ],
    ))
}

async fn manager() -> HistoryResult<ChangeHistoryManager<HistoryDb>> {
    let db = HistoryDb::connect("sqlite::memory:", 1).await?;
    db.execute(ORDERS).await?;
    Ok(ChangeHistoryManager::new(
        db,
        DialectRegistry::with_builtins(),
        settings(),
    ))
}

#[tokio::test]
async fn test_create_then_up_to_date() -> HistoryResult<()> {
    let manager = manager().await?;
    let entity = order()?;

    assert_eq!(manager.run_migration(&entity).await?, MigrationOutcome::Created);

    let columns = manager.database().table_columns("orders_history").await?;
    assert_eq!(
        columns,
        vec![
            "change_history_action",
            "change_history_revision",
            "change_history_action_at",
            "id",
            "value",
            "updated_at",
            "author_email",
        ]
    );

    assert_eq!(manager.run_migration(&entity).await?, MigrationOutcome::UpToDate);

    Ok(())
}

#[tokio::test]
async fn test_new_fields_need_one_run_each() -> HistoryResult<()> {
    let manager = manager().await?;
    manager.run_migration(&order()?).await?;

    manager
        .database()
        .execute("ALTER TABLE orders ADD notes TEXT")
        .await?;
    manager
        .database()
        .execute("ALTER TABLE orders ADD status VARCHAR(16)")
        .await?;
    let entity = order()?.field("notes", "TEXT").field("status", "VARCHAR(16)");

    assert_eq!(
        manager.run_migration(&entity).await?,
        MigrationOutcome::Updated {
            column: "notes".to_string()
        }
    );
    assert_eq!(
        manager.run_migration(&entity).await?,
        MigrationOutcome::Updated {
            column: "status".to_string()
        }
    );
    assert_eq!(manager.run_migration(&entity).await?, MigrationOutcome::UpToDate);

    let columns = manager.database().table_columns("orders_history").await?;
    assert_eq!(&columns[columns.len() - 2..], &["notes", "status"]);

    Ok(())
}

#[tokio::test]
async fn test_plan_has_no_trigger_bodies() -> HistoryResult<()> {
    let manager = manager().await?;
    let plan = manager.plan(&order()?).await?;

    assert_eq!(plan.outcome, MigrationOutcome::Created);
    assert!(plan.statements[0].starts_with("CREATE TABLE \"orders_history\""));
    assert_eq!(plan.statements.len(), 5);
    assert!(plan.statements[1..]
        .iter()
        .all(|s| s.starts_with("DROP TRIGGER IF EXISTS")));

    // Planning alone leaves the database untouched.
    assert!(manager.database().table_columns("orders_history").await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_history_rows_in_revision_order() -> HistoryResult<()> {
    let manager = manager().await?;
    let entity = order()?;
    manager.run_migration(&entity).await?;

    assert!(manager.history(&entity, &[QueryValue::Int(7)]).await?.is_empty());

    manager
        .database()
        .execute(
            "INSERT INTO orders_history \
             (change_history_action, change_history_revision, change_history_action_at, id, value, author_email) \
             VALUES ('update', 2, '2024-05-01 10:05:00', 7, 20, 'b@example.com'), \
                    ('insert', 1, '2024-05-01 10:00:00', 7, 10, 'a@example.com'), \
                    ('insert', 1, '2024-05-01 10:00:00', 8, 99, 'c@example.com')",
        )
        .await?;

    let entries = manager.history(&entity, &[QueryValue::Int(7)]).await?;
    let revisions: Vec<Option<i64>> = entries.iter().map(|e| e.revision).collect();
    assert_eq!(revisions, vec![Some(1), Some(2)]);
    assert_eq!(entries[0].action, "insert");
    assert_eq!(entries[1].action, "update");
    assert_eq!(
        entries[1].action_at.map(|t| t.to_string()).as_deref(),
        Some("2024-05-01 10:05:00")
    );
    assert_eq!(entries[1].values["value"], serde_json::json!("20"));
    assert_eq!(entries[1].values["updated_at"], serde_json::Value::Null);

    Ok(())
}

#[tokio::test]
async fn test_revisions_sort_numerically() -> HistoryResult<()> {
    let manager = manager().await?;
    let entity = order()?;
    manager.run_migration(&entity).await?;

    let rows: Vec<String> = (1..=11)
        .rev()
        .map(|rev| format!("('update', {rev}, 3, {})", rev * 10))
        .collect();
    manager
        .database()
        .execute(&format!(
            "INSERT INTO orders_history \
             (change_history_action, change_history_revision, id, value) VALUES {}",
            rows.join(", ")
        ))
        .await?;

    let entries = manager.history(&entity, &[QueryValue::Int(3)]).await?;
    let revisions: Vec<i64> = entries.iter().filter_map(|e| e.revision).collect();
    assert_eq!(revisions, (1..=11).collect::<Vec<_>>());
    assert_eq!(entries[10].values["value"], serde_json::json!("110"));
    assert!(entries.iter().all(|e| e.action_at.is_some()));

    Ok(())
}

#[tokio::test]
async fn test_history_key_must_match_primary_key() -> HistoryResult<()> {
    let manager = manager().await?;
    let entity = order()?;
    manager.run_migration(&entity).await?;

    let err = manager
        .history(&entity, &[QueryValue::Int(1), QueryValue::Int(2)])
        .await
        .unwrap_err();
    assert!(matches!(err, HistoryError::Query(_)));

    Ok(())
}

#[tokio::test]
async fn test_required_author_is_nullable_in_history() -> HistoryResult<()> {
    let db = HistoryDb::connect("sqlite::memory:", 1).await?;
    db.execute(
        "CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL, \
         author_email VARCHAR(255) NOT NULL)",
    )
    .await?;
    let manager = ChangeHistoryManager::new(db, DialectRegistry::with_builtins(), settings());
    let entity = Entity::new(
        "Note",
        "notes",
        vec![
            "id INTEGER PRIMARY KEY".parse()?,
            "body TEXT NOT NULL".parse()?,
            "author_email VARCHAR(255) NOT NULL".parse()?,
        ],
    );
    manager.run_migration(&entity).await?;

    // A delete entry carries no author.
    manager
        .database()
        .execute(
            "INSERT INTO notes_history (change_history_action, change_history_revision, id, body) \
             VALUES ('delete', 1, 1, 'gone')",
        )
        .await?;

    let entries = manager.history(&entity, &[QueryValue::Int(1)]).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "delete");
    assert_eq!(entries[0].values["body"], serde_json::json!("gone"));
    assert_eq!(entries[0].values["author_email"], serde_json::Value::Null);

    Ok(())
}

#[tokio::test]
async fn test_failing_statement_reports_sql() -> HistoryResult<()> {
    let manager = manager().await?;
    let broken = Entity::new(
        "Broken",
        "orders",
        vec![
            FieldSpec::new("id", "INTEGER", true),
            FieldSpec::new("value", "INT DEFAULT (", false),
        ],
    );

    let err = manager.run_migration(&broken).await.unwrap_err();
    assert!(matches!(err, HistoryError::Statement { .. }));
    assert!(err.sql().unwrap().starts_with("CREATE TABLE \"orders_history\""));

    Ok(())
}

#[tokio::test]
async fn test_migrate_from_config() -> HistoryResult<()> {
    let config = Config::from_toml(
        r#"
        [database]
        url = "sqlite::memory:"

        [change_history]
        change_author_column = "author_email"
        table_suffix = "audit"

        [[entities]]
        name = "Order"
        table = "orders"
        fields = ["id INTEGER PRIMARY KEY", "value INT", "author_email VARCHAR(255)"]
        "#,
    )?;

    let url = config.database.url.clone().unwrap_or_default();
    let db = HistoryDb::connect(&url, config.database.max_connections).await?;
    db.execute(ORDERS).await?;

    let mut manager = ChangeHistoryManager::new(
        db,
        DialectRegistry::with_builtins(),
        config.change_history.clone(),
    );
    manager.add_entities(config.entities()?);

    let outcomes = manager.run_migrations().await?;
    assert_eq!(outcomes, vec![("Order".to_string(), MigrationOutcome::Created)]);
    assert_eq!(manager.database().table_columns("orders_audit").await?.len(), 6);

    Ok(())
}
