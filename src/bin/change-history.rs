//! change-history: keep history tables and audit triggers up to date.
//!
//! # Usage
//!
//! ```bash
//! # Migrate every configured entity
//! change-history migrate
//!
//! # Show what would run, without touching the database schema
//! change-history migrate --dry-run
//!
//! # Show the recorded history of one row
//! change-history show --entity Order --key 42
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;

use anyhow::{Context, Result};
use change_history::prelude::*;
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "change-history")]
#[command(version)]
#[command(about = "Change-history tables and audit triggers", long_about = None)]
#[command(after_help = "EXAMPLES:
    change-history migrate --config app.toml
    change-history migrate --entity Order --dry-run
    change-history show --entity Order --key 42 --format json")]
struct Cli {
    /// Configuration file (defaults to ./change-history.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database connection URL, overrides the configuration file
    #[arg(long, global = true, env = "CHANGE_HISTORY_DATABASE_URL")]
    database_url: Option<String>,

    /// Verbose output (log every statement)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update history tables and triggers
    Migrate {
        /// Only migrate this entity
        #[arg(short, long)]
        entity: Option<String>,

        /// Don't execute, just show the statements
        #[arg(short, long)]
        dry_run: bool,
    },
    /// Print the trigger DDL of an entity
    Triggers {
        #[arg(short, long)]
        entity: String,
    },
    /// Show the recorded history of one row
    Show {
        #[arg(short, long)]
        entity: String,

        /// Primary-key value; repeat for composite keys
        #[arg(short, long, required = true)]
        key: Vec<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "change_history=debug"
    } else {
        "change_history=info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .init();
}

async fn run(cli: &Cli) -> Result<()> {
    let path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&path)
        .with_context(|| format!("can not load configuration from {}", path.display()))?;

    let url = cli
        .database_url
        .clone()
        .or_else(|| config.database.url.clone())
        .context("no database URL. Use --database-url, set CHANGE_HISTORY_DATABASE_URL or database.url")?;

    let db = HistoryDb::connect(&url, config.database.max_connections).await?;
    let mut manager = ChangeHistoryManager::new(
        db,
        DialectRegistry::with_builtins(),
        config.change_history.clone(),
    );
    manager.add_entities(config.entities()?);

    match &cli.command {
        Commands::Migrate { entity, dry_run } => migrate(&manager, entity.as_deref(), *dry_run).await,
        Commands::Triggers { entity } => print_triggers(&manager, entity).await,
        Commands::Show { entity, key, format } => show_history(&manager, entity, key, format).await,
    }
}

async fn migrate(
    manager: &ChangeHistoryManager<HistoryDb>,
    only: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    if dry_run {
        println!("{}", "🔍 DRY-RUN MODE - Generated SQL:".yellow().bold());

        for entity in selected(manager, only)? {
            let plan = manager.plan(entity).await?;
            println!();
            println!("{} {} ({})", "Entity:".dimmed(), entity.name.cyan(), plan.outcome);
            for statement in &plan.statements {
                println!("  {}", statement.white());
            }
        }

        println!();
        println!("{}", "No changes made.".yellow());
        return Ok(());
    }

    let outcomes = match only {
        Some(name) => {
            let entity = manager.entity(name)?;
            vec![(entity.name.clone(), manager.run_migration(entity).await?)]
        }
        None => manager.run_migrations().await?,
    };

    for (entity, outcome) in outcomes {
        let mark = match outcome {
            MigrationOutcome::UpToDate => "=".dimmed(),
            _ => "✓".green(),
        };
        println!("{} {} {}", mark, entity.cyan(), outcome);
    }

    Ok(())
}

fn selected<'a>(
    manager: &'a ChangeHistoryManager<HistoryDb>,
    only: Option<&str>,
) -> Result<Vec<&'a Entity>> {
    match only {
        Some(name) => Ok(vec![manager.entity(name)?]),
        None => Ok(manager.entities().iter().collect()),
    }
}

async fn print_triggers(manager: &ChangeHistoryManager<HistoryDb>, name: &str) -> Result<()> {
    let entity = manager.entity(name)?;
    let (original, history) = manager.describe(entity).await?;

    if manager.dialect().is_none() {
        println!(
            "{}",
            format!(
                "⚠ No trigger support for '{}', supported: {}",
                manager.database().dialect_name(),
                manager.registry().names().join(", ")
            )
            .yellow()
        );
        return Ok(());
    }
    if !original.has_primary_key() {
        println!(
            "{}",
            format!("⚠ {} has no primary key, no triggers are created", entity.name).yellow()
        );
        return Ok(());
    }

    for statement in manager.trigger_statements(&original, &history) {
        println!("{};", statement);
    }

    Ok(())
}

async fn show_history(
    manager: &ChangeHistoryManager<HistoryDb>,
    name: &str,
    key: &[String],
    format: &OutputFormat,
) -> Result<()> {
    let entity = manager.entity(name)?;
    let key: Vec<QueryValue> = key.iter().map(|k| QueryValue::parse(k)).collect();
    let entries = manager.history(entity, &key).await?;

    format_output(&entries, format)
}

fn format_output(entries: &[HistoryEntry], format: &OutputFormat) -> Result<()> {
    if entries.is_empty() {
        println!("{}", "(no history)".dimmed());
        return Ok(());
    }

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(entries)?);
        }
        OutputFormat::Table => {
            let value_columns: BTreeSet<&String> =
                entries.iter().flat_map(|e| e.values.keys()).collect();

            let mut header = vec![
                "revision".to_string(),
                "action".to_string(),
                "action_at".to_string(),
            ];
            header.extend(value_columns.iter().map(|c| c.to_string()));

            let rows: Vec<Vec<String>> = entries
                .iter()
                .map(|entry| {
                    let mut row = vec![
                        entry.revision.map(|r| r.to_string()).unwrap_or_default(),
                        entry.action.clone(),
                        entry.action_at.map(|t| t.to_string()).unwrap_or_default(),
                    ];
                    row.extend(value_columns.iter().map(|c| {
                        entry.values.get(*c).map(val_to_string).unwrap_or_default()
                    }));
                    row
                })
                .collect();

            let widths: Vec<usize> = header
                .iter()
                .enumerate()
                .map(|(i, h)| rows.iter().map(|r| r[i].len()).fold(h.len(), usize::max))
                .collect();

            let pad = |cells: &[String]| -> Vec<String> {
                cells
                    .iter()
                    .zip(&widths)
                    .map(|(c, w)| format!("{:width$}", c, width = w))
                    .collect()
            };

            println!("{}", pad(&header).join(" │ ").white().bold());
            let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
            println!("{}", sep.join("─┼─").dimmed());
            for row in &rows {
                println!("{}", pad(row).join(" │ "));
            }

            println!();
            println!("{} revision(s)", entries.len().to_string().cyan());
        }
    }

    Ok(())
}

fn val_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}
