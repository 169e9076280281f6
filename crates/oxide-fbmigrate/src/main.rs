//! oxide-fbmigrate CLI
//!
//! Command-line tool for applying migration plans as logical transactions.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_fbmigrate::prelude::*;

/// Transactional DDL emulation for database migrations.
#[derive(Parser)]
#[command(name = "oxide-fbmigrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Migration plan (JSON array of migrations).
    #[arg(short, long, global = true, default_value = "plan.json")]
    plan: PathBuf,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a migration plan.
    Apply {
        /// Database URL (SQLite path or connection string).
        #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
        database: String,

        /// Options file (JSON); flags below override it.
        #[arg(short, long)]
        options: Option<PathBuf>,

        /// When to flush the physical transaction.
        #[arg(short, long, value_enum)]
        transaction_model: Option<TransactionModel>,

        /// Do not report re-touched tables/columns as conflicts.
        #[arg(long)]
        no_virtual_lock: bool,

        /// Do not record compensating operations.
        #[arg(long)]
        no_undo: bool,

        /// Per-statement timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print the SQL of a migration plan without executing it.
    Sql {
        /// Target dialect.
        #[arg(short, long, value_enum, default_value_t = DialectArg::Firebird)]
        dialect: DialectArg,

        /// Do not shorten long constraint/index names with a hash suffix.
        #[arg(long)]
        no_pack_key_names: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DialectArg {
    Firebird,
    Sqlite,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let plan = load_plan(&cli.plan)?;
    info!(
        path = %cli.plan.display(),
        migrations = plan.len(),
        "Loaded migration plan"
    );

    match cli.command {
        Commands::Apply {
            database,
            options,
            transaction_model,
            no_virtual_lock,
            no_undo,
            timeout,
        } => {
            let mut options = match options {
                Some(path) => ProcessorOptions::from_file(&path)?,
                None => ProcessorOptions::new(),
            };
            if let Some(model) = transaction_model {
                options.transaction_model = model;
            }
            if no_virtual_lock {
                options.virtual_lock = false;
            }
            if no_undo {
                options.undo_enabled = false;
            }
            if let Some(secs) = timeout {
                options.command_timeout = Some(Duration::from_secs(secs));
            }

            let backend = SqliteBackend::connect(&database)?;
            let mut executor = MigrationExecutor::new(backend, SqliteDialect::new(), options);
            let applied = executor.apply_all(&plan)?;
            info!("Applied {} migration(s).", applied);
        }

        Commands::Sql {
            dialect,
            no_pack_key_names,
        } => {
            let sql: Vec<String> = match dialect {
                DialectArg::Firebird => {
                    let options = ProcessorOptions {
                        pack_key_names: !no_pack_key_names,
                        ..ProcessorOptions::default()
                    };
                    let dialect = FirebirdDialect::with_options(&options);
                    plan.iter().flat_map(|m| sql_for(&dialect, m)).collect()
                }
                DialectArg::Sqlite => {
                    let dialect = SqliteDialect::new();
                    plan.iter().flat_map(|m| sql_for(&dialect, m)).collect()
                }
            };
            for statement in sql {
                println!("{statement};");
            }
        }
    }

    Ok(())
}
