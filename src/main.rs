use std::path::{Path, PathBuf};
use std::process;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;

use auramatic_lib::config::Settings;
use auramatic_lib::db::{self, schema};
use auramatic_lib::ipc::server;
use auramatic_lib::stats::DrinkStats;
use auramatic_lib::{
    AppError, ImportOutcome, RecipeError, RecipeService, RequestChannel, SelectOutcome, Store,
    StoreError,
};

/// Exit status for requests rejected by validation.
const VALIDATION_EXIT_CODE: i32 = 2;

#[derive(Debug, Parser)]
#[command(
    name = "auramatic",
    about = "Recipe parameter service for the Aura Matic coffee machine",
    version
)]
struct Cli {
    /// Recipe database to open (overrides AURAMATIC_DB).
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Also write logs to a daily rolling file in this directory.
    #[arg(long, global = true, value_name = "DIR")]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Answer JSON-lines requests on stdin until EOF (the default).
    Serve,
    /// List the default recipes.
    Recipes {
        #[arg(long)]
        json: bool,
    },
    /// Show the constrained tasks of a recipe.
    Tasks {
        recipe: i64,
        #[arg(long)]
        json: bool,
    },
    /// Set the operative quantity of a task.
    #[command(allow_negative_numbers = true)]
    SetQuantity { recipe: i64, task: i64, quantity: i64 },
    /// Replace the allowed range of a task, e.g. "2,4,6".
    SetRange {
        recipe: i64,
        task: i64,
        range: String,
    },
    /// Switch to another database file.
    Import {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Drink counts per recipe and user.
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Database file maintenance.
    #[command(subcommand)]
    Db(DbCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Create an empty database with the recipe tables.
    Init { path: PathBuf },
    /// Verify that a file carries every table and column the service reads.
    Check {
        path: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    let settings = Settings::resolve(cli.db.clone(), cli.log_dir.clone());
    let log_guard = auramatic_lib::init_logging(&settings.log_filter, settings.log_dir.as_deref());
    tracing::debug!(target: "auramatic", event = "boot", git = auramatic_lib::GIT_HASH);

    let code = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start async runtime")
    {
        Ok(runtime) => {
            let command = cli.command.unwrap_or(Commands::Serve);
            match runtime.block_on(run(command, settings)) {
                Ok(code) => code,
                Err(err) => {
                    eprintln!("{}", format_cli_error(&AppError::from(err)));
                    1
                }
            }
        }
        Err(err) => {
            eprintln!("{}", format_cli_error(&AppError::from(err)));
            1
        }
    };

    drop(log_guard);
    process::exit(code);
}

async fn run(command: Commands, settings: Settings) -> Result<i32> {
    match command {
        Commands::Serve => serve(settings).await,
        Commands::Recipes { json } => {
            let service = open_service(&settings, true).await?;
            match service.list_recipes().await {
                Ok(recipes) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&recipes)?);
                    } else {
                        for recipe in recipes {
                            println!("{}\t{}", recipe.id, recipe.name);
                        }
                    }
                    Ok(0)
                }
                Err(err) => Ok(report_rejection(err)),
            }
        }
        Commands::Tasks { recipe, json } => {
            let service = open_service(&settings, true).await?;
            match service.select_recipe(recipe).await {
                Ok(SelectOutcome::Loaded { tasks, .. }) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&tasks)?);
                    } else {
                        for task in tasks {
                            println!(
                                "{}\t{}\t{} {}\t[{}]",
                                task.task_id, task.name, task.quantity, task.unit, task.range
                            );
                        }
                    }
                    Ok(0)
                }
                Ok(SelectOutcome::Superseded { .. }) => bail!("selection was superseded"),
                Err(err) => Ok(report_rejection(err)),
            }
        }
        Commands::SetQuantity {
            recipe,
            task,
            quantity,
        } => {
            let service = open_service(&settings, true).await?;
            if let Err(err) = service.select_recipe(recipe).await {
                return Ok(report_rejection(err));
            }
            match service.update_quantity(recipe, task, quantity).await {
                Ok(_) => {
                    println!("quantity of task {task} in recipe {recipe} set to {quantity}");
                    Ok(0)
                }
                Err(err) => Ok(report_rejection(err)),
            }
        }
        Commands::SetRange {
            recipe,
            task,
            range,
        } => {
            let service = open_service(&settings, true).await?;
            // Loads the cached quantity the advisory is computed from.
            if let Err(err) = service.select_recipe(recipe).await {
                return Ok(report_rejection(err));
            }
            match service.update_range(recipe, task, &range).await {
                Ok(outcome) => {
                    println!("range of task {task} in recipe {recipe} saved");
                    if let Some(advisory) = outcome.advisory {
                        eprintln!("Note: {advisory}");
                    }
                    Ok(0)
                }
                Err(err) => Ok(report_rejection(err)),
            }
        }
        Commands::Import { path, json } => {
            let service = open_service(&settings, false).await?;
            match service.import_database(&path).await {
                Ok(ImportOutcome::Imported(report)) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&report)?);
                    } else {
                        println!(
                            "imported {} ({} recipes, {} drink events, {} quantity events)",
                            report.path,
                            report.recipes.len(),
                            report.drink_events,
                            report.quantity_events
                        );
                    }
                    Ok(0)
                }
                Ok(ImportOutcome::Ignored) => bail!("another import is already running"),
                Err(err) => Ok(report_rejection(err)),
            }
        }
        Commands::Stats { json } => {
            let service = open_service(&settings, true).await?;
            match service.drink_stats().await {
                Ok(stats) => {
                    if json {
                        println!("{}", serde_json::to_string_pretty(&stats)?);
                    } else {
                        print_stats_table(&stats);
                    }
                    Ok(0)
                }
                Err(err) => Ok(report_rejection(err)),
            }
        }
        Commands::Db(DbCommand::Init { path }) => init_database(&path).await,
        Commands::Db(DbCommand::Check { path, json }) => check_database(&path, json).await,
    }
}

async fn serve(settings: Settings) -> Result<i32> {
    let service = open_service(&settings, false).await?;
    let events = service.subscribe();
    if service.store().is_open() {
        if let Err(err) = service.announce_recipes().await {
            tracing::error!(target: "auramatic", event = "startup_recipes_failed", error = %err);
        }
    }

    let (channel, dispatcher) = RequestChannel::spawn(service, settings.channel_capacity);
    tracing::info!(target: "auramatic", event = "serve_started");

    tokio::select! {
        result = server::serve(channel, events, tokio::io::stdin(), tokio::io::stdout()) => {
            result.context("serve requests over stdio")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(target: "auramatic", event = "serve_interrupted");
        }
    }

    dispatcher.abort();
    let _ = dispatcher.await;
    tracing::info!(target: "auramatic", event = "serve_stopped");
    Ok(0)
}

/// Build a service over the configured database.
///
/// With `require` unset a missing file is not an error; the service starts
/// without a database and waits for an import.
async fn open_service(settings: &Settings, require: bool) -> Result<RecipeService> {
    let store = Store::new();
    match settings.db_path.as_deref() {
        Some(path) if path.exists() => {
            store
                .open_database(path)
                .await
                .with_context(|| format!("open recipe database {}", path.display()))?;
        }
        Some(path) if require => {
            bail!(
                "no database at {}; pass --db or set AURAMATIC_DB",
                path.display()
            );
        }
        None if require => bail!("no database configured; pass --db or set AURAMATIC_DB"),
        other => {
            tracing::warn!(
                target: "auramatic",
                event = "db_missing",
                path = ?other
            );
        }
    }
    Ok(RecipeService::new(store))
}

async fn init_database(path: &Path) -> Result<i32> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create database parent directory {}", parent.display()))?;
    }
    let pool = db::open_sqlite_pool(path, true)
        .await
        .with_context(|| format!("open sqlite database at {}", path.display()))?;
    let created = schema::create_schema(&pool).await;
    pool.close().await;
    created.context("create recipe tables")?;
    println!("initialized {}", path.display());
    Ok(0)
}

async fn check_database(path: &Path, json: bool) -> Result<i32> {
    let (missing, error) = match Store::stage(path).await {
        Ok(staged) => {
            staged.close().await;
            (Vec::new(), None)
        }
        Err(StoreError::Schema { missing, .. }) => (missing, None),
        Err(err) => (Vec::new(), Some(err.to_string())),
    };
    let ok = missing.is_empty() && error.is_none();

    if json {
        let value = json!({
            "path": path.display().to_string(),
            "ok": ok,
            "missing": missing,
            "error": error,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if ok {
        println!("{}: ok", path.display());
    } else if let Some(error) = error {
        println!("{}: {error}", path.display());
    } else {
        println!("{}: missing {}", path.display(), missing.join(", "));
    }

    Ok(if ok { 0 } else { 1 })
}

fn print_stats_table(stats: &DrinkStats) {
    println!("{} drinks", stats.total_events);
    for (label, total) in stats.labels.iter().zip(&stats.totals) {
        println!("{label}\t{total}");
    }
    for user in &stats.users {
        let counts = stats.per_user.get(user).map(Vec::as_slice).unwrap_or(&[]);
        let cells: Vec<String> = counts.iter().map(u64::to_string).collect();
        println!("{user}\t{}", cells.join("\t"));
    }
}

fn report_rejection(err: RecipeError) -> i32 {
    let code = if err.is_validation() {
        VALIDATION_EXIT_CODE
    } else {
        1
    };
    eprintln!("{}", format_cli_error(&AppError::from(err)));
    code
}

fn format_cli_error(err: &AppError) -> String {
    let mut out = format!("Error: {} ({})", err.message(), err.code());
    let mut context: Vec<_> = err.context().iter().collect();
    context.sort();
    for (key, value) in context {
        out.push_str(&format!("\n  {key}: {value}"));
    }
    let mut cause = err.cause();
    while let Some(inner) = cause {
        out.push_str(&format!("\n  caused by: {}", inner.message()));
        cause = inner.cause();
    }
    out
}
