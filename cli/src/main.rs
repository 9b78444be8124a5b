use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use schema_upgrade_core::{
    Dialect, SchemaDocument, Table, TableOutcome, TablePlan, UpgradeConfig, plan_create,
    validate_schema,
};
use schema_upgrade_sqlite::{SqliteError, SqliteUpgrader};
use serde::Serialize;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// CLI-specific output format enum with clap argument parsing support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliOutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliLogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliDialect {
    Sqlite,
    Postgres,
    Mysql,
}

impl From<CliDialect> for Dialect {
    fn from(dialect: CliDialect) -> Self {
        match dialect {
            CliDialect::Sqlite => Self::Sqlite,
            CliDialect::Postgres => Self::Postgres,
            CliDialect::Mysql => Self::Mysql,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "schema-upgrade")]
#[command(about = "Bring a database schema up to date with a declared schema")]
struct Cli {
    /// Log filter used when RUST_LOG is not set (e.g. info, debug).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    /// Log line format written to stderr.
    #[arg(long, global = true, default_value = "text")]
    log_format: CliLogFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply every pending change to a SQLite database.
    Upgrade(DatabaseArgs),
    /// Show the statements an upgrade would run, without running them.
    Plan(DatabaseArgs),
    /// Show per-table pending changes and row counts.
    Status(DatabaseArgs),
    /// Print the CREATE statements for the declared schema.
    Sql(SqlArgs),
    /// Check a schema document for structural errors.
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
struct DatabaseArgs {
    /// Schema document (.yml, .yaml or .json).
    #[arg(long)]
    schema: PathBuf,
    /// Database file path.
    #[arg(long)]
    database: PathBuf,
    /// Upgrade configuration with renames, drops and hooks.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output format.
    #[arg(long, default_value = "text")]
    format: CliOutputFormat,
}

#[derive(Debug, Args)]
struct SqlArgs {
    /// Schema document (.yml, .yaml or .json).
    #[arg(long)]
    schema: PathBuf,
    /// Target dialect (default: the configured dialect, else sqlite).
    #[arg(long)]
    dialect: Option<CliDialect>,
    /// Upgrade configuration supplying the dialect.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ValidateArgs {
    /// Schema document (.yml, .yaml or .json).
    #[arg(long)]
    schema: PathBuf,
    /// Output format.
    #[arg(long, default_value = "text")]
    format: CliOutputFormat,
}

#[derive(Debug, Serialize)]
struct ValidationOutput {
    tables: usize,
    errors: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    let result = match cli.command {
        Command::Upgrade(args) => run_upgrade(args),
        Command::Plan(args) => run_plan(args),
        Command::Status(args) => run_status(args),
        Command::Sql(args) => run_sql(args),
        Command::Validate(args) => run_validate(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(level: &str, format: CliLogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        CliLogFormat::Text => builder.init(),
        CliLogFormat::Json => builder.json().init(),
    }
}

fn run_upgrade(args: DatabaseArgs) -> Result<(), String> {
    let (tables, config) = load_inputs(&args.schema, args.config.as_deref())?;
    let mut upgrader = open_database(&args.database, &config)?;

    let report = upgrader
        .run(&tables, &config.instructions())
        .map_err(upgrade_failed)?;
    info!(
        statements = report.statement_count(),
        database = %args.database.display(),
        "upgrade finished"
    );

    if args.format == CliOutputFormat::Json {
        return print_json(&report);
    }

    println!("Upgrade complete ({}):", report.dialect);
    for table in &report.tables {
        match table.outcome {
            TableOutcome::Unchanged => println!("  {}: unchanged", table.table),
            TableOutcome::Created => println!(
                "  {}: created ({} statements)",
                table.table,
                table.changes.len()
            ),
            TableOutcome::Upgraded => println!(
                "  {}: upgraded ({} statements)",
                table.table,
                table.changes.len()
            ),
        }
    }
    for hook in &report.hooks {
        println!(
            "  hook '{}' ({}): {}",
            hook.hook,
            hook.phase,
            if hook.changed { "changed" } else { "no change" }
        );
    }
    Ok(())
}

fn run_plan(args: DatabaseArgs) -> Result<(), String> {
    let (tables, config) = load_inputs(&args.schema, args.config.as_deref())?;
    let mut upgrader = open_database(&args.database, &config)?;

    let plans: Vec<TablePlan> = upgrader
        .plan(&tables, &config.instructions())
        .map_err(upgrade_failed)?
        .into_iter()
        .filter(|plan| !plan.is_empty())
        .collect();

    if args.format == CliOutputFormat::Json {
        return print_json(&plans);
    }

    if plans.is_empty() {
        println!("Schema is up to date.");
        return Ok(());
    }
    for plan in &plans {
        println!("-- {}", plan.table);
        for statement in &plan.statements {
            println!("{};", statement.sql);
        }
    }
    Ok(())
}

fn run_status(args: DatabaseArgs) -> Result<(), String> {
    let (tables, config) = load_inputs(&args.schema, args.config.as_deref())?;
    let mut upgrader = open_database(&args.database, &config)?;

    let status = upgrader
        .status(&tables, &config.instructions())
        .map_err(upgrade_failed)?;

    if args.format == CliOutputFormat::Json {
        return print_json(&status);
    }

    println!("Upgrade Status:");
    for table in &status {
        let existence = match table.rows {
            Some(rows) => format!("{rows} rows"),
            None => "missing".to_string(),
        };
        if table.is_up_to_date() {
            println!("  {}: {existence}, up to date", table.table);
        } else {
            println!(
                "  {}: {existence}, {} pending",
                table.table,
                table.pending.len()
            );
        }
    }
    Ok(())
}

fn run_sql(args: SqlArgs) -> Result<(), String> {
    let (tables, config) = load_inputs(&args.schema, args.config.as_deref())?;
    let dialect = args.dialect.map(Dialect::from).unwrap_or(config.dialect);
    let generator = dialect.generator();
    debug!(%dialect, tables = tables.len(), "rendering create statements");

    for table in &tables {
        for statement in plan_create(&generator, table).statements {
            println!("{};", statement.sql);
        }
    }
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<(), String> {
    let document = load_schema(&args.schema)?;
    let errors = validate_schema(&document.tables);

    if args.format == CliOutputFormat::Json {
        print_json(&ValidationOutput {
            tables: document.tables.len(),
            errors: errors.iter().map(ToString::to_string).collect(),
        })?;
    } else if errors.is_empty() {
        println!(
            "ok: {} tables in '{}'",
            document.tables.len(),
            args.schema.display()
        );
    } else {
        for err in &errors {
            println!("invalid: {err}");
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("{} validation errors", errors.len()))
    }
}

/// Loads and validates the schema, and loads the configuration if one is
/// given.
fn load_inputs(schema: &Path, config: Option<&Path>) -> Result<(Vec<Table>, UpgradeConfig), String> {
    let document = load_schema(schema)?;
    let errors = validate_schema(&document.tables);
    if !errors.is_empty() {
        let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
        return Err(format!(
            "Invalid schema '{}': {}",
            schema.display(),
            details.join("; ")
        ));
    }

    let config = match config {
        Some(path) => UpgradeConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?,
        None => UpgradeConfig::default(),
    };
    Ok((document.tables, config))
}

fn load_schema(path: &Path) -> Result<SchemaDocument, String> {
    SchemaDocument::load(path)
        .map_err(|e| format!("Failed to load schema '{}': {e}", path.display()))
}

fn open_database(path: &Path, config: &UpgradeConfig) -> Result<SqliteUpgrader, String> {
    if config.dialect != Dialect::Sqlite {
        return Err(format!(
            "Dialect '{}' has no database binding; use `schema-upgrade sql` to render its DDL",
            config.dialect
        ));
    }
    SqliteUpgrader::from_config(path, config)
        .map_err(|e| format!("Failed to open database '{}': {e}", path.display()))
}

fn upgrade_failed(err: SqliteError) -> String {
    debug!("{}", err.format_detailed());
    err.to_string()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize output: {e}"))?;
    println!("{json}");
    Ok(())
}
