use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sqlglass::engine::HasResult;
use sqlglass::export::{export, export_to_path, write_json, ExportFormat};
use sqlglass::{Config, Engine, Metadata, RequestArgs};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sqlglass")]
#[command(about = "Browse and query read-only SQLite databases")]
struct Cli {
    /// Database file to serve; repeat for several
    #[arg(long = "db", short = 'd', value_name = "DATABASE", required = true)]
    files: Vec<PathBuf>,

    /// Worker threads running SQL
    #[arg(long, default_value = "3")]
    threads: usize,

    /// Rows per table page
    #[arg(long, default_value = "100")]
    page_size: usize,

    /// Cap on rows returned by a custom query
    #[arg(long, default_value = "1000")]
    max_returned_rows: usize,

    /// Time limit for any single statement, in milliseconds
    #[arg(long, default_value = "1000")]
    sql_time_limit_ms: u64,

    /// Pre-computed inspection JSON to load instead of scanning
    #[arg(long)]
    inspect_file: Option<PathBuf>,

    /// Metadata JSON file
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Output format
    #[arg(long, short, value_enum, default_value = "json")]
    format: FormatArg,

    /// Write output to this file instead of stdout
    #[arg(long, short)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Hash every file and print what it contains
    Inspect,
    /// Run a SELECT against one database
    Query {
        database: String,
        sql: String,
        /// Values for `:named` parameters, as name=value
        #[arg(long = "param", short = 'p')]
        params: Vec<String>,
    },
    /// Show one page of a table or view
    Browse {
        database: String,
        table: String,
        /// Filters such as `name__contains=abc`
        filters: Vec<String>,
        /// Cursor from a previous page
        #[arg(long)]
        next: Option<String>,
    },
    /// Show a single row by its key path
    Row {
        database: String,
        table: String,
        pk_path: String,
    },
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum FormatArg {
    Json,
    Jsono,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(fmt: FormatArg) -> Self {
        match fmt {
            FormatArg::Json => ExportFormat::Json,
            FormatArg::Jsono => ExportFormat::Jsono,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(run(cli))
}

fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::new(cli.files.clone());
    config.num_threads = cli.threads;
    config.page_size = cli.page_size;
    config.max_returned_rows = cli.max_returned_rows;
    config.sql_time_limit_ms = cli.sql_time_limit_ms;
    config.inspect_file = cli.inspect_file.clone();
    if let Some(path) = &cli.metadata {
        config.metadata = Metadata::from_file(path)?;
    }
    Ok(config)
}

/// Split `key=value` arguments
fn parse_pairs(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => Ok((key.to_string(), value.to_string())),
            None => bail!("Expected key=value, got {:?}", pair),
        })
        .collect()
}

async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;
    let engine = Engine::new(config).context("Failed to start")?;
    let format = ExportFormat::from(cli.format);

    let outcome = match &cli.command {
        Commands::Inspect => {
            let inventory = engine.inspect()?;
            match &cli.out {
                Some(path) => {
                    let file = std::fs::File::create(path).with_context(|| {
                        format!("Failed to create output file: {}", path.display())
                    })?;
                    write_json(&*inventory, file)
                }
                None => write_json(&*inventory, io::stdout().lock()),
            }
        }
        Commands::Query {
            database,
            sql,
            params,
        } => {
            let args = RequestArgs::parse(&parse_pairs(params)?);
            let page = engine.custom_sql(database, sql, &args).await?;
            emit(&page, format, cli.out.as_ref())
        }
        Commands::Browse {
            database,
            table,
            filters,
            next,
        } => {
            let mut pairs = parse_pairs(filters)?;
            if let Some(cursor) = next {
                pairs.push(("_next".to_string(), cursor.clone()));
            }
            let page = engine
                .browse_table(database, table, &RequestArgs::parse(&pairs))
                .await?;
            emit(&page, format, cli.out.as_ref())
        }
        Commands::Row {
            database,
            table,
            pk_path,
        } => {
            let page = engine.fetch_row(database, table, pk_path).await?;
            emit(&page, format, cli.out.as_ref())
        }
    };

    engine.shutdown()?;
    outcome
}

fn emit<P: Serialize + HasResult>(
    page: &P,
    format: ExportFormat,
    out: Option<&PathBuf>,
) -> Result<()> {
    match out {
        Some(path) => {
            export_to_path(page, format, path)?;
            eprintln!("Exported to: {}", path.display());
            Ok(())
        }
        None => export(page, format, io::stdout().lock()),
    }
}
