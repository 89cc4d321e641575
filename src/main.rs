use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, error, info, Level};
use tracing_subscriber::FmtSubscriber;

use pgsummary::config::DbConfig;
use pgsummary::render::{self, OutputFormat};
use pgsummary::summary::{PgSummary, Target, DEFAULT_MAX_LISTED_VALUES};

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum CliOutputFormat {
    /// Aligned text table
    #[default]
    Text,
    /// Pretty-printed JSON
    Json,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(format: CliOutputFormat) -> Self {
        match format {
            CliOutputFormat::Text => OutputFormat::Text,
            CliOutputFormat::Json => OutputFormat::Json,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "pgsummary")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Table or view to summarize
    #[arg(short, long)]
    table: String,

    /// Schema containing the table or view
    #[arg(long, default_value = "public")]
    schema: String,

    /// Include relation kind and view definition in the report
    #[arg(long)]
    include_source: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = CliOutputFormat::Text)]
    format: CliOutputFormat,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// List distinct values for columns with at most this many
    #[arg(long, default_value_t = DEFAULT_MAX_LISTED_VALUES)]
    max_values: usize,

    /// Path to .env file for connection config
    #[arg(long, default_value = "./.env")]
    env_file: PathBuf,

    /// Database host (overrides POSTGRES_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Database port (overrides POSTGRES_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Database name (overrides POSTGRES_DB)
    #[arg(long)]
    database: Option<String>,

    /// Database user (overrides POSTGRES_USER)
    #[arg(long)]
    user: Option<String>,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    if let Err(e) = run() {
        error!(error = ?e, "Fatal error");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    info!("pgsummary v{}", env!("CARGO_PKG_VERSION"));
    info!(
        schema = ?cli.schema,
        table = ?cli.table,
        include_source = ?cli.include_source,
        format = ?cli.format,
        "Starting summary"
    );

    let mut config =
        DbConfig::load(&cli.env_file).context("Failed to load database configuration")?;
    apply_overrides(&mut config, &cli);
    debug!(connection = ?config.redacted_connection_string(), "Loaded configuration");

    let target = Target::new(&cli.schema, &cli.table).with_source(cli.include_source);
    let mut summary = PgSummary::connect(config, target).with_max_listed_values(cli.max_values);

    summary
        .validate()
        .with_context(|| format!("Cannot summarize {}.{}", cli.schema, cli.table))?;
    let report = summary.summary().context("Failed to build summary")?;
    summary.db_mut().close();

    let rendered = render::render(&report, cli.format.into()).context("Failed to render report")?;

    match &cli.output {
        Some(path) => {
            fs::write(path, format!("{rendered}\n"))
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = ?path, "Report written");
        }
        None => println!("{rendered}"),
    }

    Ok(())
}

fn apply_overrides(config: &mut DbConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(database) = &cli.database {
        config.database = database.clone();
    }
    if let Some(user) = &cli.user {
        config.user = user.clone();
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}
