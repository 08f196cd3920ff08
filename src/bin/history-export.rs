//! CLI tool for exporting the stored history
//!
//! Reads the history document from the configured record store and writes
//! the matching entries as CSV or JSON. The store itself is never written.
//!
//! Usage:
//!   history-export [--config <path>] [--format csv|json] [--output <path>] [filters]
//!
//! Options:
//!   --config      Path to configuration file (default: standard lookup)
//!   --format      Export format, csv or json (default: json)
//!   --output      Output file, `-` for stdout (default: historique_<date>.<ext>)
//!   --module      Only entries of this module
//!   --type        Only entries of this action type
//!   --entite      Only entries of this entity kind
//!   --user        Only entries of this user
//!   --from        Entries on or after this date (YYYY-MM-DD or RFC 3339)
//!   --to          Entries up to the end of this day
//!   --search      Case-insensitive text search
//!   --sort        Sort field (default: timestamp)
//!   --order       asc or desc (default: desc)
//!   --verbose     Enable verbose output
//!
//! Example:
//!   history-export --format csv --module finance --from 2024-01-01 --output finance.csv

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use fleet_history::{
    config::StorageBackend,
    models::{
        parse_date_param, ActionType, FilterCriteria, HistoryQuery, Module, SortField, SortOrder,
    },
    open_store,
    services::{
        export::{download_filename, render},
        load_snapshot, ExportFormat,
    },
    AppConfig,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Default)]
struct ExportArgs {
    config_path: Option<PathBuf>,
    format: ExportFormat,
    output: Option<String>,
    query: HistoryQuery,
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(args) = parse_args(&args)? else {
        print_help();
        return Ok(());
    };

    // Initialize logging on stderr so `--output -` stays clean
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = match args.config_path {
        Some(ref path) => {
            let config = AppConfig::from_file(path)?;
            config.validate()?;
            config
        }
        None => AppConfig::load().context("Failed to load configuration")?,
    };

    if config.history.backend == StorageBackend::Memory {
        warn!("The memory backend holds no data outside the server process");
    }

    let (store, _db) = open_store(&config)
        .await
        .context("Failed to open history store")?;

    let now = Utc::now();
    let snapshot = load_snapshot(&store, &config.history, now).await;
    let entries = snapshot.sorted(&args.query);
    let document = render(
        args.format,
        &entries,
        &args.query.criteria,
        config.history.separator(),
        now,
    )
    .context("Failed to export history")?;
    let total = entries.len();

    match args.output.as_deref() {
        Some("-") => {
            println!("{}", document);
        }
        output => {
            let path = output.map(PathBuf::from).unwrap_or_else(|| {
                PathBuf::from(download_filename(
                    "historique",
                    args.format,
                    now.date_naive(),
                ))
            });
            std::fs::write(&path, document)
                .with_context(|| format!("Failed to write {:?}", path))?;
            info!("Exported {} entries to {}", total, path.display());
        }
    }

    Ok(())
}

/// Parse arguments; `None` means help was requested
fn parse_args(args: &[String]) -> Result<Option<ExportArgs>> {
    let mut parsed = ExportArgs::default();
    let mut criteria = FilterCriteria::default();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = || -> Result<String> {
            iter.next()
                .cloned()
                .with_context(|| format!("Missing value for {}", arg))
        };

        match arg.as_str() {
            "--config" => parsed.config_path = Some(PathBuf::from(value()?)),
            "--format" => {
                parsed.format = value()?.parse::<ExportFormat>().map_err(anyhow::Error::msg)?;
            }
            "--output" | "-o" => parsed.output = Some(value()?),
            "--module" => {
                criteria.module = Some(value()?.parse::<Module>().map_err(anyhow::Error::msg)?);
            }
            "--type" => {
                criteria.action = Some(value()?.parse::<ActionType>().map_err(anyhow::Error::msg)?);
            }
            "--entite" => criteria.entite = Some(value()?),
            "--user" => criteria.utilisateur = Some(value()?),
            "--from" => {
                criteria.date_debut =
                    Some(parse_date_param(&value()?).map_err(anyhow::Error::msg)?);
            }
            "--to" => {
                criteria.date_fin =
                    Some(parse_date_param(&value()?).map_err(anyhow::Error::msg)?);
            }
            "--search" => criteria.recherche = Some(value()?),
            "--sort" => {
                parsed.query.tri_par =
                    Some(value()?.parse::<SortField>().map_err(anyhow::Error::msg)?);
            }
            "--order" => {
                parsed.query.ordre_tri =
                    Some(value()?.parse::<SortOrder>().map_err(anyhow::Error::msg)?);
            }
            "--verbose" | "-v" => parsed.verbose = true,
            "--help" | "-h" => return Ok(None),
            other => bail!("Unknown argument: {}", other),
        }
    }

    parsed.query.criteria = criteria;
    Ok(Some(parsed))
}

fn print_help() {
    println!(
        r#"Fleet History Export {}

USAGE:
    history-export [OPTIONS]

OPTIONS:
    --config <PATH>     Path to configuration file
    --format <FORMAT>   csv or json (default: json)
    --output <PATH>     Output file, - for stdout
                        (default: historique_<YYYY-MM-DD>.<ext>)
    --module <MODULE>   Filter by module
    --type <TYPE>       Filter by action type
    --entite <ENTITE>   Filter by entity kind
    --user <USER>       Filter by user
    --from <DATE>       Entries on or after DATE
    --to <DATE>         Entries up to the end of DATE
    --search <TEXT>     Case-insensitive text search
    --sort <FIELD>      Sort field (default: timestamp)
    --order <ORDER>     asc or desc (default: desc)
    -v, --verbose       Enable verbose output
    -h, --help          Print this help message"#,
        env!("CARGO_PKG_VERSION")
    );
}
