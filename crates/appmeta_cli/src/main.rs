//! Operator CLI for app metadata stored in SQLite.
//!
//! # Responsibility
//! - Read and write one app namespace from the command line.
//! - Show resolved values by default and raw values on request.

use appmeta_core::db::open_db;
use appmeta_core::{
    default_log_level, init_logging, AppMetadata, MetadataRepository, MetadataValue,
    SqliteMetadataRepository,
};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "appmeta")]
#[command(about = "Inspect and edit derived app metadata")]
#[command(version)]
struct Args {
    /// SQLite database file
    #[arg(long, env = "APPMETA_DB")]
    db: PathBuf,

    /// App namespace inside the database
    #[arg(long, env = "APPMETA_APP")]
    app: String,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long)]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off when unset
    #[arg(long, env = "APPMETA_LOG_DIR")]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the resolved value of a key
    Get { key: String },
    /// Store a raw value (text by default)
    Set {
        key: String,
        value: String,
        /// Parse VALUE as TRUE/FALSE
        #[arg(long = "bool", conflicts_with = "as_json")]
        as_bool: bool,
        /// Parse VALUE as JSON and store it as an opaque blob
        #[arg(long = "json")]
        as_json: bool,
    },
    /// Delete a key
    Delete { key: String },
    /// List all keys with resolved (or raw) values
    List {
        #[arg(long)]
        raw: bool,
        /// Print a JSON object of `{"kind", "value"}` entries
        #[arg(long)]
        json: bool,
    },
    /// Resolve an ad-hoc template against current values
    Derive { template: String },
}

fn main() -> Result<ExitCode, Box<dyn Error>> {
    let args = Args::parse();

    if let Some(log_dir) = args.log_dir.as_deref() {
        let level = args.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }

    let conn = open_db(&args.db)?;
    let mut metadata = AppMetadata::load(SqliteMetadataRepository::new(&conn), args.app)?;

    match args.command {
        Commands::Get { key } => match metadata.get(&key) {
            Ok(value) => println!("{value}"),
            Err(err) => {
                eprintln!("{err}");
                return Ok(ExitCode::FAILURE);
            }
        },
        Commands::Set {
            key,
            value,
            as_bool,
            as_json,
        } => {
            let value = parse_value(value, as_bool, as_json)?;
            metadata.set(&key, value)?;
            for unresolved in metadata.unresolved() {
                eprintln!("warning: `{unresolved}` has unresolvable references");
            }
        }
        Commands::Delete { key } => metadata.delete(&key)?,
        Commands::List { raw, json } => {
            let entries: BTreeMap<String, MetadataValue> = if raw {
                metadata
                    .repository()
                    .get_all(metadata.app())?
                    .into_iter()
                    .map(|row| (row.key, row.value))
                    .collect()
            } else {
                metadata
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.clone()))
                    .collect()
            };
            if json {
                println!("{}", entries_to_json(&entries)?);
            } else {
                for (key, value) in &entries {
                    println!("{key}={value}");
                }
            }
        }
        Commands::Derive { template } => println!("{}", metadata.derive_value(&template)),
    }

    Ok(ExitCode::SUCCESS)
}

fn entries_to_json(entries: &BTreeMap<String, MetadataValue>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(entries)
}

fn parse_value(value: String, as_bool: bool, as_json: bool) -> Result<MetadataValue, String> {
    if as_bool {
        return match value.trim().to_ascii_uppercase().as_str() {
            "TRUE" => Ok(MetadataValue::Bool(true)),
            "FALSE" => Ok(MetadataValue::Bool(false)),
            other => Err(format!("expected TRUE or FALSE, got `{other}`")),
        };
    }
    if as_json {
        return serde_json::from_str(&value)
            .map(MetadataValue::Blob)
            .map_err(|err| format!("invalid JSON value: {err}"));
    }
    Ok(MetadataValue::Text(value))
}
