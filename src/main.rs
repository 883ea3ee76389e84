use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use sqlir::config::{ConfigError, SqlIrConfig};
use sqlir::models::enums::DatabaseType;
use sqlir::query_ir::{GenerateOptions, ParseOptions, ir_json_to_sql, sql_to_ir_with};
use sqlir::references::{ResolvedReference, compose_cte};

#[derive(Parser)]
#[command(name = "sqlir", version, about = "Translate SQL to QueryIR and back")]
struct Cli {
    #[arg(short, long, global = true, help = "Enable debug logging for sqlir")]
    verbose: bool,

    #[arg(long, global = true, help = "Config file path")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a SELECT into QueryIR JSON
    Parse {
        /// SQL file; stdin when omitted
        file: Option<PathBuf>,

        #[arg(long, help = "Dialect: postgres, mysql, sqlite, mssql, bigquery, ...")]
        dialect: Option<String>,
    },
    /// Render QueryIR JSON back to SQL
    Generate {
        /// IR JSON file; stdin when omitted
        file: Option<PathBuf>,

        #[arg(long, help = "Pretty-print the generated SQL")]
        pretty: bool,

        #[arg(long, help = "Dialect used for quoting and literals")]
        dialect: Option<String>,
    },
    /// Inline `@alias` references as CTEs
    Compose {
        /// SQL file; stdin when omitted
        file: Option<PathBuf>,

        #[arg(long, help = "JSON array of {id, alias, query}")]
        refs: PathBuf,

        #[arg(long, help = "Byte offset in the original text to map into the composed SQL")]
        cursor: Option<usize>,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ComposeOutput {
    sql: String,
    preamble_len: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<usize>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    dotenv::dotenv().ok();

    let mut builder = env_logger::Builder::from_default_env();
    if cli.verbose {
        builder.filter_module("sqlir", LevelFilter::Debug);
    }
    let _ = builder.try_init();

    if let Err(e) = run(cli).await {
        log::error!("{}", e);
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = SqlIrConfig::load(cli.config.as_deref())?;

    let output = match cli.command {
        Commands::Parse { file, dialect } => {
            let sql = read_input(file.as_ref()).await?;
            let database_type = DatabaseType::from_name_or(dialect.as_deref(), config.default_database_type);
            serde_json::to_string_pretty(&sql_to_ir_with(&sql, &ParseOptions::for_database(database_type)))?
        }
        Commands::Generate { file, pretty, dialect } => {
            let json = read_input(file.as_ref()).await?;
            let options = GenerateOptions {
                pretty: pretty || config.pretty_sql,
                database_type: DatabaseType::from_name_or(dialect.as_deref(), config.default_database_type),
            };
            serde_json::to_string_pretty(&ir_json_to_sql(&json, &options))?
        }
        Commands::Compose { file, refs, cursor } => {
            let sql = read_input(file.as_ref()).await?;
            let refs: Vec<ResolvedReference> = serde_json::from_str(&tokio::fs::read_to_string(&refs).await?)?;
            log::debug!("composing with {} reference(s)", refs.len());
            let composed = compose_cte(&sql, &refs);
            let cursor = cursor.map(|c| composed.map_offset(c));
            serde_json::to_string_pretty(&ComposeOutput { preamble_len: composed.preamble_len, sql: composed.sql, cursor })?
        }
    };

    let mut stdout = tokio::io::stdout();
    stdout.write_all(output.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

async fn read_input(file: Option<&PathBuf>) -> Result<String, CliError> {
    match file {
        Some(path) => Ok(tokio::fs::read_to_string(path).await?),
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            Ok(buf)
        }
    }
}
