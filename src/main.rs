// ABOUTME: CLI entry point for rowsync
// ABOUTME: Reads a JSON request, runs export/import/ping and prints the JSON response

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use rowsync::config::{ExportRequest, ImportRequest, PingRequest};
use rowsync::connection::ConnectionProvider;
use rowsync::cursor::CursorFile;
use rowsync::mysql::MySqlProvider;
use rowsync::settings::Settings;
use rowsync::sqlite::SqliteProvider;
use rowsync::SyncEngine;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

#[derive(Parser)]
#[command(name = "rowsync")]
#[command(about = "Paged table export and reconciling import for MySQL and SQLite", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to a TOML settings file
    #[arg(long, global = true, env = "ROWSYNC_SETTINGS")]
    settings: Option<PathBuf>,
    /// Database backend the connection descriptor points at
    #[arg(long, global = true, value_enum, default_value_t = Backend::Mysql)]
    backend: Backend,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    Mysql,
    /// The descriptor's database field is the SQLite file path
    Sqlite,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the next page of a table
    Export {
        /// Request JSON file, or - for stdin
        #[arg(long)]
        request: String,
        /// Load the cursor from, and save the next cursor to, this file
        #[arg(long = "state-file")]
        state_file: Option<PathBuf>,
    },
    /// Import a batch of records into a table
    Import {
        /// Request JSON file, or - for stdin
        #[arg(long)]
        request: String,
    },
    /// Check that the database accepts the connection
    Ping {
        /// Request JSON file, or - for stdin
        #[arg(long)]
        request: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log; logs go to stderr so stdout stays JSON
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = match &cli.settings {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };

    match cli.backend {
        Backend::Mysql => {
            let provider = MySqlProvider::new(settings.mysql.connect_timeout());
            run(SyncEngine::new(provider, settings), cli.command).await
        }
        Backend::Sqlite => run(SyncEngine::new(SqliteProvider, settings), cli.command).await,
    }
}

async fn run<P: ConnectionProvider>(engine: SyncEngine<P>, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Export {
            request,
            state_file,
        } => {
            let mut request: ExportRequest = read_request(&request).await?;

            if let Some(path) = &state_file {
                let table = request.configuration.table.clone().unwrap_or_default();
                if let Some(state) = CursorFile::load_if_exists(path)
                    .await?
                    .and_then(|cursor| cursor.state_for(&table))
                {
                    tracing::info!("Resuming export of '{}' from startIndex {}", table, state.start_index);
                    request.state = state;
                }
            }

            let page = engine.export(&request).await.context("Export failed")?;

            if let (Some(path), Some(state)) = (&state_file, page.state) {
                let table = request.configuration.table.as_deref().unwrap_or_default();
                CursorFile::new(table, state).save(path).await?;
            }

            print_json(&page)
        }
        Commands::Import { request } => {
            let request: ImportRequest = read_request(&request).await?;
            let outcomes = engine.import(request).await.context("Import failed")?;
            print_json(&outcomes)
        }
        Commands::Ping { request } => {
            let request: PingRequest = read_request(&request).await?;
            let response = engine.ping(&request).await;
            print_json(&response)?;
            if !response.is_ok() {
                bail!("Connection check failed with status {}", response.status_code);
            }
            Ok(())
        }
    }
}

/// Read a JSON request from a file path, or from stdin when the path is `-`
async fn read_request<T: DeserializeOwned>(source: &str) -> anyhow::Result<T> {
    let contents = if source == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read request from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(Path::new(source))
            .await
            .with_context(|| format!("Failed to read request from {}", source))?
    };

    serde_json::from_str(&contents).with_context(|| format!("Failed to parse request from {}", source))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("Failed to serialize response")?;
    println!("{}", rendered);
    Ok(())
}
