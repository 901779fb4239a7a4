//! Change-event pipeline server.
//!
//! Spawns the PostgreSQL capture process for one connection and logs the
//! event groups materialized from its output until a shutdown signal arrives
//! or the capture process dies.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use changefeed_core::{
    ConnectionConfig, EventDispatcher, EventModelsGroup, Materializer, PipelineConfig,
};
use changefeed_runtime::{
    spawn_child_reaper, CaptureProcess, HandlerStack, Pipeline, PipelineExit, ShutdownSignals,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the pipeline server.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Database host
    #[arg(long, env = "CHANGEFEED_DB_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Database port
    #[arg(long, env = "CHANGEFEED_DB_PORT", default_value_t = 5432)]
    port: u16,

    /// Replication user
    #[arg(long, env = "CHANGEFEED_DB_USER", default_value = "postgres")]
    user: String,

    /// Replication password
    #[arg(long, env = "CHANGEFEED_DB_PASSWORD", default_value = "", hide_env_values = true)]
    password: String,

    /// Database name
    #[arg(long, env = "CHANGEFEED_DB_NAME", default_value = "postgres")]
    database: String,

    /// Application name, used for the slot and process names
    #[arg(long, default_value = "changefeed")]
    app_name: String,

    /// Connection name
    #[arg(long, default_value = "default")]
    connection_name: String,

    /// Directory for spilled transaction buffers
    #[arg(long, default_value = "./runtime/tmp/database/listen/postgresql")]
    buffer_dir: PathBuf,

    /// Directory holding the pg-replication-<arch> binaries
    #[arg(long, default_value = "./bin")]
    binary_dir: PathBuf,

    /// Table to entity type mapping as table=Entity (repeatable)
    #[arg(long = "entity", value_parser = parse_mapping)]
    entities: Vec<(String, String)>,

    /// Records held in memory per transaction before spilling
    #[arg(long, default_value_t = changefeed_core::config::DEFAULT_SPILL_THRESHOLD)]
    spill_threshold: usize,

    /// Records per materialization pass
    #[arg(long, default_value_t = changefeed_core::config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Capture process liveness poll interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    liveness_interval_ms: u64,

    /// Do not echo malformed records to standard output
    #[arg(long)]
    no_diagnostic_stdout: bool,
}

impl Args {
    fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            app_name: self.app_name.clone(),
            connection_name: self.connection_name.clone(),
            connection: ConnectionConfig {
                host: self.host.clone(),
                port: self.port,
                username: self.user.clone(),
                password: self.password.clone(),
                database: self.database.clone(),
            },
            buffer_dir: self.buffer_dir.clone(),
            binary_dir: self.binary_dir.clone(),
            spill_threshold: self.spill_threshold,
            batch_size: self.batch_size,
            liveness_interval_ms: self.liveness_interval_ms,
            diagnostic_stdout: !self.no_diagnostic_stdout,
            ..Default::default()
        }
    }
}

fn parse_mapping(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((table, entity)) if !table.is_empty() && !entity.is_empty() => {
            Ok((table.to_string(), entity.to_string()))
        }
        _ => Err(format!("expected table=Entity, got '{}'", s)),
    }
}

/// Writes every dispatched group to the log as JSON.
struct LoggingDispatcher;

impl EventDispatcher for LoggingDispatcher {
    fn dispatch(&mut self, group: EventModelsGroup) {
        match serde_json::to_string(&group.entities) {
            Ok(entities) => tracing::info!(
                operation = %group.operation,
                entity_kind = %group.entity_kind,
                entity_type = %group.entity_type,
                count = group.len(),
                "{}",
                entities
            ),
            Err(e) => tracing::error!(
                entity_kind = %group.entity_kind,
                "Failed to serialize event group: {}",
                e
            ),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = args.pipeline_config();
    let resolver: HashMap<String, String> = args.entities.into_iter().collect();
    if resolver.is_empty() {
        tracing::warn!("No entity mappings configured; every change will be skipped");
    }

    if let Err(e) = run(config, resolver).await {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(config: PipelineConfig, resolver: HashMap<String, String>) -> anyhow::Result<()> {
    // Dispositions must be read before tokio replaces them.
    let handlers = HandlerStack::capture(&[libc::SIGINT, libc::SIGTERM])?;
    let mut signals = ShutdownSignals::install()?;
    let _reaper = spawn_child_reaper()?;

    let mut materializer = Materializer::new(&config, resolver, LoggingDispatcher);
    let purged = materializer
        .prepare()
        .with_context(|| format!("failed to prepare {}", config.buffer_dir.display()))?;
    if purged > 0 {
        tracing::info!(purged, "Removed orphaned transaction buffers");
    }

    let source = CaptureProcess::start(&config).context("failed to start capture process")?;
    let exit = Pipeline::new(&config)
        .run(source, &mut materializer, signals.recv())
        .await;

    let stats = materializer.stats();
    let open = materializer.live_transactions();
    // Drops every open buffer and its spill file.
    drop(materializer);
    tracing::info!(?stats, open_transactions = open, "Materializer closed");

    match exit? {
        PipelineExit::Signalled(signo) => {
            handlers.restore_and_raise(signo)?;
            Ok(())
        }
    }
}
