//! Pipeline configuration.

use std::path::PathBuf;

use serde::Deserialize;

/// Records held in memory by a transaction buffer before spilling to disk.
pub const DEFAULT_SPILL_THRESHOLD: usize = 5000;
/// Records replayed per materialization pass.
pub const DEFAULT_BATCH_SIZE: usize = 1000;
/// Raw-output chunks queued between the reader thread and the pipeline loop.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10240;

/// Database connection parameters handed to the capture process.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5432,
            username: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
        }
    }
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Application name, prefix of the slot and process names
    pub app_name: String,
    /// Name of the configured database connection
    pub connection_name: String,
    /// Connection parameters
    pub connection: ConnectionConfig,
    /// Directory holding spilled transaction buffers
    pub buffer_dir: PathBuf,
    /// Directory holding `pg-replication-<arch>` capture binaries
    pub binary_dir: PathBuf,
    /// In-memory records per transaction before spilling
    pub spill_threshold: usize,
    /// Records per materialization pass
    pub batch_size: usize,
    /// Capacity of the bounded raw-output queue
    pub queue_capacity: usize,
    /// Bytes requested per read from the capture process
    pub read_chunk_size: usize,
    /// Capture process liveness poll interval in milliseconds
    pub liveness_interval_ms: u64,
    /// Echo malformed records to standard output as well as the error log
    pub diagnostic_stdout: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            app_name: "changefeed".to_string(),
            connection_name: "default".to_string(),
            connection: ConnectionConfig::default(),
            buffer_dir: PathBuf::from("./runtime/tmp/database/listen/postgresql"),
            binary_dir: PathBuf::from("./bin"),
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            read_chunk_size: 8192,
            liveness_interval_ms: 1000,
            diagnostic_stdout: true,
        }
    }
}

impl PipelineConfig {
    /// Replication slot name for this application and connection.
    ///
    /// Lower-cases `app_name + "_" + connection_name` and replaces every
    /// character outside `[a-z0-9_]` with `_`. Distinct configurations can
    /// collide; nothing here detects that.
    pub fn slot_name(&self) -> String {
        format!("{}_{}", self.app_name, self.connection_name)
            .to_lowercase()
            .chars()
            .map(|c| {
                if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Connection string in key/value form, fixed to logical replication mode.
    pub fn dsn(&self) -> String {
        let conn = &self.connection;
        [
            ("host", conn.host.clone()),
            ("port", conn.port.to_string()),
            ("user", conn.username.clone()),
            ("password", conn.password.clone()),
            ("dbname", conn.database.clone()),
            ("replication", "database".to_string()),
        ]
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(" ")
    }

    /// Display name the capture process gives itself.
    pub fn process_name(&self) -> String {
        format!(
            "{}.PostgreSQL-Replication-{}",
            self.app_name, self.connection_name
        )
    }

    /// Stable spill file name for a transaction on this connection.
    pub fn buffer_identifier(&self, xid: i64) -> String {
        format!("{}.{}", self.spill_prefix(), xid)
    }

    /// Connection name made safe for use as a file name prefix.
    pub fn spill_prefix(&self) -> String {
        self.connection_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}
