//! Capture process launch and liveness.

use std::ffi::CStr;
use std::fs;
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use changefeed_core::{ChangefeedError, PipelineConfig};

/// A byte-stream source with a lifecycle: the capture process as the
/// pipeline sees it.
pub trait CaptureSource {
    /// Process id used for logging and signal delivery.
    fn pid(&self) -> u32;

    /// Hands out the raw output stream; `None` once it has been taken.
    fn take_output(&mut self) -> Option<Box<dyn Read + Send>>;

    /// Returns `false` once the source has exited.
    fn is_alive(&mut self) -> bool;

    /// Delivers `signal` to the source.
    fn forward_signal(&mut self, signal: i32) -> Result<(), ChangefeedError>;
}

/// Machine hardware name, as `uname -m` reports it.
pub fn machine_arch() -> String {
    // SAFETY: utsname is plain data; uname fills it with NUL-terminated strings.
    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    if unsafe { libc::uname(&mut uts) } == 0 {
        let machine = unsafe { CStr::from_ptr(uts.machine.as_ptr()) };
        return machine.to_string_lossy().into_owned();
    }
    std::env::consts::ARCH.to_string()
}

/// Locates the capture binary for `arch` under `binary_dir`.
///
/// # Returns
/// `Err(UnsupportedPlatform)` when `pg-replication-<arch>` does not exist.
pub fn capture_binary(binary_dir: &Path, arch: &str) -> Result<PathBuf, ChangefeedError> {
    let path = binary_dir.join(format!("pg-replication-{}", arch));
    if !path.is_file() {
        return Err(ChangefeedError::UnsupportedPlatform {
            arch: arch.to_string(),
        });
    }
    Ok(path)
}

/// Probes whether `pid` still names a live process.
pub fn process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    if unsafe { libc::kill(pid as libc::pid_t, 0) } == 0 {
        return true;
    }
    // EPERM: it exists but belongs to someone else.
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

/// Sends `signal` to `pid`. A process that is already gone is not an error.
pub fn send_signal(pid: u32, signal: i32) -> Result<(), ChangefeedError> {
    if unsafe { libc::kill(pid as libc::pid_t, signal) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(ChangefeedError::SignalError(format!(
        "failed to send signal {} to {}: {}",
        signal, pid, err
    )))
}

/// The spawned capture process.
#[derive(Debug)]
pub struct CaptureProcess {
    child: Child,
    pid: u32,
    binary: PathBuf,
}

impl CaptureProcess {
    /// Launches the capture binary for this machine.
    ///
    /// Connection parameters travel in the child's environment
    /// (`PG_DSN`, `PG_SLOT`, `PG_PROCESS_NAME`, `PG_MASTER_PID`), never on its
    /// argument list. Standard output is piped; standard error is inherited.
    pub fn start(config: &PipelineConfig) -> Result<Self, ChangefeedError> {
        let arch = machine_arch();
        let binary = capture_binary(&config.binary_dir, &arch)?;

        if let Err(e) = fs::set_permissions(&binary, fs::Permissions::from_mode(0o755)) {
            tracing::warn!(
                path = %binary.display(),
                "Failed to mark capture binary executable: {}",
                e
            );
        }

        let child = Command::new(&binary)
            .env("PG_DSN", config.dsn())
            .env("PG_SLOT", config.slot_name())
            .env("PG_PROCESS_NAME", config.process_name())
            .env("PG_MASTER_PID", std::process::id().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ChangefeedError::SpawnError(format!("{}: {}", binary.display(), e)))?;

        let pid = child.id();
        tracing::info!(
            pid,
            binary = %binary.display(),
            slot = %config.slot_name(),
            "Capture process spawned"
        );

        Ok(Self { child, pid, binary })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }
}

impl CaptureSource for CaptureProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn take_output(&mut self) -> Option<Box<dyn Read + Send>> {
        self.child
            .stdout
            .take()
            .map(|stdout| Box::new(stdout) as Box<dyn Read + Send>)
    }

    fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::debug!(pid = self.pid, %status, "Capture process reaped");
                false
            }
            // Already reaped by the child reaper.
            Err(_) => process_alive(self.pid),
        }
    }

    fn forward_signal(&mut self, signal: i32) -> Result<(), ChangefeedError> {
        send_signal(self.pid, signal)
    }
}
