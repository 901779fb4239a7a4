//! Termination signal handling and child reaping.
//!
//! The dispositions of SIGINT and SIGTERM in force before the pipeline starts
//! are captured in a [`HandlerStack`]. On shutdown the signal is forwarded to
//! the capture process first; the previous disposition is then restored and
//! the signal re-raised against this process.

use std::ptr;

use changefeed_core::ChangefeedError;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::task::JoinHandle;

/// Dispositions saved before the pipeline installed its own listeners.
pub struct HandlerStack {
    saved: Vec<(i32, libc::sigaction)>,
}

impl HandlerStack {
    /// Records the current disposition of each signal.
    ///
    /// Must run before [`ShutdownSignals::install`].
    pub fn capture(signals: &[i32]) -> Result<Self, ChangefeedError> {
        let mut saved = Vec::with_capacity(signals.len());
        for &signo in signals {
            // SAFETY: sigaction is plain data; a null new action only queries.
            let mut previous: libc::sigaction = unsafe { std::mem::zeroed() };
            if unsafe { libc::sigaction(signo, ptr::null(), &mut previous) } != 0 {
                return Err(ChangefeedError::SignalError(format!(
                    "failed to read disposition of signal {}: {}",
                    signo,
                    std::io::Error::last_os_error()
                )));
            }
            saved.push((signo, previous));
        }
        Ok(Self { saved })
    }

    /// Signals whose disposition was captured.
    pub fn signals(&self) -> Vec<i32> {
        self.saved.iter().map(|(signo, _)| *signo).collect()
    }

    /// Restores the saved disposition of `signo`.
    pub fn restore(&self, signo: i32) -> Result<(), ChangefeedError> {
        let (_, previous) = self
            .saved
            .iter()
            .find(|(saved, _)| *saved == signo)
            .ok_or_else(|| {
                ChangefeedError::SignalError(format!("no saved disposition for signal {}", signo))
            })?;

        if unsafe { libc::sigaction(signo, previous, ptr::null_mut()) } != 0 {
            return Err(ChangefeedError::SignalError(format!(
                "failed to restore disposition of signal {}: {}",
                signo,
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }

    /// Restores the saved disposition of `signo` and raises it against this process.
    ///
    /// With the default disposition this does not return.
    pub fn restore_and_raise(&self, signo: i32) -> Result<(), ChangefeedError> {
        self.restore(signo)?;
        if unsafe { libc::raise(signo) } != 0 {
            return Err(ChangefeedError::SignalError(format!(
                "failed to raise signal {}",
                signo
            )));
        }
        Ok(())
    }
}

/// Listeners for the signals that stop the pipeline.
pub struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl ShutdownSignals {
    /// Installs SIGINT and SIGTERM listeners on the current runtime.
    pub fn install() -> Result<Self, ChangefeedError> {
        let listen = |kind: SignalKind| {
            signal(kind).map_err(|e| {
                ChangefeedError::SignalError(format!("failed to install signal listener: {}", e))
            })
        };
        Ok(Self {
            interrupt: listen(SignalKind::interrupt())?,
            terminate: listen(SignalKind::terminate())?,
        })
    }

    /// Waits for the next shutdown signal and returns its number.
    pub async fn recv(&mut self) -> i32 {
        tokio::select! {
            _ = self.interrupt.recv() => libc::SIGINT,
            _ = self.terminate.recv() => libc::SIGTERM,
        }
    }
}

/// Reaps every exited child without blocking.
///
/// # Returns
/// Number of children reaped.
pub fn reap_exited() -> usize {
    let mut reaped = 0;
    loop {
        let mut status = 0;
        let pid = unsafe { libc::waitpid(-1, &mut status, libc::WNOHANG) };
        if pid <= 0 {
            break;
        }
        tracing::debug!(pid, status, "Reaped child process");
        reaped += 1;
    }
    reaped
}

/// Spawns a task that reaps exited children on every SIGCHLD.
pub fn spawn_child_reaper() -> Result<JoinHandle<()>, ChangefeedError> {
    let mut sigchld = signal(SignalKind::child()).map_err(|e| {
        ChangefeedError::SignalError(format!("failed to install SIGCHLD listener: {}", e))
    })?;

    Ok(tokio::spawn(async move {
        while sigchld.recv().await.is_some() {
            reap_exited();
        }
    }))
}
