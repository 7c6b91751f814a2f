//! Local tshark sniffer

use super::{CaptureControl, MonitorSetup};
use crate::error::{AppError, Result};
use crate::types::ChannelSpec;
use async_trait::async_trait;
#[cfg(unix)]
use nix::{
    errno::Errno,
    sys::signal::{killpg, Signal},
    unistd::Pid,
};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

/// Runs `tshark` on a monitor interface; the monitor itself is provisioned
/// through an optional [`MonitorSetup`] (usually the test manager).
pub struct TsharkSniffer {
    program: PathBuf,
    radio: String,
    monitor: Option<Arc<dyn MonitorSetup>>,
    child: Mutex<Option<Child>>,
}

impl TsharkSniffer {
    pub fn new(radio: impl Into<String>, monitor: Option<Arc<dyn MonitorSetup>>) -> Self {
        Self {
            program: PathBuf::from("tshark"),
            radio: radio.into(),
            monitor,
            child: Mutex::new(None),
        }
    }

    /// Use a different capture binary (tests, non-standard installs)
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Arguments for a pcap capture of `interface` into `output`
    pub fn capture_args(interface: &str, output: &Path) -> Vec<String> {
        vec![
            "-i".to_string(),
            interface.to_string(),
            "-F".to_string(),
            "pcap".to_string(),
            "-q".to_string(),
            "-w".to_string(),
            output.display().to_string(),
        ]
    }
}

impl Drop for TsharkSniffer {
    /// Leaves no capture behind when the run unwinds, dumpcap included
    fn drop(&mut self) {
        if let Some(child) = self.child.get_mut().as_mut() {
            let _ = force_kill(child);
        }
    }
}

#[async_trait]
impl CaptureControl for TsharkSniffer {
    async fn ensure_monitor(&self, interface: &str, channel: ChannelSpec) -> Result<()> {
        match &self.monitor {
            Some(monitor) => monitor.ensure_monitor(&self.radio, interface, channel).await,
            None => Ok(()),
        }
    }

    async fn start_capture(&self, interface: &str, output: &Path) -> Result<()> {
        let mut slot = self.child.lock().await;
        if slot.is_some() {
            return Err(AppError::capture("A capture process is already running"));
        }

        let mut command = Command::new(&self.program);
        command
            .args(Self::capture_args(interface, output))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        let child = command
            .spawn()
            .map_err(|e| AppError::capture(format!("Failed to start {}: {}", self.program.display(), e)))?;

        *slot = Some(child);
        Ok(())
    }

    async fn stop_capture(&self) -> Result<()> {
        let mut slot = self.child.lock().await;
        if let Some(child) = slot.as_mut() {
            interrupt(child)?;
        }
        Ok(())
    }

    async fn abort_capture(&self) -> Result<()> {
        let mut slot = self.child.lock().await;
        if let Some(mut child) = slot.take() {
            force_kill(&mut child)?;
            // reaped by the runtime once it exits
            drop(child);
        }
        Ok(())
    }

    async fn capture_finished(&self) -> Result<bool> {
        let mut slot = self.child.lock().await;
        let exited = match slot.as_mut() {
            None => return Ok(true),
            Some(child) => child
                .try_wait()
                .map_err(|e| AppError::capture(format!("Failed to reap capture process: {}", e)))?
                .is_some(),
        };
        if exited {
            *slot = None;
        }
        Ok(exited)
    }

    async fn fetch(&self, remote: &Path, local: &Path) -> Result<()> {
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(remote, local)
            .await
            .map_err(|e| AppError::capture(format!("Failed to fetch {}: {}", remote.display(), e)))?;
        Ok(())
    }
}

/// Ask the capture to finish its file: SIGINT to the whole process group so
/// the dumpcap helper stops along with tshark
#[cfg(unix)]
fn interrupt(child: &mut Child) -> Result<()> {
    signal_group(child, Signal::SIGINT)
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) -> Result<()> {
    force_kill(child)
}

#[cfg(unix)]
fn force_kill(child: &mut Child) -> Result<()> {
    signal_group(child, Signal::SIGKILL)?;
    start_kill(child)
}

#[cfg(not(unix))]
fn force_kill(child: &mut Child) -> Result<()> {
    start_kill(child)
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: Signal) -> Result<()> {
    // no pid once the child has been reaped
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid).map_err(|_| AppError::internal(format!("Process id {} out of range", pid)))?;
    match killpg(Pid::from_raw(pid), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(AppError::capture(format!("Failed to send {:?} to capture: {}", signal, e))),
    }
}

fn start_kill(child: &mut Child) -> Result<()> {
    // already exited processes report InvalidInput; nothing to do then
    match child.start_kill() {
        Err(e) if e.kind() != std::io::ErrorKind::InvalidInput => {
            Err(AppError::capture(format!("Failed to stop capture: {}", e)))
        }
        _ => Ok(()),
    }
}
