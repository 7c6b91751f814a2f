//! Packet capture around a roam ramp

pub mod frames;
pub mod sniffer;

pub use frames::{AuthenticationQuery, CaptureFrame, FrameAnalyzer, FrameKind, ReassociationQuery};
pub use sniffer::TsharkSniffer;

use crate::error::{AppError, Result};
use crate::types::ChannelSpec;
use crate::utils::BoundedPoll;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Control channel of a sniffer
#[async_trait]
pub trait CaptureControl: Send + Sync {
    /// Create or retune the monitor interface. Idempotent.
    async fn ensure_monitor(&self, interface: &str, channel: ChannelSpec) -> Result<()>;

    /// Start writing packets seen on `interface` to `output`
    async fn start_capture(&self, interface: &str, output: &Path) -> Result<()>;

    /// Ask the capture process to stop
    async fn stop_capture(&self) -> Result<()>;

    /// Kill a capture that did not stop in time and forget it
    async fn abort_capture(&self) -> Result<()>;

    /// Whether the capture process has fully exited
    async fn capture_finished(&self) -> Result<bool>;

    /// Copy a finished capture to `local`
    async fn fetch(&self, remote: &Path, local: &Path) -> Result<()>;
}

/// Provisions monitor interfaces on a radio (test manager side)
#[async_trait]
pub trait MonitorSetup: Send + Sync {
    async fn ensure_monitor(&self, radio: &str, interface: &str, channel: ChannelSpec) -> Result<()>;
}

/// One sniffer, one capture at a time, never reusing a file name
pub struct CaptureSession {
    control: Arc<dyn CaptureControl>,
    capture_dir: PathBuf,
    stop_poll: BoundedPoll,
    running: Option<PathBuf>,
    sequence: u32,
}

impl CaptureSession {
    pub fn new(control: Arc<dyn CaptureControl>, capture_dir: impl Into<PathBuf>, stop_poll: BoundedPoll) -> Self {
        Self {
            control,
            capture_dir: capture_dir.into(),
            stop_poll,
            running: None,
            sequence: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Tune the monitor and start a new capture file named after `output_name`
    pub async fn start(&mut self, interface: &str, channel: ChannelSpec, output_name: &str) -> Result<PathBuf> {
        if let Some(path) = &self.running {
            return Err(AppError::capture(format!(
                "Capture {} is still running",
                path.display()
            )));
        }

        self.control.ensure_monitor(interface, channel).await?;

        let path = loop {
            self.sequence += 1;
            let candidate = self.capture_dir.join(format!("{}_{:03}.pcap", output_name, self.sequence));
            if !candidate.exists() {
                break candidate;
            }
        };

        tokio::fs::create_dir_all(&self.capture_dir).await?;
        self.control.start_capture(interface, &path).await?;
        self.running = Some(path.clone());
        Ok(path)
    }

    /// Stop the running capture; returns the file once the process has exited.
    /// A capture still running after the bounded wait is killed.
    pub async fn stop(&mut self) -> Result<PathBuf> {
        let path = self
            .running
            .take()
            .ok_or_else(|| AppError::capture("No capture is running"))?;

        if let Err(e) = self.control.stop_capture().await {
            self.control.abort_capture().await?;
            return Err(e);
        }

        let control = self.control.clone();
        let waited = self
            .stop_poll
            .until("capture process exit", move |_| {
                let control = control.clone();
                async move { matches!(control.capture_finished().await, Ok(true)).then_some(()) }
            })
            .await;

        if let Err(e) = waited {
            self.control.abort_capture().await?;
            return Err(AppError::capture(format!("{}: {}", path.display(), e)));
        }

        Ok(path)
    }

    /// Transfer a finished capture into `local_dir`
    pub async fn fetch(&self, remote: &Path, local_dir: &Path) -> Result<PathBuf> {
        let file_name = remote
            .file_name()
            .ok_or_else(|| AppError::capture(format!("Capture path {} has no file name", remote.display())))?;
        let local = local_dir.join(file_name);
        if local != remote {
            self.control.fetch(remote, &local).await?;
        }
        Ok(local)
    }
}
