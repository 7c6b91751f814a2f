//! Roam Timing Tester
//!
//! Forces wireless stations to roam between access points by ramping
//! programmable RF attenuators, detects each roam from station telemetry and
//! measures the roam latency from the 802.11 management frames in a packet
//! capture taken around the ramp.

pub mod attenuator;
pub mod capture;
pub mod cli;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod models;
pub mod output;
pub mod station;
pub mod stats;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{AppError, Result};
pub use models::{Config, FailReason, RoamAttempt, Verdict};
pub use attenuator::{AttenuationController, AttenuatorChannel, RampSchedule};
pub use capture::{CaptureControl, CaptureFrame, CaptureSession, FrameAnalyzer};
pub use engine::{RoamIterationEngine, RoamTest, RoamTimingCalculator};
pub use station::{RoamAssist, StationObserver, StationTelemetry};
pub use stats::{AggregateCounters, ResultAggregator, RunSummary};
pub use output::{ColoredFormatter, OutputCoordinator, OutputFormatter, PlainFormatter, ReportWriter};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const DEFAULT_MANAGER_URL: &str = "http://localhost:8080";
    pub const DEFAULT_ITERATIONS: u32 = 2;
    /// Attenuation values are deci-dB
    pub const DEFAULT_STEP: u16 = 100;
    pub const DEFAULT_MAX_ATTENUATION: u16 = 950;
    pub const MAX_SUPPORTED_ATTENUATION: u16 = 955;
    pub const DEFAULT_WAIT_TIME: Duration = Duration::from_secs(10);
    pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_secs(5);
    pub const DEFAULT_CONVERGENCE_ATTEMPTS: u32 = 3;
    pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
    pub const DEFAULT_THRESHOLD: Duration = Duration::from_millis(50);
    pub const DEFAULT_SCAN_FREQUENCIES: &[u32] = &[5180, 5300];
    pub const DEFAULT_SNIFF_RADIO: &str = "1.1.wiphy1";
    pub const DEFAULT_MONITOR_NAME: &str = "moni0a";
    pub const DEFAULT_SNIFF_CHANNEL: &str = "36";
    pub const DEFAULT_CAPTURE_DIR: &str = "captures";
    pub const DEFAULT_OUTPUT_DIR: &str = "roam-report";
    /// Between a scan trigger and the roam command
    pub const DEFAULT_ASSIST_GAP: Duration = Duration::from_secs(2);
    pub const DEFAULT_SNIFFER_STOP_ATTEMPTS: u32 = 20;
    pub const DEFAULT_SNIFFER_STOP_INTERVAL: Duration = Duration::from_millis(250);
    pub const DEFAULT_ENABLE_COLOR: bool = true;
}
