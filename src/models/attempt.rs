//! Roam attempt records and verdicts

use crate::types::{MacAddr, StationId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Why an attempt did not pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FailReason {
    /// BSSID never changed during the ramp
    NoRoam,
    /// No reassociation response for the station in the capture (or no capture)
    NoReassociation,
    /// Only rejecting reassociation responses were captured
    ReassociationRejected { status: u16 },
    /// Successful reassociation without a matching authentication frame
    AuthFail,
    /// Reassociation captured before authentication
    TimestampInversion,
    ThresholdExceeded,
    /// Landing BSSID outside the pair, or roamed stations landed apart.
    /// Keeps the latency verdict it overrides, if that was a failure.
    BssidMismatch { inner: Option<Box<FailReason>> },
    /// Station answered telemetry without an association at the BEFORE snapshot
    NotAssociated,
    /// Station vanished from telemetry after the BEFORE snapshot
    StationLost,
    /// Attenuator rejected a value mid-iteration
    IterationAborted { detail: String },
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRoam => write!(f, "no roam occurred"),
            Self::NoReassociation => write!(f, "No Reassociation"),
            Self::ReassociationRejected { status } => write!(f, "Reassociation failure (status {})", status),
            Self::AuthFail => write!(f, "Auth Fail"),
            Self::TimestampInversion => write!(f, "timestamp inversion"),
            Self::ThresholdExceeded => write!(f, "Roam time exceeded threshold"),
            Self::BssidMismatch { inner: Some(inner) } => write!(f, "bssid mismatch ({})", inner),
            Self::BssidMismatch { inner: None } => write!(f, "bssid mismatch"),
            Self::NotAssociated => write!(f, "station not associated"),
            Self::StationLost => write!(f, "station lost"),
            Self::IterationAborted { detail } => write!(f, "iteration aborted: {}", detail),
        }
    }
}

/// Final classification of one attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "detail", rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail(FailReason),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    pub fn fail_reason(&self) -> Option<&FailReason> {
        match self {
            Self::Pass => None,
            Self::Fail(reason) => Some(reason),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail(reason) => write!(f, "FAIL: {}", reason),
        }
    }
}

/// A directed transition between two module groups (`from` is attenuated away)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPair {
    pub from: usize,
    pub to: usize,
}

impl fmt::Display for TransitionPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}->g{}", self.from, self.to)
    }
}

/// One (iteration, pair, station) roam attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoamAttempt {
    pub iteration: u32,
    pub pair: TransitionPair,
    pub station: StationId,
    pub station_mac: Option<MacAddr>,
    pub bssid_before: MacAddr,
    pub bssid_after: MacAddr,
    pub roamed: bool,
    pub latency_ms: Option<f64>,
    /// Capture record time, seconds since the epoch
    pub auth_time_s: Option<f64>,
    pub reassoc_time_s: Option<f64>,
    pub signal_dbm: Option<i32>,
    pub verdict: Verdict,
    pub capture_file: Option<PathBuf>,
}

impl RoamAttempt {
    /// Attempt with no roam observed and nothing measured yet
    pub fn new(iteration: u32, pair: TransitionPair, station: StationId, bssid_before: MacAddr) -> Self {
        Self {
            iteration,
            pair,
            station,
            station_mac: None,
            bssid_before,
            bssid_after: bssid_before,
            roamed: false,
            latency_ms: None,
            auth_time_s: None,
            reassoc_time_s: None,
            signal_dbm: None,
            verdict: Verdict::Fail(FailReason::NoRoam),
            capture_file: None,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.verdict.is_pass()
    }
}
