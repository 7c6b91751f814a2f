//! Station observation and roam assistance

use crate::error::{AppError, Result};
use crate::types::{MacAddr, StationId};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Station attributes the engine reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationField {
    Bssid,
    Signal,
    Ip,
    Mac,
}

impl StationField {
    /// Field name in the manager's port query
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bssid => "ap",
            Self::Signal => "signal",
            Self::Ip => "ip",
            Self::Mac => "mac",
        }
    }
}

impl fmt::Display for StationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of per-station telemetry
#[async_trait]
pub trait StationTelemetry: Send + Sync {
    /// Current raw value of `field`. `Ok(None)` means the station no longer exists.
    async fn query(&self, station: &StationId, field: StationField) -> Result<Option<String>>;
}

/// Best-effort driver commands used to converge stations before a ramp
#[async_trait]
pub trait RoamAssist: Send + Sync {
    async fn scan_trigger(&self, station: &StationId, frequencies: &[u32]) -> Result<()>;

    /// Send a raw roam command (`roam <bssid>` or `ft_ds <bssid>`)
    async fn roam_command(&self, station: &StationId, command: &str) -> Result<()>;
}

/// Outcome of one station read
#[derive(Debug, Clone)]
pub enum ReadOutcome<T> {
    Value(T),
    /// Station has no record any more; it has been removed from the test
    Vanished,
    /// Query failed or timed out; skip the station for this poll
    Failed(AppError),
}

impl<T> ReadOutcome<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }

    fn map<U>(self, f: impl FnOnce(T) -> U) -> ReadOutcome<U> {
        match self {
            Self::Value(v) => ReadOutcome::Value(f(v)),
            Self::Vanished => ReadOutcome::Vanished,
            Self::Failed(e) => ReadOutcome::Failed(e),
        }
    }
}

/// Reads station state with per-query timeouts and tracks vanished stations
pub struct StationObserver {
    telemetry: Arc<dyn StationTelemetry>,
    query_timeout: Duration,
    removed: RwLock<BTreeSet<StationId>>,
}

impl StationObserver {
    pub fn new(telemetry: Arc<dyn StationTelemetry>, query_timeout: Duration) -> Self {
        Self {
            telemetry,
            query_timeout,
            removed: RwLock::new(BTreeSet::new()),
        }
    }

    /// Raw field read. Removed stations are not queried again.
    pub async fn read(&self, station: &StationId, field: StationField) -> ReadOutcome<String> {
        if self.is_removed(station).await {
            return ReadOutcome::Vanished;
        }

        match tokio::time::timeout(self.query_timeout, self.telemetry.query(station, field)).await {
            Ok(Ok(Some(value))) => ReadOutcome::Value(value),
            Ok(Ok(None)) => {
                self.removed.write().await.insert(station.clone());
                ReadOutcome::Vanished
            }
            Ok(Err(e)) => ReadOutcome::Failed(e),
            Err(_) => ReadOutcome::Failed(AppError::timeout(format!(
                "{} query for {} exceeded {:?}",
                field, station, self.query_timeout
            ))),
        }
    }

    /// Canonical BSSID, `None` when not associated
    pub async fn read_bssid(&self, station: &StationId) -> ReadOutcome<Option<MacAddr>> {
        self.read(station, StationField::Bssid).await.map(|raw| raw.parse().ok())
    }

    pub async fn read_mac(&self, station: &StationId) -> ReadOutcome<Option<MacAddr>> {
        self.read(station, StationField::Mac).await.map(|raw| raw.parse().ok())
    }

    /// Signal in dBm (`-45 dBm` and `-45` are both accepted)
    pub async fn read_signal(&self, station: &StationId) -> ReadOutcome<Option<i32>> {
        self.read(station, StationField::Signal).await.map(|raw| parse_signal(&raw))
    }

    pub async fn read_ip(&self, station: &StationId) -> ReadOutcome<Option<String>> {
        self.read(station, StationField::Ip).await.map(|raw| {
            let ip = raw.trim();
            (!ip.is_empty() && ip != "0.0.0.0").then(|| ip.to_string())
        })
    }

    /// Read every station's BSSID concurrently; returns once all reads finished
    pub async fn poll_bssids(&self, stations: &[StationId]) -> BTreeMap<StationId, ReadOutcome<Option<MacAddr>>> {
        let reads = stations.iter().map(|sta| async move { (sta.clone(), self.read_bssid(sta).await) });
        join_all(reads).await.into_iter().collect()
    }

    pub async fn poll_signals(&self, stations: &[StationId]) -> BTreeMap<StationId, ReadOutcome<Option<i32>>> {
        let reads = stations.iter().map(|sta| async move { (sta.clone(), self.read_signal(sta).await) });
        join_all(reads).await.into_iter().collect()
    }

    pub async fn poll_macs(&self, stations: &[StationId]) -> BTreeMap<StationId, ReadOutcome<Option<MacAddr>>> {
        let reads = stations.iter().map(|sta| async move { (sta.clone(), self.read_mac(sta).await) });
        join_all(reads).await.into_iter().collect()
    }

    pub async fn is_removed(&self, station: &StationId) -> bool {
        self.removed.read().await.contains(station)
    }

    /// Stations from `stations` that have not been removed
    pub async fn active_stations(&self, stations: &[StationId]) -> Vec<StationId> {
        let removed = self.removed.read().await;
        stations.iter().filter(|s| !removed.contains(*s)).cloned().collect()
    }
}

fn parse_signal(raw: &str) -> Option<i32> {
    raw.split_whitespace().next()?.parse().ok()
}
