//! Result aggregation for roam test runs

use crate::models::RoamAttempt;
use crate::types::{MacAddr, StationId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attempt counters for one station or one BSSID
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCounters {
    pub attempted: u32,
    pub succeeded: u32,
    pub failed: u32,
}

impl AggregateCounters {
    fn count(&mut self, passed: bool) {
        self.attempted += 1;
        if passed {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
    }

    /// Pass rate in percent, 0 when nothing was attempted
    pub fn pass_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.succeeded as f64 / self.attempted as f64 * 100.0
        }
    }
}

/// Distribution of the measured latencies of passing attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyStats {
    pub count: usize,
    pub min_ms: f64,
    pub avg_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub std_dev_ms: f64,
}

impl LatencyStats {
    /// `None` for an empty sample
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let count = sorted.len();
        let avg = sorted.iter().sum::<f64>() / count as f64;
        let variance = sorted.iter().map(|x| (x - avg).powi(2)).sum::<f64>() / count as f64;

        Some(Self {
            count,
            min_ms: sorted[0],
            avg_ms: avg,
            max_ms: sorted[count - 1],
            p50_ms: percentile(&sorted, 50.0),
            p95_ms: percentile(&sorted, 95.0),
            std_dev_ms: variance.sqrt(),
        })
    }
}

/// Linear interpolation between closest ranks
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }

    let index = (p / 100.0) * (sorted.len() as f64 - 1.0);
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let weight = index - lower as f64;
        sorted[lower] + weight * (sorted[upper] - sorted[lower])
    }
}

/// Totals of a run, by station and by BSSID
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub by_station: BTreeMap<StationId, AggregateCounters>,
    pub by_bssid: BTreeMap<MacAddr, AggregateCounters>,
    pub totals: AggregateCounters,
    /// Failure reasons and how often they occurred
    pub failure_reasons: BTreeMap<String, u32>,
    pub latency: Option<LatencyStats>,
}

impl RunSummary {
    pub fn pass_rate(&self) -> f64 {
        self.totals.pass_rate()
    }
}

/// Keyed counters for a run.
///
/// Stations and BSSIDs are registered up front so that an entity with no
/// attempts still shows up with zero counters.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    by_station: BTreeMap<StationId, AggregateCounters>,
    by_bssid: BTreeMap<MacAddr, AggregateCounters>,
    totals: AggregateCounters,
    failure_reasons: BTreeMap<String, u32>,
    latencies: Vec<f64>,
}

impl ResultAggregator {
    pub fn new(stations: &[StationId], bssids: &[MacAddr]) -> Self {
        Self {
            by_station: stations.iter().map(|s| (s.clone(), AggregateCounters::default())).collect(),
            by_bssid: bssids.iter().map(|b| (*b, AggregateCounters::default())).collect(),
            ..Default::default()
        }
    }

    /// Count one finalized attempt. BSSIDs outside the configured set are not tracked.
    pub fn record(&mut self, attempt: &RoamAttempt) {
        let passed = attempt.is_pass();

        self.by_station.entry(attempt.station.clone()).or_default().count(passed);
        if let Some(counters) = self.by_bssid.get_mut(&attempt.bssid_after) {
            counters.count(passed);
        }
        self.totals.count(passed);

        match attempt.verdict.fail_reason() {
            Some(reason) => *self.failure_reasons.entry(reason.to_string()).or_default() += 1,
            None => {
                if let Some(latency) = attempt.latency_ms {
                    self.latencies.push(latency);
                }
            }
        }
    }

    pub fn station(&self, station: &StationId) -> Option<&AggregateCounters> {
        self.by_station.get(station)
    }

    pub fn bssid(&self, bssid: &MacAddr) -> Option<&AggregateCounters> {
        self.by_bssid.get(bssid)
    }

    pub fn summarize(&self) -> RunSummary {
        RunSummary {
            by_station: self.by_station.clone(),
            by_bssid: self.by_bssid.clone(),
            totals: self.totals,
            failure_reasons: self.failure_reasons.clone(),
            latency: LatencyStats::from_samples(&self.latencies),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailReason, TransitionPair, Verdict};

    fn ap(last: u8) -> MacAddr {
        MacAddr::new([0x94, 0xa6, 0x7e, 0x54, 0xd4, last])
    }

    fn attempt(station: &StationId, iteration: u32, after: MacAddr, verdict: Verdict, latency: Option<f64>) -> RoamAttempt {
        let mut a = RoamAttempt::new(iteration, TransitionPair { from: 0, to: 1 }, station.clone(), ap(0x31));
        a.bssid_after = after;
        a.roamed = after != ap(0x31);
        a.verdict = verdict;
        a.latency_ms = latency;
        a
    }

    #[test]
    fn test_three_stations_four_iterations() {
        let stations: Vec<StationId> = (0..3).map(|i| StationId::new(1, 1, format!("sta000{}", i))).collect();
        let mut aggregator = ResultAggregator::new(&stations, &[ap(0x31), ap(0x33)]);

        for iteration in 1..=4 {
            for station in &stations {
                aggregator.record(&attempt(station, iteration, ap(0x33), Verdict::Pass, Some(20.0)));
            }
        }

        let first = aggregator.summarize();
        assert_eq!(first.totals.attempted, 12);
        assert_eq!(first.totals.succeeded, 12);
        for station in &stations {
            assert_eq!(first.by_station[station].attempted, 4);
        }
        assert_eq!(first.by_bssid[&ap(0x33)].attempted, 12);
        assert_eq!(first.by_bssid[&ap(0x31)].attempted, 0);

        // summarizing has no side effects
        assert_eq!(aggregator.summarize(), first);
        assert_eq!(aggregator.summarize().totals.attempted, 12);
    }

    #[test]
    fn test_failures_are_counted_by_reason() {
        let station = StationId::new(1, 1, "sta0000");
        let mut aggregator = ResultAggregator::new(std::slice::from_ref(&station), &[ap(0x31), ap(0x33)]);

        aggregator.record(&attempt(&station, 1, ap(0x33), Verdict::Pass, Some(35.0)));
        aggregator.record(&attempt(&station, 2, ap(0x31), Verdict::Fail(FailReason::NoRoam), None));
        aggregator.record(&attempt(&station, 3, ap(0x33), Verdict::Fail(FailReason::ThresholdExceeded), Some(70.0)));

        let summary = aggregator.summarize();
        assert_eq!(summary.by_station[&station], AggregateCounters { attempted: 3, succeeded: 1, failed: 2 });
        assert_eq!(summary.failure_reasons["no roam occurred"], 1);
        assert_eq!(summary.failure_reasons["Roam time exceeded threshold"], 1);
        // only passing latencies enter the distribution
        assert_eq!(summary.latency.as_ref().map(|l| l.count), Some(1));
        assert!((summary.pass_rate() - 100.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_unexpected_bssid_is_not_tracked() {
        let station = StationId::new(1, 1, "sta0000");
        let mut aggregator = ResultAggregator::new(std::slice::from_ref(&station), &[ap(0x31), ap(0x33)]);

        aggregator.record(&attempt(
            &station,
            1,
            ap(0x99),
            Verdict::Fail(FailReason::BssidMismatch { inner: None }),
            None,
        ));

        let summary = aggregator.summarize();
        assert!(!summary.by_bssid.contains_key(&ap(0x99)));
        assert_eq!(summary.totals.failed, 1);
    }

    #[test]
    fn test_latency_stats() {
        let stats = LatencyStats::from_samples(&[40.0, 10.0, 30.0, 20.0]).unwrap();
        assert_eq!(stats.count, 4);
        assert_eq!(stats.min_ms, 10.0);
        assert_eq!(stats.max_ms, 40.0);
        assert_eq!(stats.avg_ms, 25.0);
        assert_eq!(stats.p50_ms, 25.0);
        assert!(LatencyStats::from_samples(&[]).is_none());
    }

    #[test]
    fn test_empty_pass_rate() {
        assert_eq!(AggregateCounters::default().pass_rate(), 0.0);
    }
}
