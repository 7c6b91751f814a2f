//! Roam iteration state machine and run loop
//!
//! One iteration forces every station through one directed transition
//! between two attenuator groups:
//!
//! `BeforeSnapshot -> Ramping -> AfterSnapshot -> CaptureAnalysis -> Classified`
//!
//! The capture runs from the start of the ramp until the after snapshot and is
//! stopped on every exit path of the iteration.

pub mod timing;

pub use timing::{RoamTimingCalculator, TimingInputs, TimingOutcome};

use crate::attenuator::AttenuationController;
use crate::capture::{CaptureSession, FrameAnalyzer};
use crate::error::{AppError, Result};
use crate::logging::RoamEventLogger;
use crate::models::{Config, FailReason, RoamAttempt, TransitionPair, Verdict};
use crate::station::{ReadOutcome, RoamAssist, StationObserver};
use crate::stats::{ResultAggregator, RunSummary};
use crate::types::{AuthAlgorithm, ChannelSpec, MacAddr, ModuleId, RoamMethod, StationId};
use crate::utils::BoundedPoll;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Phase of the iteration currently executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IterationState {
    Idle,
    BeforeSnapshot,
    Ramping,
    AfterSnapshot,
    CaptureAnalysis,
    Classified,
}

/// Timing and capture parameters of the engine
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub wait_time: Duration,
    pub settle_time: Duration,
    pub convergence_attempts: u32,
    /// Gap between a scan trigger and the roam command that follows it
    pub assist_gap: Duration,
    pub scan_frequencies: Vec<u32>,
    pub roam_method: RoamMethod,
    pub monitor_name: String,
    pub channel: ChannelSpec,
    /// Where finished captures are fetched to
    pub report_dir: PathBuf,
    pub threshold: Duration,
    pub auth_algorithm: AuthAlgorithm,
    pub require_ft_element: bool,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            wait_time: config.wait_time(),
            settle_time: config.settle_time(),
            convergence_attempts: config.convergence_attempts,
            assist_gap: crate::defaults::DEFAULT_ASSIST_GAP,
            scan_frequencies: config.scan_frequencies.clone(),
            roam_method: config.roam_method,
            monitor_name: config.monitor_name.clone(),
            channel: config.sniff_channel.parse()?,
            report_dir: config.output_dir.join("captures"),
            threshold: config.threshold(),
            auth_algorithm: AuthAlgorithm::for_roam(&config.security, config.fast_transition),
            require_ft_element: config.fast_transition,
        })
    }
}

/// Directed transitions `g0->g1, g1->g2, ..., g(K-1)->g0`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRing {
    groups: usize,
}

impl TransitionRing {
    pub fn new(groups: usize) -> Result<Self> {
        if groups < 2 {
            return Err(AppError::config(format!(
                "At least two attenuator groups are required, got {}",
                groups
            )));
        }
        Ok(Self { groups })
    }

    /// Pair used by 1-based iteration `k`: ring entry `(k - 1) mod K`
    pub fn pair_for_iteration(&self, iteration: u32) -> TransitionPair {
        let from = iteration.saturating_sub(1) as usize % self.groups;
        self.starting_at(from)
    }

    /// Pair whose near side is `group`
    pub fn starting_at(&self, group: usize) -> TransitionPair {
        let from = group % self.groups;
        TransitionPair {
            from,
            to: (from + 1) % self.groups,
        }
    }
}

/// Everything one iteration produced
#[derive(Debug, Default)]
pub struct IterationOutcome {
    pub attempts: Vec<RoamAttempt>,
    /// Hardware failure that ended the iteration early
    pub aborted: Option<AppError>,
    /// Stations that vanished during this iteration
    pub removed: Vec<StationId>,
    /// Stations reachable but unassociated when the iteration started
    pub not_associated: Vec<StationId>,
    pub capture_file: Option<PathBuf>,
}

/// Executes single roam iterations
pub struct RoamIterationEngine {
    controller: AttenuationController,
    observer: StationObserver,
    assist: Arc<dyn RoamAssist>,
    capture: CaptureSession,
    calculator: RoamTimingCalculator,
    settings: EngineSettings,
    bssids: Vec<MacAddr>,
    macs: BTreeMap<StationId, MacAddr>,
    reported_removed: BTreeSet<StationId>,
    events: RoamEventLogger,
    state: IterationState,
}

impl RoamIterationEngine {
    pub fn new(
        controller: AttenuationController,
        observer: StationObserver,
        assist: Arc<dyn RoamAssist>,
        capture: CaptureSession,
        bssids: Vec<MacAddr>,
        settings: EngineSettings,
        events: RoamEventLogger,
    ) -> Self {
        let calculator = RoamTimingCalculator::new(settings.threshold, settings.auth_algorithm, settings.require_ft_element);
        Self {
            controller,
            observer,
            assist,
            capture,
            calculator,
            settings,
            bssids,
            macs: BTreeMap::new(),
            reported_removed: BTreeSet::new(),
            events,
            state: IterationState::Idle,
        }
    }

    pub fn state(&self) -> IterationState {
        self.state
    }

    pub fn controller(&self) -> &AttenuationController {
        &self.controller
    }

    pub fn observer(&self) -> &StationObserver {
        &self.observer
    }

    /// Baseline every discovered module, then park the ones outside the test.
    ///
    /// A configured module missing from every attenuator is a configuration
    /// error, reported before any value is written.
    pub async fn prepare(&mut self, test_modules: &BTreeSet<ModuleId>) -> Result<()> {
        let discovered = self.controller.discover_modules().await?;
        let present: BTreeSet<&ModuleId> = discovered.iter().collect();
        if let Some(missing) = test_modules.iter().find(|m| !present.contains(m)) {
            return Err(AppError::config(format!(
                "Attenuator module {} was not found on any attenuator",
                missing
            )));
        }

        self.controller.initialize(&discovered).await?;

        let unused: Vec<ModuleId> = discovered.into_iter().filter(|m| !test_modules.contains(m)).collect();
        self.controller.quiesce_unused(&unused).await
    }

    /// The passive set of this iteration becomes the active set of the next
    pub fn finish_transition(&mut self) {
        self.controller.swap_roles();
    }

    /// Pair forced next: the group the swapped roles left un-attenuated is the near side
    pub fn next_pair(&self, ring: &TransitionRing, iteration: u32) -> TransitionPair {
        match self.controller.held_groups() {
            Some((active, _)) => ring.starting_at(active),
            None => ring.pair_for_iteration(iteration),
        }
    }

    /// Run one iteration for `stations`.
    ///
    /// Only configuration errors are returned as `Err`; hardware failures end
    /// the iteration with every started station failed as aborted.
    pub async fn run_iteration(
        &mut self,
        iteration: u32,
        pair: TransitionPair,
        stations: &[StationId],
    ) -> Result<IterationOutcome> {
        let near = self.bssid(pair.from)?;
        let far = self.bssid(pair.to)?;
        let from_group = self.group(pair.from)?;
        let to_group = self.group(pair.to)?;

        let mut outcome = IterationOutcome::default();
        let active = self.observer.active_stations(stations).await;
        let correlation_id = self.events.log_iteration_start(iteration, pair, active.len()).await;

        self.state = IterationState::BeforeSnapshot;
        let assigned = if self.controller.holds_roles(&from_group, &to_group) {
            self.controller.rebaseline().await
        } else {
            self.controller.assign_pair(&from_group, &to_group).await
        };
        if let Err(e) = assigned {
            if matches!(e, AppError::Config(_)) {
                self.state = IterationState::Idle;
                return Err(e);
            }
            self.events.log_iteration_aborted(iteration, &e).await;
            outcome.aborted = Some(e);
            self.state = IterationState::Classified;
            self.events.log_iteration_end(&correlation_id, iteration, 0, 0).await;
            return Ok(outcome);
        }

        let mut before = self.snapshot(&active, &mut outcome).await;
        if before.len() > 1 && before.values().any(|b| *b != near) {
            before = self.converge(near, before, &mut outcome).await;
        }
        self.resolve_macs(&mut before, &mut outcome).await;

        self.state = IterationState::Ramping;
        let capture_name = format!("iteration_{}_g{}-g{}", iteration, pair.from, pair.to);
        let started = match self
            .capture
            .start(&self.settings.monitor_name, self.settings.channel, &capture_name)
            .await
        {
            Ok(path) => {
                self.events.log_capture("started", &path).await;
                Some(path)
            }
            Err(e) => {
                self.events.log_capture_failed("start", &e).await;
                None
            }
        };

        let (after, lost, abort) = self.ramp(&before, &mut outcome).await;

        self.state = IterationState::AfterSnapshot;
        let roamed: Vec<StationId> = after.keys().filter(|s| !lost.contains(*s)).cloned().collect();
        let signals = if abort.is_none() {
            self.observer.poll_signals(&roamed).await
        } else {
            BTreeMap::new()
        };
        outcome.capture_file = self.finish_capture(started).await;
        self.fail_unassociated(iteration, pair, &mut outcome).await;

        if let Some(error) = abort {
            self.events.log_iteration_aborted(iteration, &error).await;
            for (station, bssid_before) in &before {
                let mut attempt = self.attempt(iteration, pair, station, *bssid_before, &outcome);
                if let Some(landed) = after.get(station) {
                    attempt.bssid_after = *landed;
                    attempt.roamed = true;
                }
                attempt.verdict = Verdict::Fail(FailReason::IterationAborted { detail: error.to_string() });
                self.events.log_verdict(&attempt).await;
                outcome.attempts.push(attempt);
            }
            outcome.aborted = Some(error);
            self.state = IterationState::Classified;
            self.events.log_iteration_end(&correlation_id, iteration, 0, outcome.attempts.len()).await;
            return Ok(outcome);
        }

        self.state = IterationState::CaptureAnalysis;
        let analyzer = match &outcome.capture_file {
            Some(path) => match FrameAnalyzer::from_pcap_file(path) {
                Ok(analyzer) => Some(analyzer),
                Err(e) => {
                    self.events.log_capture_failed("analysis", &e).await;
                    None
                }
            },
            None => None,
        };

        let landings: BTreeSet<MacAddr> = roamed.iter().filter_map(|s| after.get(s)).copied().collect();
        let landing_consensus = landings.len() <= 1;

        for (station, bssid_before) in &before {
            let mut attempt = self.attempt(iteration, pair, station, *bssid_before, &outcome);

            if lost.contains(station) {
                attempt.verdict = Verdict::Fail(FailReason::StationLost);
            } else {
                let bssid_after = after.get(station).copied().unwrap_or(*bssid_before);
                attempt.bssid_after = bssid_after;
                attempt.roamed = bssid_after != *bssid_before;
                attempt.signal_dbm = match signals.get(station) {
                    Some(ReadOutcome::Value(signal)) => *signal,
                    _ => None,
                };

                let timing = self.calculator.classify(&TimingInputs {
                    before: *bssid_before,
                    after: bssid_after,
                    station_mac: attempt.station_mac,
                    expected: [near, far],
                    landing_consensus,
                    frames: analyzer.as_ref(),
                });
                attempt.verdict = timing.verdict;
                attempt.latency_ms = timing.latency_ms;
                attempt.auth_time_s = timing.auth_time.map(|t| t.as_secs_f64());
                attempt.reassoc_time_s = timing.reassoc_time.map(|t| t.as_secs_f64());
            }

            self.events.log_verdict(&attempt).await;
            outcome.attempts.push(attempt);
        }

        self.state = IterationState::Classified;
        let passed = outcome.attempts.iter().filter(|a| a.is_pass()).count();
        self.events
            .log_iteration_end(&correlation_id, iteration, passed, outcome.attempts.len())
            .await;
        Ok(outcome)
    }

    fn bssid(&self, group: usize) -> Result<MacAddr> {
        self.bssids.get(group).copied().ok_or_else(|| {
            AppError::config(format!("No BSSID configured for attenuator group {}", group))
        })
    }

    fn group(&self, group: usize) -> Result<Vec<ModuleId>> {
        self.controller
            .groups()
            .get(group)
            .cloned()
            .ok_or_else(|| AppError::config(format!("Attenuator group {} does not exist", group)))
    }

    fn attempt(
        &self,
        iteration: u32,
        pair: TransitionPair,
        station: &StationId,
        bssid_before: MacAddr,
        outcome: &IterationOutcome,
    ) -> RoamAttempt {
        let mut attempt = RoamAttempt::new(iteration, pair, station.clone(), bssid_before);
        attempt.station_mac = self.macs.get(station).copied();
        attempt.capture_file = outcome.capture_file.clone();
        attempt
    }

    async fn report_removed(&mut self, station: &StationId, outcome: &mut IterationOutcome) {
        if self.reported_removed.insert(station.clone()) {
            self.events.log_station_removed(station).await;
            outcome.removed.push(station.clone());
        }
    }

    /// Associated stations and their BSSIDs; everything else sits this iteration out
    async fn snapshot(&mut self, stations: &[StationId], outcome: &mut IterationOutcome) -> BTreeMap<StationId, MacAddr> {
        let mut before = BTreeMap::new();
        for (station, read) in self.observer.poll_bssids(stations).await {
            match read {
                ReadOutcome::Value(Some(bssid)) => {
                    self.events.log_snapshot("before", &station, Some(bssid)).await;
                    before.insert(station, bssid);
                }
                ReadOutcome::Value(None) => {
                    self.events.log_snapshot("before", &station, None).await;
                    if !outcome.not_associated.contains(&station) {
                        outcome.not_associated.push(station);
                    }
                }
                ReadOutcome::Vanished => self.report_removed(&station, outcome).await,
                ReadOutcome::Failed(e) => self.events.log_station_skipped(&station, &e).await,
            }
        }
        before
    }

    /// Stations with no association at the start of the iteration still count as attempts
    async fn fail_unassociated(&mut self, iteration: u32, pair: TransitionPair, outcome: &mut IterationOutcome) {
        let stations = outcome.not_associated.clone();
        for station in &stations {
            let mut attempt = self.attempt(iteration, pair, station, MacAddr::UNSPECIFIED, outcome);
            attempt.verdict = Verdict::Fail(FailReason::NotAssociated);
            self.events.log_verdict(&attempt).await;
            outcome.attempts.push(attempt);
        }
    }

    /// Nudge stations onto `target`, re-checking after each settle period
    async fn converge(
        &mut self,
        target: MacAddr,
        before: BTreeMap<StationId, MacAddr>,
        outcome: &mut IterationOutcome,
    ) -> BTreeMap<StationId, MacAddr> {
        let participants: Vec<StationId> = before.keys().cloned().collect();
        let initial_off: Vec<StationId> = before
            .iter()
            .filter(|(_, bssid)| **bssid != target)
            .map(|(station, _)| station.clone())
            .collect();

        let rounds = self.settings.convergence_attempts;
        let poll = BoundedPoll::new(rounds + 1, self.settings.settle_time);
        let observer = &self.observer;
        let assist = self.assist.as_ref();
        let settings = &self.settings;
        let events = &self.events;
        let participants_ref = &participants;
        let initial_ref = &initial_off;

        let converged = poll
            .until("station convergence", move |attempt| async move {
                let off = if attempt == 1 {
                    initial_ref.clone()
                } else {
                    off_target(&observer.poll_bssids(participants_ref).await, target)
                };
                if off.is_empty() {
                    return Some(());
                }
                if attempt <= rounds {
                    for station in &off {
                        request_roam(assist, settings, events, station, target).await;
                    }
                }
                None
            })
            .await
            .is_ok();

        let refreshed = self.snapshot(&participants, outcome).await;
        let off = refreshed.values().filter(|b| **b != target).count();
        self.events.log_convergence(target, converged, off).await;
        refreshed
    }

    /// Fill the MAC cache; stations without a usable MAC sit this iteration out
    async fn resolve_macs(&mut self, before: &mut BTreeMap<StationId, MacAddr>, outcome: &mut IterationOutcome) {
        let unknown: Vec<StationId> = before.keys().filter(|s| !self.macs.contains_key(*s)).cloned().collect();
        if unknown.is_empty() {
            return;
        }

        for (station, read) in self.observer.poll_macs(&unknown).await {
            match read {
                ReadOutcome::Value(Some(mac)) => {
                    self.macs.insert(station, mac);
                }
                ReadOutcome::Value(None) => {
                    let error = AppError::telemetry(format!("{} reported no usable MAC address", station));
                    self.events.log_station_skipped(&station, &error).await;
                    before.remove(&station);
                }
                ReadOutcome::Vanished => {
                    self.report_removed(&station, outcome).await;
                    before.remove(&station);
                }
                ReadOutcome::Failed(e) => {
                    self.events.log_station_skipped(&station, &e).await;
                    before.remove(&station);
                }
            }
        }
    }

    /// Walk the schedule; the first BSSID differing from BEFORE is kept
    async fn ramp(
        &mut self,
        before: &BTreeMap<StationId, MacAddr>,
        outcome: &mut IterationOutcome,
    ) -> (BTreeMap<StationId, MacAddr>, BTreeSet<StationId>, Option<AppError>) {
        let mut after = BTreeMap::new();
        let mut lost = BTreeSet::new();

        for i in 0..self.controller.schedule().len() {
            if let Err(e) = self.controller.step(i).await {
                return (after, lost, Some(e));
            }
            if let Some((up, down)) = self.controller.schedule().at(i) {
                self.events.log_step(i, up, down).await;
            }

            tokio::time::sleep(self.settings.wait_time).await;

            let pending: Vec<StationId> = before
                .keys()
                .filter(|s| !after.contains_key(*s) && !lost.contains(*s))
                .cloned()
                .collect();
            if pending.is_empty() {
                continue;
            }

            for (station, read) in self.observer.poll_bssids(&pending).await {
                match read {
                    ReadOutcome::Value(Some(bssid)) => {
                        if let Some(&previous) = before.get(&station) {
                            if bssid != previous {
                                self.events.log_transition(&station, previous, bssid, i).await;
                                after.insert(station, bssid);
                            }
                        }
                    }
                    // mid-roam; keep waiting
                    ReadOutcome::Value(None) => {}
                    ReadOutcome::Vanished => {
                        self.report_removed(&station, outcome).await;
                        lost.insert(station);
                    }
                    ReadOutcome::Failed(e) => self.events.log_station_skipped(&station, &e).await,
                }
            }
        }

        (after, lost, None)
    }

    async fn finish_capture(&mut self, started: Option<PathBuf>) -> Option<PathBuf> {
        if started.is_none() {
            return None;
        }

        let remote = match self.capture.stop().await {
            Ok(path) => path,
            Err(e) => {
                self.events.log_capture_failed("stop", &e).await;
                return None;
            }
        };
        self.events.log_capture("stopped", &remote).await;

        match self.capture.fetch(&remote, &self.settings.report_dir).await {
            Ok(local) => {
                self.events.log_capture("fetched", &local).await;
                Some(local)
            }
            Err(e) => {
                self.events.log_capture_failed("fetch", &e).await;
                None
            }
        }
    }
}

fn off_target(reads: &BTreeMap<StationId, ReadOutcome<Option<MacAddr>>>, target: MacAddr) -> Vec<StationId> {
    reads
        .iter()
        .filter(|(_, read)| !matches!(read, ReadOutcome::Value(Some(b)) if *b == target))
        .map(|(station, _)| station.clone())
        .collect()
}

/// Best effort: scan, then ask the driver to roam to `target`
async fn request_roam(
    assist: &dyn RoamAssist,
    settings: &EngineSettings,
    events: &RoamEventLogger,
    station: &StationId,
    target: MacAddr,
) {
    if let Err(e) = assist.scan_trigger(station, &settings.scan_frequencies).await {
        events.log_station_skipped(station, &e).await;
    }
    tokio::time::sleep(settings.assist_gap).await;
    if let Err(e) = assist.roam_command(station, &settings.roam_method.command(&target)).await {
        events.log_station_skipped(station, &e).await;
    }
}

/// Results of a complete run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub iterations_requested: u32,
    pub iterations_completed: u32,
    pub attempts: Vec<RoamAttempt>,
    pub summary: RunSummary,
    /// Iteration number and reason, for iterations ended by a hardware failure
    pub aborted_iterations: Vec<(u32, String)>,
    pub removed_stations: Vec<StationId>,
    pub cancelled: bool,
}

impl RunReport {
    pub fn pass_rate(&self) -> f64 {
        self.summary.pass_rate()
    }

    /// Every attempt passed and the run was not cut short
    pub fn all_passed(&self) -> bool {
        !self.cancelled && self.summary.totals.attempted > 0 && self.summary.totals.failed == 0
    }
}

/// Runs the configured number of iterations around the transition ring
pub struct RoamTest {
    engine: RoamIterationEngine,
    stations: Vec<StationId>,
    test_modules: BTreeSet<ModuleId>,
    iterations: u32,
    ring: TransitionRing,
    aggregator: ResultAggregator,
    cancel: Arc<AtomicBool>,
}

impl RoamTest {
    pub fn new(engine: RoamIterationEngine, config: &Config) -> Result<Self> {
        let ring = TransitionRing::new(config.attenuator_groups.len())?;
        Ok(Self {
            engine,
            stations: config.stations.clone(),
            test_modules: config.test_modules(),
            iterations: config.iterations,
            ring,
            aggregator: ResultAggregator::new(&config.stations, &config.bssids),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Setting the flag stops the run before the next iteration starts
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn aggregator(&self) -> &ResultAggregator {
        &self.aggregator
    }

    pub async fn run(&mut self) -> Result<RunReport> {
        let started_at = Utc::now();
        self.engine.prepare(&self.test_modules).await?;

        let mut attempts = Vec::new();
        let mut aborted_iterations = Vec::new();
        let mut removed_stations = Vec::new();
        let mut completed = 0;
        let mut cancelled = false;

        for iteration in 1..=self.iterations {
            if self.cancel.load(Ordering::SeqCst) {
                cancelled = true;
                break;
            }

            let pair = self.engine.next_pair(&self.ring, iteration);
            let outcome = self.engine.run_iteration(iteration, pair, &self.stations).await?;

            for attempt in &outcome.attempts {
                self.aggregator.record(attempt);
            }
            if let Some(error) = &outcome.aborted {
                aborted_iterations.push((iteration, error.to_string()));
            }
            removed_stations.extend(outcome.removed);
            attempts.extend(outcome.attempts);

            self.engine.finish_transition();
            completed += 1;
        }

        Ok(RunReport {
            started_at,
            finished_at: Utc::now(),
            iterations_requested: self.iterations,
            iterations_completed: completed,
            attempts,
            summary: self.aggregator.summarize(),
            aborted_iterations,
            removed_stations,
            cancelled,
        })
    }
}
