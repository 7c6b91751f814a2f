//! Shared fakes for integration tests
//!
//! `FakeLab` plays the test manager: attenuators, stations whose association
//! follows the attenuation of their access point, and roam-assist commands.
//! `FakeSniffer` writes a scripted pcap file whenever a capture is stopped.

#![allow(dead_code)]

use async_trait::async_trait;
use roam_timing_tester::{
    attenuator::{AttenuationController, AttenuatorChannel, AttenuatorInfo},
    capture::{CaptureControl, CaptureSession},
    engine::{EngineSettings, RoamIterationEngine, RoamTest},
    error::{AppError, Result},
    logging::RoamEventLogger,
    models::Config,
    station::{RoamAssist, StationField, StationObserver, StationTelemetry},
    types::{ChannelSpec, MacAddr, ModuleId, StationId},
    utils::BoundedPoll,
};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const SERIAL: &str = "1.1.3034";
pub const BSSID_G0: &str = "94:a6:7e:54:d4:31";
pub const BSSID_G1: &str = "94:a6:7e:54:d4:33";
pub const BSSID_ROGUE: &str = "94:a6:7e:54:d4:35";

pub fn mac(text: &str) -> MacAddr {
    text.parse().unwrap()
}

pub fn station(port: &str) -> StationId {
    StationId::new(1, 1, port)
}

pub fn groups() -> Vec<Vec<ModuleId>> {
    vec![
        vec![ModuleId::new(SERIAL, 0), ModuleId::new(SERIAL, 1)],
        vec![ModuleId::new(SERIAL, 2), ModuleId::new(SERIAL, 3)],
    ]
}

/// A station as the fake manager sees it
#[derive(Debug, Clone)]
pub struct FakeStation {
    pub id: StationId,
    /// MAC exactly as the manager reports it
    pub mac_text: String,
    pub current: Option<MacAddr>,
    /// BSSID reads returned in order before the attenuation model takes over
    pub script: VecDeque<Option<MacAddr>>,
    /// Station disappears once its AP is attenuated to this value
    pub vanish_at: Option<u16>,
    /// Never changes AP on its own
    pub sticky: bool,
    pub vanished: bool,
}

impl FakeStation {
    pub fn new(port: &str, mac_text: &str, on: &str) -> Self {
        Self {
            id: station(port),
            mac_text: mac_text.to_string(),
            current: Some(mac(on)),
            script: VecDeque::new(),
            vanish_at: None,
            sticky: false,
            vanished: false,
        }
    }

    /// Answers telemetry but never associates
    pub fn unassociated(port: &str, mac_text: &str) -> Self {
        Self {
            current: None,
            sticky: true,
            ..Self::new(port, mac_text, BSSID_G0)
        }
    }

    pub fn scripted(mut self, reads: &[&str]) -> Self {
        self.script = reads.iter().map(|b| Some(mac(b))).collect();
        self
    }

    pub fn vanishing_at(mut self, value: u16) -> Self {
        self.vanish_at = Some(value);
        self
    }

    pub fn sticky(mut self) -> Self {
        self.sticky = true;
        self
    }
}

#[derive(Debug, Default)]
struct LabState {
    values: BTreeMap<ModuleId, u16>,
    aps: Vec<(Vec<ModuleId>, MacAddr)>,
    stations: BTreeMap<StationId, FakeStation>,
    attenuators: Vec<AttenuatorInfo>,
    fail_on: Option<(ModuleId, u16)>,
    writes: Vec<(ModuleId, u16)>,
    commands: Vec<(StationId, String)>,
}

impl LabState {
    fn attenuation(&self, group: &[ModuleId]) -> u16 {
        group.iter().map(|m| self.values.get(m).copied().unwrap_or(0)).max().unwrap_or(0)
    }

    fn ap_attenuation(&self, bssid: MacAddr) -> Option<u16> {
        self.aps.iter().find(|(_, b)| *b == bssid).map(|(g, _)| self.attenuation(g))
    }

    /// Association after applying the attenuation model
    fn read_bssid(&mut self, id: &StationId) -> Option<Option<MacAddr>> {
        let strongest = self
            .aps
            .iter()
            .map(|(g, b)| (self.attenuation(g), *b))
            .min_by_key(|(att, _)| *att);
        let current_att = self
            .stations
            .get(id)
            .and_then(|s| s.current)
            .and_then(|b| self.ap_attenuation(b));

        let sta = self.stations.get_mut(id)?;
        if sta.vanished {
            return None;
        }
        if let Some(next) = sta.script.pop_front() {
            return Some(next);
        }
        if let (Some(limit), Some(att)) = (sta.vanish_at, current_att) {
            if att >= limit {
                sta.vanished = true;
                return None;
            }
        }
        if !sta.sticky {
            if let (Some((best_att, best)), Some(att)) = (strongest, current_att) {
                if att > best_att {
                    sta.current = Some(best);
                }
            }
        }
        Some(sta.current)
    }
}

/// In-memory test manager
#[derive(Debug, Default)]
pub struct FakeLab {
    state: Mutex<LabState>,
}

impl FakeLab {
    pub fn new(stations: Vec<FakeStation>) -> Self {
        let groups = groups();
        let state = LabState {
            aps: vec![(groups[0].clone(), mac(BSSID_G0)), (groups[1].clone(), mac(BSSID_G1))],
            stations: stations.into_iter().map(|s| (s.id.clone(), s)).collect(),
            attenuators: vec![AttenuatorInfo {
                serial: SERIAL.to_string(),
                module_count: 4,
                phantom: false,
            }],
            ..Default::default()
        };
        Self { state: Mutex::new(state) }
    }

    pub fn add_attenuator(&self, info: AttenuatorInfo) {
        self.state.lock().unwrap().attenuators.push(info);
    }

    /// Reject the next write of `value` to `module`
    pub fn fail_on(&self, module: ModuleId, value: u16) {
        self.state.lock().unwrap().fail_on = Some((module, value));
    }

    pub fn value(&self, module: &ModuleId) -> Option<u16> {
        self.state.lock().unwrap().values.get(module).copied()
    }

    pub fn writes(&self) -> Vec<(ModuleId, u16)> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn commands(&self) -> Vec<(StationId, String)> {
        self.state.lock().unwrap().commands.clone()
    }
}

#[async_trait]
impl StationTelemetry for FakeLab {
    async fn query(&self, station: &StationId, field: StationField) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        let mac_text = match state.stations.get(station) {
            Some(sta) if !sta.vanished => sta.mac_text.clone(),
            _ => return Ok(None),
        };

        let value = match field {
            StationField::Bssid => match state.read_bssid(station) {
                Some(Some(bssid)) => bssid.to_string(),
                Some(None) => "Not-Associated".to_string(),
                None => return Ok(None),
            },
            StationField::Mac => mac_text,
            StationField::Signal => "-47 dBm".to_string(),
            StationField::Ip => "10.26.1.17".to_string(),
        };
        Ok(Some(value))
    }
}

#[async_trait]
impl AttenuatorChannel for FakeLab {
    async fn set_module(&self, module: &ModuleId, value: u16) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_on.as_ref() == Some(&(module.clone(), value)) {
            state.fail_on = None;
            return Err(AppError::http(format!("set_attenuator {} {} failed", module, value)));
        }
        state.values.insert(module.clone(), value);
        state.writes.push((module.clone(), value));
        Ok(())
    }

    async fn list_attenuators(&self) -> Result<Vec<AttenuatorInfo>> {
        Ok(self.state.lock().unwrap().attenuators.clone())
    }
}

#[async_trait]
impl RoamAssist for FakeLab {
    async fn scan_trigger(&self, station: &StationId, frequencies: &[u32]) -> Result<()> {
        let freqs: Vec<String> = frequencies.iter().map(|f| f.to_string()).collect();
        self.state
            .lock()
            .unwrap()
            .commands
            .push((station.clone(), format!("scan trigger freq {}", freqs.join(" "))));
        Ok(())
    }

    async fn roam_command(&self, station: &StationId, command: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.commands.push((station.clone(), command.to_string()));
        let target = command.split_whitespace().nth(1).and_then(|b| b.parse::<MacAddr>().ok());
        if let (Some(sta), Some(target)) = (state.stations.get_mut(station), target) {
            if !sta.sticky {
                sta.current = Some(target);
            }
        }
        Ok(())
    }
}

/// Timestamped raw 802.11 frame
pub type Packet = (Duration, Vec<u8>);

/// Sniffer that materializes one scripted capture per start/stop cycle
#[derive(Debug, Default)]
pub struct FakeSniffer {
    scripts: Mutex<VecDeque<Vec<Packet>>>,
    running: Mutex<Option<PathBuf>>,
    started: Mutex<Vec<PathBuf>>,
    pub refuse_start: bool,
}

impl FakeSniffer {
    pub fn new(scripts: Vec<Vec<Packet>>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            ..Default::default()
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse_start: true,
            ..Default::default()
        }
    }

    pub fn started(&self) -> Vec<PathBuf> {
        self.started.lock().unwrap().clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().unwrap().is_some()
    }
}

#[async_trait]
impl CaptureControl for FakeSniffer {
    async fn ensure_monitor(&self, _interface: &str, _channel: ChannelSpec) -> Result<()> {
        Ok(())
    }

    async fn start_capture(&self, _interface: &str, output: &Path) -> Result<()> {
        if self.refuse_start {
            return Err(AppError::capture("monitor interface is down"));
        }
        *self.running.lock().unwrap() = Some(output.to_path_buf());
        self.started.lock().unwrap().push(output.to_path_buf());
        Ok(())
    }

    async fn stop_capture(&self) -> Result<()> {
        let path = self.running.lock().unwrap().take();
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or_default();
        if let Some(path) = path {
            std::fs::write(&path, pcap_bytes(&script))?;
        }
        Ok(())
    }

    async fn abort_capture(&self) -> Result<()> {
        self.running.lock().unwrap().take();
        Ok(())
    }

    async fn capture_finished(&self) -> Result<bool> {
        Ok(!self.is_running())
    }

    async fn fetch(&self, remote: &Path, local: &Path) -> Result<()> {
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(remote, local).await?;
        Ok(())
    }
}

/// Temporary lab wiring the engine to the fakes
pub struct Harness {
    pub lab: Arc<FakeLab>,
    pub sniffer: Arc<FakeSniffer>,
    pub config: Config,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(stations: Vec<FakeStation>, sniffer: FakeSniffer) -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config {
            attenuator_groups: groups(),
            bssids: vec![mac(BSSID_G0), mac(BSSID_G1)],
            stations: stations.iter().map(|s| s.id.clone()).collect(),
            iterations: 2,
            step: 100,
            max_attenuation: 950,
            wait_time_seconds: 0,
            settle_time_seconds: 0,
            convergence_attempts: 3,
            threshold_ms: 50,
            capture_dir: dir.path().join("remote"),
            output_dir: dir.path().join("report"),
            enable_color: false,
            ..Config::default()
        };

        Self {
            lab: Arc::new(FakeLab::new(stations)),
            sniffer: Arc::new(sniffer),
            config,
            dir,
        }
    }

    pub fn settings(&self) -> EngineSettings {
        let mut settings = EngineSettings::from_config(&self.config).unwrap();
        settings.assist_gap = Duration::ZERO;
        settings
    }

    pub fn engine(&self) -> RoamIterationEngine {
        let controller = AttenuationController::new(
            self.lab.clone(),
            self.config.attenuator_groups.clone(),
            self.config.step,
            self.config.max_attenuation,
        )
        .unwrap();
        let capture = CaptureSession::new(
            self.sniffer.clone(),
            self.config.capture_dir.clone(),
            BoundedPoll::new(3, Duration::ZERO),
        );

        RoamIterationEngine::new(
            controller,
            StationObserver::new(self.lab.clone(), Duration::from_secs(1)),
            self.lab.clone(),
            capture,
            self.config.bssids.clone(),
            self.settings(),
            RoamEventLogger::new(&self.config),
        )
    }

    pub fn roam_test(&self) -> RoamTest {
        RoamTest::new(self.engine(), &self.config).unwrap()
    }
}

pub fn mgmt_header(subtype: u8, da: MacAddr, sa: MacAddr, bssid: MacAddr) -> Vec<u8> {
    let mut frame = vec![subtype << 4, 0x00, 0x3a, 0x01];
    frame.extend_from_slice(&da.octets());
    frame.extend_from_slice(&sa.octets());
    frame.extend_from_slice(&bssid.octets());
    frame.extend_from_slice(&[0x10, 0x00]);
    frame
}

/// FT authentication request from the station
pub fn ft_auth(sta: MacAddr, ap: MacAddr) -> Vec<u8> {
    let mut frame = mgmt_header(11, ap, sta, ap);
    frame.extend_from_slice(&2u16.to_le_bytes());
    frame.extend_from_slice(&1u16.to_le_bytes());
    frame.extend_from_slice(&0u16.to_le_bytes());
    frame.extend_from_slice(&[54, 3, 0x12, 0x34, 0x01]);
    frame
}

pub fn reassoc_response(sta: MacAddr, ap: MacAddr, status: u16) -> Vec<u8> {
    let mut frame = mgmt_header(3, sta, ap, ap);
    frame.extend_from_slice(&[0x11, 0x01]);
    frame.extend_from_slice(&status.to_le_bytes());
    frame.extend_from_slice(&[0x01, 0xc0]);
    frame.extend_from_slice(&[1, 4, 0x8c, 0x12, 0x98, 0x24]);
    frame.extend_from_slice(&[55, 2, 0x00, 0x00]);
    frame
}

pub fn beacon(ap: MacAddr) -> Vec<u8> {
    let mut frame = mgmt_header(8, MacAddr::BROADCAST, ap, ap);
    frame.extend_from_slice(&[0u8; 12]);
    frame
}

/// Auth at `at`, successful reassociation `latency_ms` later
pub fn roam_frames(sta: MacAddr, ap: MacAddr, at: Duration, latency_ms: u64) -> Vec<Packet> {
    vec![
        (at, ft_auth(sta, ap)),
        (at + Duration::from_millis(latency_ms), reassoc_response(sta, ap, 0)),
    ]
}

/// Capture starting with a beacon at t=0
pub fn capture(ap: MacAddr, roams: Vec<Vec<Packet>>) -> Vec<Packet> {
    let mut packets = vec![(Duration::ZERO, beacon(ap))];
    packets.extend(roams.into_iter().flatten());
    packets
}

/// Classic pcap with the raw 802.11 link type
pub fn pcap_bytes(packets: &[Packet]) -> Vec<u8> {
    let base = Duration::from_secs(1_700_000_000);
    let mut out = Vec::new();
    out.extend_from_slice(&0xa1b2c3d4u32.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&4u16.to_le_bytes());
    out.extend_from_slice(&0i32.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&65535u32.to_le_bytes());
    out.extend_from_slice(&105u32.to_le_bytes());
    for (offset, data) in packets {
        let ts = base + *offset;
        out.extend_from_slice(&(ts.as_secs() as u32).to_le_bytes());
        out.extend_from_slice(&ts.subsec_micros().to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
    }
    out
}
