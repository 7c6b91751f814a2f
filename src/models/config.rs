//! Configuration data model and validation

use crate::types::{AppError, ChannelSpec, EnterpriseAuth, MacAddr, ModuleId, Result, RoamMethod, SecurityMode, StationId};
use crate::utils::split_list;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the test manager JSON API
    #[serde(default = "default_manager_url")]
    pub manager_url: String,

    /// Attenuator module groups, one per access point, in ring order
    #[serde(default)]
    pub attenuator_groups: Vec<Vec<ModuleId>>,

    /// BSSID served behind each module group (same order as the groups)
    #[serde(default)]
    pub bssids: Vec<MacAddr>,

    /// Stations under test
    #[serde(default)]
    pub stations: Vec<StationId>,

    /// Number of roam iterations (one transition per iteration)
    #[serde(default = "default_iterations")]
    pub iterations: u32,

    /// Ramp step in deci-dB
    #[serde(default = "default_step")]
    pub step: u16,

    /// Maximum attenuation in deci-dB
    #[serde(default = "default_max_attenuation")]
    pub max_attenuation: u16,

    /// Wait after each ramp step before reading stations
    #[serde(default = "default_wait_time_secs")]
    pub wait_time_seconds: u64,

    /// Wait after roam-assist commands before re-checking convergence
    #[serde(default = "default_settle_time_secs")]
    pub settle_time_seconds: u64,

    /// Maximum convergence rounds before the ramp starts regardless
    #[serde(default = "default_convergence_attempts")]
    pub convergence_attempts: u32,

    /// Bound on every single station telemetry query
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_seconds: u64,

    /// Frequencies passed to the scan trigger before a roam-assist command
    #[serde(default = "default_scan_frequencies")]
    pub scan_frequencies: Vec<u32>,

    /// Roam-assist flavour (over the air or over the DS)
    #[serde(default = "default_roam_method")]
    pub roam_method: RoamMethod,

    /// Radio the monitor interface is created on
    #[serde(default = "default_sniff_radio")]
    pub sniff_radio: String,

    /// Monitor interface name
    #[serde(default = "default_monitor_name")]
    pub monitor_name: String,

    /// Monitor channel or frequency
    #[serde(default = "default_sniff_channel")]
    pub sniff_channel: String,

    /// Where the sniffer writes capture files
    #[serde(default = "default_capture_dir")]
    pub capture_dir: PathBuf,

    /// Where fetched captures and the run report are stored
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Station security configuration
    #[serde(default)]
    pub security: SecurityMode,

    /// Stations roam with 802.11r fast transition
    #[serde(default = "default_fast_transition")]
    pub fast_transition: bool,

    /// Roam latency threshold in milliseconds (strictly below passes)
    #[serde(default = "default_threshold_ms")]
    pub threshold_ms: u64,

    /// Enable colored terminal output
    #[serde(default = "default_enable_color")]
    pub enable_color: bool,

    /// Print the report as JSON instead of tables
    #[serde(default)]
    pub json_output: bool,

    /// Enable verbose output
    #[serde(default)]
    pub verbose: bool,

    /// Enable debug output
    #[serde(default)]
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manager_url: default_manager_url(),
            attenuator_groups: Vec::new(),
            bssids: Vec::new(),
            stations: Vec::new(),
            iterations: default_iterations(),
            step: default_step(),
            max_attenuation: default_max_attenuation(),
            wait_time_seconds: default_wait_time_secs(),
            settle_time_seconds: default_settle_time_secs(),
            convergence_attempts: default_convergence_attempts(),
            query_timeout_seconds: default_query_timeout_secs(),
            scan_frequencies: default_scan_frequencies(),
            roam_method: default_roam_method(),
            sniff_radio: default_sniff_radio(),
            monitor_name: default_monitor_name(),
            sniff_channel: default_sniff_channel(),
            capture_dir: default_capture_dir(),
            output_dir: default_output_dir(),
            security: SecurityMode::default(),
            fast_transition: default_fast_transition(),
            threshold_ms: default_threshold_ms(),
            enable_color: default_enable_color(),
            json_output: false,
            verbose: false,
            debug: false,
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(self.wait_time_seconds)
    }

    pub fn settle_time(&self) -> Duration {
        Duration::from_secs(self.settle_time_seconds)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }

    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }

    /// Every module taking part in the test
    pub fn test_modules(&self) -> BTreeSet<ModuleId> {
        self.attenuator_groups.iter().flatten().cloned().collect()
    }

    /// Validate the configuration and return the first error.
    ///
    /// Runs before any hardware is touched; every failure here is fatal.
    pub fn validate(&self) -> Result<()> {
        match url::Url::parse(&self.manager_url) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
            Ok(_) => return Err(AppError::config(format!("Manager URL must use http or https: {}", self.manager_url))),
            Err(e) => return Err(AppError::config(format!("Invalid manager URL '{}': {}", self.manager_url, e))),
        }

        if self.attenuator_groups.len() < 2 {
            return Err(AppError::config(format!(
                "At least two attenuator module groups are required, got {}",
                self.attenuator_groups.len()
            )));
        }

        let mut seen = BTreeSet::new();
        for (i, group) in self.attenuator_groups.iter().enumerate() {
            if group.is_empty() {
                return Err(AppError::config(format!("Attenuator group {} is empty", i)));
            }
            for module in group {
                if !seen.insert(module) {
                    return Err(AppError::config(format!(
                        "Attenuator module {} appears in more than one group",
                        module
                    )));
                }
            }
        }

        if self.bssids.len() != self.attenuator_groups.len() {
            return Err(AppError::config(format!(
                "BSSID list must have one entry per module group ({} groups, {} BSSIDs)",
                self.attenuator_groups.len(),
                self.bssids.len()
            )));
        }

        let distinct: BTreeSet<_> = self.bssids.iter().collect();
        if distinct.len() != self.bssids.len() {
            return Err(AppError::config("BSSID list contains duplicates"));
        }

        if self.stations.is_empty() {
            return Err(AppError::config("At least one station is required"));
        }

        if self.iterations == 0 {
            return Err(AppError::config("Iteration count must be greater than 0"));
        }

        if self.iterations > 10_000 {
            return Err(AppError::config("Iteration count cannot exceed 10000"));
        }

        if self.step == 0 {
            return Err(AppError::config("Attenuation step must be greater than 0"));
        }

        if self.max_attenuation > crate::defaults::MAX_SUPPORTED_ATTENUATION {
            return Err(AppError::config(format!(
                "Maximum attenuation {} exceeds the supported {} deci-dB",
                self.max_attenuation,
                crate::defaults::MAX_SUPPORTED_ATTENUATION
            )));
        }

        if self.step > self.max_attenuation {
            return Err(AppError::config(format!(
                "Attenuation step {} is larger than the maximum {}",
                self.step, self.max_attenuation
            )));
        }

        if self.wait_time_seconds > 300 {
            return Err(AppError::config("Wait time cannot exceed 300 seconds"));
        }

        if self.query_timeout_seconds == 0 || self.query_timeout_seconds > 120 {
            return Err(AppError::config("Query timeout must be between 1 and 120 seconds"));
        }

        if self.threshold_ms == 0 {
            return Err(AppError::config("Roam threshold must be greater than 0 ms"));
        }

        for freq in &self.scan_frequencies {
            if !(2400..=7125).contains(freq) {
                return Err(AppError::config(format!("Invalid scan frequency {} MHz", freq)));
            }
        }

        self.sniff_channel.parse::<ChannelSpec>()?;

        if self.monitor_name.trim().is_empty() {
            return Err(AppError::config("Monitor interface name cannot be empty"));
        }

        if let SecurityMode::Enterprise(auth) = &self.security {
            if auth.identity.trim().is_empty() || auth.eap_method.trim().is_empty() {
                return Err(AppError::config("Enterprise security requires EAP method and identity"));
            }
        }

        Ok(())
    }

    /// Merge `ROAM_*` environment variables into this configuration
    pub fn merge_from_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("ROAM_MANAGER_URL") {
            self.manager_url = url.trim().to_string();
        }

        if let Ok(groups) = std::env::var("ROAM_GROUPS") {
            let serial = std::env::var("ROAM_ATTENUATOR").ok();
            self.attenuator_groups = parse_groups_with_serial(&groups, serial.as_deref().map(str::trim))?;
        }

        if let Ok(bssids) = std::env::var("ROAM_BSSIDS") {
            self.bssids = parse_mac_list(&bssids)?;
        }

        if let Ok(stations) = std::env::var("ROAM_STATIONS") {
            self.stations = parse_station_list(&stations)?;
        }

        if let Ok(value) = std::env::var("ROAM_ITERATIONS") {
            self.iterations = parse_env_number("ROAM_ITERATIONS", &value)?;
        }

        if let Ok(value) = std::env::var("ROAM_STEP") {
            self.step = parse_env_number("ROAM_STEP", &value)?;
        }

        if let Ok(value) = std::env::var("ROAM_MAX_ATTENUATION") {
            self.max_attenuation = parse_env_number("ROAM_MAX_ATTENUATION", &value)?;
        }

        if let Ok(value) = std::env::var("ROAM_WAIT_TIME") {
            self.wait_time_seconds = parse_env_number("ROAM_WAIT_TIME", &value)?;
        }

        if let Ok(value) = std::env::var("ROAM_SETTLE_TIME") {
            self.settle_time_seconds = parse_env_number("ROAM_SETTLE_TIME", &value)?;
        }

        if let Ok(value) = std::env::var("ROAM_CONVERGENCE_ATTEMPTS") {
            self.convergence_attempts = parse_env_number("ROAM_CONVERGENCE_ATTEMPTS", &value)?;
        }

        if let Ok(value) = std::env::var("ROAM_QUERY_TIMEOUT") {
            self.query_timeout_seconds = parse_env_number("ROAM_QUERY_TIMEOUT", &value)?;
        }

        if let Ok(value) = std::env::var("ROAM_SCAN_FREQUENCIES") {
            self.scan_frequencies = parse_frequency_list(&value)?;
        }

        if let Ok(value) = std::env::var("ROAM_METHOD") {
            self.roam_method = value.parse()?;
        }

        if let Ok(value) = std::env::var("ROAM_SNIFF_RADIO") {
            self.sniff_radio = value.trim().to_string();
        }

        if let Ok(value) = std::env::var("ROAM_MONITOR_NAME") {
            self.monitor_name = value.trim().to_string();
        }

        if let Ok(value) = std::env::var("ROAM_SNIFF_CHANNEL") {
            self.sniff_channel = value.trim().to_string();
        }

        if let Ok(value) = std::env::var("ROAM_CAPTURE_DIR") {
            self.capture_dir = PathBuf::from(value.trim());
        }

        if let Ok(value) = std::env::var("ROAM_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(value.trim());
        }

        if let Ok(kind) = std::env::var("ROAM_SECURITY") {
            let enterprise = match (std::env::var("ROAM_EAP_METHOD"), std::env::var("ROAM_EAP_IDENTITY")) {
                (Ok(eap_method), Ok(identity)) => Some(EnterpriseAuth {
                    eap_method,
                    identity,
                    password: std::env::var("ROAM_EAP_PASSWORD").unwrap_or_default(),
                }),
                _ => None,
            };
            self.security = SecurityMode::from_parts(&kind, enterprise)?;
        }

        if let Ok(value) = std::env::var("ROAM_FAST_TRANSITION") {
            self.fast_transition = value.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid ROAM_FAST_TRANSITION value '{}': {}", value, e)))?;
        }

        if let Ok(value) = std::env::var("ROAM_THRESHOLD_MS") {
            self.threshold_ms = parse_env_number("ROAM_THRESHOLD_MS", &value)?;
        }

        if let Ok(value) = std::env::var("ROAM_ENABLE_COLOR") {
            self.enable_color = value.trim().parse()
                .map_err(|e| AppError::config(format!("Invalid ROAM_ENABLE_COLOR value '{}': {}", value, e)))?;
        }

        Ok(())
    }
}

/// Parse module groups: groups separated by `;`, modules by `,`
pub fn parse_groups(value: &str) -> Result<Vec<Vec<ModuleId>>> {
    parse_groups_with_serial(value, None)
}

/// Like [`parse_groups`], but bare module indices (`0,1;2,3`) are taken
/// relative to `serial` when one is given.
pub fn parse_groups_with_serial(value: &str, serial: Option<&str>) -> Result<Vec<Vec<ModuleId>>> {
    value
        .split(';')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(|g| parse_group_with_serial(g, serial))
        .collect()
}

/// Parse one comma separated module group
pub fn parse_group(value: &str) -> Result<Vec<ModuleId>> {
    parse_group_with_serial(value, None)
}

fn parse_group_with_serial(value: &str, serial: Option<&str>) -> Result<Vec<ModuleId>> {
    split_list(value)
        .iter()
        .map(|m| match (serial, m.parse::<u8>()) {
            (Some(serial), Ok(index)) => Ok(ModuleId::new(serial, index)),
            _ => m.parse::<ModuleId>().map_err(|e| AppError::config(e.to_string())),
        })
        .collect()
}

pub fn parse_mac_list(value: &str) -> Result<Vec<MacAddr>> {
    split_list(value)
        .iter()
        .map(|m| m.parse::<MacAddr>().map_err(|e| AppError::config(e.to_string())))
        .collect()
}

pub fn parse_station_list(value: &str) -> Result<Vec<StationId>> {
    split_list(value)
        .iter()
        .map(|s| s.parse::<StationId>().map_err(|e| AppError::config(e.to_string())))
        .collect()
}

pub fn parse_frequency_list(value: &str) -> Result<Vec<u32>> {
    split_list(value)
        .iter()
        .map(|f| f.parse::<u32>().map_err(|e| AppError::config(format!("Invalid frequency '{}': {}", f, e))))
        .collect()
}

fn parse_env_number<T>(name: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", name, value, e)))
}

// Default value functions for serde
fn default_manager_url() -> String {
    crate::defaults::DEFAULT_MANAGER_URL.to_string()
}

fn default_iterations() -> u32 {
    crate::defaults::DEFAULT_ITERATIONS
}

fn default_step() -> u16 {
    crate::defaults::DEFAULT_STEP
}

fn default_max_attenuation() -> u16 {
    crate::defaults::DEFAULT_MAX_ATTENUATION
}

fn default_wait_time_secs() -> u64 {
    crate::defaults::DEFAULT_WAIT_TIME.as_secs()
}

fn default_settle_time_secs() -> u64 {
    crate::defaults::DEFAULT_SETTLE_TIME.as_secs()
}

fn default_convergence_attempts() -> u32 {
    crate::defaults::DEFAULT_CONVERGENCE_ATTEMPTS
}

fn default_query_timeout_secs() -> u64 {
    crate::defaults::DEFAULT_QUERY_TIMEOUT.as_secs()
}

fn default_scan_frequencies() -> Vec<u32> {
    crate::defaults::DEFAULT_SCAN_FREQUENCIES.to_vec()
}

fn default_roam_method() -> RoamMethod {
    RoamMethod::OverTheAir
}

fn default_sniff_radio() -> String {
    crate::defaults::DEFAULT_SNIFF_RADIO.to_string()
}

fn default_monitor_name() -> String {
    crate::defaults::DEFAULT_MONITOR_NAME.to_string()
}

fn default_sniff_channel() -> String {
    crate::defaults::DEFAULT_SNIFF_CHANNEL.to_string()
}

fn default_capture_dir() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_CAPTURE_DIR)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(crate::defaults::DEFAULT_OUTPUT_DIR)
}

fn default_fast_transition() -> bool {
    true
}

fn default_threshold_ms() -> u64 {
    crate::defaults::DEFAULT_THRESHOLD.as_millis() as u64
}

fn default_enable_color() -> bool {
    crate::defaults::DEFAULT_ENABLE_COLOR
}

#[cfg(test)]
pub(crate) fn sample_config() -> Config {
    Config {
        attenuator_groups: vec![
            parse_group("1.1.3034.0,1.1.3034.1").unwrap(),
            parse_group("1.1.3034.2,1.1.3034.3").unwrap(),
        ],
        bssids: parse_mac_list("94:a6:7e:54:d4:31,94:a6:7e:54:d4:33").unwrap(),
        stations: parse_station_list("1.1.sta0000,1.1.sta0001").unwrap(),
        ..Config::default()
    }
}
