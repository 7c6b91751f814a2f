//! Environment variable handling and .env file management

use crate::error::{AppError, Result};
use crate::models::config as model;
use crate::types::{ChannelSpec, RoamMethod, SecurityMode};
use std::path::Path;

/// Environment variable configuration manager
pub struct EnvManager;

impl EnvManager {
    /// Load .env file if it exists
    pub fn load_env_file(debug: bool) -> Result<()> {
        if Path::new(".env").exists() {
            dotenv::from_filename(".env")
                .map_err(|e| AppError::config(format!("Failed to load .env file: {}", e)))?;

            if debug {
                eprintln!("Loaded configuration from .env file");
            }
        } else if debug {
            eprintln!("No .env file found, using defaults and CLI arguments");
        }

        Ok(())
    }

    /// Create example .env file content
    pub fn create_example_env_content() -> String {
        r#"# Roam Timing Tester Configuration
#
# Values here are used as defaults and can be overridden by command-line
# arguments. Attenuation values are in deci-dB (950 = 95.0 dB).

# Test manager JSON API
# ROAM_MANAGER_URL=http://192.168.100.1:8080

# Attenuator serial for bare module indices in ROAM_GROUPS
# ROAM_ATTENUATOR=1.1.3034

# One module group per access point, groups separated by ';'
# ROAM_GROUPS=0,1;2,3

# BSSIDs behind the groups, same order
# ROAM_BSSIDS=94:a6:7e:54:d4:31,94:a6:7e:54:d4:33

# Stations under test
# ROAM_STATIONS=1.1.sta0000,1.1.sta0001

# Ramp and timing
# ROAM_ITERATIONS=2
# ROAM_STEP=100
# ROAM_MAX_ATTENUATION=950
# ROAM_WAIT_TIME=10
# ROAM_SETTLE_TIME=5
# ROAM_CONVERGENCE_ATTEMPTS=3
# ROAM_QUERY_TIMEOUT=5

# Roam assist (ota or otds) and scan frequencies in MHz
# ROAM_METHOD=ota
# ROAM_SCAN_FREQUENCIES=5180,5300

# Sniffer
# ROAM_SNIFF_RADIO=1.1.wiphy1
# ROAM_MONITOR_NAME=moni0a
# ROAM_SNIFF_CHANNEL=36
# ROAM_CAPTURE_DIR=captures
# ROAM_OUTPUT_DIR=roam-report

# Security (open, wpa2, wpa3, enterprise)
# ROAM_SECURITY=enterprise
# ROAM_EAP_METHOD=TTLS
# ROAM_EAP_IDENTITY=testuser
# ROAM_EAP_PASSWORD=testpasswd
# ROAM_FAST_TRANSITION=true

# Pass threshold in milliseconds
# ROAM_THRESHOLD_MS=50

# Enable colored output (true/false)
# ROAM_ENABLE_COLOR=true
"#
        .to_string()
    }

    /// Save example .env file to disk
    pub fn save_example_env_file(path: &Path) -> Result<()> {
        let content = Self::create_example_env_content();
        std::fs::write(path, content)
            .map_err(|e| AppError::config(format!("Failed to write example .env file: {}", e)))?;

        Ok(())
    }

    /// Validate environment variable format before parsing
    pub fn validate_env_var(key: &str, value: &str) -> Result<()> {
        match key {
            "ROAM_MANAGER_URL" => {
                let parsed = url::Url::parse(value.trim())
                    .map_err(|e| AppError::config(format!("Invalid ROAM_MANAGER_URL '{}': {}", value, e)))?;
                if parsed.scheme() != "http" && parsed.scheme() != "https" {
                    return Err(AppError::config(format!("ROAM_MANAGER_URL must use http or https: {}", value)));
                }
            }
            "ROAM_GROUPS" => {
                let serial = std::env::var("ROAM_ATTENUATOR").ok();
                model::parse_groups_with_serial(value, serial.as_deref().map(str::trim))?;
            }
            "ROAM_BSSIDS" => {
                model::parse_mac_list(value)?;
            }
            "ROAM_STATIONS" => {
                model::parse_station_list(value)?;
            }
            "ROAM_ITERATIONS" => {
                let count = parse_number::<u32>(key, value)?;
                if count == 0 || count > 10_000 {
                    return Err(AppError::config(format!("ROAM_ITERATIONS must be between 1 and 10000, got: {}", count)));
                }
            }
            "ROAM_STEP" | "ROAM_MAX_ATTENUATION" => {
                let deci_db = parse_number::<u16>(key, value)?;
                if deci_db > crate::defaults::MAX_SUPPORTED_ATTENUATION {
                    return Err(AppError::config(format!(
                        "{} cannot exceed {} deci-dB, got: {}",
                        key,
                        crate::defaults::MAX_SUPPORTED_ATTENUATION,
                        deci_db
                    )));
                }
            }
            "ROAM_WAIT_TIME" | "ROAM_SETTLE_TIME" => {
                let secs = parse_number::<u64>(key, value)?;
                if secs > 300 {
                    return Err(AppError::config(format!("{} cannot exceed 300 seconds, got: {}", key, secs)));
                }
            }
            "ROAM_QUERY_TIMEOUT" => {
                let secs = parse_number::<u64>(key, value)?;
                if secs == 0 || secs > 120 {
                    return Err(AppError::config(format!("ROAM_QUERY_TIMEOUT must be between 1 and 120, got: {}", secs)));
                }
            }
            "ROAM_CONVERGENCE_ATTEMPTS" | "ROAM_THRESHOLD_MS" => {
                parse_number::<u64>(key, value)?;
            }
            "ROAM_SCAN_FREQUENCIES" => {
                model::parse_frequency_list(value)?;
            }
            "ROAM_METHOD" => {
                value.parse::<RoamMethod>()?;
            }
            "ROAM_SNIFF_CHANNEL" => {
                value.parse::<ChannelSpec>()?;
            }
            "ROAM_SECURITY" => {
                let kind = value.trim().to_lowercase();
                if !kind.contains("enterprise") && kind != "eap" {
                    SecurityMode::from_parts(&kind, None)?;
                }
            }
            "ROAM_FAST_TRANSITION" | "ROAM_ENABLE_COLOR" => {
                value
                    .trim()
                    .parse::<bool>()
                    .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))?;
            }
            _ => {
                // Free-form or unknown variable
            }
        }

        Ok(())
    }

    /// Get list of all supported environment variables with descriptions
    pub fn get_supported_env_vars() -> Vec<(&'static str, &'static str, &'static str)> {
        vec![
            ("ROAM_MANAGER_URL", "Test manager JSON API base URL", "http://192.168.100.1:8080"),
            ("ROAM_ATTENUATOR", "Attenuator serial for bare module indices", "1.1.3034"),
            ("ROAM_GROUPS", "Module groups per AP, ';' between groups", "0,1;2,3"),
            ("ROAM_BSSIDS", "BSSIDs behind the groups, same order", "94:a6:7e:54:d4:31,94:a6:7e:54:d4:33"),
            ("ROAM_STATIONS", "Stations under test", "1.1.sta0000,1.1.sta0001"),
            ("ROAM_ITERATIONS", "Number of roam iterations (1-10000)", "2"),
            ("ROAM_STEP", "Ramp step in deci-dB", "100"),
            ("ROAM_MAX_ATTENUATION", "Maximum attenuation in deci-dB (0-955)", "950"),
            ("ROAM_WAIT_TIME", "Seconds to wait after each ramp step", "10"),
            ("ROAM_SETTLE_TIME", "Seconds to wait after roam-assist commands", "5"),
            ("ROAM_CONVERGENCE_ATTEMPTS", "Convergence rounds before the ramp", "3"),
            ("ROAM_QUERY_TIMEOUT", "Station query timeout in seconds (1-120)", "5"),
            ("ROAM_SCAN_FREQUENCIES", "Frequencies to scan before roam assist", "5180,5300"),
            ("ROAM_METHOD", "Roam-assist method (ota, otds)", "ota"),
            ("ROAM_SNIFF_RADIO", "Radio for the monitor interface", "1.1.wiphy1"),
            ("ROAM_MONITOR_NAME", "Monitor interface name", "moni0a"),
            ("ROAM_SNIFF_CHANNEL", "Monitor channel or frequency", "36"),
            ("ROAM_CAPTURE_DIR", "Directory the sniffer writes to", "captures"),
            ("ROAM_OUTPUT_DIR", "Directory for captures and the report", "roam-report"),
            ("ROAM_SECURITY", "Station security (open, wpa2, wpa3, enterprise)", "wpa2"),
            ("ROAM_EAP_METHOD", "EAP method for enterprise security", "TTLS"),
            ("ROAM_EAP_IDENTITY", "EAP identity for enterprise security", "testuser"),
            ("ROAM_EAP_PASSWORD", "EAP password for enterprise security", "testpasswd"),
            ("ROAM_FAST_TRANSITION", "Stations use 802.11r fast transition", "true"),
            ("ROAM_THRESHOLD_MS", "Roam latency pass threshold in ms", "50"),
            ("ROAM_ENABLE_COLOR", "Enable colored output", "true"),
        ]
    }

    /// Display environment variable help
    pub fn display_env_help() -> String {
        let mut help = String::new();
        help.push_str("Supported Environment Variables:\n\n");

        for (var, description, example) in Self::get_supported_env_vars() {
            help.push_str(&format!("  {:<26} {}\n", var, description));
            help.push_str(&format!("  {:<26} Example: {}\n\n", "", example));
        }

        help.push_str("Configuration Priority (highest to lowest):\n");
        help.push_str("  1. Command-line arguments\n");
        help.push_str("  2. Environment variables\n");
        help.push_str("  3. .env file values\n");
        help.push_str("  4. Default values\n");

        help
    }

    /// Validate all currently set environment variables
    pub fn validate_current_env() -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        for (var_name, _, _) in Self::get_supported_env_vars() {
            if let Ok(value) = std::env::var(var_name) {
                if let Err(e) = Self::validate_env_var(var_name, &value) {
                    warnings.push(format!("Warning: {}", e));
                }
            }
        }

        Ok(warnings)
    }

    /// Check if .env file exists and validate its contents
    pub fn check_env_file() -> Result<Option<Vec<String>>> {
        Self::check_env_file_at(Path::new(".env"))
    }

    /// Validate the `KEY=value` lines of an env file
    pub fn check_env_file_at(path: &Path) -> Result<Option<Vec<String>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read {}: {}", path.display(), e)))?;

        let mut warnings = Vec::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                let key = key.trim();
                let value = value.trim();

                if let Err(e) = Self::validate_env_var(key, value) {
                    warnings.push(format!("Line '{}': {}", line, e));
                }
            }
        }

        Ok(Some(warnings))
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AppError::config(format!("Invalid {} value '{}': {}", key, value, e)))
}
