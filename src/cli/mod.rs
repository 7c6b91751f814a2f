//! Command-line interface for the roam timing tester

use clap::{ArgAction, Parser};

/// Roam Timing Tester - forces stations to roam with RF attenuators and
/// measures the roam latency from packet captures
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "roamtest")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Base URL of the test manager JSON API
    #[arg(long, value_name = "URL")]
    pub manager_url: Option<String>,

    /// Attenuator serial that bare module indices in --groups refer to
    #[arg(long, value_name = "SERIAL")]
    pub attenuator: Option<String>,

    /// Module group per access point, in ring order (repeat for each group).
    /// Modules are comma separated, e.g. "1.1.3034.0,1.1.3034.1" or "0,1" with --attenuator
    #[arg(short, long = "group", value_name = "MODULES", action = ArgAction::Append)]
    pub groups: Vec<String>,

    /// BSSIDs served behind the groups, same order (comma-separated)
    #[arg(short, long, value_name = "BSSIDS")]
    pub bssids: Option<String>,

    /// Stations under test, e.g. "1.1.sta0000,1.1.sta0001"
    #[arg(short, long, value_name = "STATIONS")]
    pub stations: Option<String>,

    /// Number of roam iterations
    #[arg(short, long)]
    pub iterations: Option<u32>,

    /// Attenuation ramp step in deci-dB
    #[arg(long)]
    pub step: Option<u16>,

    /// Maximum attenuation in deci-dB
    #[arg(long)]
    pub max_attenuation: Option<u16>,

    /// Seconds to wait after each ramp step
    #[arg(long, value_parser = parse_seconds)]
    pub wait_time: Option<u64>,

    /// Seconds to wait after roam-assist commands
    #[arg(long, value_parser = parse_seconds)]
    pub settle_time: Option<u64>,

    /// Convergence rounds before the ramp starts regardless
    #[arg(long)]
    pub convergence_attempts: Option<u32>,

    /// Frequencies (MHz) to scan before roam-assist commands (comma-separated)
    #[arg(long, value_name = "FREQS")]
    pub scan_frequencies: Option<String>,

    /// Roam-assist method: ota (over the air) or otds (over the DS)
    #[arg(long, value_name = "METHOD")]
    pub roam_method: Option<String>,

    /// Radio the sniffer monitor is created on, e.g. "1.1.wiphy1"
    #[arg(long, value_name = "RADIO")]
    pub sniff_radio: Option<String>,

    /// Monitor interface name
    #[arg(long, value_name = "NAME")]
    pub monitor_name: Option<String>,

    /// Monitor channel number, or frequency in MHz
    #[arg(long, value_name = "CHANNEL")]
    pub channel: Option<String>,

    /// Directory the sniffer writes captures to
    #[arg(long, value_name = "DIR")]
    pub capture_dir: Option<String>,

    /// Directory for fetched captures and the run report
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<String>,

    /// Station security: open, wpa2, wpa3 or enterprise
    #[arg(long, value_name = "MODE")]
    pub security: Option<String>,

    /// EAP method for enterprise security, e.g. TTLS or PEAP
    #[arg(long, value_name = "METHOD")]
    pub eap_method: Option<String>,

    /// EAP identity for enterprise security
    #[arg(long, value_name = "IDENTITY")]
    pub eap_identity: Option<String>,

    /// EAP password for enterprise security
    #[arg(long, value_name = "PASSWORD")]
    pub eap_password: Option<String>,

    /// Stations roam without 802.11r fast transition
    #[arg(long)]
    pub no_ft: bool,

    /// Roam latency threshold in milliseconds
    #[arg(short, long, value_name = "MS")]
    pub threshold: Option<u64>,

    /// Timeout in seconds for a single station query
    #[arg(long, value_parser = parse_duration)]
    pub query_timeout: Option<u64>,

    /// Force colored output
    #[arg(long)]
    pub color: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(long)]
    pub debug: bool,

    /// Show supported environment variables and exit
    #[arg(long)]
    pub env_help: bool,

    /// Write an example .env file to the given path and exit
    #[arg(long, value_name = "PATH")]
    pub write_env_example: Option<String>,
}

impl Cli {
    /// Validate CLI arguments for conflicts and requirements
    pub fn validate(&self) -> Result<(), String> {
        if self.color && self.no_color {
            return Err("Cannot specify both --color and --no-color".to_string());
        }

        let eap_given = self.eap_method.is_some() || self.eap_identity.is_some() || self.eap_password.is_some();
        if eap_given {
            match self.security.as_deref().map(str::to_lowercase) {
                Some(mode) if mode.contains("enterprise") || mode == "eap" => {}
                Some(_) => return Err("EAP options require --security enterprise".to_string()),
                None => {}
            }
        }

        if self.groups.len() == 1 {
            return Err("At least two --group options are required to roam between access points".to_string());
        }

        Ok(())
    }

    /// True when the invocation only asks for help output, not a run
    pub fn is_info_only(&self) -> bool {
        self.env_help || self.write_env_example.is_some()
    }

    /// Check if colors should be enabled
    pub fn use_colors(&self) -> bool {
        if self.color {
            true
        } else if self.no_color {
            false
        } else {
            supports_color()
        }
    }

    /// Get configuration summary for display
    pub fn get_config_summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("Configuration Summary:\n");
        if let Some(ref url) = self.manager_url {
            summary.push_str(&format!("  Manager: {}\n", url));
        }
        if !self.groups.is_empty() {
            summary.push_str(&format!("  Groups: {}\n", self.groups.join(" | ")));
        }
        if let Some(ref bssids) = self.bssids {
            summary.push_str(&format!("  BSSIDs: {}\n", bssids));
        }
        if let Some(ref stations) = self.stations {
            summary.push_str(&format!("  Stations: {}\n", stations));
        }
        if let Some(iterations) = self.iterations {
            summary.push_str(&format!("  Iterations: {}\n", iterations));
        }
        if let Some(threshold) = self.threshold {
            summary.push_str(&format!("  Threshold: {}ms\n", threshold));
        }
        summary.push_str(&format!("  Colored output: {}\n", self.use_colors()));
        summary.push_str(&format!("  Verbose mode: {}\n", self.verbose));
        summary.push_str(&format!("  Debug mode: {}\n", self.debug));

        summary
    }
}

/// Parse a timeout in seconds (1-300)
fn parse_duration(s: &str) -> Result<u64, String> {
    if s.starts_with('+') || s.starts_with("0x") || s.starts_with("0X") {
        return Err(format!("Invalid duration: {}", s));
    }

    s.parse::<u64>()
        .map_err(|_| format!("Invalid duration: {}", s))
        .and_then(|secs| {
            if secs == 0 {
                Err("Duration must be greater than 0".to_string())
            } else if secs > 300 {
                Err("Duration cannot exceed 300 seconds".to_string())
            } else {
                Ok(secs)
            }
        })
}

/// Parse a wait in seconds (0-300)
fn parse_seconds(s: &str) -> Result<u64, String> {
    if s == "0" {
        Ok(0)
    } else {
        parse_duration(s)
    }
}

/// Check if the terminal supports color output
fn supports_color() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    #[cfg(target_os = "windows")]
    {
        if std::env::var("ANSICON").is_ok() || std::env::var("ConEmuANSI").is_ok() {
            return true;
        }
    }

    #[cfg(unix)]
    {
        true
    }
    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing_basic() {
        let cli = Cli::parse_from([
            "roamtest",
            "--group", "1.1.3034.0,1.1.3034.1",
            "--group", "1.1.3034.2,1.1.3034.3",
            "--bssids", "94:a6:7e:54:d4:31,94:a6:7e:54:d4:33",
            "--stations", "1.1.sta0000",
            "-i", "4",
        ]);
        assert_eq!(cli.groups.len(), 2);
        assert_eq!(cli.iterations, Some(4));
        assert!(cli.threshold.is_none());
        assert!(!cli.no_ft);
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_cli_parsing_all_options() {
        let cli = Cli::parse_from([
            "roamtest",
            "--manager-url", "http://192.168.100.1:8080",
            "--attenuator", "1.1.3034",
            "-g", "0,1",
            "-g", "2,3",
            "--step", "50",
            "--max-attenuation", "900",
            "--wait-time", "0",
            "--settle-time", "3",
            "--convergence-attempts", "2",
            "--scan-frequencies", "5180,5745",
            "--roam-method", "otds",
            "--sniff-radio", "1.1.wiphy2",
            "--monitor-name", "mon0",
            "--channel", "5745",
            "--output-dir", "out",
            "--security", "enterprise",
            "--eap-method", "TTLS",
            "--eap-identity", "testuser",
            "--eap-password", "secret",
            "--no-ft",
            "-t", "60",
            "--query-timeout", "10",
            "--no-color",
            "--json",
            "--verbose",
            "--debug",
        ]);

        assert_eq!(cli.attenuator.as_deref(), Some("1.1.3034"));
        assert_eq!(cli.step, Some(50));
        assert_eq!(cli.wait_time, Some(0));
        assert_eq!(cli.settle_time, Some(3));
        assert_eq!(cli.roam_method.as_deref(), Some("otds"));
        assert_eq!(cli.channel.as_deref(), Some("5745"));
        assert!(cli.no_ft);
        assert_eq!(cli.threshold, Some(60));
        assert_eq!(cli.query_timeout, Some(10));
        assert!(cli.json && cli.verbose && cli.debug);
        assert!(!cli.use_colors());
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_color_support_detection() {
        std::env::set_var("NO_COLOR", "1");
        assert!(!supports_color());
        std::env::remove_var("NO_COLOR");
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(parse_duration("10").unwrap(), 10);
        assert_eq!(parse_duration("300").unwrap(), 300);
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("301").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("+10").is_err());
        assert!(parse_duration("0x10").is_err());
        assert!(parse_duration("-5").is_err());

        assert_eq!(parse_seconds("0").unwrap(), 0);
        assert_eq!(parse_seconds("15").unwrap(), 15);
        assert!(parse_seconds("301").is_err());
    }

    #[test]
    fn test_cli_validation() {
        let conflict = Cli::parse_from(["roamtest", "--color", "--no-color"]);
        assert!(conflict.validate().unwrap_err().contains("--color and --no-color"));

        let single = Cli::parse_from(["roamtest", "-g", "1.1.3034.0"]);
        assert!(single.validate().unwrap_err().contains("two --group"));

        let eap = Cli::parse_from(["roamtest", "--security", "wpa2", "--eap-identity", "user"]);
        assert!(eap.validate().unwrap_err().contains("--security enterprise"));

        // groups may also come from the environment
        assert!(Cli::parse_from(["roamtest"]).validate().is_ok());
    }

    #[test]
    fn test_config_summary() {
        let cli = Cli::parse_from(["roamtest", "-i", "5", "-t", "40", "--verbose"]);
        let summary = cli.get_config_summary();
        assert!(summary.contains("Iterations: 5"));
        assert!(summary.contains("Threshold: 40ms"));
        assert!(summary.contains("Verbose mode: true"));
    }

    #[test]
    fn test_info_only_flags() {
        assert!(Cli::parse_from(["roamtest", "--env-help"]).is_info_only());
        assert!(Cli::parse_from(["roamtest", "--write-env-example", ".env.example"]).is_info_only());
        assert!(!Cli::parse_from(["roamtest"]).is_info_only());
    }
}
