//! Configuration parsing from CLI arguments and environment variables

use crate::{
    cli::Cli,
    config::env::EnvManager,
    error::{AppError, Result},
    models::{config as model, Config},
    types::{EnterpriseAuth, SecurityMode},
};
use std::path::PathBuf;

/// Configuration parser that combines CLI arguments with environment variables
pub struct ConfigParser {
    cli: Cli,
}

impl ConfigParser {
    /// Create a new configuration parser with CLI arguments
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Parse and build the complete configuration
    pub fn parse(&self) -> Result<Config> {
        self.cli.validate().map_err(AppError::config)?;

        let mut config = Config::default();

        self.load_env_file()?;
        config.merge_from_env()?;
        self.apply_cli_overrides(&mut config)?;

        config.validate()?;

        Ok(config)
    }

    fn load_env_file(&self) -> Result<()> {
        EnvManager::load_env_file(self.cli.debug)
    }

    /// Apply CLI argument overrides to configuration
    fn apply_cli_overrides(&self, config: &mut Config) -> Result<()> {
        let cli = &self.cli;

        if let Some(ref url) = cli.manager_url {
            config.manager_url = url.trim().to_string();
        }

        if !cli.groups.is_empty() {
            let serial = cli
                .attenuator
                .clone()
                .or_else(|| std::env::var("ROAM_ATTENUATOR").ok());
            config.attenuator_groups = cli
                .groups
                .iter()
                .map(|g| model::parse_groups_with_serial(g, serial.as_deref().map(str::trim)))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .flatten()
                .collect();
        }

        if let Some(ref bssids) = cli.bssids {
            config.bssids = model::parse_mac_list(bssids)?;
        }

        if let Some(ref stations) = cli.stations {
            config.stations = model::parse_station_list(stations)?;
        }

        if let Some(iterations) = cli.iterations {
            config.iterations = iterations;
        }

        if let Some(step) = cli.step {
            config.step = step;
        }

        if let Some(max) = cli.max_attenuation {
            config.max_attenuation = max;
        }

        if let Some(wait) = cli.wait_time {
            config.wait_time_seconds = wait;
        }

        if let Some(settle) = cli.settle_time {
            config.settle_time_seconds = settle;
        }

        if let Some(attempts) = cli.convergence_attempts {
            config.convergence_attempts = attempts;
        }

        if let Some(ref freqs) = cli.scan_frequencies {
            config.scan_frequencies = model::parse_frequency_list(freqs)?;
        }

        if let Some(ref method) = cli.roam_method {
            config.roam_method = method.parse()?;
        }

        if let Some(ref radio) = cli.sniff_radio {
            config.sniff_radio = radio.trim().to_string();
        }

        if let Some(ref name) = cli.monitor_name {
            config.monitor_name = name.trim().to_string();
        }

        if let Some(ref channel) = cli.channel {
            config.sniff_channel = channel.trim().to_string();
        }

        if let Some(ref dir) = cli.capture_dir {
            config.capture_dir = PathBuf::from(dir);
        }

        if let Some(ref dir) = cli.output_dir {
            config.output_dir = PathBuf::from(dir);
        }

        if let Some(ref kind) = cli.security {
            config.security = SecurityMode::from_parts(kind, self.enterprise_auth(&config.security))?;
        }

        if cli.no_ft {
            config.fast_transition = false;
        }

        if let Some(threshold) = cli.threshold {
            config.threshold_ms = threshold;
        }

        if let Some(timeout) = cli.query_timeout {
            config.query_timeout_seconds = timeout;
        }

        if cli.no_color {
            config.enable_color = false;
        } else if cli.color {
            config.enable_color = true;
        }

        // CLI-only flags
        config.json_output = cli.json;
        config.verbose = cli.verbose;
        config.debug = cli.debug;

        if config.debug {
            eprintln!("Applied CLI overrides to configuration");
            eprintln!(
                "Final config: groups={}, stations={}, iterations={}, threshold={}ms",
                config.attenuator_groups.len(),
                config.stations.len(),
                config.iterations,
                config.threshold_ms
            );
        }

        Ok(())
    }

    /// EAP parameters from the CLI, falling back to what the environment set
    fn enterprise_auth(&self, current: &SecurityMode) -> Option<EnterpriseAuth> {
        let existing = current.enterprise();
        let eap_method = self
            .cli
            .eap_method
            .clone()
            .or_else(|| existing.map(|a| a.eap_method.clone()))?;
        let identity = self
            .cli
            .eap_identity
            .clone()
            .or_else(|| existing.map(|a| a.identity.clone()))?;
        let password = self
            .cli
            .eap_password
            .clone()
            .or_else(|| existing.map(|a| a.password.clone()))
            .unwrap_or_default();

        Some(EnterpriseAuth { eap_method, identity, password })
    }
}

/// Convenience function to load complete configuration from CLI arguments
pub fn load_config(cli: Cli) -> Result<Config> {
    let parser = ConfigParser::new(cli);
    parser.parse()
}

/// Display configuration summary for debug purposes
pub fn display_config_summary(config: &Config) -> String {
    let mut summary = Vec::new();

    summary.push(format!("Manager: {}", config.manager_url));
    for (i, (group, bssid)) in config.attenuator_groups.iter().zip(&config.bssids).enumerate() {
        let modules: Vec<String> = group.iter().map(|m| m.to_string()).collect();
        summary.push(format!("Group g{}: {} -> {}", i, modules.join(","), bssid));
    }
    let stations: Vec<String> = config.stations.iter().map(|s| s.to_string()).collect();
    summary.push(format!("Stations: {}", stations.join(", ")));
    summary.push(format!("Iterations: {}", config.iterations));
    summary.push(format!("Ramp: step {} / max {} deci-dB", config.step, config.max_attenuation));
    summary.push(format!(
        "Wait: {}s, settle: {}s, convergence attempts: {}",
        config.wait_time_seconds, config.settle_time_seconds, config.convergence_attempts
    ));
    summary.push(format!("Roam method: {}", config.roam_method));
    summary.push(format!("Security: {}", config.security.name()));
    if let Some(auth) = config.security.enterprise() {
        summary.push(format!("EAP: {} as {}", auth.eap_method, auth.identity));
    }
    summary.push(format!("Fast transition: {}", config.fast_transition));
    summary.push(format!("Threshold: {}ms", config.threshold_ms));
    summary.push(format!("Sniffer: {} on {} channel {}", config.monitor_name, config.sniff_radio, config.sniff_channel));
    summary.push(format!("Output: {}", config.output_dir.display()));
    summary.push(format!("Color Output: {}", config.enable_color));

    summary.join("\n")
}
