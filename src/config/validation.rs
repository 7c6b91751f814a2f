//! Configuration validation utilities and rules

use crate::{
    error::Result,
    models::Config,
    types::{RoamMethod, SecurityMode},
};
use colored::Colorize;
use std::time::Duration;

/// Configuration validator with advanced validation rules
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration with comprehensive checks
    pub fn validate_comprehensive(config: &Config) -> Result<Vec<ValidationWarning>> {
        let mut warnings = Vec::new();

        config.validate()?;

        warnings.extend(Self::validate_timing(config));
        warnings.extend(Self::validate_ramp(config));
        warnings.extend(Self::validate_roaming(config));
        warnings.extend(Self::validate_run_length(config));

        Ok(warnings)
    }

    /// Waits and thresholds
    fn validate_timing(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.wait_time_seconds < 3 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Wait time of {}s is shorter than a typical background scan interval; roams may be detected late",
                    config.wait_time_seconds
                ),
            ));
        }

        if config.threshold_ms > 100 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("Threshold of {}ms is above the 100ms usually expected for voice-grade roaming", config.threshold_ms),
            ));
        } else if config.threshold_ms < 10 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("Threshold of {}ms is very strict; most roams will fail", config.threshold_ms),
            ));
        }

        if config.convergence_attempts > 0 && config.settle_time_seconds < 2 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("Settle time of {}s may not leave stations time to act on roam assist", config.settle_time_seconds),
            ));
        }

        if config.convergence_attempts == 0 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "Convergence is disabled; stations off the expected BSSID start the ramp where they are".to_string(),
            ));
        }

        warnings
    }

    /// Ramp shape
    fn validate_ramp(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        let steps = Self::ramp_length(config);
        if steps < 4 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Ramp of {} steps (step {} / max {}) is coarse; the roam point will be poorly resolved",
                    steps, config.step, config.max_attenuation
                ),
            ));
        }

        if config.max_attenuation < 600 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "Maximum attenuation of {:.1} dB may not be enough to force a roam",
                    config.max_attenuation as f64 / 10.0
                ),
            ));
        }

        warnings
    }

    /// Roam method and security combinations
    fn validate_roaming(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        if config.roam_method == RoamMethod::OverTheDs && !config.fast_transition {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                "Over-the-DS roaming requires fast transition; stations will likely ignore the roam command".to_string(),
            ));
        }

        if let SecurityMode::Enterprise(auth) = &config.security {
            if auth.password.is_empty() {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Warning,
                    format!("Enterprise identity '{}' has no password", auth.identity),
                ));
            }
            if !config.fast_transition {
                warnings.push(ValidationWarning::new(
                    ValidationLevel::Info,
                    "Enterprise roaming without fast transition includes a full EAP exchange in the measured latency".to_string(),
                ));
            }
        }

        if config.scan_frequencies.is_empty() {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                "No scan frequencies configured; roam assist triggers a full scan".to_string(),
            ));
        }

        if config.stations.len() > 32 {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("{} stations will be polled after every ramp step", config.stations.len()),
            ));
        }

        warnings
    }

    /// Expected wall-clock length of the run
    fn validate_run_length(config: &Config) -> Vec<ValidationWarning> {
        let mut warnings = Vec::new();

        let groups = config.attenuator_groups.len();
        if (config.iterations as usize) < groups {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!(
                    "{} iteration(s) cannot visit all {} groups, some transitions will not be measured",
                    config.iterations, groups
                ),
            ));
        }

        let estimate = Self::estimated_duration(config);
        if estimate > Duration::from_secs(4 * 3600) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Warning,
                format!("Run will take at least {}, consider fewer iterations or a shorter wait", format_hms(estimate)),
            ));
        } else if estimate > Duration::from_secs(3600) {
            warnings.push(ValidationWarning::new(
                ValidationLevel::Info,
                format!("Run will take at least {}", format_hms(estimate)),
            ));
        }

        warnings
    }

    fn ramp_length(config: &Config) -> u32 {
        if config.step == 0 {
            return 0;
        }
        (config.max_attenuation as u32).div_ceil(config.step as u32) + 1
    }

    /// Lower bound: every ramp step waits once per iteration
    pub fn estimated_duration(config: &Config) -> Duration {
        let per_iteration = config.wait_time() * Self::ramp_length(config);
        per_iteration * config.iterations
    }
}

fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Validation warning levels
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationLevel {
    Info,
    Warning,
    Error,
}

impl ValidationLevel {
    /// Get display string for level
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    /// Get color for terminal display
    pub fn color(&self) -> &'static str {
        match self {
            Self::Info => "blue",
            Self::Warning => "yellow",
            Self::Error => "red",
        }
    }
}

/// Configuration validation warning
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub level: ValidationLevel,
    pub message: String,
}

impl ValidationWarning {
    /// Create a new validation warning
    pub fn new(level: ValidationLevel, message: String) -> Self {
        Self { level, message }
    }

    /// Format warning for display
    pub fn format(&self, use_color: bool) -> String {
        let tag = format!("[{}]", self.level.as_str());
        if use_color {
            format!("{} {}", tag.color(self.level.color()).bold(), self.message)
        } else {
            format!("{} {}", tag, self.message)
        }
    }
}

/// Convenience function for comprehensive configuration validation
pub fn validate_config(config: &Config) -> Result<Vec<ValidationWarning>> {
    ConfigValidator::validate_comprehensive(config)
}
