//! Persisted run report (`results.json`)

use crate::{
    engine::RunReport,
    error::{AppError, ErrorContext, Result},
    models::Config,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const REPORT_FILE_NAME: &str = "results.json";

/// Run parameters stored next to the results. Never carries the EAP password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub tool_version: String,
    pub manager_url: String,
    pub security: String,
    pub eap_method: Option<String>,
    pub identity: Option<String>,
    pub fast_transition: bool,
    pub roam_method: String,
    pub threshold_ms: u64,
    pub step: u16,
    pub max_attenuation: u16,
    pub wait_time_seconds: u64,
    pub groups: Vec<String>,
    pub bssids: Vec<String>,
    pub stations: Vec<String>,
    pub sniff_channel: String,
}

impl ReportMetadata {
    pub fn from_config(config: &Config) -> Self {
        let auth = config.security.enterprise();
        Self {
            tool_version: crate::VERSION.to_string(),
            manager_url: config.manager_url.clone(),
            security: config.security.name().to_string(),
            eap_method: auth.map(|a| a.eap_method.clone()),
            identity: auth.map(|a| a.identity.clone()),
            fast_transition: config.fast_transition,
            roam_method: config.roam_method.to_string(),
            threshold_ms: config.threshold_ms,
            step: config.step,
            max_attenuation: config.max_attenuation,
            wait_time_seconds: config.wait_time_seconds,
            groups: config
                .attenuator_groups
                .iter()
                .map(|g| g.iter().map(|m| m.to_string()).collect::<Vec<_>>().join(","))
                .collect(),
            bssids: config.bssids.iter().map(|b| b.to_string()).collect(),
            stations: config.stations.iter().map(|s| s.to_string()).collect(),
            sniff_channel: config.sniff_channel.clone(),
        }
    }
}

/// Document layout of `results.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportDocument {
    pub metadata: ReportMetadata,
    pub report: RunReport,
}

/// Writes run reports into the output directory
#[derive(Debug, Clone)]
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(REPORT_FILE_NAME)
    }

    /// Serialize the report, creating the output directory if needed
    pub async fn write(&self, report: &RunReport, metadata: &ReportMetadata) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await.map_err(|e| {
            AppError::io(format!("Failed to create output directory {}: {}", self.output_dir.display(), e))
        })?;

        let document = ReportDocument {
            metadata: metadata.clone(),
            report: report.clone(),
        };
        let json = serde_json::to_string_pretty(&document)?;

        let path = self.report_path();
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        Ok(path)
    }

    /// Read back a report written by [`ReportWriter::write`]
    pub async fn load(path: &Path) -> Result<ReportDocument> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid report {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::sample_config;
    use crate::stats::ResultAggregator;
    use crate::types::{EnterpriseAuth, SecurityMode};
    use chrono::Utc;

    fn empty_report(config: &Config) -> RunReport {
        RunReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            iterations_requested: config.iterations,
            iterations_completed: 0,
            attempts: Vec::new(),
            summary: ResultAggregator::new(&config.stations, &config.bssids).summarize(),
            aborted_iterations: vec![(1, "attenuator offline".to_string())],
            removed_stations: Vec::new(),
            cancelled: true,
        }
    }

    #[test]
    fn test_metadata_never_contains_password() {
        let mut config = sample_config();
        config.security = SecurityMode::Enterprise(EnterpriseAuth {
            eap_method: "TTLS".to_string(),
            identity: "testuser".to_string(),
            password: "testpasswd".to_string(),
        });

        let metadata = ReportMetadata::from_config(&config);
        assert_eq!(metadata.identity.as_deref(), Some("testuser"));
        assert_eq!(metadata.groups, vec!["1.1.3034.0,1.1.3034.1", "1.1.3034.2,1.1.3034.3"]);

        let json = serde_json::to_string(&metadata).unwrap();
        assert!(!json.contains("testpasswd"));
    }

    #[tokio::test]
    async fn test_write_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = sample_config();
        let writer = ReportWriter::new(dir.path().join("nested"));

        let path = writer.write(&empty_report(&config), &ReportMetadata::from_config(&config)).await.unwrap();
        assert!(path.ends_with(REPORT_FILE_NAME));

        let document = ReportWriter::load(&path).await.unwrap();
        assert_eq!(document.metadata.threshold_ms, 50);
        assert!(document.report.cancelled);
        assert_eq!(document.report.aborted_iterations[0].0, 1);
        assert_eq!(document.report.summary.by_station.len(), 2);
    }
}
