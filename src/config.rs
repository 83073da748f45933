// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Configuration persistence for k8sync
//!
//! All k8sync data is stored under ~/.k8sync/:
//! - ~/.k8sync/config.json - daemon and client settings
//! - ~/.k8sync/state.json - cluster, workload and node records
//! - ~/.k8sync/credentials/ - kubeconfigs materialized from inline content
//! - ~/.k8sync/log/ - rotated log files

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::kubernetes::{ClusterVersion, RegistryOptions};
use crate::reconcile::{InventorySettings, JobSchedule, WorkloadSettings};

/// Get the base k8sync directory (~/.k8sync/)
pub fn base_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".k8sync"))
        .context("Could not determine home directory")
}

fn default_credential_dir() -> PathBuf {
    base_dir()
        .map(|p| p.join("credentials"))
        .unwrap_or_else(|_| PathBuf::from("credentials"))
}

fn default_state_file() -> PathBuf {
    base_dir()
        .map(|p| p.join("state.json"))
        .unwrap_or_else(|_| PathBuf::from("state.json"))
}

/// k8sync configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Where kubeconfigs from inline credential content are written
    pub credential_dir: PathBuf,
    /// JSON file backing the record store
    pub state_file: PathBuf,
    pub workload_interval_secs: u64,
    pub node_interval_secs: u64,
    /// Triggers later than this are skipped; 0 means one interval
    pub misfire_grace_secs: u64,
    pub ownership_label: String,
    pub workload_resource: String,
    pub gpu_model_label: String,
    /// Assumed cluster version when the server does not report one
    pub baseline_version: String,
    pub allow_in_cluster: bool,
}

impl Default for Config {
    fn default() -> Self {
        let workload = WorkloadSettings::default();
        Self {
            credential_dir: default_credential_dir(),
            state_file: default_state_file(),
            workload_interval_secs: 30,
            node_interval_secs: 60,
            misfire_grace_secs: 0,
            ownership_label: workload.ownership_label,
            workload_resource: workload.resource_type,
            gpu_model_label: InventorySettings::default().gpu_model_label,
            baseline_version: ClusterVersion::BASELINE.to_string(),
            allow_in_cluster: true,
        }
    }
}

impl Config {
    /// Load config from `path` (default ~/.k8sync/config.json), or defaults if not found
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save config to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get the config file path (~/.k8sync/config.json)
    pub fn config_path() -> Result<PathBuf> {
        Ok(base_dir()?.join("config.json"))
    }

    fn validate(&self) -> Result<()> {
        if self.workload_interval_secs == 0 || self.node_interval_secs == 0 {
            anyhow::bail!("Job intervals must be at least one second");
        }
        self.baseline()?;
        Ok(())
    }

    pub fn baseline(&self) -> Result<ClusterVersion> {
        ClusterVersion::parse(&self.baseline_version)
            .with_context(|| format!("Invalid baseline version: {}", self.baseline_version))
    }

    pub fn registry_options(&self) -> Result<RegistryOptions> {
        Ok(RegistryOptions {
            credential_dir: self.credential_dir.clone(),
            baseline_version: self.baseline()?,
            allow_in_cluster: self.allow_in_cluster,
        })
    }

    fn schedule(&self, interval_secs: u64) -> JobSchedule {
        let schedule = JobSchedule::every(Duration::from_secs(interval_secs));
        if self.misfire_grace_secs > 0 {
            schedule.with_grace(Duration::from_secs(self.misfire_grace_secs))
        } else {
            schedule
        }
    }

    pub fn workload_schedule(&self) -> JobSchedule {
        self.schedule(self.workload_interval_secs)
    }

    pub fn node_schedule(&self) -> JobSchedule {
        self.schedule(self.node_interval_secs)
    }

    pub fn workload_settings(&self) -> WorkloadSettings {
        WorkloadSettings {
            resource_type: self.workload_resource.clone(),
            ownership_label: self.ownership_label.clone(),
        }
    }

    pub fn inventory_settings(&self) -> InventorySettings {
        InventorySettings {
            gpu_model_label: self.gpu_model_label.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.workload_interval_secs, 30);
        assert_eq!(config.node_interval_secs, 60);
        assert_eq!(config.baseline_version, "1.24");
        assert_eq!(config.ownership_label, "k8sync.io/managed=true");
        assert!(config.allow_in_cluster);
    }

    #[test]
    fn test_config_deserialize_partial() {
        let json = r#"{"nodeIntervalSecs": 120, "gpuModelLabel": "gpu.example.com/model"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.node_interval_secs, 120);
        assert_eq!(config.workload_interval_secs, 30);
        assert_eq!(config.inventory_settings().gpu_model_label, "gpu.example.com/model");
    }

    #[test]
    fn test_config_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.json");

        let config = Config {
            state_file: temp_dir.path().join("state.json"),
            misfire_grace_secs: 5,
            ..Default::default()
        };
        config.save(&config_path).unwrap();

        let loaded = Config::load(Some(&config_path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loaded = Config::load(Some(&temp_dir.path().join("absent.json"))).unwrap();
        assert_eq!(loaded, Config::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"baselineVersion": "latest"}"#).unwrap();
        assert!(Config::load(Some(&path)).is_err());

        fs::write(&path, r#"{"workloadIntervalSecs": 0}"#).unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_schedules() {
        let mut config = Config::default();
        assert_eq!(config.node_schedule().misfire_grace, Duration::from_secs(60));
        config.misfire_grace_secs = 10;
        let schedule = config.workload_schedule();
        assert_eq!(schedule.interval, Duration::from_secs(30));
        assert_eq!(schedule.misfire_grace, Duration::from_secs(10));
    }
}
