use crate::defaults::*;
use crate::models::SacParameters;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_jobtype() -> String {
    String::from(JOBTYPE)
}
fn default_verbose() -> i8 {
    0
}
fn default_restart() -> bool {
    RESTART
}
fn default_number_of_cores() -> usize {
    NUMBER_OF_CORES
}
fn default_model_kind() -> ModelKind {
    ModelKind::Sac
}
fn default_tabulated_file() -> String {
    String::from(TABULATED_FILE_NAME)
}
fn default_scan_start() -> f64 {
    SCAN_START
}
fn default_scan_end() -> f64 {
    SCAN_END
}
fn default_scan_points() -> usize {
    SCAN_POINTS
}
fn default_scan_file() -> String {
    String::from(SCAN_FILE_NAME)
}
fn default_model_config() -> ModelConfig {
    ModelConfig::default()
}
fn default_parallelization_config() -> ParallelizationConfig {
    ParallelizationConfig::default()
}
fn default_scan_config() -> ScanConfig {
    ScanConfig::default()
}

/// Settings of the program that are read from "tsh.toml". Everything that
/// concerns the propagation itself lives in "dynamics.toml".
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    #[serde(default = "default_jobtype")]
    pub jobtype: String,
    #[serde(default = "default_verbose")]
    pub verbose: i8,
    #[serde(default = "default_restart")]
    pub restart: bool,
    #[serde(default = "default_parallelization_config")]
    pub parallelization: ParallelizationConfig,
    #[serde(default = "default_model_config")]
    pub model: ModelConfig,
    #[serde(default = "default_scan_config")]
    pub scan: ScanConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            jobtype: default_jobtype(),
            verbose: default_verbose(),
            restart: default_restart(),
            parallelization: default_parallelization_config(),
            model: default_model_config(),
            scan: default_scan_config(),
        }
    }
}

impl Configuration {
    /// Read the configuration file from the working directory. If it does not exist
    /// the default settings are used and written to the directory.
    pub fn new() -> Result<Self> {
        let config_file_path: &Path = Path::new(CONFIG_FILE_NAME);
        if config_file_path.exists() {
            Self::from_file(config_file_path)
        } else {
            let config: Self = Self::default();
            // save the configuration file so that the user can see all used options
            let config_string: String = toml::to_string(&config)?;
            fs::write(config_file_path, config_string)
                .with_context(|| format!("unable to write {}", CONFIG_FILE_NAME))?;
            Ok(config)
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let config_string: String = fs::read_to_string(path)
            .with_context(|| format!("unable to read {}", path.display()))?;
        Self::from_toml(&config_string)
            .with_context(|| format!("invalid configuration in {}", path.display()))
    }

    pub fn from_toml(config_string: &str) -> Result<Self> {
        let config: Self = toml::from_str(config_string)?;
        Ok(config)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// single avoided crossing
    Sac,
    /// diabatic Hamiltonians read from a .npy file, replayed step by step
    Tabulated,
}

/// Selection of the model Hamiltonian
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    #[serde(default = "default_model_kind")]
    pub kind: ModelKind,
    #[serde(default)]
    pub sac: SacParameters,
    #[serde(default = "default_tabulated_file")]
    pub tabulated_file: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: default_model_kind(),
            sac: SacParameters::default(),
            tabulated_file: default_tabulated_file(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
#[serde(deny_unknown_fields)]
pub struct ParallelizationConfig {
    #[serde(default = "default_number_of_cores")]
    pub number_of_cores: usize,
}

impl Default for ParallelizationConfig {
    fn default() -> Self {
        Self {
            number_of_cores: default_number_of_cores(),
        }
    }
}

/// Grid of the potential energy scan along the first nuclear coordinate
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    #[serde(default = "default_scan_start")]
    pub start: f64,
    #[serde(default = "default_scan_end")]
    pub end: f64,
    #[serde(default = "default_scan_points")]
    pub points: usize,
    #[serde(default = "default_scan_file")]
    pub output_file: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start: default_scan_start(),
            end: default_scan_end(),
            points: default_scan_points(),
            output_file: default_scan_file(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Configuration = Configuration::from_toml("").unwrap();
        assert_eq!(config.jobtype, JOBTYPE);
        assert_eq!(config.model.kind, ModelKind::Sac);
        assert_eq!(config.model.sac.a, SAC_A);
        assert_eq!(config.scan.points, SCAN_POINTS);
        assert!(!config.restart);
    }

    #[test]
    fn nested_tables_are_read() {
        let config: Configuration = Configuration::from_toml(
            "jobtype = \"scan\"\n[model]\nkind = \"tabulated\"\ntabulated_file = \"h.npy\"\n\
             [model.sac]\nc = 0.01\n[scan]\npoints = 11",
        )
        .unwrap();
        assert_eq!(config.jobtype, "scan");
        assert_eq!(config.model.kind, ModelKind::Tabulated);
        assert_eq!(config.model.tabulated_file, "h.npy");
        assert_eq!(config.model.sac.c, 0.01);
        assert_eq!(config.model.sac.d, SAC_D);
        assert_eq!(config.scan.points, 11);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(Configuration::from_toml("number_of_trajectories = 3").is_err());
        assert!(Configuration::from_toml("[model]\nkind = \"morse\"").is_err());
    }
}
