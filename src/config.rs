//! Pipeline configuration loaded from an optional YAML file.
//!
//! Every key is optional; command-line flags override whatever the file sets.

use std::{fs, path::Path};

use anyhow::{Context, Result, ensure};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATE_FORMAT: &str = "%d-%m-%Y";
pub const DEFAULT_SENTINEL: &str = "UNKNOWN";
pub const DEFAULT_TOP_PRODUCTS: usize = 10;
pub const DEFAULT_TOP_CUSTOMERS: usize = 50;

/// What to do with a row whose date or numeric text cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum MalformedPolicy {
    /// Abort the run on the first malformed value.
    #[default]
    Reject,
    /// Drop the row from the working set and record it for review.
    Quarantine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// chrono format of raw transaction dates.
    pub date_format: String,
    pub unknown_sentinel: String,
    pub malformed: MalformedPolicy,
    /// Group duplicates on the raw date text, before dates are normalized.
    pub dedup_on_raw_dates: bool,
    pub top_products: usize,
    pub top_customers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            unknown_sentinel: DEFAULT_SENTINEL.to_string(),
            malformed: MalformedPolicy::default(),
            dedup_on_raw_dates: false,
            top_products: DEFAULT_TOP_PRODUCTS,
            top_customers: DEFAULT_TOP_CUSTOMERS,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("Opening config file {path:?}"))?;
        let config: PipelineConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("Parsing config file {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.unknown_sentinel.trim().is_empty(),
            "unknown_sentinel cannot be blank"
        );
        ensure!(!self.date_format.is_empty(), "date_format cannot be empty");
        ensure!(self.top_products > 0, "top_products must be positive");
        ensure!(self.top_customers > 0, "top_customers must be positive");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "malformed: quarantine").unwrap();
        writeln!(file, "top_customers: 5").unwrap();
        let config = PipelineConfig::load(file.path()).expect("load");
        assert_eq!(config.malformed, MalformedPolicy::Quarantine);
        assert_eq!(config.top_customers, 5);
        assert_eq!(config.top_products, DEFAULT_TOP_PRODUCTS);
        assert_eq!(config.date_format, DEFAULT_DATE_FORMAT);
        assert!(!config.dedup_on_raw_dates);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "rules: []").unwrap();
        assert!(PipelineConfig::load(file.path()).is_err());
    }

    #[test]
    fn blank_sentinel_fails_validation() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "unknown_sentinel: '  '").unwrap();
        let err = PipelineConfig::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("unknown_sentinel"));
    }
}
