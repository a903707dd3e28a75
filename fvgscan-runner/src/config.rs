//! TOML configuration for scanning and backtesting.
//!
//! ```toml
//! [scanner]
//! symbols = ["BTC/USDT", "ETH/USDT"]
//! timeframes = ["1m", "5m", "15m", "1h", "4h", "1d"]
//! data_dir = "data/candles"
//! overrides_path = "data/parameters.json"
//!
//! [parameters]
//! min_gap_percent = 0.2
//!
//! [backtest]
//! initial_capital = 10000.0
//! pending_entry_bars = 20
//! annualization = 252.0
//! output_dir = "results"
//! ```
//!
//! Every section and field is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use fvgscan_core::domain::{Timeframe, DEFAULT_TIMEFRAMES};
use fvgscan_core::params::{ParamError, ParameterSet, ParameterStore, PartialParameterSet};

use crate::metrics::DEFAULT_ANNUALIZATION;
use crate::runner::BacktestSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid [parameters]: {0}")]
    Params(#[from] ParamError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScannerSection {
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub data_dir: PathBuf,
    pub overrides_path: PathBuf,
}

impl Default for ScannerSection {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            timeframes: DEFAULT_TIMEFRAMES.to_vec(),
            data_dir: PathBuf::from("data/candles"),
            overrides_path: PathBuf::from(crate::overrides::DEFAULT_OVERRIDES_PATH),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BacktestSection {
    pub initial_capital: f64,
    pub pending_entry_bars: Option<usize>,
    pub annualization: f64,
    pub output_dir: PathBuf,
}

impl Default for BacktestSection {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            pending_entry_bars: None,
            annualization: DEFAULT_ANNUALIZATION,
            output_dir: PathBuf::from("results"),
        }
    }
}

/// Complete runner configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanConfig {
    pub scanner: ScannerSection,
    /// Global parameter defaults; unset fields keep the built-in values.
    pub parameters: PartialParameterSet,
    pub backtest: BacktestSection,
}

impl ScanConfig {
    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ScanConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.parameters.validate()?;
        let capital = self.backtest.initial_capital;
        if !capital.is_finite() || capital <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "initial_capital must be positive, got {capital}"
            )));
        }
        let ann = self.backtest.annualization;
        if !ann.is_finite() || ann <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "annualization must be positive, got {ann}"
            )));
        }
        if self.backtest.pending_entry_bars == Some(0) {
            return Err(ConfigError::Invalid(
                "pending_entry_bars must be at least 1".into(),
            ));
        }
        if self.scanner.timeframes.is_empty() {
            return Err(ConfigError::Invalid("no timeframes configured".into()));
        }
        Ok(())
    }

    /// Built-in defaults with `[parameters]` applied.
    pub fn defaults(&self) -> ParameterSet {
        let mut defaults = ParameterSet::default();
        self.parameters.apply_to(&mut defaults);
        defaults
    }

    /// Parameter store with config defaults and no overrides.
    pub fn parameter_store(&self) -> Result<ParameterStore, ConfigError> {
        Ok(ParameterStore::new(self.defaults())?)
    }

    pub fn backtest_settings(&self) -> BacktestSettings {
        BacktestSettings {
            initial_capital: self.backtest.initial_capital,
            pending_entry_bars: self.backtest.pending_entry_bars,
            annualization: self.backtest.annualization,
            timeframes: self.scanner.timeframes.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ScanConfig::from_toml("").unwrap();
        assert_eq!(config, ScanConfig::default());
        assert_eq!(config.defaults(), ParameterSet::default());
        assert_eq!(config.scanner.timeframes.len(), 6);
    }

    #[test]
    fn parses_all_sections() {
        let config = ScanConfig::from_toml(
            r#"
[scanner]
symbols = ["BTC/USDT"]
timeframes = ["5m", "1h"]

[parameters]
min_gap_percent = 0.25
min_timeframe_confluence = 2

[backtest]
initial_capital = 5000.0
pending_entry_bars = 12
"#,
        )
        .unwrap();
        assert_eq!(config.scanner.symbols, vec!["BTC/USDT".to_string()]);
        assert_eq!(config.scanner.timeframes, vec![Timeframe::M5, Timeframe::H1]);
        let defaults = config.defaults();
        assert_eq!(defaults.min_gap_percent, 0.25);
        assert_eq!(defaults.min_timeframe_confluence, 2);
        assert_eq!(defaults.max_gap_age, 50);
        let settings = config.backtest_settings();
        assert_eq!(settings.initial_capital, 5000.0);
        assert_eq!(settings.pending_entry_bars, Some(12));
        assert_eq!(settings.annualization, DEFAULT_ANNUALIZATION);
    }

    #[test]
    fn unknown_parameter_rejected() {
        let err = ScanConfig::from_toml("[parameters]\nmin_gap = 0.2\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn out_of_domain_parameter_rejected() {
        let err = ScanConfig::from_toml("[parameters]\nmax_risk_percent = 150.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Params(_)));
    }

    #[test]
    fn bad_timeframe_rejected() {
        assert!(ScanConfig::from_toml("[scanner]\ntimeframes = [\"2m\"]\n").is_err());
    }

    #[test]
    fn non_positive_capital_rejected() {
        let err = ScanConfig::from_toml("[backtest]\ninitial_capital = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
