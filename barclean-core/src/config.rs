//! Pipeline configuration, loaded from TOML.
//!
//! Every field has a default, so an empty document is a valid configuration:
//!
//! ```toml
//! [diagnostics]
//! mad_k = 3.0
//! iqr_k = 1.5
//! missing_tolerance_percent = 30.0
//! gap_warn_percent = 5.0
//!
//! [impute]
//! strategy = "iterative"   # or "fill_forward"
//! max_iter = 10
//! seed = 42
//! order = "ascending"      # or "random"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::diagnostics::DiagnosticsConfig;
use crate::impute::ImputeConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {message}")]
    Io { path: String, message: String },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub diagnostics: DiagnosticsConfig,
    pub impute: ImputeConfig,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Reject thresholds that would make the run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.diagnostics;
        if !(d.mad_k > 0.0 && d.iqr_k > 0.0) {
            return Err(ConfigError::Invalid(
                "diagnostics.mad_k and diagnostics.iqr_k must be positive".into(),
            ));
        }
        if !(0.0..=100.0).contains(&d.missing_tolerance_percent)
            || !(0.0..=100.0).contains(&d.gap_warn_percent)
        {
            return Err(ConfigError::Invalid(
                "percentages must lie in [0, 100]".into(),
            ));
        }
        let i = &self.impute;
        if i.max_iter == 0 {
            return Err(ConfigError::Invalid("impute.max_iter must be at least 1".into()));
        }
        if !(i.tolerance >= 0.0 && i.ridge_lambda >= 0.0) {
            return Err(ConfigError::Invalid(
                "impute.tolerance and impute.ridge_lambda must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impute::{ImputeOrder, ImputeStrategy};

    #[test]
    fn empty_document_is_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.diagnostics.mad_k, 3.0);
        assert_eq!(config.diagnostics.missing_tolerance_percent, 30.0);
        assert_eq!(config.impute.max_iter, 10);
        assert_eq!(config.impute.seed, 42);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            [impute]
            strategy = "fill_forward"
            order = "random"
            "#,
        )
        .unwrap();
        assert_eq!(config.impute.strategy, ImputeStrategy::FillForward);
        assert_eq!(config.impute.order, ImputeOrder::Random);
        assert_eq!(config.impute.seed, 42);
        assert_eq!(config.diagnostics.gap_warn_percent, 5.0);
    }

    #[test]
    fn unknown_section_is_rejected() {
        assert!(matches!(
            PipelineConfig::from_toml("[network]\nretries = 3\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn zero_iterations_is_invalid() {
        assert!(matches!(
            PipelineConfig::from_toml("[impute]\nmax_iter = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn toml_round_trip() {
        let config = PipelineConfig::default();
        let text = config.to_toml().unwrap();
        assert_eq!(PipelineConfig::from_toml(&text).unwrap(), config);
    }
}
