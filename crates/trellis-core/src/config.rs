//! Engine configuration (`trellis.toml`) parsing and validation.

use std::ops::RangeInclusive;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expr::{EvaluationStrategy, Evaluator, EvaluatorLimits};

/// File name looked up in the working directory
pub const CONFIG_FILE: &str = "trellis.toml";

const DEPTH_RANGE: RangeInclusive<usize> = 1..=10_000;

/// Errors that can occur when loading a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// The complete trellis.toml configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub evaluator: EvaluatorConfig,
    pub logging: LoggingConfig,
}

/// `[evaluator]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluatorConfig {
    pub strategy: EvaluationStrategy,
    /// Evaluation recursion limit, function calls included
    pub max_stack_depth: usize,
    /// Syntactic nesting limit applied by the expression parser
    pub max_nesting_depth: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        let limits = EvaluatorLimits::default();
        Self {
            strategy: EvaluationStrategy::default(),
            max_stack_depth: limits.max_stack_depth,
            max_nesting_depth: limits.max_nesting_depth,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `tracing` filter directive, used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load and validate a config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate config text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_depth("evaluator.max_stack_depth", self.evaluator.max_stack_depth)?;
        check_depth("evaluator.max_nesting_depth", self.evaluator.max_nesting_depth)?;
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "logging.filter",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn limits(&self) -> EvaluatorLimits {
        EvaluatorLimits {
            max_nesting_depth: self.evaluator.max_nesting_depth,
            max_stack_depth: self.evaluator.max_stack_depth,
        }
    }

    /// The evaluator this configuration describes
    pub fn build_evaluator(&self) -> Evaluator {
        Evaluator::new(self.evaluator.strategy, self.limits())
    }
}

fn check_depth(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if DEPTH_RANGE.contains(&value) {
        return Ok(());
    }
    Err(ConfigError::Invalid {
        field,
        reason: format!(
            "{value} is outside {}..={}",
            DEPTH_RANGE.start(),
            DEPTH_RANGE.end()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = EngineConfig::parse("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.evaluator.strategy, EvaluationStrategy::Sandboxed);
        assert_eq!(config.limits(), EvaluatorLimits::default());
        assert_eq!(config.logging.filter, "warn");
    }

    #[test]
    fn full_config() {
        let config = EngineConfig::parse(
            r#"
[evaluator]
strategy = "direct"
max_stack_depth = 64
max_nesting_depth = 32

[logging]
filter = "trellis_core=debug"
"#,
        )
        .unwrap();
        assert_eq!(config.evaluator.strategy, EvaluationStrategy::Direct);
        assert_eq!(config.limits().max_stack_depth, 64);
        assert_eq!(config.limits().max_nesting_depth, 32);
        assert_eq!(config.build_evaluator().strategy(), EvaluationStrategy::Direct);
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = EngineConfig::parse("[evaluator]\nstrategy = \"direct\"\ntimeout = 5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = EngineConfig::parse("[evaluator]\nstrategy = \"vm\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn rejects_out_of_range_limits() {
        let err = EngineConfig::parse("[evaluator]\nmax_stack_depth = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "evaluator.max_stack_depth", .. }
        ));
        assert!(EngineConfig::parse("[evaluator]\nmax_nesting_depth = 20000\n").is_err());
        assert!(EngineConfig::parse("[logging]\nfilter = \" \"\n").is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[evaluator]\nstrategy = \"direct\"").unwrap();
        let config = EngineConfig::from_path(file.path()).unwrap();
        assert_eq!(config.evaluator.strategy, EvaluationStrategy::Direct);

        let missing = EngineConfig::from_path(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
