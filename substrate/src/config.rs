//! Engine-wide configuration: policy thresholds and validator command
//! templates. Loaded from a TOML file at the project root; every field has
//! a sane default so a missing file is not an error at the call site.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    pub stall_threshold: usize,
    pub oscillation_threshold: usize,
    pub window_seconds: i64,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            stall_threshold: 3,
            oscillation_threshold: 2,
            window_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub max_calls_per_minute: usize,
    pub max_calls_per_target: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls_per_minute: 60,
            max_calls_per_target: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub velocity: VelocityConfig,
    pub rate_limit: RateLimitConfig,
    /// Path to the TrustManager's YAML rules file, relative to the project
    /// root. When unset, no trust rules are loaded and TrustPolicy is
    /// omitted from the default composition.
    pub trust_rules_path: Option<String>,
    pub blocked_paths: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            velocity: VelocityConfig::default(),
            rate_limit: RateLimitConfig::default(),
            trust_rules_path: None,
            blocked_paths: Vec::new(),
        }
    }
}

/// One configured validator entry: a name, its kind, and its command
/// template (with a `{path}` placeholder where applicable).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    pub name: String,
    pub kind: ValidatorKind,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub parser: Option<String>,
    #[serde(default)]
    pub success_codes: Option<Vec<i32>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    Syntax,
    Command,
    Diagnostic,
    TestRunner,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubstrateConfig {
    pub policy: PolicyConfig,
    pub validators: Vec<ValidatorConfig>,
    pub stop_on_first_validator_error: bool,
}

impl SubstrateConfig {
    pub fn from_toml(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_validators() {
        let config = SubstrateConfig::default();
        assert!(config.validators.is_empty());
        assert_eq!(config.policy.velocity.stall_threshold, 3);
    }

    #[test]
    fn parses_minimal_toml() {
        let toml_src = r#"
            stop_on_first_validator_error = true

            [policy]
            trust_rules_path = "trust.yaml"

            [[validators]]
            name = "syntax"
            kind = "syntax"

            [[validators]]
            name = "tests"
            kind = "test_runner"
            command = "pytest {path}"
        "#;
        let config = SubstrateConfig::from_toml(toml_src).unwrap();
        assert!(config.stop_on_first_validator_error);
        assert_eq!(config.policy.trust_rules_path.as_deref(), Some("trust.yaml"));
        assert_eq!(config.validators.len(), 2);
        assert_eq!(config.validators[1].kind, ValidatorKind::TestRunner);
    }

    #[test]
    fn missing_file_surfaces_io_error() {
        let result = SubstrateConfig::load("/nonexistent/path/substrate.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
