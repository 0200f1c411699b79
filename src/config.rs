use thiserror::Error;

use crate::{expr::parse::MAX_DEPTH_CAP, sandbox::Limits, solve::SolveConfig};

/// Settings of the whole crate, usually loaded from a YAML file:
///
/// ```yaml
/// sandbox:
///   max_input_len: 4096
///   max_depth: 128
///   magnitude_bound: 1.0e18
/// solve:
///   max_retries: 3
///   per_call_timeout_ms: 30000
/// ```
///
/// Every field is optional and falls back to its default. Configuration is
/// always handed over explicitly, nothing here reads the environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub sandbox: Limits,
    pub solve: SolveConfig,
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        use ConfigError::Invalid;

        if self.sandbox.max_input_len == 0 {
            return Err(Invalid {
                field: "sandbox.max_input_len",
                reason: "must be positive",
            });
        }
        if self.sandbox.max_depth == 0 {
            return Err(Invalid {
                field: "sandbox.max_depth",
                reason: "must be positive",
            });
        }
        if self.sandbox.max_depth > MAX_DEPTH_CAP {
            return Err(Invalid {
                field: "sandbox.max_depth",
                reason: "must not exceed 256",
            });
        }
        if !(self.sandbox.magnitude_bound.is_finite() && self.sandbox.magnitude_bound > 0.0) {
            return Err(Invalid {
                field: "sandbox.magnitude_bound",
                reason: "must be a positive finite number",
            });
        }
        if self.solve.per_call_timeout.is_zero() {
            return Err(Invalid {
                field: "solve.per_call_timeout_ms",
                reason: "must be positive",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration is not valid YAML for this crate. {0}")]
    Yaml(#[from] serde_yml::Error),

    #[error("configuration field `{field}` {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}
