//! Client configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```json
//! { "max_concurrent_subrequests": 8, "max_quanta_per_query": 5000, "quantum_origin_ms": 0 }
//! ```

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Errors raised while loading a [`ClientConfig`].
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[snafu(display("failed to read config file {path}: {source}"))]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The configuration text is not valid JSON for this struct.
    #[snafu(display("failed to parse client config: {source}"))]
    Parse {
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A field holds a value the client cannot run with.
    #[snafu(display("invalid client config: {field} {reason}"))]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Tunables for command execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Upper bound on in-flight sub-requests for a single command.
    pub max_concurrent_subrequests: usize,
    /// A query covering more quanta than this fails to plan.
    pub max_quanta_per_query: usize,
    /// Alignment origin of quantum boundaries, in epoch milliseconds.
    pub quantum_origin_ms: i64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            max_concurrent_subrequests: 8,
            max_quanta_per_query: 5000,
            quantum_origin_ms: 0,
        }
    }
}

impl ClientConfig {
    /// Parse and validate a JSON config.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = serde_json::from_str(text).context(ParseSnafu)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).context(ReadSnafu {
            path: path.display().to_string(),
        })?;
        Self::from_json_str(&text)
    }

    /// Reject values the coordinator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.max_concurrent_subrequests > 0,
            InvalidSnafu {
                field: "max_concurrent_subrequests",
                reason: "must be at least 1",
            }
        );
        ensure!(
            self.max_quanta_per_query > 0,
            InvalidSnafu {
                field: "max_quanta_per_query",
                reason: "must be at least 1",
            }
        );
        Ok(())
    }
}
