//! Tunable limits for the [`Resolver`](crate::Resolver).

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Limits and knobs used while resolving statements.
///
/// Every field has a sensible default, so a configuration file only needs to
/// mention the values it wants to change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    /// The character separating statements in a batch.
    pub delimiter: char,
    /// The deepest an expression may nest (parentheses, unary operators,
    /// exponents) before parsing is abandoned.
    pub max_depth: usize,
    /// The largest degree a polynomial may expand to, counting nested and
    /// multiplied powers. Anything bigger is solved numerically.
    pub max_exponent: u32,
    /// Newton iterations per starting point.
    pub max_iterations: usize,
    /// Convergence tolerance for Newton's method, also used to decide when a
    /// coefficient is negligible.
    pub tolerance: f64,
    /// How close to zero an equation must evaluate for a candidate root to be
    /// accepted.
    pub residual_tolerance: f64,
    /// Numeric root finding starts from points spread over
    /// `[-search_radius, search_radius]`.
    pub search_radius: f64,
    /// How many starting points to use for numeric root finding.
    pub seed_count: usize,
    /// The line appended to every step trace when a batch contains more than
    /// one statement.
    pub trace_separator: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            delimiter: ';',
            max_depth: crate::parse::DEFAULT_MAX_DEPTH,
            max_exponent: 64,
            max_iterations: 100,
            tolerance: 1e-9,
            residual_tolerance: 1e-7,
            search_radius: 10.0,
            seed_count: 21,
            trace_separator: String::from("---"),
        }
    }
}

impl ResolverConfig {
    /// Parse a configuration from YAML.
    pub fn from_yaml_str(src: &str) -> Result<Self, ConfigError> {
        let config: ResolverConfig = serde_yaml::from_str(src)?;
        config.validate()?;

        Ok(config)
    }

    /// Load a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let src = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!(path = %path.display(), "Loading resolver config");

        ResolverConfig::from_yaml_str(&src)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delimiter == '=' || is_operator(self.delimiter) {
            return Err(ConfigError::Invalid {
                field: "delimiter",
                reason: format!(
                    "{:?} is part of the expression syntax",
                    self.delimiter
                ),
            });
        }
        if self.delimiter.is_whitespace() || self.delimiter.is_alphanumeric()
        {
            return Err(ConfigError::Invalid {
                field: "delimiter",
                reason: format!(
                    "{:?} can appear inside a statement",
                    self.delimiter
                ),
            });
        }

        positive("max_depth", self.max_depth as f64)?;
        positive("max_iterations", self.max_iterations as f64)?;
        positive("tolerance", self.tolerance)?;
        positive("residual_tolerance", self.residual_tolerance)?;
        positive("search_radius", self.search_radius)?;

        if self.seed_count < 2 {
            return Err(ConfigError::Invalid {
                field: "seed_count",
                reason: String::from("at least 2 starting points are needed"),
            });
        }

        Ok(())
    }
}

fn is_operator(c: char) -> bool {
    matches!(c, '+' | '-' | '*' | '/' | '^' | '(' | ')' | '.' | '_')
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            reason: format!("must be a positive number, not {}", value),
        })
    }
}

/// Errors that can occur while loading a [`ResolverConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read \"{}\"", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for \"{field}\": {reason}")]
    Invalid { field: &'static str, reason: String },
}
