//! Configuration schema (sqlscope.toml)

use serde::{Deserialize, Serialize};
use crate::dialect::{DialectConfig, DialectRules};

/// Per-project adjustments on top of a dialect preset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialectOverrides {
    /// Additional words classified as keywords
    #[serde(default)]
    pub extra_keywords: Vec<String>,

    /// Replace the preset's single-line comment markers
    #[serde(default)]
    pub line_comments: Option<Vec<String>>,

    /// Additional line commands (`DELIMITER`, `GO`)
    #[serde(default)]
    pub commands: Vec<String>,

    /// Override whether identifiers may start with a digit
    #[serde(default)]
    pub digit_identifiers: Option<bool>,
}

/// Statement rewriter settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewriterConfig {
    /// Hard bound on a single statement parse
    #[serde(default = "default_parse_timeout_ms")]
    pub parse_timeout_ms: u64,

    /// Size of the background parse pool
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Splice rewritten clauses into the original text instead of
    /// returning the canonical rendering of the whole statement
    #[serde(default = "default_preserve_formatting")]
    pub preserve_formatting: bool,
}

fn default_parse_timeout_ms() -> u64 {
    1000
}

fn default_worker_threads() -> usize {
    2
}

fn default_preserve_formatting() -> bool {
    true
}

impl Default for RewriterConfig {
    fn default() -> Self {
        Self {
            parse_timeout_ms: default_parse_timeout_ms(),
            worker_threads: default_worker_threads(),
            preserve_formatting: default_preserve_formatting(),
        }
    }
}

impl RewriterConfig {
    pub fn parse_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.parse_timeout_ms)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// SQL dialect
    #[serde(default)]
    pub dialect: DialectConfig,

    /// Dialect adjustments
    #[serde(default)]
    pub dialect_overrides: DialectOverrides,

    /// Statement rewriter
    #[serde(default)]
    pub rewriter: RewriterConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if config.rewriter.worker_threads == 0 {
            return Err(ConfigError::ParseError(
                "rewriter.worker_threads must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Dialect preset with the overrides applied
    pub fn dialect_rules(&self) -> DialectRules {
        let mut rules = DialectRules::for_dialect(self.dialect);
        let overrides = &self.dialect_overrides;

        rules.add_keywords(&overrides.extra_keywords);

        if let Some(markers) = &overrides.line_comments {
            rules.line_comments = markers.iter().filter(|m| !m.is_empty()).cloned().collect();
        }

        rules.commands.extend(overrides.commands.iter().cloned());

        if let Some(digit_identifiers) = overrides.digit_identifiers {
            rules.digit_identifiers = digit_identifiers;
        }

        rules
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
