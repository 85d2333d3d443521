//! sqlscope core
//!
//! Dialect rules and configuration shared by the tokenizer, the model
//! builder and the statement rewriter.

pub mod dialect;
pub mod config;

pub use dialect::{DialectConfig, DialectRules, QuotePair, ANSI_KEYWORDS};
pub use config::{Config, ConfigError, DialectOverrides, RewriterConfig};
