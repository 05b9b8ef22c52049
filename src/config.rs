//! Configuration for the CLI front-end.
//!
//! Hierarchical loading: `icl.toml` in the working directory, then `ICL_*`
//! environment variables. The core pipeline never reads configuration - every
//! pipeline input is an explicit parameter; this layer only supplies CLI
//! defaults.
//!
//! ```toml
//! # icl.toml
//! [compile]
//! default_target = "python"
//! optimize = false
//!
//! [logging]
//! level = "warn"
//! ```
//!
//! Environment overrides use `__` as the section separator:
//! `ICL_COMPILE__DEFAULT_TARGET=js`, `ICL_LOGGING__LEVEL=debug`.

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IclConfig {
    #[serde(default)]
    pub compile: CompileConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Compile-command defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Target used when the CLI flag is omitted.
    #[serde(default = "default_target")]
    pub default_target: String,

    /// Run graph optimization passes by default.
    #[serde(default)]
    pub optimize: bool,
}

/// Logging defaults applied when RUST_LOG is unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_target() -> String {
    "python".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for CompileConfig {
    fn default() -> Self {
        CompileConfig {
            default_target: default_target(),
            optimize: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

impl Default for IclConfig {
    fn default() -> Self {
        IclConfig {
            compile: CompileConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl IclConfig {
    /// Load configuration from `icl.toml` and `ICL_*` env overrides,
    /// falling back to defaults when neither is present.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("icl.toml"))
            .merge(Env::prefixed("ICL_").split("__"))
            .extract()
    }
}
