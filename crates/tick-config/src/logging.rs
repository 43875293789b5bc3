use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Deserialize;

/// `[logging]` section. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level for every target, e.g. `"info"`.
    pub level: String,
    /// Per-target overrides: `{ "tick_tasks::client" = "debug" }`.
    pub modules: BTreeMap<String, String>,
    /// Also write logs here. Relative to the config file's directory.
    pub file: Option<PathBuf>,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            modules: BTreeMap::new(),
            file: None,
            format: LogFormat::Plain,
        }
    }
}

impl LoggingConfig {
    /// `EnvFilter` directive string: the level followed by the module
    /// overrides in name order.
    pub fn directives(&self) -> String {
        let mut out = self.level.clone();
        for (module, level) in &self.modules {
            write!(out, ",{module}={level}").ok();
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// `[domain]`-prefixed text lines.
    Plain,
    /// One JSON object per event.
    Json,
}
