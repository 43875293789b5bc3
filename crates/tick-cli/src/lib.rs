pub mod cmd_classify;
pub mod cmd_render;
pub mod cmd_reverse;

use std::path::Path;

use anyhow::Result;
use tick_config::{ForgeConfig, LoggingConfig};
use tick_lang::{AlertRule, GeneratorOptions};

/// Read an [`AlertRule`] from a TOML file.
pub fn load_rule(path: &Path) -> Result<AlertRule> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    toml::from_str(&text).map_err(|e| anyhow::anyhow!("parsing rule {}: {e}", path.display()))
}

/// Settings the offline commands need from `tickforge.toml`.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub generator: GeneratorOptions,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Load from `config` when given, defaults otherwise.
    pub fn resolve(config: Option<&Path>) -> Result<Self> {
        let Some(path) = config else {
            return Ok(Self::default());
        };
        let config = ForgeConfig::load(path)?;
        Ok(Self {
            generator: config.script.generator_options(),
            logging: config.logging,
        })
    }
}
