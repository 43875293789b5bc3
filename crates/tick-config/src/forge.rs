use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::kapacitor::KapacitorConfig;
use crate::logging::LoggingConfig;
use crate::script::ScriptConfig;
use crate::validate;

// ---------------------------------------------------------------------------
// Raw TOML structure (intermediate representation)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ForgeConfigRaw {
    kapacitor: KapacitorConfig,
    #[serde(default)]
    script: ScriptConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// ForgeConfig (resolved, validated)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ForgeConfig {
    pub kapacitor: KapacitorConfig,
    pub script: ScriptConfig,
    pub logging: LoggingConfig,
}

impl ForgeConfig {
    /// Read and parse a `tickforge.toml` file. A relative `logging.file` is
    /// resolved against the directory holding the config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let mut config: ForgeConfig = content.parse()?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.logging.file = config.logging.file.take().map(|file| {
            if file.is_relative() {
                base.join(file)
            } else {
                file
            }
        });
        Ok(config)
    }
}

impl FromStr for ForgeConfig {
    type Err = anyhow::Error;

    /// Parse a TOML string into a resolved, validated [`ForgeConfig`].
    fn from_str(toml_str: &str) -> anyhow::Result<Self> {
        let raw: ForgeConfigRaw = toml::from_str(toml_str)?;

        let mut kapacitor = raw.kapacitor;
        // Links are appended to the base URL, so a trailing slash would double up.
        kapacitor.url = kapacitor.url.trim_end_matches('/').to_string();

        let config = ForgeConfig {
            kapacitor,
            script: raw.script,
            logging: raw.logging,
        };

        validate::validate(&config)?;

        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
