use serde::Deserialize;
use tick_lang::GeneratorOptions;

/// Where generated scripts write fired alerts back to.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    pub output_database: String,
    pub output_retention_policy: String,
    pub output_measurement: String,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        let defaults = GeneratorOptions::default();
        Self {
            output_database: defaults.output_database,
            output_retention_policy: defaults.output_retention_policy,
            output_measurement: defaults.output_measurement,
        }
    }
}

impl ScriptConfig {
    pub fn generator_options(&self) -> GeneratorOptions {
        GeneratorOptions {
            output_database: self.output_database.clone(),
            output_retention_policy: self.output_retention_policy.clone(),
            output_measurement: self.output_measurement.clone(),
        }
    }
}
