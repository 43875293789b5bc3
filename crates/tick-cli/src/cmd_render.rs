use std::path::{Path, PathBuf};

use anyhow::Result;
use tick_lang::{GeneratorOptions, Script, TickGenerator};

use crate::load_rule;

pub fn run(rule: PathBuf, options: GeneratorOptions) -> Result<()> {
    let script = render_file(&rule, options)?;
    print!("{script}");
    Ok(())
}

/// Render the rule stored at `path`.
pub fn render_file(path: &Path, options: GeneratorOptions) -> Result<Script> {
    let rule = load_rule(path)?;
    let script = TickGenerator::new(options)
        .generate(&rule)
        .map_err(|e| anyhow::anyhow!("rule {:?}: {e}", rule.name))?;
    tracing::debug!(domain = "codec", rule = %rule.name, bytes = script.as_str().len(), "script rendered");
    Ok(script)
}
