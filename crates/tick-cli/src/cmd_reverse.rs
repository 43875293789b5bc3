use std::path::PathBuf;

use anyhow::Result;
use tick_lang::{AlertRule, ReverseError, Script};

/// Output encoding of the reconstructed rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

pub fn run(script: PathBuf, format: Format) -> Result<()> {
    let text = std::fs::read_to_string(&script)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", script.display()))?;
    let (rule, warning) = reverse_text(&text)?;
    if let Some(reason) = warning {
        eprintln!("warning: {}: partially reconstructed: {reason}", script.display());
    }
    print!("{}", encode(&rule, format)?);
    Ok(())
}

/// Rebuild the rule in `text`. An unsupported script shape still yields
/// the recovered part of the rule together with the reason.
pub fn reverse_text(text: &str) -> Result<(AlertRule, Option<String>)> {
    match tick_lang::reverse(&Script::new(text)) {
        Ok(rule) => Ok((rule, None)),
        Err(ReverseError::Unsupported { reason, partial }) => {
            tracing::debug!(domain = "codec", reason = %reason, "partial reverse");
            Ok((*partial, Some(reason)))
        }
        Err(e @ ReverseError::Syntax(_)) => Err(e.into()),
    }
}

pub fn encode(rule: &AlertRule, format: Format) -> Result<String> {
    Ok(match format {
        Format::Toml => toml::to_string_pretty(rule)?,
        Format::Json => {
            let mut out = serde_json::to_string_pretty(rule)?;
            out.push('\n');
            out
        }
    })
}
