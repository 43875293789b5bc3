use crate::forge::ForgeConfig;

/// Internal validation, called automatically during `ForgeConfig::from_str` / `load`.
pub(crate) fn validate(config: &ForgeConfig) -> anyhow::Result<()> {
    let kapacitor = &config.kapacitor;
    let rest = kapacitor
        .url
        .strip_prefix("http://")
        .or_else(|| kapacitor.url.strip_prefix("https://"));
    match rest {
        Some(host) if !host.is_empty() => {}
        _ => anyhow::bail!(
            "kapacitor.url must start with \"http://\" or \"https://\" and name a host, got {:?}",
            kapacitor.url,
        ),
    }

    if kapacitor.password.is_some() && kapacitor.username.is_none() {
        anyhow::bail!("kapacitor.password is set but kapacitor.username is missing");
    }
    if kapacitor.username.as_deref() == Some("") {
        anyhow::bail!("kapacitor.username must not be empty");
    }

    let script = &config.script;
    for (key, value) in [
        ("output_database", &script.output_database),
        ("output_retention_policy", &script.output_retention_policy),
        ("output_measurement", &script.output_measurement),
    ] {
        if value.is_empty() {
            anyhow::bail!("script.{key} must not be empty");
        }
    }

    if config.logging.level.trim().is_empty() {
        anyhow::bail!("logging.level must not be empty");
    }

    Ok(())
}
