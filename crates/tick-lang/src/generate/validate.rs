use std::collections::HashSet;
use std::time::Duration;

use crate::error::GenerateError;
use crate::rule::{AlertRule, Handler, QueryConfig, TaskType, Trigger};

/// Check everything the generator relies on and hand back the query.
pub(super) fn validate(rule: &AlertRule) -> Result<&QueryConfig, GenerateError> {
    if rule.name.trim().is_empty() {
        return Err(GenerateError::MissingName);
    }
    let query = rule.query.as_ref().ok_or(GenerateError::MissingQuery)?;

    match rule.task_type() {
        TaskType::Stream => validate_stream_query(query)?,
        TaskType::Batch => validate_batch_query(query)?,
    }
    // Without tags there is no where filter to carry the negation.
    if !query.are_tags_accepted && query.tags.is_empty() {
        return Err(GenerateError::InvalidQuery(
            "tag rejection needs at least one tag".into(),
        ));
    }
    for tag in &query.group_by.tags {
        if tag.is_empty() {
            return Err(GenerateError::InvalidQuery("empty group-by tag".into()));
        }
    }
    if let Some(time) = query.group_by.time {
        check_duration("group-by time", time).map_err(GenerateError::InvalidQuery)?;
    }
    if let Some(every) = rule.every {
        check_duration("every", every).map_err(GenerateError::InvalidQuery)?;
    }

    if let Trigger::Relative { shift, .. } = &rule.trigger {
        check_duration("shift", *shift).map_err(GenerateError::InvalidTrigger)?;
    }

    validate_conditions(rule)?;
    rule.handlers.iter().try_for_each(validate_handler)?;
    Ok(query)
}

fn validate_stream_query(query: &QueryConfig) -> Result<(), GenerateError> {
    if query.measurement.is_empty() {
        return Err(GenerateError::InvalidQuery(
            "stream rules need a measurement".into(),
        ));
    }
    match query.fields.as_slice() {
        [field] if !field.name.is_empty() => {}
        [_] => {
            return Err(GenerateError::InvalidQuery("field name is empty".into()));
        }
        fields => {
            return Err(GenerateError::InvalidQuery(format!(
                "stream rules need exactly one field, got {}",
                fields.len()
            )));
        }
    }
    for (key, values) in &query.tags {
        if key.is_empty() {
            return Err(GenerateError::InvalidQuery("empty tag key".into()));
        }
        if values.is_empty() {
            return Err(GenerateError::InvalidQuery(format!(
                "tag '{key}' has no values"
            )));
        }
    }
    Ok(())
}

fn validate_batch_query(query: &QueryConfig) -> Result<(), GenerateError> {
    if query.database.is_empty() {
        return Err(GenerateError::InvalidQuery(
            "batch rules need a database".into(),
        ));
    }
    let raw = query.raw_text.as_deref().unwrap_or_default();
    if raw.contains("'''") {
        return Err(GenerateError::InvalidQuery(
            "raw query text must not contain '''".into(),
        ));
    }
    // `'''` closes at its first occurrence, so a trailing quote would be cut off.
    if raw.ends_with('\'') {
        return Err(GenerateError::InvalidQuery(
            "raw query text must not end with a quote".into(),
        ));
    }
    if !query.fields.is_empty() || !query.tags.is_empty() {
        return Err(GenerateError::InvalidQuery(
            "raw query rules cannot also select fields or filter tags".into(),
        ));
    }
    Ok(())
}

fn validate_conditions(rule: &AlertRule) -> Result<(), GenerateError> {
    if rule.conditions.is_empty() {
        return Err(GenerateError::NoConditions);
    }
    let mut seen = HashSet::new();
    for cond in &rule.conditions {
        let level = cond.level.as_str();
        if !seen.insert(cond.level) {
            return Err(GenerateError::DuplicateLevel(level));
        }
        let invalid = |reason: &str| GenerateError::InvalidCondition {
            level,
            reason: reason.to_string(),
        };
        if !cond.value.is_finite() {
            return Err(invalid("threshold must be a finite number"));
        }
        match (cond.operator.is_range(), cond.upper) {
            (true, None) => return Err(invalid("range operator needs an upper bound")),
            (true, Some(upper)) if !upper.is_finite() => {
                return Err(invalid("upper bound must be a finite number"));
            }
            (true, Some(upper)) if upper < cond.value => {
                return Err(invalid("upper bound is below the lower bound"));
            }
            (false, Some(_)) => {
                return Err(invalid("upper bound only applies to range operators"));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_handler(handler: &Handler) -> Result<(), GenerateError> {
    let empty = |what: &str| GenerateError::InvalidHandler(format!("{what} is empty"));
    match handler {
        Handler::Email { to } if to.iter().any(String::is_empty) => Err(empty("email recipient")),
        Handler::Log { path } if path.is_empty() => Err(empty("log path")),
        Handler::Post { url } if url.is_empty() => Err(empty("post url")),
        Handler::Tcp { address } if address.is_empty() => Err(empty("tcp address")),
        Handler::Exec { command } if command.is_empty() => Err(empty("exec command")),
        _ => Ok(()),
    }
}

/// Durations must be positive and representable as a script literal.
fn check_duration(what: &str, d: Duration) -> Result<(), String> {
    if d.is_zero() {
        return Err(format!("{what} must be greater than zero"));
    }
    if d.subsec_nanos() % 1_000 != 0 {
        return Err(format!("{what} has sub-microsecond precision"));
    }
    Ok(())
}
