//! Duration literals as they appear in scripts (`30s`, `10m`, `500ms`).

use std::time::Duration;

use winnow::prelude::*;

use crate::parse_utils::duration_literal;

const UNITS: &[(&str, u128)] = &[
    ("d", 86_400_000_000_000),
    ("h", 3_600_000_000_000),
    ("m", 60_000_000_000),
    ("s", 1_000_000_000),
    ("ms", 1_000_000),
    ("u", 1_000),
];

/// Render `d` using the largest unit that divides it exactly.
/// Sub-microsecond remainders are truncated.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    for (suffix, size) in UNITS {
        if nanos % size == 0 {
            return format!("{}{suffix}", nanos / size);
        }
    }
    format!("{}u", nanos / 1_000)
}

pub fn parse_duration(text: &str) -> anyhow::Result<Duration> {
    duration_literal
        .parse(text.trim())
        .map_err(|e| anyhow::anyhow!("invalid duration {text:?}: {e}"))
}

/// `serde(with = ...)` support for `Duration` fields.
pub mod serde_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_duration(&s).map_err(de::Error::custom)
    }
}

/// `serde(with = ...)` support for `Option<Duration>` fields.
pub mod serde_opt_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => serializer.serialize_some(&super::format_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| super::parse_duration(&s).map_err(de::Error::custom))
            .transpose()
    }
}
