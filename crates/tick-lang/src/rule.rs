//! Structured alert-rule model shared by the generator and the reverse parser.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::duration::{serde_duration, serde_opt_duration};

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

/// Generated script text. Generation always produces a fresh value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script(String);

impl Script {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Script {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for Script {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl From<Script> for String {
    fn from(script: Script) -> Self {
        script.0
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// AlertRule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryConfig>,
    pub trigger: Trigger,
    pub conditions: Vec<Condition>,
    /// How often the alert is evaluated.
    #[serde(with = "serde_opt_duration", skip_serializing_if = "Option::is_none")]
    pub every: Option<Duration>,
    pub message: String,
    pub details: String,
    pub handlers: Vec<Handler>,
    /// Last generated form of this rule.
    #[serde(skip_serializing_if = "Script::is_empty")]
    pub script: Script,
}

impl AlertRule {
    pub fn task_type(&self) -> TaskType {
        task_type(self.query.as_ref())
    }
}

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub database: String,
    pub retention_policy: String,
    pub measurement: String,
    pub fields: Vec<Field>,
    /// Tag key → accepted (or rejected) values.
    pub tags: BTreeMap<String, Vec<String>>,
    /// `true`: tags must match one of the values; `false`: must match none.
    pub are_tags_accepted: bool,
    pub group_by: GroupBy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            database: String::new(),
            retention_policy: String::new(),
            measurement: String::new(),
            fields: Vec::new(),
            tags: BTreeMap::new(),
            are_tags_accepted: true,
            group_by: GroupBy::default(),
            raw_text: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupBy {
    #[serde(with = "serde_opt_duration", skip_serializing_if = "Option::is_none")]
    pub time: Option<Duration>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<Aggregate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregate {
    Mean,
    Median,
    Sum,
    Count,
    Min,
    Max,
    First,
    Last,
    Spread,
    Stddev,
}

impl Aggregate {
    pub fn as_str(self) -> &'static str {
        match self {
            Aggregate::Mean => "mean",
            Aggregate::Median => "median",
            Aggregate::Sum => "sum",
            Aggregate::Count => "count",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
            Aggregate::First => "first",
            Aggregate::Last => "last",
            Aggregate::Spread => "spread",
            Aggregate::Stddev => "stddev",
        }
    }
}

impl FromStr for Aggregate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mean" => Ok(Aggregate::Mean),
            "median" => Ok(Aggregate::Median),
            "sum" => Ok(Aggregate::Sum),
            "count" => Ok(Aggregate::Count),
            "min" => Ok(Aggregate::Min),
            "max" => Ok(Aggregate::Max),
            "first" => Ok(Aggregate::First),
            "last" => Ok(Aggregate::Last),
            "spread" => Ok(Aggregate::Spread),
            "stddev" => Ok(Aggregate::Stddev),
            _ => Err(format!("unknown aggregate function: {s}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Task classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Stream,
    Batch,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Stream => "stream",
            TaskType::Batch => "batch",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule is a batch task iff it carries non-empty raw query text.
pub fn task_type(query: Option<&QueryConfig>) -> TaskType {
    match query.and_then(|q| q.raw_text.as_deref()) {
        Some(raw) if !raw.is_empty() => TaskType::Batch,
        _ => TaskType::Stream,
    }
}

// ---------------------------------------------------------------------------
// Trigger & conditions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    #[default]
    Threshold,
    /// Compare the current value with the value `shift` ago.
    Relative {
        change: Change,
        #[serde(with = "serde_duration")]
        shift: Duration,
    },
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Threshold => "threshold",
            Trigger::Relative { .. } => "relative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    Change,
    PercentChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub level: Level,
    pub operator: Operator,
    pub value: f64,
    /// Upper bound for range operators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Crit,
    Warn,
    Info,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Crit => "crit",
            Level::Warn => "warn",
            Level::Info => "info",
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crit" => Ok(Level::Crit),
            "warn" => Ok(Level::Warn),
            "info" => Ok(Level::Info),
            _ => Err(format!("unknown alert level: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    GreaterThan,
    GreaterEqual,
    LessThan,
    LessEqual,
    EqualTo,
    NotEqualTo,
    InsideRange,
    OutsideRange,
}

impl Operator {
    pub fn is_range(self) -> bool {
        matches!(self, Operator::InsideRange | Operator::OutsideRange)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Notification target attached to the alert node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Handler {
    Email {
        #[serde(default)]
        to: Vec<String>,
    },
    Slack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },
    PagerDuty,
    Log {
        path: String,
    },
    Post {
        url: String,
    },
    Tcp {
        address: String,
    },
    Exec {
        command: Vec<String>,
    },
}
