use crate::rule::AlertRule;

/// A rule that cannot be rendered into a valid script.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerateError {
    #[error("rule has no name")]
    MissingName,
    #[error("rule has no query")]
    MissingQuery,
    #[error("rule has no conditions")]
    NoConditions,
    #[error("condition level '{0}' appears more than once")]
    DuplicateLevel(&'static str),
    #[error("condition '{level}': {reason}")]
    InvalidCondition { level: &'static str, reason: String },
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),
    #[error("invalid handler: {0}")]
    InvalidHandler(String),
}

/// Failure to rebuild an [`AlertRule`] from script text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReverseError {
    /// The text is not a script at all.
    #[error("script syntax error: {0}")]
    Syntax(String),
    /// The script parsed, but its shape is not one the generator emits.
    /// Carries whatever could be recovered.
    #[error("unsupported script shape: {reason}")]
    Unsupported {
        reason: String,
        partial: Box<AlertRule>,
    },
}
