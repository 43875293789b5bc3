//! Identifiers shared by the generator and the reverse parser.

/// Name of the `httpOut` endpoint that exposes emitted alerts.
pub const HTTP_ENDPOINT: &str = "output";

/// Field every alert lambda compares against.
pub(crate) const VALUE_FIELD: &str = "value";

pub(crate) const DB: &str = "db";
pub(crate) const RP: &str = "rp";
pub(crate) const MEASUREMENT: &str = "measurement";
pub(crate) const GROUP_BY: &str = "groupBy";
pub(crate) const WHERE_FILTER: &str = "whereFilter";
pub(crate) const PERIOD: &str = "period";
pub(crate) const EVERY: &str = "every";
pub(crate) const SHIFT: &str = "shift";
pub(crate) const NAME: &str = "name";
pub(crate) const ID_VAR: &str = "idVar";
pub(crate) const MESSAGE: &str = "message";
pub(crate) const DETAILS: &str = "details";
pub(crate) const ID_TAG: &str = "idTag";
pub(crate) const LEVEL_TAG: &str = "levelTag";
pub(crate) const MESSAGE_FIELD: &str = "messageField";
pub(crate) const DURATION_FIELD: &str = "durationField";
pub(crate) const OUTPUT_DB: &str = "outputDB";
pub(crate) const OUTPUT_RP: &str = "outputRP";
pub(crate) const OUTPUT_MEASUREMENT: &str = "outputMeasurement";
pub(crate) const TRIGGER_TYPE: &str = "triggerType";

pub(crate) const DATA: &str = "data";
pub(crate) const PAST: &str = "past";
pub(crate) const CURRENT: &str = "current";
pub(crate) const TRIGGER: &str = "trigger";

pub(crate) const PAST_VALUE: &str = "past.value";
pub(crate) const CURRENT_VALUE: &str = "current.value";

/// Variable holding the lower bound of a range condition, e.g. `critLower`.
pub(crate) fn lower_var(level: &str) -> String {
    format!("{level}Lower")
}

/// Variable holding the upper bound of a range condition, e.g. `critUpper`.
pub(crate) fn upper_var(level: &str) -> String {
    format!("{level}Upper")
}
