//! Rendering of an [`AlertRule`] into script text.
//!
//! Every structured field ends up either in a `var` declaration or as a
//! node/property argument, so [`reverse`](crate::reverse) can rebuild the
//! rule from the text alone.

use crate::ast::*;
use crate::error::GenerateError;
use crate::names::*;
use crate::rule::{
    AlertRule, Change, Condition, Handler, Operator, QueryConfig, Script, TaskType, Trigger,
};

mod validate;


// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Where fired alerts are written back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorOptions {
    pub output_database: String,
    pub output_retention_policy: String,
    pub output_measurement: String,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            output_database: "chronograf".to_string(),
            output_retention_policy: "autogen".to_string(),
            output_measurement: "alerts".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct TickGenerator {
    options: GeneratorOptions,
}

/// Render `rule` with default output options.
pub fn generate(rule: &AlertRule) -> Result<Script, GenerateError> {
    TickGenerator::default().generate(rule)
}

impl TickGenerator {
    pub fn new(options: GeneratorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &GeneratorOptions {
        &self.options
    }

    /// Validate `rule` and render it. Identical rules render to identical text.
    pub fn generate(&self, rule: &AlertRule) -> Result<Script, GenerateError> {
        let query = validate::validate(rule)?;
        Ok(Script::new(self.program(rule, query).to_string()))
    }

    fn program(&self, rule: &AlertRule, query: &QueryConfig) -> Program {
        let mut out = ProgramBuilder::default();
        self.declare_vars(&mut out, rule, query);

        let data = match rule.task_type() {
            TaskType::Stream => stream_chain(rule, query),
            TaskType::Batch => batch_chain(rule, query),
        };
        out.chain(DATA, data);

        let alert_source = match &rule.trigger {
            Trigger::Threshold => Chain::new(DATA),
            Trigger::Relative { change, .. } => {
                out.chain(
                    PAST,
                    Chain::new(DATA).node("shift", vec![Expr::ident(SHIFT)]),
                );
                out.var(CURRENT, Expr::ident(DATA));
                Chain::new(PAST)
                    .node("join", vec![Expr::ident(CURRENT)])
                    .prop("as", vec![Expr::str(PAST), Expr::str(CURRENT)])
                    .node("eval", vec![Expr::lambda(change_expr(*change))])
                    .prop("keep", vec![])
                    .prop("as", vec![Expr::str(VALUE_FIELD)])
            }
        };
        out.chain(TRIGGER, alert_chain(alert_source, rule));

        out.bare(
            Chain::new(TRIGGER)
                .node(
                    "eval",
                    vec![Expr::lambda(Expr::call(
                        "float",
                        vec![Expr::field(VALUE_FIELD)],
                    ))],
                )
                .prop("as", vec![Expr::str(VALUE_FIELD)])
                .prop("keep", vec![])
                .node("influxDBOut", vec![])
                .prop("create", vec![])
                .prop("database", vec![Expr::ident(OUTPUT_DB)])
                .prop("retentionPolicy", vec![Expr::ident(OUTPUT_RP)])
                .prop("measurement", vec![Expr::ident(OUTPUT_MEASUREMENT)])
                .prop("tag", vec![Expr::str("alertName"), Expr::ident(NAME)])
                .prop("tag", vec![Expr::str("triggerType"), Expr::ident(TRIGGER_TYPE)]),
        );
        out.bare(Chain::new(TRIGGER).node("httpOut", vec![Expr::str(HTTP_ENDPOINT)]));

        out.finish()
    }

    fn declare_vars(&self, out: &mut ProgramBuilder, rule: &AlertRule, query: &QueryConfig) {
        out.var(DB, Expr::str(&query.database));
        out.var(RP, Expr::str(&query.retention_policy));
        out.var(MEASUREMENT, Expr::str(&query.measurement));
        out.var(
            GROUP_BY,
            Expr::List(query.group_by.tags.iter().map(Expr::str).collect()),
        );
        if let Some(filter) = where_filter(query) {
            out.var(WHERE_FILTER, Expr::lambda(filter));
        }
        if let Some(period) = query.group_by.time {
            out.var(PERIOD, Expr::Duration(period));
        }
        if let Some(every) = rule.every {
            out.var(EVERY, Expr::Duration(every));
        }
        if let Trigger::Relative { shift, .. } = &rule.trigger {
            out.var(SHIFT, Expr::Duration(*shift));
        }

        out.var(NAME, Expr::str(&rule.name));
        out.var(
            ID_VAR,
            Expr::bin(BinOp::Add, Expr::ident(NAME), Expr::str(":{{.Group}}")),
        );
        out.var(MESSAGE, Expr::str(&rule.message));
        out.var(DETAILS, Expr::str(&rule.details));
        out.var(ID_TAG, Expr::str("alertID"));
        out.var(LEVEL_TAG, Expr::str("level"));
        out.var(MESSAGE_FIELD, Expr::str("message"));
        out.var(DURATION_FIELD, Expr::str("duration"));
        out.var(OUTPUT_DB, Expr::str(&self.options.output_database));
        out.var(OUTPUT_RP, Expr::str(&self.options.output_retention_policy));
        out.var(OUTPUT_MEASUREMENT, Expr::str(&self.options.output_measurement));
        out.var(TRIGGER_TYPE, Expr::str(rule.trigger.as_str()));

        for cond in &rule.conditions {
            let level = cond.level.as_str();
            match cond.upper {
                Some(upper) if cond.operator.is_range() => {
                    out.var(&lower_var(level), Expr::Number(cond.value));
                    out.var(&upper_var(level), Expr::Number(upper));
                }
                _ => out.var(level, Expr::Number(cond.value)),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

fn stream_chain(rule: &AlertRule, query: &QueryConfig) -> Chain {
    let mut chain = Chain::new("stream")
        .node("from", vec![])
        .prop("database", vec![Expr::ident(DB)])
        .prop("retentionPolicy", vec![Expr::ident(RP)])
        .prop("measurement", vec![Expr::ident(MEASUREMENT)])
        .prop("groupBy", vec![Expr::ident(GROUP_BY)]);
    if !query.tags.is_empty() {
        chain = chain.prop("where", vec![Expr::ident(WHERE_FILTER)]);
    }

    if query.group_by.time.is_some() {
        // `.every(period)` marks a rule without its own evaluation interval.
        let every = if rule.every.is_some() { EVERY } else { PERIOD };
        chain = chain
            .node("window", vec![])
            .prop("period", vec![Expr::ident(PERIOD)])
            .prop("every", vec![Expr::ident(every)])
            .prop("align", vec![]);
    }

    // Validation guarantees exactly one field for stream rules.
    if let Some(field) = query.fields.first() {
        chain = match field.function {
            Some(func) => chain.node(func.as_str(), vec![Expr::str(&field.name)]),
            None => chain.node("eval", vec![Expr::lambda(Expr::field(&field.name))]),
        };
        chain = chain.prop("as", vec![Expr::str(VALUE_FIELD)]);
    }
    chain
}

fn batch_chain(rule: &AlertRule, query: &QueryConfig) -> Chain {
    let raw = query.raw_text.clone().unwrap_or_default();
    let mut chain = Chain::new("batch").node("query", vec![Expr::RawStr(raw)]);
    if query.group_by.time.is_some() {
        chain = chain.prop("period", vec![Expr::ident(PERIOD)]);
    }
    if rule.every.is_some() {
        chain = chain.prop("every", vec![Expr::ident(EVERY)]);
    }
    chain.prop("groupBy", vec![Expr::ident(GROUP_BY)])
}

fn alert_chain(source: Chain, rule: &AlertRule) -> Chain {
    let mut chain = source.node("alert", vec![]);
    for cond in &rule.conditions {
        chain = chain.prop(
            cond.level.as_str(),
            vec![Expr::lambda(condition_expr(cond))],
        );
    }
    chain = chain
        .prop("stateChangesOnly", vec![])
        .prop("message", vec![Expr::ident(MESSAGE)])
        .prop("details", vec![Expr::ident(DETAILS)])
        .prop("id", vec![Expr::ident(ID_VAR)])
        .prop("idTag", vec![Expr::ident(ID_TAG)])
        .prop("levelTag", vec![Expr::ident(LEVEL_TAG)])
        .prop("messageField", vec![Expr::ident(MESSAGE_FIELD)])
        .prop("durationField", vec![Expr::ident(DURATION_FIELD)]);
    for handler in &rule.handlers {
        chain = handler_links(chain, handler);
    }
    chain
}

fn handler_links(chain: Chain, handler: &Handler) -> Chain {
    match handler {
        Handler::Email { to } => {
            let chain = chain.prop("email", vec![]);
            if to.is_empty() {
                chain
            } else {
                chain.prop("to", to.iter().map(Expr::str).collect())
            }
        }
        Handler::Slack { channel } => {
            let chain = chain.prop("slack", vec![]);
            match channel {
                Some(channel) => chain.prop("channel", vec![Expr::str(channel)]),
                None => chain,
            }
        }
        Handler::PagerDuty => chain.prop("pagerDuty", vec![]),
        Handler::Log { path } => chain.prop("log", vec![Expr::str(path)]),
        Handler::Post { url } => chain.prop("post", vec![Expr::str(url)]),
        Handler::Tcp { address } => chain.prop("tcp", vec![Expr::str(address)]),
        Handler::Exec { command } => chain.prop("exec", command.iter().map(Expr::str).collect()),
    }
}

// ---------------------------------------------------------------------------
// Lambdas
// ---------------------------------------------------------------------------

fn condition_expr(cond: &Condition) -> Expr {
    let level = cond.level.as_str();
    let value = || Expr::field(VALUE_FIELD);
    let cmp = |op, var: &str| Expr::bin(op, value(), Expr::ident(var));
    match cond.operator {
        Operator::GreaterThan => cmp(BinOp::Gt, level),
        Operator::GreaterEqual => cmp(BinOp::Ge, level),
        Operator::LessThan => cmp(BinOp::Lt, level),
        Operator::LessEqual => cmp(BinOp::Le, level),
        Operator::EqualTo => cmp(BinOp::Eq, level),
        Operator::NotEqualTo => cmp(BinOp::Ne, level),
        Operator::InsideRange => Expr::bin(
            BinOp::And,
            cmp(BinOp::Ge, &lower_var(level)),
            cmp(BinOp::Le, &upper_var(level)),
        ),
        Operator::OutsideRange => Expr::bin(
            BinOp::Or,
            cmp(BinOp::Lt, &lower_var(level)),
            cmp(BinOp::Gt, &upper_var(level)),
        ),
    }
}

fn change_expr(change: Change) -> Expr {
    let diff = Expr::call(
        "float",
        vec![Expr::bin(
            BinOp::Sub,
            Expr::field(CURRENT_VALUE),
            Expr::field(PAST_VALUE),
        )],
    );
    match change {
        Change::Change => diff,
        Change::PercentChange => Expr::bin(
            BinOp::Mul,
            Expr::bin(
                BinOp::Div,
                Expr::call("abs", vec![diff]),
                Expr::call("float", vec![Expr::field(PAST_VALUE)]),
            ),
            Expr::Number(100.0),
        ),
    }
}

/// Accepted tags: `("k" == 'a' OR "k" == 'b') AND ...`;
/// rejected tags: `"k" != 'a' AND "k" != 'b' AND ...`.
fn where_filter(query: &QueryConfig) -> Option<Expr> {
    let compare = |op, key: &str, value: &str| Expr::bin(op, Expr::field(key), Expr::str(value));
    if !query.are_tags_accepted {
        return Expr::fold(
            BinOp::And,
            query.tags.iter().flat_map(|(key, values)| {
                values.iter().map(move |v| compare(BinOp::Ne, key, v))
            }),
        );
    }
    let groups = query.tags.iter().filter_map(|(key, values)| {
        Expr::fold(
            BinOp::Or,
            values.iter().map(|v| compare(BinOp::Eq, key, v)),
        )
    });
    Expr::fold(BinOp::And, groups)
}

// ---------------------------------------------------------------------------
// ProgramBuilder
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ProgramBuilder {
    statements: Vec<Statement>,
}

impl ProgramBuilder {
    fn var(&mut self, name: &str, value: Expr) {
        self.statements.push(Statement::Var {
            name: name.to_string(),
            value: Value::Expr(value),
        });
    }

    fn chain(&mut self, name: &str, chain: Chain) {
        self.statements.push(Statement::Var {
            name: name.to_string(),
            value: Value::Chain(chain),
        });
    }

    fn bare(&mut self, chain: Chain) {
        self.statements.push(Statement::Chain(chain));
    }

    fn finish(self) -> Program {
        Program {
            statements: self.statements,
        }
    }
}
