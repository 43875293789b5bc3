//! Rebuilding an [`AlertRule`] from script text.
//!
//! Extraction fills the rule step by step. When a step meets a shape the
//! generator never emits, the rule built so far is returned alongside the
//! reason so callers can still show something useful.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::ast::*;
use crate::error::ReverseError;
use crate::names::*;
use crate::rule::{
    Aggregate, AlertRule, Change, Condition, Field, Handler, Level, Operator, QueryConfig, Script,
    Trigger,
};
use crate::tick_parser::parse_script;

#[cfg(test)]
mod tests;

type Step<T = ()> = Result<T, String>;

/// Parse `script` and recover the rule it encodes. The returned rule's
/// `script` field is left empty.
pub fn reverse(script: &Script) -> Result<AlertRule, ReverseError> {
    let program =
        parse_script(script.as_str()).map_err(|e| ReverseError::Syntax(e.to_string()))?;
    let mut extractor = Extractor {
        program: &program,
        rule: AlertRule::default(),
    };
    match extractor.run() {
        Ok(()) => Ok(extractor.rule),
        Err(reason) => Err(ReverseError::Unsupported {
            reason,
            partial: Box::new(extractor.rule),
        }),
    }
}

struct Extractor<'a> {
    program: &'a Program,
    rule: AlertRule,
}

impl<'a> Extractor<'a> {
    fn run(&mut self) -> Step {
        self.rule.name = self
            .var_string(NAME)?
            .ok_or("script declares no alert name")?;
        self.rule.message = self.var_string(MESSAGE)?.unwrap_or_default();
        self.rule.details = self.var_string(DETAILS)?.unwrap_or_default();

        let program = self.program;
        let data = program
            .var_chain(DATA)
            .ok_or("script has no `data` pipeline")?;
        self.rule.query = Some(QueryConfig::default());
        match data.source.as_str() {
            "stream" => self.stream(data)?,
            "batch" => self.batch(data)?,
            other => return Err(format!("unknown pipeline source '{other}'")),
        }

        self.trigger()?;
        self.alert()
    }

    fn query(&mut self) -> &mut QueryConfig {
        self.rule.query.get_or_insert_with(QueryConfig::default)
    }

    // -----------------------------------------------------------------------
    // Data pipelines
    // -----------------------------------------------------------------------

    fn stream(&mut self, data: &'a Chain) -> Step {
        let mut nodes = data.nodes().into_iter();
        let from = nodes
            .next()
            .filter(|view| view.node.name == "from")
            .ok_or("stream pipeline does not start with from()")?;
        for prop in from.properties() {
            match prop.name.as_str() {
                "database" => {
                    let db = self.string_arg(prop)?;
                    self.query().database = db;
                }
                "retentionPolicy" => {
                    let rp = self.string_arg(prop)?;
                    self.query().retention_policy = rp;
                }
                "measurement" => {
                    let measurement = self.string_arg(prop)?;
                    self.query().measurement = measurement;
                }
                "groupBy" => {
                    let tags = self.string_list_arg(prop)?;
                    self.query().group_by.tags = tags;
                }
                "where" => {
                    let filter = self.lambda_arg(prop)?;
                    let (tags, accepted) = tags_from_filter(filter)?;
                    let query = self.query();
                    query.tags = tags;
                    query.are_tags_accepted = accepted;
                }
                other => return Err(format!("unsupported from() property .{other}()")),
            }
        }

        let mut windowed = false;
        let mut selection = None;
        for view in nodes {
            match view.node.name.as_str() {
                "window" if !windowed => {
                    windowed = true;
                    self.window(view)?;
                }
                _ if selection.is_none() => selection = Some(view),
                other => return Err(format!("unexpected node {other}() in stream pipeline")),
            }
        }
        if !windowed {
            self.rule.every = self.var_duration(EVERY)?;
        }

        let view = selection.ok_or("stream pipeline selects no field")?;
        let field = self.field_selection(view)?;
        self.query().fields = vec![field];
        Ok(())
    }

    fn window(&mut self, view: NodeView<'a>) -> Step {
        for prop in view.properties() {
            match prop.name.as_str() {
                "period" => {
                    let period = self.duration_arg(prop)?;
                    self.query().group_by.time = Some(period);
                }
                "every" => {
                    // `.every(period)` means the rule has no interval of its own.
                    self.rule.every = match single_arg(prop)? {
                        Expr::Ident(name) if name == PERIOD => None,
                        _ => Some(self.duration_arg(prop)?),
                    };
                }
                "align" => {}
                other => return Err(format!("unsupported window() property .{other}()")),
            }
        }
        Ok(())
    }

    fn field_selection(&self, view: NodeView<'a>) -> Step<Field> {
        let call = view.node;
        let field = if call.name == "eval" {
            match self.lambda_arg(call)? {
                Expr::Field(name) => Field {
                    name: name.clone(),
                    function: None,
                },
                _ => return Err("eval() must select a single field".into()),
            }
        } else {
            let function = call.name.parse::<Aggregate>()?;
            Field {
                name: self.string_arg(call)?,
                function: Some(function),
            }
        };
        match view.property("as") {
            Some(alias) if self.string_arg(alias)? == VALUE_FIELD => Ok(field),
            _ => Err(format!("{}() result is not named '{VALUE_FIELD}'", call.name)),
        }
    }

    fn batch(&mut self, data: &'a Chain) -> Step {
        let nodes = data.nodes();
        let view = match nodes.as_slice() {
            [view] if view.node.name == "query" => *view,
            _ => return Err("batch pipeline must be a single query() node".into()),
        };
        let raw = self.string_arg(view.node)?;
        self.query().raw_text = Some(raw);
        for prop in view.properties() {
            match prop.name.as_str() {
                "period" => {
                    let period = self.duration_arg(prop)?;
                    self.query().group_by.time = Some(period);
                }
                "every" => self.rule.every = Some(self.duration_arg(prop)?),
                "groupBy" => {
                    let tags = self.string_list_arg(prop)?;
                    self.query().group_by.tags = tags;
                }
                other => return Err(format!("unsupported query() property .{other}()")),
            }
        }

        let db = self.var_string(DB)?.unwrap_or_default();
        let rp = self.var_string(RP)?.unwrap_or_default();
        let measurement = self.var_string(MEASUREMENT)?.unwrap_or_default();
        let query = self.query();
        query.database = db;
        query.retention_policy = rp;
        query.measurement = measurement;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Trigger & alert
    // -----------------------------------------------------------------------

    fn trigger(&mut self) -> Step {
        let kind = self.var_string(TRIGGER_TYPE)?;
        self.rule.trigger = match kind.as_deref() {
            None | Some("threshold") => Trigger::Threshold,
            Some("relative") => Trigger::Relative {
                change: self.change()?,
                shift: self.shift()?,
            },
            Some(other) => return Err(format!("unknown trigger type '{other}'")),
        };
        Ok(())
    }

    fn shift(&self) -> Step<Duration> {
        if let Some(shift) = self.var_duration(SHIFT)? {
            return Ok(shift);
        }
        let view = self
            .program
            .var_chain(PAST)
            .and_then(|chain| chain.find_node("shift"))
            .ok_or("relative trigger has no shift")?;
        self.duration_arg(view.node)
    }

    fn change(&self) -> Step<Change> {
        let view = self
            .program
            .var_chain(TRIGGER)
            .and_then(|chain| chain.find_node("eval"))
            .ok_or("relative trigger has no change computation")?;
        match self.lambda_arg(view.node)? {
            Expr::Call { name, .. } if name == "float" => Ok(Change::Change),
            Expr::BinOp { op: BinOp::Mul, .. } => Ok(Change::PercentChange),
            _ => Err("unrecognised change computation".into()),
        }
    }

    fn alert(&mut self) -> Step {
        let program = self.program;
        let chain = program
            .var_chain(TRIGGER)
            .ok_or("script has no `trigger` pipeline")?;
        let expected = match self.rule.trigger {
            Trigger::Threshold => DATA,
            Trigger::Relative { .. } => PAST,
        };
        if chain.source != expected {
            return Err(format!(
                "trigger pipeline reads from '{}', expected '{expected}'",
                chain.source
            ));
        }
        let alert = chain
            .find_node("alert")
            .ok_or("trigger pipeline has no alert()")?;

        for prop in alert.properties() {
            match prop.name.as_str() {
                "crit" | "warn" | "info" => {
                    let cond = self.condition(prop)?;
                    if self.rule.conditions.iter().any(|c| c.level == cond.level) {
                        return Err(format!("level {} appears twice", prop.name));
                    }
                    self.rule.conditions.push(cond);
                }
                "message" => self.rule.message = self.string_arg(prop)?,
                "details" => self.rule.details = self.string_arg(prop)?,
                "stateChangesOnly" | "id" | "idTag" | "levelTag" | "messageField"
                | "durationField" => {}
                _ => self.handler(prop)?,
            }
        }
        Ok(())
    }

    fn condition(&self, prop: &Call) -> Step<Condition> {
        let level = prop.name.parse::<Level>()?;
        let body = self.lambda_arg(prop)?;
        let (operator, expected) = match body {
            Expr::BinOp { op: BinOp::And, .. } => (Operator::InsideRange, (BinOp::Ge, BinOp::Le)),
            Expr::BinOp { op: BinOp::Or, .. } => (Operator::OutsideRange, (BinOp::Lt, BinOp::Gt)),
            _ => {
                let (op, value) = self.comparison(body)?;
                let operator = match op {
                    BinOp::Gt => Operator::GreaterThan,
                    BinOp::Ge => Operator::GreaterEqual,
                    BinOp::Lt => Operator::LessThan,
                    BinOp::Le => Operator::LessEqual,
                    BinOp::Eq => Operator::EqualTo,
                    BinOp::Ne => Operator::NotEqualTo,
                    _ => return Err(format!("unsupported {} condition", prop.name)),
                };
                return Ok(Condition {
                    level,
                    operator,
                    value,
                    upper: None,
                });
            }
        };

        let Expr::BinOp { left, right, .. } = body else {
            return Err(format!("unsupported {} condition", prop.name));
        };
        let (lower_op, value) = self.comparison(left)?;
        let (upper_op, upper) = self.comparison(right)?;
        if (lower_op, upper_op) != expected {
            return Err(format!("unsupported range condition for {}", prop.name));
        }
        Ok(Condition {
            level,
            operator,
            value,
            upper: Some(upper),
        })
    }

    /// `"value" <op> threshold`
    fn comparison(&self, expr: &Expr) -> Step<(BinOp, f64)> {
        match expr {
            Expr::BinOp { op, left, right }
                if op.precedence() == BinOp::Eq.precedence()
                    && matches!(&**left, Expr::Field(f) if f == VALUE_FIELD) =>
            {
                Ok((*op, self.number(right)?))
            }
            _ => Err(format!("condition does not compare \"{VALUE_FIELD}\"")),
        }
    }

    fn handler(&mut self, prop: &Call) -> Step {
        let handler = match prop.name.as_str() {
            "email" => Handler::Email {
                to: self.strings(&prop.args)?,
            },
            "to" => {
                let recipients = self.strings(&prop.args)?;
                return match self.rule.handlers.last_mut() {
                    Some(Handler::Email { to }) => {
                        to.extend(recipients);
                        Ok(())
                    }
                    _ => Err(".to() does not follow .email()".into()),
                };
            }
            "slack" => Handler::Slack { channel: None },
            "channel" => {
                let name = self.string_arg(prop)?;
                return match self.rule.handlers.last_mut() {
                    Some(Handler::Slack { channel }) => {
                        *channel = Some(name);
                        Ok(())
                    }
                    _ => Err(".channel() does not follow .slack()".into()),
                };
            }
            "pagerDuty" => Handler::PagerDuty,
            "log" => Handler::Log {
                path: self.string_arg(prop)?,
            },
            "post" => Handler::Post {
                url: self.string_arg(prop)?,
            },
            "tcp" => Handler::Tcp {
                address: self.string_arg(prop)?,
            },
            "exec" => Handler::Exec {
                command: self.strings(&prop.args)?,
            },
            other => return Err(format!("unsupported alert property .{other}()")),
        };
        self.rule.handlers.push(handler);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Value resolution
    // -----------------------------------------------------------------------

    /// Follow one level of variable indirection.
    fn resolve<'e>(&'e self, expr: &'e Expr) -> &'e Expr {
        match expr {
            Expr::Ident(name) => self.program.var_expr(name).unwrap_or(expr),
            _ => expr,
        }
    }

    fn string(&self, expr: &Expr) -> Step<String> {
        match self.resolve(expr).as_str() {
            Some(s) => Ok(s.to_string()),
            None => Err(format!("expected a string, found `{expr}`")),
        }
    }

    fn strings(&self, exprs: &[Expr]) -> Step<Vec<String>> {
        exprs.iter().map(|expr| self.string(expr)).collect()
    }

    fn number(&self, expr: &Expr) -> Step<f64> {
        match self.resolve(expr) {
            Expr::Number(n) => Ok(*n),
            Expr::Neg(inner) => match &**inner {
                Expr::Number(n) => Ok(-n),
                _ => Err(format!("expected a number, found `{expr}`")),
            },
            _ => Err(format!("expected a number, found `{expr}`")),
        }
    }

    fn duration(&self, expr: &Expr) -> Step<Duration> {
        match self.resolve(expr) {
            Expr::Duration(d) => Ok(*d),
            _ => Err(format!("expected a duration, found `{expr}`")),
        }
    }

    fn string_arg(&self, call: &Call) -> Step<String> {
        self.string(single_arg(call)?)
    }

    fn duration_arg(&self, call: &Call) -> Step<Duration> {
        self.duration(single_arg(call)?)
    }

    fn string_list_arg(&self, call: &Call) -> Step<Vec<String>> {
        let arg = single_arg(call)?;
        match self.resolve(arg) {
            Expr::List(items) => self.strings(items),
            _ => Err(format!("{}() expects a list, found `{arg}`", call.name)),
        }
    }

    fn lambda_arg<'e>(&'e self, call: &'e Call) -> Step<&'e Expr> {
        let arg = single_arg(call)?;
        match self.resolve(arg) {
            Expr::Lambda(body) => Ok(body.as_ref()),
            _ => Err(format!("{}() expects a lambda, found `{arg}`", call.name)),
        }
    }

    fn var_string(&self, name: &str) -> Step<Option<String>> {
        self.program.var_expr(name).map(|e| self.string(e)).transpose()
    }

    fn var_duration(&self, name: &str) -> Step<Option<Duration>> {
        self.program.var_expr(name).map(|e| self.duration(e)).transpose()
    }
}

fn single_arg(call: &Call) -> Step<&Expr> {
    match call.args.as_slice() {
        [arg] => Ok(arg),
        args => Err(format!(
            "{}() takes one argument, found {}",
            call.name,
            args.len()
        )),
    }
}

// ---------------------------------------------------------------------------
// Tag filters
// ---------------------------------------------------------------------------

/// Flatten a where-lambda into tag values. Accepted filters compare with
/// `==` (values of one key joined by `OR`); rejected ones use `!=` joined
/// by `AND`. Mixing the two is not representable.
fn tags_from_filter(expr: &Expr) -> Step<(BTreeMap<String, Vec<String>>, bool)> {
    let mut tags: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut ops = Vec::new();
    let mut saw_or = false;
    collect_tags(expr, &mut tags, &mut ops, &mut saw_or)?;

    let accepted = if ops.iter().all(|op| *op == BinOp::Eq) {
        true
    } else if !saw_or && ops.iter().all(|op| *op == BinOp::Ne) {
        false
    } else {
        return Err("where filter mixes accepted and rejected tags".into());
    };
    Ok((tags, accepted))
}

fn collect_tags(
    expr: &Expr,
    tags: &mut BTreeMap<String, Vec<String>>,
    ops: &mut Vec<BinOp>,
    saw_or: &mut bool,
) -> Step {
    match expr {
        Expr::BinOp {
            op: op @ (BinOp::And | BinOp::Or),
            left,
            right,
        } => {
            *saw_or |= *op == BinOp::Or;
            collect_tags(left, tags, ops, saw_or)?;
            collect_tags(right, tags, ops, saw_or)
        }
        Expr::BinOp {
            op: op @ (BinOp::Eq | BinOp::Ne),
            left,
            right,
        } => match (&**left, &**right) {
            (Expr::Field(key), Expr::Str(value)) => {
                ops.push(*op);
                tags.entry(key.clone()).or_default().push(value.clone());
                Ok(())
            }
            _ => Err(format!("unsupported where clause `{expr}`")),
        },
        _ => Err(format!("unsupported where clause `{expr}`")),
    }
}
