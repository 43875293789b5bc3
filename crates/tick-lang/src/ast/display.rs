use std::fmt;

use super::{BinOp, Call, Chain, Expr, Link, Program, Statement, Value};
use crate::duration::format_duration;
use crate::parse_utils::escape;

const NODE_INDENT: &str = "    ";
const PROPERTY_INDENT: &str = "        ";

// ---------------------------------------------------------------------------
// Program layout
// ---------------------------------------------------------------------------

/// Pipelines are separated from their neighbours by a blank line; runs of
/// plain `var` declarations are kept together.
impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, stmt) in self.statements.iter().enumerate() {
            if idx > 0 && (is_block(&self.statements[idx - 1]) || is_block(stmt)) {
                writeln!(f)?;
            }
            writeln!(f, "{stmt}")?;
        }
        Ok(())
    }
}

fn is_block(stmt: &Statement) -> bool {
    match stmt {
        Statement::Chain(_) => true,
        Statement::Var { value, .. } => matches!(
            value,
            Value::Chain(_) | Value::Expr(Expr::Ident(_))
        ),
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Var { name, value } => write!(f, "var {name} = {value}"),
            Statement::Chain(chain) => write!(f, "{chain}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Expr(expr) => write!(f, "{expr}"),
            Value::Chain(chain) => write!(f, "{chain}"),
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)?;
        for link in &self.links {
            match link {
                Link::Node(call) => write!(f, "\n{NODE_INDENT}|{call}")?,
                Link::Property(call) => write!(f, "\n{PROPERTY_INDENT}.{call}")?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        write_list(f, &self.args)?;
        f.write_str(")")
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Str(s) => write!(f, "'{}'", escape(s, '\'')),
            Expr::RawStr(s) => write!(f, "'''{s}'''"),
            Expr::Duration(d) => f.write_str(&format_duration(*d)),
            Expr::Bool(true) => f.write_str("TRUE"),
            Expr::Bool(false) => f.write_str("FALSE"),
            Expr::Ident(name) => f.write_str(name),
            Expr::Field(name) => write!(f, "\"{}\"", escape(name, '"')),
            Expr::List(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            Expr::Lambda(body) => write!(f, "lambda: {body}"),
            Expr::BinOp { op, left, right } => {
                write_operand(f, left, *op, false)?;
                write!(f, " {} ", op.symbol())?;
                write_operand(f, right, *op, true)
            }
            Expr::Neg(inner) => {
                if matches!(**inner, Expr::BinOp { .. }) {
                    write!(f, "-({inner})")
                } else {
                    write!(f, "-{inner}")
                }
            }
            Expr::Call { name, args } => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
        }
    }
}

/// Operands bind left-to-right, so a right operand of equal precedence
/// needs parentheses to keep its grouping.
fn write_operand(f: &mut fmt::Formatter<'_>, operand: &Expr, parent: BinOp, right: bool) -> fmt::Result {
    let needs_parens = match operand {
        Expr::BinOp { op, .. } => {
            op.precedence() < parent.precedence()
                || (right && op.precedence() == parent.precedence())
        }
        _ => false,
    };
    if needs_parens {
        write!(f, "({operand})")
    } else {
        write!(f, "{operand}")
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn or_inside_and_is_parenthesized() {
        let or = Expr::bin(
            BinOp::Or,
            Expr::bin(BinOp::Eq, Expr::field("host"), Expr::str("a")),
            Expr::bin(BinOp::Eq, Expr::field("host"), Expr::str("b")),
        );
        let and = Expr::bin(
            BinOp::And,
            or,
            Expr::bin(BinOp::Eq, Expr::field("cpu"), Expr::str("total")),
        );
        assert_eq!(
            and.to_string(),
            r#"("host" == 'a' OR "host" == 'b') AND "cpu" == 'total'"#
        );
    }

    #[test]
    fn right_nested_subtraction_keeps_parens() {
        let e = Expr::bin(
            BinOp::Sub,
            Expr::Number(1.0),
            Expr::bin(BinOp::Sub, Expr::Number(2.0), Expr::Number(3.0)),
        );
        assert_eq!(e.to_string(), "1 - (2 - 3)");
    }

    #[test]
    fn chain_layout() {
        let chain = Chain::new("stream")
            .node("from", vec![])
            .prop("measurement", vec![Expr::ident("measurement")]);
        assert_eq!(
            chain.to_string(),
            "stream\n    |from()\n        .measurement(measurement)"
        );
    }

    #[test]
    fn program_separates_pipelines() {
        let program = Program {
            statements: vec![
                Statement::Var {
                    name: "db".into(),
                    value: Value::Expr(Expr::str("telegraf")),
                },
                Statement::Var {
                    name: "rp".into(),
                    value: Value::Expr(Expr::str("autogen")),
                },
                Statement::Chain(Chain::new("trigger").node("httpOut", vec![Expr::str("output")])),
            ],
        };
        assert_eq!(
            program.to_string(),
            "var db = 'telegraf'\nvar rp = 'autogen'\n\ntrigger\n    |httpOut('output')\n"
        );
    }
}
