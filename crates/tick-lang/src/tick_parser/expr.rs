use winnow::combinator::{alt, cut_err, opt};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::literal;

use crate::ast::*;
use crate::parse_utils::{
    duration_literal, field_reference, ident, kw, number_literal, quoted_string,
    triple_quoted_string, ws_skip,
};

pub(crate) fn parse_expr(input: &mut &str) -> ModalResult<Expr> {
    or_expr.parse_next(input)
}

// Binary levels, loosest first. Comparison does not chain.

fn or_expr(input: &mut &str) -> ModalResult<Expr> {
    left_assoc(input, and_expr, |i| kw("OR").value(BinOp::Or).parse_next(i))
}

fn and_expr(input: &mut &str) -> ModalResult<Expr> {
    left_assoc(input, cmp_expr, |i| kw("AND").value(BinOp::And).parse_next(i))
}

fn cmp_expr(input: &mut &str) -> ModalResult<Expr> {
    let left = add_expr.parse_next(input)?;
    ws_skip.parse_next(input)?;
    let Some(op) = opt(cmp_op).parse_next(input)? else {
        return Ok(left);
    };
    ws_skip.parse_next(input)?;
    let right = cut_err(add_expr)
        .context(StrContext::Expected(StrContextValue::Description(
            "right-hand side of comparison",
        )))
        .parse_next(input)?;
    Ok(Expr::bin(op, left, right))
}

fn cmp_op(input: &mut &str) -> ModalResult<BinOp> {
    // Two-character operators first so `<=` is not read as `<`.
    alt((
        "==".value(BinOp::Eq),
        "!=".value(BinOp::Ne),
        "<=".value(BinOp::Le),
        ">=".value(BinOp::Ge),
        "<".value(BinOp::Lt),
        ">".value(BinOp::Gt),
    ))
    .parse_next(input)
}

fn add_expr(input: &mut &str) -> ModalResult<Expr> {
    left_assoc(input, mul_expr, |i| {
        alt(('+'.value(BinOp::Add), '-'.value(BinOp::Sub))).parse_next(i)
    })
}

fn mul_expr(input: &mut &str) -> ModalResult<Expr> {
    left_assoc(input, unary_expr, |i| {
        alt(('*'.value(BinOp::Mul), '/'.value(BinOp::Div))).parse_next(i)
    })
}

/// `operand { op operand }`, folded to the left.
fn left_assoc(
    input: &mut &str,
    mut operand: impl FnMut(&mut &str) -> ModalResult<Expr>,
    mut op: impl FnMut(&mut &str) -> ModalResult<BinOp>,
) -> ModalResult<Expr> {
    let mut left = operand(input)?;
    loop {
        ws_skip.parse_next(input)?;
        let Some(bin) = opt(&mut op).parse_next(input)? else {
            return Ok(left);
        };
        ws_skip.parse_next(input)?;
        let right = cut_err(&mut operand).parse_next(input)?;
        left = Expr::bin(bin, left, right);
    }
}

/// `unary_expr = "-" unary_expr | primary`
///
/// A negated number literal folds into a negative [`Expr::Number`].
fn unary_expr(input: &mut &str) -> ModalResult<Expr> {
    if opt(literal("-")).parse_next(input)?.is_some() {
        ws_skip.parse_next(input)?;
        let inner = cut_err(unary_expr).parse_next(input)?;
        return Ok(match inner {
            Expr::Number(n) => Expr::Number(-n),
            other => Expr::Neg(Box::new(other)),
        });
    }
    primary.parse_next(input)
}

// ---------------------------------------------------------------------------
// Primary expressions
// ---------------------------------------------------------------------------

fn primary(input: &mut &str) -> ModalResult<Expr> {
    alt((
        paren_expr,
        lambda_expr,
        kw("TRUE").value(Expr::Bool(true)),
        kw("FALSE").value(Expr::Bool(false)),
        triple_quoted_string.map(Expr::RawStr),
        quoted_string.map(Expr::Str),
        field_reference.map(Expr::Field),
        list_expr,
        duration_literal.map(Expr::Duration),
        number_literal.map(Expr::Number),
        ident_or_call,
    ))
    .parse_next(input)
}

fn paren_expr(input: &mut &str) -> ModalResult<Expr> {
    literal("(").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let inner = cut_err(parse_expr).parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal(")"))
        .context(StrContext::Expected(StrContextValue::Description("')'")))
        .parse_next(input)?;
    Ok(inner)
}

fn lambda_expr(input: &mut &str) -> ModalResult<Expr> {
    kw("lambda").parse_next(input)?;
    ws_skip.parse_next(input)?;
    cut_err(literal(":"))
        .context(StrContext::Expected(StrContextValue::Description(
            "':' after lambda",
        )))
        .parse_next(input)?;
    ws_skip.parse_next(input)?;
    let body = cut_err(parse_expr).parse_next(input)?;
    Ok(Expr::lambda(body))
}

fn list_expr(input: &mut &str) -> ModalResult<Expr> {
    literal("[").parse_next(input)?;
    let items = delimited_items("]", input)?;
    Ok(Expr::List(items))
}

fn ident_or_call(input: &mut &str) -> ModalResult<Expr> {
    let name = ident.parse_next(input)?.to_string();
    if input.starts_with('(') {
        let args = call_args.parse_next(input)?;
        return Ok(Expr::Call { name, args });
    }
    Ok(Expr::Ident(name))
}

/// `"(" [ expr { "," expr } ] ")"`
pub(crate) fn call_args(input: &mut &str) -> ModalResult<Vec<Expr>> {
    literal("(").parse_next(input)?;
    delimited_items(")", input)
}

fn delimited_items(close: &'static str, input: &mut &str) -> ModalResult<Vec<Expr>> {
    let mut items = Vec::new();
    ws_skip.parse_next(input)?;
    if opt(literal(close)).parse_next(input)?.is_some() {
        return Ok(items);
    }
    loop {
        ws_skip.parse_next(input)?;
        items.push(cut_err(parse_expr).parse_next(input)?);
        ws_skip.parse_next(input)?;
        if opt(literal(",")).parse_next(input)?.is_some() {
            continue;
        }
        cut_err(literal(close))
            .context(StrContext::Expected(StrContextValue::Description(
                "closing delimiter",
            )))
            .parse_next(input)?;
        return Ok(items);
    }
}
