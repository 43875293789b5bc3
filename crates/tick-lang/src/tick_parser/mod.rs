use winnow::combinator::{alt, cut_err, opt};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::literal;

mod expr;

use crate::ast::*;
use crate::parse_utils::{ident, kw, ws_skip};

pub(crate) use expr::{call_args, parse_expr};


// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Parse script text into a [`Program`].
pub fn parse_script(input: &str) -> anyhow::Result<Program> {
    program
        .parse(input)
        .map_err(|e| anyhow::anyhow!("parse error: {e}"))
}

// ---------------------------------------------------------------------------
// Top-level grammar
// ---------------------------------------------------------------------------

fn program(input: &mut &str) -> ModalResult<Program> {
    let mut statements = Vec::new();
    loop {
        ws_skip.parse_next(input)?;
        if input.is_empty() {
            break;
        }
        let stmt = cut_err(statement)
            .context(StrContext::Expected(StrContextValue::Description(
                "'var' declaration or pipeline",
            )))
            .parse_next(input)?;
        statements.push(stmt);
    }
    Ok(Program { statements })
}

fn statement(input: &mut &str) -> ModalResult<Statement> {
    alt((var_stmt, chain_stmt.map(Statement::Chain))).parse_next(input)
}

// ---------------------------------------------------------------------------
// var declaration
// ---------------------------------------------------------------------------

fn var_stmt(input: &mut &str) -> ModalResult<Statement> {
    kw("var").parse_next(input)?;
    ws_skip.parse_next(input)?;
    let name = cut_err(ident)
        .context(StrContext::Expected(StrContextValue::Description(
            "variable name",
        )))
        .parse_next(input)?
        .to_string();
    ws_skip.parse_next(input)?;
    cut_err(literal("="))
        .context(StrContext::Expected(StrContextValue::Description("'='")))
        .parse_next(input)?;
    ws_skip.parse_next(input)?;

    let value = cut_err(parse_expr)
        .context(StrContext::Expected(StrContextValue::Description(
            "value after '='",
        )))
        .parse_next(input)?;

    // `var x = source |node()...`: an identifier followed by a pipe starts a chain.
    if let Expr::Ident(source) = &value {
        ws_skip.parse_next(input)?;
        if input.starts_with('|') {
            let links = chain_links.parse_next(input)?;
            return Ok(Statement::Var {
                name,
                value: Value::Chain(Chain {
                    source: source.clone(),
                    links,
                }),
            });
        }
    }
    Ok(Statement::Var {
        name,
        value: Value::Expr(value),
    })
}

// ---------------------------------------------------------------------------
// Pipelines
// ---------------------------------------------------------------------------

fn chain_stmt(input: &mut &str) -> ModalResult<Chain> {
    let source = ident.parse_next(input)?.to_string();
    ws_skip.parse_next(input)?;
    if !input.starts_with(['|', '.']) {
        return Err(winnow::error::ErrMode::Cut(
            winnow::error::ContextError::new(),
        ));
    }
    let links = chain_links.parse_next(input)?;
    Ok(Chain { source, links })
}

fn chain_links(input: &mut &str) -> ModalResult<Vec<Link>> {
    let mut links = Vec::new();
    loop {
        ws_skip.parse_next(input)?;
        if opt(literal("|")).parse_next(input)?.is_some() {
            links.push(Link::Node(cut_err(link_call).parse_next(input)?));
        } else if opt(literal(".")).parse_next(input)?.is_some() {
            links.push(Link::Property(cut_err(link_call).parse_next(input)?));
        } else {
            break;
        }
    }
    Ok(links)
}

fn link_call(input: &mut &str) -> ModalResult<Call> {
    ws_skip.parse_next(input)?;
    let name = ident
        .context(StrContext::Expected(StrContextValue::Description(
            "node or property name",
        )))
        .parse_next(input)?
        .to_string();
    let args = call_args
        .context(StrContext::Expected(StrContextValue::Description(
            "argument list",
        )))
        .parse_next(input)?;
    Ok(Call { name, args })
}
