use std::time::Duration;

use winnow::ascii::multispace0;
use winnow::combinator::{alt, cut_err, opt};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::{any, literal, take_until, take_while};

/// Words that can never be used as identifiers.
pub const RESERVED: &[&str] = &["AND", "OR", "TRUE", "FALSE", "lambda", "var"];

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

pub fn ident<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    // First character must be alphabetic or underscore (not digit).
    if !input.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    let saved = *input;
    let word = take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)?;
    if RESERVED.contains(&word) {
        *input = saved;
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    Ok(word)
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

/// `'...'` with `\'` and `\\` escapes.
pub fn quoted_string(input: &mut &str) -> ModalResult<String> {
    delimited_escaped('\'', input)
}

/// `"..."` field reference, same escaping rules as [`quoted_string`].
pub fn field_reference(input: &mut &str) -> ModalResult<String> {
    delimited_escaped('"', input)
}

/// `'''...'''`: verbatim, no escapes.
pub fn triple_quoted_string(input: &mut &str) -> ModalResult<String> {
    literal("'''").parse_next(input)?;
    let content = cut_err(take_until(0.., "'''"))
        .context(StrContext::Expected(StrContextValue::Description(
            "closing '''",
        )))
        .parse_next(input)?;
    literal("'''").parse_next(input)?;
    Ok(content.to_string())
}

fn delimited_escaped(quote: char, input: &mut &str) -> ModalResult<String> {
    if !input.starts_with(quote) {
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    *input = &input[quote.len_utf8()..];

    let mut out = String::new();
    loop {
        let chunk = take_while(0.., |c: char| c != quote && c != '\\').parse_next(input)?;
        out.push_str(chunk);
        if opt(literal("\\")).parse_next(input)?.is_some() {
            let escaped = cut_err(any)
                .context(StrContext::Expected(StrContextValue::Description(
                    "escaped character",
                )))
                .parse_next(input)?;
            out.push(escaped);
            continue;
        }
        if input.starts_with(quote) {
            *input = &input[quote.len_utf8()..];
            return Ok(out);
        }
        // Unterminated string.
        return Err(ErrMode::Cut(ContextError::new()));
    }
}

/// Escape `text` for embedding between `quote` characters.
pub fn escape(text: &str, quote: char) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\\' || c == quote {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ---------------------------------------------------------------------------
// Duration
// ---------------------------------------------------------------------------

/// Parse a duration literal: digits followed by one of
/// `u`, `µ`, `ms`, `s`, `m`, `h`, `d`, `w`. Backtracks when no unit follows.
pub fn duration_literal(input: &mut &str) -> ModalResult<Duration> {
    let saved = *input;
    let digits = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let unit = match opt(duration_unit).parse_next(input)? {
        Some(unit) => unit,
        None => {
            *input = saved;
            return Err(ErrMode::Backtrack(ContextError::new()));
        }
    };
    let count: u64 = digits
        .parse()
        .map_err(|_| ErrMode::Cut(ContextError::new()))?;
    let nanos = count
        .checked_mul(unit)
        .ok_or_else(|| ErrMode::Cut(ContextError::new()))?;
    Ok(Duration::from_nanos(nanos))
}

/// Unit suffix in nanoseconds. The suffix must end the word.
fn duration_unit(input: &mut &str) -> ModalResult<u64> {
    let saved = *input;
    let unit = alt((
        literal("ms").value(1_000_000u64),
        literal("us").value(1_000u64),
        literal("u").value(1_000u64),
        literal("µ").value(1_000u64),
        literal("s").value(1_000_000_000u64),
        literal("m").value(60_000_000_000u64),
        literal("h").value(3_600_000_000_000u64),
        literal("d").value(86_400_000_000_000u64),
        literal("w").value(604_800_000_000_000u64),
    ))
    .parse_next(input)?;
    if input.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
        *input = saved;
        return Err(ErrMode::Backtrack(ContextError::new()));
    }
    Ok(unit)
}

// ---------------------------------------------------------------------------
// Whitespace & comments
// ---------------------------------------------------------------------------

/// Skip whitespace and `// ...` line comments.
pub fn ws_skip(input: &mut &str) -> ModalResult<()> {
    loop {
        let _ = multispace0.parse_next(input)?;
        if opt(literal("//")).parse_next(input)?.is_some() {
            let _ = take_while(0.., |c: char| c != '\n').parse_next(input)?;
        } else {
            break;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Keyword matching with word boundary
// ---------------------------------------------------------------------------

/// Match an exact keyword string, ensuring it's not a prefix of a longer
/// identifier (i.e. the next character is not alphanumeric or `_`).
pub fn kw<'a>(keyword: &'static str) -> impl FnMut(&mut &'a str) -> ModalResult<()> {
    move |input: &mut &'a str| {
        let saved = *input;
        literal(keyword).parse_next(input)?;
        if input.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_') {
            *input = saved;
            return Err(ErrMode::Backtrack(ContextError::new()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Number literal
// ---------------------------------------------------------------------------

/// Parse an unsigned number literal: integer or float.
pub fn number_literal(input: &mut &str) -> ModalResult<f64> {
    let integer_part = take_while(1.., |c: char| c.is_ascii_digit()).parse_next(input)?;
    let has_dot = opt(literal(".")).parse_next(input)?.is_some();
    if has_dot {
        let frac_part = take_while(1.., |c: char| c.is_ascii_digit())
            .context(StrContext::Expected(StrContextValue::Description(
                "digits after decimal point",
            )))
            .parse_next(input)?;
        let s = format!("{integer_part}.{frac_part}");
        let v: f64 = s.parse().map_err(|_| ErrMode::Cut(ContextError::new()))?;
        Ok(v)
    } else {
        let v: f64 = integer_part
            .parse()
            .map_err(|_| ErrMode::Cut(ContextError::new()))?;
        Ok(v)
    }
}
