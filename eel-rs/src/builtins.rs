//! Standard functions.
//!
//! Registered into every context by [`FunctionRegistry::standard`]. Each
//! body receives arguments already coerced to its declared parameter kinds,
//! so the accessors below only unwrap.

use chrono::{Offset, Utc};

use crate::error::{BoxError, Error, FunctionError};
use crate::functions::{Function, FunctionRegistry};
use crate::value::{Decimal, Kind, RoundingMode, Value};

type Outcome = std::result::Result<Value, BoxError>;

/// Add the standard set to `registry`.
pub fn register(registry: &mut FunctionRegistry) {
    // ── Control ───────────────────────────────────────────────────────────────
    registry.register(
        Function::new("fail", |args: &[Value]| -> Outcome {
            Err(Box::new(Error::from(FunctionError::Failed {
                message: args[0].as_text().to_string(),
            })))
        })
        .optional("message", Kind::Text, "fail() called"),
    );

    // ── Text ──────────────────────────────────────────────────────────────────
    registry.register(
        Function::new("length", |args: &[Value]| -> Outcome {
            Ok(Value::number(args[0].as_text().chars().count() as i64))
        })
        .param("text", Kind::Text),
    );
    registry.register(
        Function::new("upper", |args: &[Value]| -> Outcome {
            Ok(Value::text(args[0].as_text().to_uppercase()))
        })
        .param("text", Kind::Text),
    );
    registry.register(
        Function::new("lower", |args: &[Value]| -> Outcome {
            Ok(Value::text(args[0].as_text().to_lowercase()))
        })
        .param("text", Kind::Text),
    );
    registry.register(
        Function::new("trim", |args: &[Value]| -> Outcome {
            Ok(Value::text(args[0].as_text().trim()))
        })
        .param("text", Kind::Text),
    );
    registry.register(
        Function::new("substr", |args: &[Value]| -> Outcome {
            let chars: Vec<char> = args[0].as_text().chars().collect();
            let start = (integer("substr", &args[1])?.max(0) as usize).min(chars.len());
            let end = match args.get(2) {
                Some(count) if !count.as_text().is_empty() => {
                    let count = integer("substr", count)?.max(0) as usize;
                    start.saturating_add(count).min(chars.len())
                }
                _ => chars.len(),
            };
            Ok(Value::text(chars[start..end].iter().collect::<String>()))
        })
        .param("text", Kind::Text)
        .param("start", Kind::Number)
        .optional("count", None, ""),
    );
    registry.register(
        Function::new("find", |args: &[Value]| -> Outcome {
            let haystack = args[0].as_text();
            let index = match haystack.find(args[1].as_text()) {
                Some(byte) => haystack[..byte].chars().count() as i64,
                None => -1,
            };
            Ok(Value::number(index))
        })
        .param("text", Kind::Text)
        .param("needle", Kind::Text),
    );
    registry.register(
        Function::new("replace", |args: &[Value]| -> Outcome {
            let (text, from, to) = (args[0].as_text(), args[1].as_text(), args[2].as_text());
            if from.is_empty() {
                return Ok(args[0].clone());
            }
            Ok(Value::text(text.replace(from, to)))
        })
        .param("text", Kind::Text)
        .param("from", Kind::Text)
        .param("to", Kind::Text),
    );
    registry.register(
        Function::new("repeat", |args: &[Value]| -> Outcome {
            let n = integer("repeat", &args[1])?.max(0) as usize;
            Ok(Value::text(args[0].as_text().repeat(n)))
        })
        .param("text", Kind::Text)
        .param("count", Kind::Number),
    );
    registry.register(
        Function::new("pad", |args: &[Value]| -> Outcome {
            let text = args[0].as_text();
            let width = integer("pad", &args[1])?.max(0) as usize;
            let fill = args[2].as_text().chars().next().unwrap_or(' ');
            let current = text.chars().count();
            let mut out = text.to_string();
            out.extend(std::iter::repeat_n(fill, width.saturating_sub(current)));
            Ok(Value::text(out))
        })
        .param("text", Kind::Text)
        .param("width", Kind::Number)
        .optional("fill", Kind::Text, " "),
    );
    registry.register(
        Function::new("ascii", |args: &[Value]| -> Outcome {
            let code = args[0].as_text().chars().next().map_or(0, |c| c as i64);
            Ok(Value::number(code))
        })
        .param("text", Kind::Text),
    );
    registry.register(
        Function::new("char", |args: &[Value]| -> Outcome {
            let code = integer("char", &args[0])?;
            let c = u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| Error::arithmetic(format!("char: {code} is not a code point")))?;
            Ok(Value::text(c.to_string()))
        })
        .param("code", Kind::Number),
    );

    // ── Numbers ───────────────────────────────────────────────────────────────
    registry.register(
        Function::new("abs", |args: &[Value]| -> Outcome {
            Ok(Value::number(number(&args[0])?.abs()))
        })
        .param("number", Kind::Number),
    );
    registry.register(
        Function::new("round", |args: &[Value]| -> Outcome {
            let places = integer("round", &args[1])?;
            Ok(Value::number(
                number(&args[0])?.round_to_scale(places, RoundingMode::HalfUp)?,
            ))
        })
        .param("number", Kind::Number)
        .optional("places", Kind::Number, 0),
    );
    registry.register(
        Function::new("trunc", |args: &[Value]| -> Outcome {
            Ok(Value::number(number(&args[0])?.trunc()))
        })
        .param("number", Kind::Number),
    );
    registry.register(
        Function::new("sqrt", |args: &[Value]| -> Outcome {
            let n = number(&args[0])?;
            if n.is_negative() {
                return Err(Box::new(Error::arithmetic(format!("sqrt of negative number {n}"))));
            }
            let root = Decimal::from_f64(n.to_f64().sqrt())
                .ok_or_else(|| Error::arithmetic(format!("sqrt of {n} is out of range")))?;
            Ok(Value::number(root))
        })
        .param("number", Kind::Number),
    );
    registry.register(
        Function::new("min", |args: &[Value]| extreme(args, std::cmp::Ordering::Less))
            .param("first", Kind::Number)
            .variadic(Kind::Number),
    );
    registry.register(
        Function::new("max", |args: &[Value]| extreme(args, std::cmp::Ordering::Greater))
            .param("first", Kind::Number)
            .variadic(Kind::Number),
    );

    // ── Dates ─────────────────────────────────────────────────────────────────
    registry.register(Function::new("now", |_: &[Value]| -> Outcome {
        Ok(Value::date(Utc::now().with_timezone(&Utc.fix())))
    }));
}

// ── Argument accessors ────────────────────────────────────────────────────────

fn number(value: &Value) -> Result<&Decimal, Error> {
    value.as_number()
}

fn integer(name: &str, value: &Value) -> Result<i64, Error> {
    let n = value.as_number()?;
    n.trunc_i64()
        .ok_or_else(|| Error::arithmetic(format!("{name}: {n} is out of range")))
}

/// The first argument that orders `wanted` against every other one.
fn extreme(args: &[Value], wanted: std::cmp::Ordering) -> Outcome {
    let mut best = &args[0];
    for candidate in &args[1..] {
        if number(candidate)?.cmp(number(best)?) == wanted {
            best = candidate;
        }
    }
    Ok(best.clone())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
