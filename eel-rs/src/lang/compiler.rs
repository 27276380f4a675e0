//! Executor factory.
//!
//! The parser never evaluates anything: every grammar production hands its
//! already-compiled parts to one [`Compiler`] method and receives a new
//! executor back. [`ClosureCompiler`] builds executors as shared closures
//! over a [`Scope`]; another implementation could emit bytecode or an AST
//! without touching the grammar.

use std::sync::Arc;

use num_bigint::BigInt;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::runtime::Cancellation;
use crate::symbols::SymbolsTable;
use crate::value::{Kind, MathContext, Value};

// ── Syntax fragments ──────────────────────────────────────────────────────────

/// One piece of a template.
#[derive(Debug, Clone)]
pub enum Segment<E> {
    Text(String),
    /// `${…}`, `$(…)` or `$name(…)`.
    Value(E),
    /// `$[n]`: the n-th previous `Value` segment of the same template.
    LookBack { distance: usize, position: usize },
}

/// A substring bound and the source position of its sub-expression.
#[derive(Debug, Clone)]
pub struct Bound<E> {
    pub executor: E,
    pub position: usize,
}

#[derive(Debug, Clone)]
pub struct Slice<E> {
    pub start: Bound<E>,
    /// `None` runs to the end of the text.
    pub count: Option<Bound<E>>,
}

/// Case-transform suffixes of a variable reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseTransform {
    /// `^`
    UpperFirst,
    /// `^^`
    Upper,
    /// `,`
    LowerFirst,
    /// `,,`
    Lower,
    /// `~`
    ToggleFirst,
    /// `~~`
    Toggle,
}

impl CaseTransform {
    pub fn apply(self, text: &str) -> String {
        match self {
            CaseTransform::Upper => text.to_uppercase(),
            CaseTransform::Lower => text.to_lowercase(),
            CaseTransform::Toggle => text.chars().map(toggle).collect(),
            CaseTransform::UpperFirst => map_first(text, |c| c.to_uppercase().collect()),
            CaseTransform::LowerFirst => map_first(text, |c| c.to_lowercase().collect()),
            CaseTransform::ToggleFirst => map_first(text, |c| toggle(c).to_string()),
        }
    }
}

fn toggle(c: char) -> char {
    let flipped: Vec<char> = if c.is_uppercase() {
        c.to_lowercase().collect()
    } else {
        c.to_uppercase().collect()
    };
    // Multi-character case mappings (ß → SS) leave the character alone.
    match flipped.as_slice() {
        [single] => *single,
        _ => c,
    }
}

fn map_first(text: &str, f: impl FnOnce(char) -> String) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => f(first) + chars.as_str(),
        None => String::new(),
    }
}

/// `${name:start:count^#-default}` after parsing.
#[derive(Debug, Clone)]
pub struct VariableRef<E> {
    pub name: String,
    pub slice: Option<Slice<E>>,
    pub transforms: Vec<CaseTransform>,
    pub length: bool,
    pub default: Option<E>,
}

impl<E> VariableRef<E> {
    /// A bare read with no modifiers.
    pub fn plain(name: impl Into<String>) -> Self {
        VariableRef {
            name: name.into(),
            slice: None,
            transforms: Vec::new(),
            length: false,
            default: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Before,
    After,
    Shl,
    Shr,
    /// `or`, short-circuit.
    Or,
    /// `|`
    BitOr,
    Add,
    Sub,
    /// `xor` and `^`
    Xor,
    Mul,
    Div,
    /// `//`
    DivFloor,
    /// `-/`
    DivTrunc,
    Rem,
    /// `and`, short-circuit.
    And,
    /// `&`
    BitAnd,
    Power,
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Plus,
    Not,
    Complement,
}

// ── Compiler ──────────────────────────────────────────────────────────────────

/// One method per grammar production.
pub trait Compiler {
    type Executor;

    fn constant(&self, value: Value) -> Self::Executor;

    /// A template. `typed` templates made of a single value segment keep
    /// that segment's own value; everything else concatenates to Text.
    fn template(&self, segments: Vec<Segment<Self::Executor>>, typed: bool) -> Self::Executor;

    fn variable(&self, reference: VariableRef<Self::Executor>) -> Self::Executor;

    /// `${name?}`
    fn is_defined(&self, name: String) -> Self::Executor;

    fn conditional(
        &self,
        condition: Self::Executor,
        then: Self::Executor,
        otherwise: Self::Executor,
    ) -> Self::Executor;

    fn binary(&self, op: BinaryOp, lhs: Self::Executor, rhs: Self::Executor) -> Self::Executor;

    fn unary(&self, op: UnaryOp, operand: Self::Executor) -> Self::Executor;

    /// `text(x)`, `number(x)`, `logic(x)`, `date(x)`
    fn convert(&self, kind: Kind, operand: Self::Executor) -> Self::Executor;

    /// Bind a function call. Fails at compile time when the call cannot
    /// match the function's signature.
    fn call(
        &self,
        name: &str,
        arguments: Vec<Self::Executor>,
        position: usize,
    ) -> Result<Self::Executor>;
}

// ── Closure executors ─────────────────────────────────────────────────────────

/// Per-call evaluation state shared by every executor of one evaluation.
pub struct Scope<'a> {
    symbols: &'a SymbolsTable,
    cancel: &'a Cancellation,
}

impl<'a> Scope<'a> {
    pub fn new(symbols: &'a SymbolsTable, cancel: &'a Cancellation) -> Self {
        Scope { symbols, cancel }
    }

    pub fn read(&self, key: &str) -> Option<String> {
        self.symbols.read(key)
    }

    /// Fails with [`Error::Interrupted`] once the evaluation was cancelled.
    pub fn checkpoint(&self) -> Result<()> {
        self.cancel.check()
    }
}

/// A compiled construct.
pub type Executor = Arc<dyn Fn(&Scope<'_>) -> Result<Value> + Send + Sync>;

/// Builds [`Executor`] closures, drawing constants and functions from a
/// [`Context`].
pub struct ClosureCompiler<'c> {
    context: &'c Context,
}

impl<'c> ClosureCompiler<'c> {
    pub fn new(context: &'c Context) -> Self {
        ClosureCompiler { context }
    }
}

impl Compiler for ClosureCompiler<'_> {
    type Executor = Executor;

    fn constant(&self, value: Value) -> Executor {
        let value = self.context.pool().intern(value);
        Arc::new(move |_| Ok(value.clone()))
    }

    fn template(&self, mut segments: Vec<Segment<Executor>>, typed: bool) -> Executor {
        if typed && matches!(segments.as_slice(), [Segment::Value(_)]) {
            if let Some(Segment::Value(single)) = segments.pop() {
                return single;
            }
        }
        if segments.iter().all(|s| matches!(s, Segment::Text(_))) {
            let text: String = segments
                .iter()
                .filter_map(|s| match s {
                    Segment::Text(t) => Some(t.as_str()),
                    _ => None,
                })
                .collect();
            return self.constant(Value::text(text));
        }
        Arc::new(move |scope| {
            let mut out = String::new();
            let mut produced: Vec<Value> = Vec::new();
            for segment in &segments {
                match segment {
                    Segment::Text(t) => out.push_str(t),
                    Segment::Value(e) => {
                        scope.checkpoint()?;
                        let value = e(scope)?;
                        out.push_str(value.as_text());
                        produced.push(value);
                    }
                    Segment::LookBack { distance, position } => {
                        let value = produced
                            .len()
                            .checked_sub(*distance)
                            .and_then(|i| produced.get(i))
                            .ok_or_else(|| Error::syntax(*position, "look-back out of range"))?;
                        out.push_str(value.as_text());
                    }
                }
            }
            Ok(Value::text(out))
        })
    }

    fn variable(&self, reference: VariableRef<Executor>) -> Executor {
        Arc::new(move |scope| {
            let Some(raw) = scope.read(&reference.name) else {
                return match &reference.default {
                    Some(default) => default(scope),
                    None => Err(Error::UnknownSymbol {
                        name: reference.name.clone(),
                    }),
                };
            };
            let mut text = match &reference.slice {
                Some(slice) => substring(&raw, slice, scope)?,
                None => raw,
            };
            for transform in &reference.transforms {
                text = transform.apply(&text);
            }
            if reference.length {
                Ok(Value::number(text.chars().count() as i64))
            } else {
                Ok(Value::text(text))
            }
        })
    }

    fn is_defined(&self, name: String) -> Executor {
        Arc::new(move |scope| Ok(Value::logic(scope.read(&name).is_some())))
    }

    fn conditional(&self, condition: Executor, then: Executor, otherwise: Executor) -> Executor {
        Arc::new(move |scope| {
            if condition(scope)?.as_logic()? {
                then(scope)
            } else {
                otherwise(scope)
            }
        })
    }

    fn binary(&self, op: BinaryOp, lhs: Executor, rhs: Executor) -> Executor {
        match op {
            BinaryOp::And => Arc::new(move |scope| {
                if !lhs(scope)?.as_logic()? {
                    return Ok(Value::FALSE);
                }
                Ok(Value::logic(rhs(scope)?.as_logic()?))
            }),
            BinaryOp::Or => Arc::new(move |scope| {
                if lhs(scope)?.as_logic()? {
                    return Ok(Value::TRUE);
                }
                Ok(Value::logic(rhs(scope)?.as_logic()?))
            }),
            _ => {
                let math = *self.context.math();
                Arc::new(move |scope| {
                    scope.checkpoint()?;
                    let l = lhs(scope)?;
                    let r = rhs(scope)?;
                    apply_binary(op, &l, &r, &math)
                })
            }
        }
    }

    fn unary(&self, op: UnaryOp, operand: Executor) -> Executor {
        Arc::new(move |scope| {
            let v = operand(scope)?;
            Ok(match op {
                UnaryOp::Negate => Value::number(-v.as_number()?),
                UnaryOp::Plus => Value::number(v.as_number()?.clone()),
                UnaryOp::Not => Value::logic(!v.as_logic()?),
                UnaryOp::Complement => match v.kind() {
                    Kind::Logic => Value::logic(!v.as_logic()?),
                    _ => Value::number(!v.as_number()?.trunc()),
                },
            })
        })
    }

    fn convert(&self, kind: Kind, operand: Executor) -> Executor {
        Arc::new(move |scope| operand(scope)?.convert(kind))
    }

    fn call(&self, name: &str, arguments: Vec<Executor>, position: usize) -> Result<Executor> {
        self.context.functions().bind(name, arguments, position)
    }
}

// ── Operator semantics ────────────────────────────────────────────────────────

fn apply_binary(op: BinaryOp, l: &Value, r: &Value, math: &MathContext) -> Result<Value> {
    use BinaryOp::*;
    Ok(match op {
        Eq => Value::logic(l.equals(r)),
        Ne => Value::logic(!l.equals(r)),
        Lt => Value::logic(l.compare(r).is_lt()),
        Gt => Value::logic(l.compare(r).is_gt()),
        Le => Value::logic(l.compare(r).is_le()),
        Ge => Value::logic(l.compare(r).is_ge()),
        Before => Value::logic(l.as_date()? < r.as_date()?),
        After => Value::logic(l.as_date()? > r.as_date()?),
        Add => Value::number(l.as_number()? + r.as_number()?),
        Sub => Value::number(l.as_number()? - r.as_number()?),
        Mul => Value::number(l.as_number()?.checked_mul(r.as_number()?)?),
        Div => Value::number(l.as_number()?.div(r.as_number()?, math)?),
        DivFloor => Value::number(l.as_number()?.div_floor(r.as_number()?)?),
        DivTrunc => Value::number(l.as_number()?.div_trunc(r.as_number()?)?),
        Rem => Value::number(l.as_number()?.rem(r.as_number()?)?),
        Power => Value::number(l.as_number()?.pow(r.as_number()?, math)?),
        Concat => Value::text(format!("{}{}", l.as_text(), r.as_text())),
        BitAnd | BitOr | Xor => bitwise(op, l, r)?,
        Shl | Shr => shift(op, l, r)?,
        And => Value::logic(l.as_logic()? && r.as_logic()?),
        Or => Value::logic(l.as_logic()? || r.as_logic()?),
    })
}

/// Logical when both sides are Logic, otherwise on the integer parts.
fn bitwise(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    if l.kind() == Kind::Logic && r.kind() == Kind::Logic {
        let (a, b) = (l.as_logic()?, r.as_logic()?);
        return Ok(Value::logic(match op {
            BinaryOp::BitAnd => a & b,
            BinaryOp::BitOr => a | b,
            _ => a ^ b,
        }));
    }
    let (a, b): (BigInt, BigInt) = (l.as_number()?.trunc(), r.as_number()?.trunc());
    Ok(Value::number(match op {
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        _ => a ^ b,
    }))
}

fn shift(op: BinaryOp, l: &Value, r: &Value) -> Result<Value> {
    let count = r
        .as_number()?
        .to_i32()
        .ok_or_else(|| Error::arithmetic(format!("invalid shift count {}", r.as_text())))?;
    let n = l.as_number()?.trunc();
    let bits = count.unsigned_abs() as usize;
    let left = (op == BinaryOp::Shl) == (count >= 0);
    Ok(Value::number(if left { n << bits } else { n >> bits }))
}

fn index(bound: &Bound<Executor>, scope: &Scope<'_>) -> Result<usize> {
    let value = (bound.executor)(scope)?;
    let n = value.as_number()?;
    if !n.is_integer() {
        return Err(Error::Fractional {
            position: bound.position,
            value: n.to_string(),
        });
    }
    n.to_i32()
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| Error::OutOfRange {
            position: bound.position,
            value: n.to_string(),
        })
}

fn substring(text: &str, slice: &Slice<Executor>, scope: &Scope<'_>) -> Result<String> {
    let length = text.chars().count();
    let start = index(&slice.start, scope)?;
    if start > length {
        return Err(Error::OutOfRange {
            position: slice.start.position,
            value: start.to_string(),
        });
    }
    let count = match &slice.count {
        Some(bound) => {
            let count = index(bound, scope)?;
            if start + count > length {
                return Err(Error::OutOfRange {
                    position: bound.position,
                    value: count.to_string(),
                });
            }
            count
        }
        None => length - start,
    };
    Ok(text.chars().skip(start).take(count).collect())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_transforms() {
        assert_eq!(CaseTransform::UpperFirst.apply("eel"), "Eel");
        assert_eq!(CaseTransform::Upper.apply("eel"), "EEL");
        assert_eq!(CaseTransform::LowerFirst.apply("EEL"), "eEL");
        assert_eq!(CaseTransform::Lower.apply("EeL"), "eel");
        assert_eq!(CaseTransform::ToggleFirst.apply("eEl"), "EEl");
        assert_eq!(CaseTransform::Toggle.apply("eEl"), "EeL");
        assert_eq!(CaseTransform::UpperFirst.apply(""), "");
    }

    #[test]
    fn toggle_keeps_multi_character_mappings() {
        assert_eq!(CaseTransform::Toggle.apply("ß"), "ß");
    }

    fn num(text: &str) -> Value {
        Value::number(text.parse::<crate::value::Decimal>().unwrap())
    }

    fn binary(op: BinaryOp, l: Value, r: Value) -> Value {
        apply_binary(op, &l, &r, &MathContext::default()).unwrap()
    }

    #[test]
    fn bitwise_on_logic_stays_logic() {
        let v = binary(BinaryOp::Xor, Value::TRUE, Value::FALSE);
        assert_eq!(v.kind(), Kind::Logic);
        assert!(v.as_logic().unwrap());
    }

    #[test]
    fn bitwise_on_numbers_uses_integer_parts() {
        assert_eq!(binary(BinaryOp::BitAnd, num("12.9"), num("10")).as_text(), "8");
        assert_eq!(binary(BinaryOp::BitOr, num("12"), num("3")).as_text(), "15");
        assert_eq!(binary(BinaryOp::Xor, num("6"), Value::TRUE).as_text(), "7");
    }

    #[test]
    fn shifts() {
        assert_eq!(binary(BinaryOp::Shl, num("1"), num("4")).as_text(), "16");
        assert_eq!(binary(BinaryOp::Shr, num("16"), num("2")).as_text(), "4");
        assert_eq!(binary(BinaryOp::Shl, num("16"), num("-2")).as_text(), "4");
        assert!(apply_binary(BinaryOp::Shl, &num("1"), &num("0.5"), &MathContext::default()).is_err());
    }

    #[test]
    fn comparisons_follow_the_text_wins_rule() {
        assert!(binary(BinaryOp::Lt, num("9"), num("10")).as_logic().unwrap());
        assert!(!binary(BinaryOp::Lt, Value::text("9"), num("10")).as_logic().unwrap());
        assert!(binary(BinaryOp::Eq, Value::TRUE, num("1")).as_logic().unwrap());
    }

    #[test]
    fn concat_uses_text_forms() {
        assert_eq!(binary(BinaryOp::Concat, num("1.50"), Value::TRUE).as_text(), "1.5true");
    }
}
