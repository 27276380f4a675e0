//! Runtime value model.
//!
//! Every expression produces a [`Value`] of one of four kinds (Text,
//! Number, Logic or Date), and any value can be asked for any of the four
//! forms. Text is always available; the other conversions follow fixed
//! language rules and may fail with [`Error::Conversion`].
//!
//! Values are immutable. Derived forms (the Text of a Number, the Number
//! of a Date, …) are computed on first request and cached in a once-cell on
//! the value itself, so repeated conversions are free and the caching can
//! never change a result.

pub mod date;
pub mod decimal;
pub mod pool;

use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};
use crate::lang::number;

pub use date::Timestamp;
pub use decimal::{Decimal, MathContext, RoundingMode};
pub use pool::ValuePool;

// ── Kind ──────────────────────────────────────────────────────────────────────

/// The four value types of the language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Text,
    Number,
    Logic,
    Date,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Kind::Text => "Text",
            Kind::Number => "Number",
            Kind::Logic => "Logic",
            Kind::Date => "Date",
        })
    }
}

// ── Value ─────────────────────────────────────────────────────────────────────

/// An immutable, cheaply clonable language value.
#[derive(Clone)]
pub struct Value(Repr);

#[derive(Clone)]
enum Repr {
    Text(Arc<TextRepr>),
    Number(Arc<NumberRepr>),
    Logic(bool),
    Date(Arc<DateRepr>),
}

struct TextRepr {
    text: String,
    number: OnceLock<Option<Decimal>>,
    date: OnceLock<Option<Timestamp>>,
}

struct NumberRepr {
    number: Decimal,
    text: OnceLock<String>,
}

struct DateRepr {
    date: Timestamp,
    text: OnceLock<String>,
    number: OnceLock<Decimal>,
}

fn singleton(cell: &'static OnceLock<Value>, init: impl FnOnce() -> Value) -> Value {
    cell.get_or_init(init).clone()
}

fn decimal_one() -> &'static Decimal {
    static ONE: OnceLock<Decimal> = OnceLock::new();
    ONE.get_or_init(Decimal::one)
}

fn decimal_zero() -> &'static Decimal {
    static ZERO: OnceLock<Decimal> = OnceLock::new();
    ZERO.get_or_init(Decimal::zero)
}

impl Value {
    pub const TRUE: Value = Value(Repr::Logic(true));
    pub const FALSE: Value = Value(Repr::Logic(false));

    fn new_text(text: String) -> Value {
        Value(Repr::Text(Arc::new(TextRepr {
            text,
            number: OnceLock::new(),
            date: OnceLock::new(),
        })))
    }

    fn new_number(number: Decimal) -> Value {
        Value(Repr::Number(Arc::new(NumberRepr {
            number,
            text: OnceLock::new(),
        })))
    }

    /// A Text value. The empty string is a shared singleton.
    pub fn text(text: impl Into<String>) -> Value {
        let text = text.into();
        if text.is_empty() {
            return Value::empty_text();
        }
        Value::new_text(text)
    }

    /// A Number value. 0, 1 and 10 are shared singletons.
    pub fn number(number: impl Into<Decimal>) -> Value {
        let number = number.into();
        if number.is_zero() {
            Value::zero()
        } else if &number == decimal_one() {
            Value::one()
        } else if number == Decimal::ten() {
            Value::ten()
        } else {
            Value::new_number(number)
        }
    }

    pub fn logic(b: bool) -> Value {
        if b {
            Value::TRUE
        } else {
            Value::FALSE
        }
    }

    pub fn date(date: Timestamp) -> Value {
        Value(Repr::Date(Arc::new(DateRepr {
            date,
            text: OnceLock::new(),
            number: OnceLock::new(),
        })))
    }

    pub fn empty_text() -> Value {
        static EMPTY: OnceLock<Value> = OnceLock::new();
        singleton(&EMPTY, || Value::new_text(String::new()))
    }

    pub fn zero() -> Value {
        static ZERO: OnceLock<Value> = OnceLock::new();
        singleton(&ZERO, || Value::new_number(Decimal::zero()))
    }

    pub fn one() -> Value {
        static ONE: OnceLock<Value> = OnceLock::new();
        singleton(&ONE, || Value::new_number(Decimal::one()))
    }

    pub fn ten() -> Value {
        static TEN: OnceLock<Value> = OnceLock::new();
        singleton(&TEN, || Value::new_number(Decimal::ten()))
    }

    /// The zero timestamp (the Unix epoch, UTC).
    pub fn epoch() -> Value {
        static EPOCH: OnceLock<Value> = OnceLock::new();
        singleton(&EPOCH, || Value::date(date::epoch()))
    }

    pub fn kind(&self) -> Kind {
        match &self.0 {
            Repr::Text(_) => Kind::Text,
            Repr::Number(_) => Kind::Number,
            Repr::Logic(_) => Kind::Logic,
            Repr::Date(_) => Kind::Date,
        }
    }

    /// True when both handles share the same allocation (or are the same
    /// Logic constant).
    pub fn ptr_eq(&self, other: &Value) -> bool {
        match (&self.0, &other.0) {
            (Repr::Text(a), Repr::Text(b)) => Arc::ptr_eq(a, b),
            (Repr::Number(a), Repr::Number(b)) => Arc::ptr_eq(a, b),
            (Repr::Date(a), Repr::Date(b)) => Arc::ptr_eq(a, b),
            (Repr::Logic(a), Repr::Logic(b)) => a == b,
            _ => false,
        }
    }

    // ── Conversions ───────────────────────────────────────────────────────────

    /// Text form; never fails.
    pub fn as_text(&self) -> &str {
        match &self.0 {
            Repr::Text(t) => &t.text,
            Repr::Number(n) => n.text.get_or_init(|| n.number.to_string()),
            Repr::Logic(true) => "true",
            Repr::Logic(false) => "false",
            Repr::Date(d) => d.text.get_or_init(|| date::format(&d.date)),
        }
    }

    /// Number form. Text is parsed with the numeric literal grammar
    /// (any of the four bases).
    pub fn as_number(&self) -> Result<&Decimal> {
        match &self.0 {
            Repr::Text(t) => t
                .number
                .get_or_init(|| number::parse_str(t.text.trim()).ok().map(|lit| lit.value))
                .as_ref()
                .ok_or_else(|| Error::conversion(Kind::Text, Kind::Number, t.text.as_str())),
            Repr::Number(n) => Ok(&n.number),
            Repr::Logic(true) => Ok(decimal_one()),
            Repr::Logic(false) => Ok(decimal_zero()),
            Repr::Date(d) => Ok(d.number.get_or_init(|| date::to_seconds(&d.date))),
        }
    }

    /// Logic form.
    pub fn as_logic(&self) -> Result<bool> {
        match &self.0 {
            Repr::Text(t) => match t.text.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(true),
                "false" | "0" | "" => Ok(false),
                _ => Err(Error::conversion(Kind::Text, Kind::Logic, t.text.as_str())),
            },
            Repr::Number(n) => Ok(n.number.is_positive()),
            Repr::Logic(b) => Ok(*b),
            Repr::Date(d) => Ok(d.date > date::epoch()),
        }
    }

    /// Date form.
    pub fn as_date(&self) -> Result<Timestamp> {
        match &self.0 {
            Repr::Text(t) => t
                .date
                .get_or_init(|| date::parse(&t.text))
                .ok_or_else(|| Error::conversion(Kind::Text, Kind::Date, t.text.as_str())),
            Repr::Number(n) => date::from_seconds(&n.number)
                .ok_or_else(|| Error::conversion(Kind::Number, Kind::Date, self.as_text())),
            Repr::Logic(true) => Ok(date::epoch() + chrono::TimeDelta::seconds(1)),
            Repr::Logic(false) => Ok(date::epoch()),
            Repr::Date(d) => Ok(d.date),
        }
    }

    /// This value converted to `kind`.
    pub fn convert(&self, kind: Kind) -> Result<Value> {
        if self.kind() == kind {
            return Ok(self.clone());
        }
        Ok(match kind {
            Kind::Text => Value::text(self.as_text()),
            Kind::Number => Value::number(self.as_number()?.clone()),
            Kind::Logic => Value::logic(self.as_logic()?),
            Kind::Date => Value::date(self.as_date()?),
        })
    }

    // ── Comparison ────────────────────────────────────────────────────────────

    /// Language equality (`=`): identical kinds compare natively; if either
    /// side is Text both compare as Text; otherwise both compare as Number.
    pub fn equals(&self, other: &Value) -> bool {
        self.compare(other) == Ordering::Equal
    }

    /// Language ordering, using the same type rule as [`Value::equals`].
    pub fn compare(&self, other: &Value) -> Ordering {
        match (&self.0, &other.0) {
            (Repr::Text(a), Repr::Text(b)) => a.text.cmp(&b.text),
            (Repr::Number(a), Repr::Number(b)) => a.number.cmp(&b.number),
            (Repr::Logic(a), Repr::Logic(b)) => a.cmp(b),
            (Repr::Date(a), Repr::Date(b)) => a.date.cmp(&b.date),
            (Repr::Text(_), _) | (_, Repr::Text(_)) => self.as_text().cmp(other.as_text()),
            _ => match (self.as_number(), other.as_number()) {
                (Ok(a), Ok(b)) => a.cmp(b),
                // Only Text can fail to convert, and Text was handled above.
                _ => Ordering::Equal,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_text())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.kind(), self.as_text())
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::empty_text()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::text(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::logic(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::number(n)
    }
}

impl From<Decimal> for Value {
    fn from(n: Decimal) -> Self {
        Value::number(n)
    }
}

impl From<Timestamp> for Value {
    fn from(d: Timestamp) -> Self {
        Value::date(d)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn num(s: &str) -> Value {
        Value::number(s.parse::<Decimal>().unwrap())
    }

    fn date(s: &str) -> Value {
        Value::date(date::parse(s).unwrap())
    }

    #[test]
    fn number_to_text_is_plain() {
        assert_eq!(num("1e3").as_text(), "1000");
        assert_eq!(num("0.00012").as_text(), "0.00012");
    }

    #[test]
    fn date_to_text() {
        assert_eq!(date("2024-03-15T10:30Z").as_text(), "2024-03-15T10:30:00+00:00");
    }

    #[test]
    fn logic_to_everything() {
        assert_eq!(Value::TRUE.as_text(), "true");
        assert_eq!(Value::FALSE.as_text(), "false");
        assert_eq!(Value::TRUE.as_number().unwrap(), &Decimal::one());
        assert_eq!(Value::FALSE.as_number().unwrap(), &Decimal::zero());
        assert_eq!(Value::TRUE.as_date().unwrap().timestamp(), 1);
        assert_eq!(Value::FALSE.as_date().unwrap().timestamp(), 0);
    }

    #[test]
    fn text_to_number_accepts_all_bases() {
        assert_eq!(Value::text("0x1F").as_number().unwrap(), &Decimal::from(31));
        assert_eq!(Value::text("0b101").as_number().unwrap(), &Decimal::from(5));
        assert_eq!(Value::text("0c17").as_number().unwrap(), &Decimal::from(15));
        assert_eq!(Value::text("1_000").as_number().unwrap(), &Decimal::from(1000));
    }

    #[test]
    fn text_to_number_failure_names_types() {
        let err = Value::text("abc").as_number().unwrap_err();
        assert!(matches!(
            err,
            Error::Conversion { from: Kind::Text, to: Kind::Number, .. }
        ));
    }

    #[test]
    fn text_to_logic() {
        assert!(Value::text("TRUE").as_logic().unwrap());
        assert!(Value::text("1").as_logic().unwrap());
        assert!(!Value::text("False").as_logic().unwrap());
        assert!(!Value::text("0").as_logic().unwrap());
        assert!(!Value::text("").as_logic().unwrap());
        assert!(Value::text("yes").as_logic().is_err());
    }

    #[test]
    fn number_and_date_to_logic() {
        assert!(num("0.5").as_logic().unwrap());
        assert!(!num("0").as_logic().unwrap());
        assert!(!num("-3").as_logic().unwrap());
        assert!(date("1970-01-01T00:00:01Z").as_logic().unwrap());
        assert!(!date("1970-01-01Z").as_logic().unwrap());
        assert!(!date("1960").as_logic().unwrap());
    }

    #[test]
    fn number_to_date() {
        let d = num("86400.25").as_date().unwrap();
        assert_eq!(date::format(&d), "1970-01-02T00:00:00.25+00:00");
    }

    #[test]
    fn date_to_number() {
        assert_eq!(date("1970-01-02Z").as_number().unwrap(), &Decimal::from(86400));
    }

    #[test]
    fn text_wins_equality() {
        assert!(Value::text("0").equals(&num("0")));
        assert!(!Value::text("1.0").equals(&num("1")));
        assert!(Value::text("true").equals(&Value::TRUE));
        assert!(!Value::text("0").equals(&Value::FALSE));
    }

    #[test]
    fn numeric_bridge_for_non_text() {
        assert!(num("0").equals(&Value::FALSE));
        assert!(num("1").equals(&Value::TRUE));
        assert!(num("0").equals(&Value::epoch()));
        assert!(Value::TRUE.equals(&date("1970-01-01T00:00:01Z")));
    }

    #[test]
    fn native_comparisons() {
        assert_eq!(num("2").compare(&num("10")), Ordering::Less);
        assert_eq!(Value::text("2").compare(&Value::text("10")), Ordering::Greater);
        assert_eq!(Value::FALSE.compare(&Value::TRUE), Ordering::Less);
        assert!(date("2024-01-01T01:00+01:00").equals(&date("2024-01-01T00:00Z")));
    }

    #[test]
    fn singletons_are_shared() {
        assert!(Value::text("").ptr_eq(&Value::empty_text()));
        assert!(Value::number(0).ptr_eq(&Value::zero()));
        assert!(Value::number(10).ptr_eq(&Value::ten()));
        assert!(!Value::number(7).ptr_eq(&Value::number(7)));
    }

    #[test]
    fn memoised_conversion_matches_fresh() {
        let v = Value::text("0x10");
        let first = v.as_number().unwrap().clone();
        let again = v.as_number().unwrap().clone();
        assert_eq!(first, again);
        assert_eq!(first, Value::text("0x10").as_number().unwrap().clone());
    }

    #[test]
    fn convert_changes_kind() {
        let v = Value::text("42").convert(Kind::Number).unwrap();
        assert_eq!(v.kind(), Kind::Number);
        assert_eq!(Value::TRUE.convert(Kind::Text).unwrap().as_text(), "true");
        assert!(Value::text("x").convert(Kind::Date).is_err());
    }
}
