//! Numeric literal grammar.
//!
//! ```text
//! literal  := sign? ( prefixed | decimal )
//! prefixed := "0" ("x"|"X") hex+ | "0" ("c"|"C") oct+ | "0" ("b"|"B") bin+
//! decimal  := digits ( "." digits? )? exponent?  |  "." digits exponent?
//! exponent := ("e"|"E") sign? digits
//! ```
//!
//! Inside any digit run a single `_` may separate two digits. A literal is
//! *plain* when it is an unsigned base-10 integer with no fraction and no
//! exponent; only plain literals may index a look-back.

use num_bigint::BigInt;

use crate::error::{Error, Result};
use crate::value::Decimal;

use super::source::{Source, END};

/// A parsed numeric literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberLiteral {
    pub value: Decimal,
    /// The characters consumed, separators included.
    pub text: String,
    pub plain: bool,
}

/// Parse one literal starting at the source's current character. Reading
/// stops at the first character that cannot continue the literal.
pub fn parse(source: &mut Source<'_>) -> Result<NumberLiteral> {
    NumberParser {
        source,
        text: String::new(),
    }
    .literal()
}

/// Parse `text` as exactly one literal; trailing characters are an error.
pub fn parse_str(text: &str) -> Result<NumberLiteral> {
    let mut source = Source::from_str(text, text.len())?;
    let literal = parse(&mut source)?;
    if !source.at_end() {
        return Err(unexpected(&source));
    }
    Ok(literal)
}

fn unexpected(source: &Source<'_>) -> Error {
    let c = source.current();
    let message = if c == END {
        "unexpected end of number".to_string()
    } else {
        format!("unexpected character '{c}' (0x{:04X})", c as u32)
    };
    Error::NumberFormat {
        position: source.position(),
        message,
    }
}

struct NumberParser<'s, 'a> {
    source: &'s mut Source<'a>,
    text: String,
}

impl NumberParser<'_, '_> {
    fn current(&self) -> char {
        self.source.current()
    }

    fn bump(&mut self) -> Result<char> {
        let c = self.source.read()?;
        self.text.push(c);
        Ok(c)
    }

    fn fail(&self, message: impl Into<String>) -> Error {
        Error::NumberFormat {
            position: self.source.position(),
            message: message.into(),
        }
    }

    fn literal(mut self) -> Result<NumberLiteral> {
        let mut signed = false;
        let mut negative = false;
        if matches!(self.current(), '+' | '-') {
            negative = self.bump()? == '-';
            signed = true;
        }

        if self.current() == '0' {
            let radix = match self.source.next() {
                'x' | 'X' => Some(16),
                'c' | 'C' => Some(8),
                'b' | 'B' => Some(2),
                _ => None,
            };
            if let Some(radix) = radix {
                self.bump()?;
                let prefix = self.bump()?;
                if !self.current().is_digit(radix) {
                    return Err(self.fail(format!("missing digits after '0{prefix}'")));
                }
                let digits = self.digits(radix)?;
                let mut n = BigInt::parse_bytes(digits.as_bytes(), radix)
                    .ok_or_else(|| self.fail("malformed digits"))?;
                if negative {
                    n = -n;
                }
                return Ok(NumberLiteral {
                    value: Decimal::from(n),
                    text: self.text,
                    plain: false,
                });
            }
        }

        let int = if self.current().is_ascii_digit() {
            self.digits(10)?
        } else {
            String::new()
        };
        let mut fraction = String::new();
        let mut plain = !signed;
        if self.current() == '.' && (!int.is_empty() || self.source.next().is_ascii_digit()) {
            self.bump()?;
            plain = false;
            if self.current().is_ascii_digit() {
                fraction = self.digits(10)?;
            } else if self.current() == '_' {
                return Err(unexpected(self.source));
            }
        }
        if int.is_empty() && fraction.is_empty() {
            return Err(unexpected(self.source));
        }

        let mut exponent: i64 = 0;
        if matches!(self.current(), 'e' | 'E') {
            self.bump()?;
            plain = false;
            let mut exp_negative = false;
            if matches!(self.current(), '+' | '-') {
                exp_negative = self.bump()? == '-';
            }
            if !self.current().is_ascii_digit() {
                return Err(self.fail("missing digits in exponent"));
            }
            let digits = self.digits(10)?;
            exponent = digits
                .parse()
                .map_err(|_| self.fail("exponent out of range"))?;
            if exp_negative {
                exponent = -exponent;
            }
        }

        let mut unscaled: BigInt = format!("{int}{fraction}")
            .parse()
            .map_err(|_| self.fail("malformed digits"))?;
        if negative {
            unscaled = -unscaled;
        }
        let scale = (fraction.len() as i64)
            .checked_sub(exponent)
            .ok_or_else(|| self.fail("exponent out of range"))?;
        let value = Decimal::checked(unscaled, scale)
            .map_err(|_| self.fail("exponent out of range"))?;
        Ok(NumberLiteral {
            value,
            text: self.text,
            plain,
        })
    }

    /// A run of digits in `radix`, returned without separators. The current
    /// character must already be a digit.
    fn digits(&mut self, radix: u32) -> Result<String> {
        let mut out = String::new();
        loop {
            let c = self.current();
            if c.is_digit(radix) {
                self.bump()?;
                out.push(c);
            } else if c == '_' {
                if !self.source.next().is_digit(radix) {
                    return Err(unexpected(self.source));
                }
                self.bump()?;
            } else {
                return Ok(out);
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn value(text: &str) -> String {
        parse_str(text).unwrap().value.to_string()
    }

    fn error(text: &str) -> (usize, String) {
        match parse_str(text).unwrap_err() {
            Error::NumberFormat { position, message } => (position, message),
            other => panic!("expected a number format error, got {other:?}"),
        }
    }

    #[test]
    fn decimal_forms() {
        assert_eq!(value("42"), "42");
        assert_eq!(value("-3.25"), "-3.25");
        assert_eq!(value("+7"), "7");
        assert_eq!(value(".5"), "0.5");
        assert_eq!(value("5."), "5");
        assert_eq!(value("1.5e3"), "1500");
        assert_eq!(value("25E-2"), "0.25");
    }

    #[test]
    fn prefixed_bases() {
        assert_eq!(value("0xFF"), "255");
        assert_eq!(value("0Xff"), "255");
        assert_eq!(value("0c17"), "15");
        assert_eq!(value("0b1010"), "10");
        assert_eq!(value("-0x10"), "-16");
    }

    #[test]
    fn separators() {
        assert_eq!(value("1_000_000"), "1000000");
        assert_eq!(value("0b1111_0000"), "240");
        assert_eq!(value("3.141_592"), "3.141592");
    }

    #[test]
    fn bad_separators() {
        assert_eq!(error("1__0"), (2, "unexpected character '_' (0x005F)".into()));
        assert_eq!(error("10_"), (3, "unexpected character '_' (0x005F)".into()));
        assert_eq!(error("_1").0, 1);
        assert_eq!(error("1_.5").0, 2);
    }

    #[test]
    fn digits_outside_the_radix() {
        assert_eq!(error("0b102"), (5, "unexpected character '2' (0x0032)".into()));
        assert_eq!(error("0c8").1, "missing digits after '0c'");
    }

    #[test]
    fn malformed_input() {
        assert_eq!(error("").1, "unexpected end of number");
        assert_eq!(error("-").1, "unexpected end of number");
        assert_eq!(error("1e").1, "missing digits in exponent");
        assert_eq!(error("12a"), (3, "unexpected character 'a' (0x0061)".into()));
    }

    #[test]
    fn exponent_range() {
        assert_eq!(error("1e99999999999999"), (17, "exponent out of range".into()));
        assert_eq!(error("1e-2147483648").1, "exponent out of range");
        assert_eq!(error("1e99999999999999999999").1, "exponent out of range");
        assert_eq!(parse_str("1e2147483647").unwrap().value.scale(), -2147483647);
        assert_eq!(parse_str("1.5e-2147483646").unwrap().value.scale(), 2147483647);
    }

    #[test]
    fn plain_flag() {
        assert!(parse_str("12").unwrap().plain);
        assert!(!parse_str("12.0").unwrap().plain);
        assert!(!parse_str("1e2").unwrap().plain);
        assert!(!parse_str("0x1").unwrap().plain);
        assert!(!parse_str("-1").unwrap().plain);
    }

    #[test]
    fn stops_at_the_first_foreign_character() {
        let mut source = Source::from_str("12+3", 10).unwrap();
        let lit = parse(&mut source).unwrap();
        assert_eq!(lit.text, "12");
        assert_eq!(source.current(), '+');
    }
}
