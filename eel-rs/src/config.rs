//! Settings file parser.
//!
//! A settings file configures a [`ContextBuilder`](crate::ContextBuilder):
//!
//! | Key | Value |
//! |-----|-------|
//! | `max_length` | maximum expression size in bytes (at least 2) |
//! | `timeout` | seconds (`1.5`), or with a unit (`250ms`, `2s`); `0` disables |
//! | `precision` | significant digits for `/` and `**`; `0` is unlimited |
//! | `rounding` | `UP`, `DOWN`, `CEILING`, `FLOOR`, `HALF_UP`, `HALF_DOWN`, `HALF_EVEN`, `UNNECESSARY` |
//!
//! Lines are `key = value`. Blank lines and lines starting with `#` or `;`
//! are ignored. A bad line is reported and skipped; the rest still load.

use std::path::Path;
use std::time::Duration;

use crate::value::decimal::{Decimal, RoundingMode};

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a settings file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Parsed settings; `None` leaves the builder's value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub max_length: Option<usize>,
    pub timeout: Option<Duration>,
    pub precision: Option<u32>,
    pub rounding: Option<RoundingMode>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a settings string. Returns the settings and a list of any
    /// errors on individual lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut settings = Settings::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                errors.push(ConfigError {
                    line: lineno,
                    message: format!("expected 'key = value', got '{line}'"),
                });
                continue;
            };
            if let Err(message) = settings.set(key.trim(), value.trim()) {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (settings, errors)
    }

    /// Read and parse a settings file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Apply one `key = value` pair.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), String> {
        match key.to_ascii_lowercase().as_str() {
            "max_length" => {
                let n: usize = value
                    .parse()
                    .map_err(|_| format!("max_length: '{value}' is not a byte count"))?;
                self.max_length = Some(n);
            }
            "timeout" => self.timeout = Some(parse_timeout(value)?),
            "precision" => {
                let n: u32 = value
                    .parse()
                    .map_err(|_| format!("precision: '{value}' is not a digit count"))?;
                self.precision = Some(n);
            }
            "rounding" => {
                let mode = value
                    .parse()
                    .map_err(|_| format!("rounding: unknown mode '{value}'"))?;
                self.rounding = Some(mode);
            }
            other => return Err(format!("unknown setting '{other}'")),
        }
        Ok(())
    }
}

/// `1.5`, `1.5s` or `250ms`.
pub fn parse_timeout(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    let (number, scale) = if let Some(ms) = value.strip_suffix("ms") {
        (ms, Decimal::new(1, 3))
    } else if let Some(s) = value.strip_suffix('s') {
        (s, Decimal::one())
    } else {
        (value, Decimal::one())
    };
    let amount: Decimal = number
        .trim()
        .parse()
        .map_err(|_| format!("timeout: '{value}' is not a duration"))?;
    if amount.is_negative() {
        return Err(format!("timeout: '{value}' is negative"));
    }
    let nanos = (&(&amount * &scale) * &Decimal::new(1_000_000_000, 0)).trunc();
    let nanos = u64::try_from(nanos).map_err(|_| format!("timeout: '{value}' is too long"))?;
    Ok(Duration::from_nanos(nanos))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_keys() {
        let (s, errors) = Settings::load_str(
            "max_length = 4096\ntimeout = 2s\nprecision = 16\nrounding = half_up\n",
        );
        assert!(errors.is_empty(), "{errors:?}");
        assert_eq!(s.max_length, Some(4096));
        assert_eq!(s.timeout, Some(Duration::from_secs(2)));
        assert_eq!(s.precision, Some(16));
        assert_eq!(s.rounding, Some(RoundingMode::HalfUp));
    }

    #[test]
    fn timeout_forms() {
        assert_eq!(parse_timeout("1.5"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_timeout("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_timeout("3 s"), Ok(Duration::from_secs(3)));
        assert_eq!(parse_timeout("0"), Ok(Duration::ZERO));
        assert!(parse_timeout("-1").is_err());
        assert!(parse_timeout("soon").is_err());
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let (s, errors) = Settings::load_str("# heading\n\n; old style\n  precision=7  \n");
        assert!(errors.is_empty());
        assert_eq!(s.precision, Some(7));
    }

    #[test]
    fn bad_lines_are_reported_and_skipped() {
        let (s, errors) = Settings::load_str("precision = many\ncolour = blue\nnonsense\ntimeout=1\n");
        assert_eq!(s.timeout, Some(Duration::from_secs(1)));
        assert_eq!(s.precision, None);
        let lines: Vec<usize> = errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![1, 2, 3]);
        assert_eq!(errors[1].to_string(), "line 2: unknown setting 'colour'");
    }

    #[test]
    fn unknown_rounding_mode() {
        let (_, errors) = Settings::load_str("rounding = sideways");
        assert_eq!(errors[0].message, "rounding: unknown mode 'sideways'");
    }

    #[test]
    fn load_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"max_length = 64\n").unwrap();
        let (s, errors) = Settings::load_file(file.path()).unwrap();
        assert!(errors.is_empty());
        assert_eq!(s.max_length, Some(64));
    }
}
