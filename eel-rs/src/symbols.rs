//! Symbols table.
//!
//! Variables are resolved at evaluation time through an ordered chain of
//! lookup strategies; the first strategy that knows a key answers it. The
//! table is immutable once built and cheap to clone, so one table can serve
//! any number of concurrent evaluations.
//!
//! ```rust
//! use std::collections::HashMap;
//! use eel::SymbolsTable;
//!
//! let mut user = HashMap::new();
//! user.insert("name".to_string(), "Eel".to_string());
//! let symbols = SymbolsTable::builder()
//!     .map(user)
//!     .scoped("env.", eel::symbols::Environment)
//!     .default_value("?")
//!     .build();
//! assert_eq!(symbols.read("name").as_deref(), Some("Eel"));
//! assert_eq!(symbols.read("missing").as_deref(), Some("?"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

// ── Strategies ────────────────────────────────────────────────────────────────

/// One way of resolving a symbol.
pub trait Lookup: Send + Sync {
    fn read(&self, key: &str) -> Option<String>;
}

impl Lookup for HashMap<String, String> {
    fn read(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct Environment;

impl Lookup for Environment {
    fn read(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// A lookup closure.
pub struct Callback<F>(pub F);

impl<F> Lookup for Callback<F>
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn read(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }
}

/// Answers every key with the same value.
#[derive(Debug, Clone)]
pub struct Fallback(pub String);

impl Lookup for Fallback {
    fn read(&self, _key: &str) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Only answers keys starting with `prefix`, asking `inner` for the rest.
pub struct Scoped {
    prefix: String,
    inner: Arc<dyn Lookup>,
}

impl Scoped {
    pub fn new(prefix: impl Into<String>, inner: impl Lookup + 'static) -> Self {
        Scoped {
            prefix: prefix.into(),
            inner: Arc::new(inner),
        }
    }
}

impl Lookup for Scoped {
    fn read(&self, key: &str) -> Option<String> {
        self.inner.read(key.strip_prefix(self.prefix.as_str())?)
    }
}

// ── Properties ────────────────────────────────────────────────────────────────

/// `key=value` text in the Java properties style.
///
/// Lines starting with `#` or `!` are comments. The key ends at the first
/// unescaped `=`, `:` or whitespace; a trailing backslash continues the
/// value on the next line. `\t`, `\n`, `\r`, `\f`, `\uXXXX` and an escaped
/// separator are decoded.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    entries: HashMap<String, String>,
}

impl Properties {
    pub fn parse(text: &str) -> Self {
        let mut entries = HashMap::new();
        let mut lines = text.lines();
        while let Some(raw) = lines.next() {
            let line = raw.trim_start();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let mut logical = line.to_string();
            while ends_with_continuation(&logical) {
                logical.pop();
                match lines.next() {
                    Some(next) => logical.push_str(next.trim_start()),
                    None => break,
                }
            }
            let (key, value) = split_entry(&logical);
            entries.insert(unescape(key), unescape(value));
        }
        Properties { entries }
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

impl Lookup for Properties {
    fn read(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }
}

/// An odd number of trailing backslashes.
fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..i], line[i + 1..].trim_start()),
            c if c.is_whitespace() => {
                let rest = line[i..].trim_start();
                let rest = rest
                    .strip_prefix(|c: char| c == '=' || c == ':')
                    .unwrap_or(rest);
                return (&line[..i], rest.trim_start());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{000C}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

// ── Table ─────────────────────────────────────────────────────────────────────

/// An ordered chain of [`Lookup`] strategies.
#[derive(Clone, Default)]
pub struct SymbolsTable {
    strategies: Arc<Vec<Arc<dyn Lookup>>>,
}

impl SymbolsTable {
    pub fn builder() -> SymbolsBuilder {
        SymbolsBuilder::default()
    }

    /// A table that defines nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_map(map: HashMap<String, String>) -> Self {
        Self::builder().map(map).build()
    }

    pub fn environment() -> Self {
        Self::builder().environment().build()
    }

    pub fn properties(properties: Properties) -> Self {
        Self::builder().properties(properties).build()
    }

    /// A table that answers every key with `value`.
    pub fn default_value(value: impl Into<String>) -> Self {
        Self::builder().default_value(value).build()
    }

    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self::builder().callback(f).build()
    }

    /// The first strategy's answer for `key`.
    pub fn read(&self, key: &str) -> Option<String> {
        self.strategies.iter().find_map(|s| s.read(key))
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

impl fmt::Debug for SymbolsTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolsTable")
            .field("strategies", &self.strategies.len())
            .finish()
    }
}

/// Collects strategies in priority order.
#[derive(Default)]
pub struct SymbolsBuilder {
    strategies: Vec<Arc<dyn Lookup>>,
}

impl SymbolsBuilder {
    pub fn lookup(mut self, strategy: impl Lookup + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    pub fn map(self, map: HashMap<String, String>) -> Self {
        self.lookup(map)
    }

    pub fn properties(self, properties: Properties) -> Self {
        self.lookup(properties)
    }

    pub fn environment(self) -> Self {
        self.lookup(Environment)
    }

    pub fn callback<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.lookup(Callback(f))
    }

    pub fn scoped(self, prefix: impl Into<String>, inner: impl Lookup + 'static) -> Self {
        self.lookup(Scoped::new(prefix, inner))
    }

    pub fn default_value(self, value: impl Into<String>) -> Self {
        self.lookup(Fallback(value.into()))
    }

    /// Append every strategy of `table`.
    pub fn table(mut self, table: &SymbolsTable) -> Self {
        self.strategies.extend(table.strategies.iter().cloned());
        self
    }

    pub fn build(self) -> SymbolsTable {
        SymbolsTable {
            strategies: Arc::new(self.strategies),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
