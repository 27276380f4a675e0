//! Compile context.
//!
//! A [`Context`] carries everything compilation and evaluation need besides
//! the source text and the symbols: the length limit, the evaluation
//! timeout, the decimal [`MathContext`], the function registry and the
//! constant pool. Contexts are immutable and cheap to clone; clones share
//! one pool and one timer runtime.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConfigError, Settings};
use crate::functions::{Function, FunctionRegistry};
use crate::lang::source::MIN_LIMIT;
use crate::runtime::Timer;
use crate::value::{MathContext, RoundingMode, ValuePool};

/// Default maximum expression size in bytes.
pub const DEFAULT_MAX_LENGTH: usize = 1024;

#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    max_length: usize,
    timeout: Option<Duration>,
    math: MathContext,
    functions: FunctionRegistry,
    pool: ValuePool,
    timer: Timer,
}

impl Context {
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    pub fn max_length(&self) -> usize {
        self.inner.max_length
    }

    /// `None` evaluates on the calling thread without a time limit.
    pub fn timeout(&self) -> Option<Duration> {
        self.inner.timeout
    }

    pub fn math(&self) -> &MathContext {
        &self.inner.math
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.inner.functions
    }

    pub fn pool(&self) -> &ValuePool {
        &self.inner.pool
    }

    pub(crate) fn timer(&self) -> &Timer {
        &self.inner.timer
    }
}

impl Default for Context {
    fn default() -> Self {
        ContextBuilder::new().build()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("max_length", &self.inner.max_length)
            .field("timeout", &self.inner.timeout)
            .field("math", &self.inner.math)
            .field("functions", &self.inner.functions.len())
            .field("pool", &self.inner.pool)
            .finish()
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ContextBuilder {
    max_length: usize,
    timeout: Option<Duration>,
    math: MathContext,
    functions: FunctionRegistry,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder {
    /// Defaults: 1024 bytes, no timeout, 34 digits rounding half-even, the
    /// standard functions.
    pub fn new() -> Self {
        ContextBuilder {
            max_length: DEFAULT_MAX_LENGTH,
            timeout: None,
            math: MathContext::DECIMAL128,
            functions: FunctionRegistry::standard(),
        }
    }

    /// Maximum expression size in bytes; values below 2 are raised to 2.
    pub fn max_length(mut self, bytes: usize) -> Self {
        self.max_length = bytes;
        self
    }

    /// Evaluation time limit; a zero duration disables it.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    pub fn math(mut self, math: MathContext) -> Self {
        self.math = math;
        self
    }

    pub fn precision(mut self, digits: u32) -> Self {
        self.math.precision = digits;
        self
    }

    pub fn rounding(mut self, rounding: RoundingMode) -> Self {
        self.math.rounding = rounding;
        self
    }

    /// Register an extra function, replacing a standard one of the same name.
    pub fn function(mut self, function: Function) -> Self {
        self.functions.register(function);
        self
    }

    pub fn functions(mut self, functions: impl IntoIterator<Item = Function>) -> Self {
        for function in functions {
            self.functions.register(function);
        }
        self
    }

    /// Start from an empty registry instead of the standard functions.
    pub fn without_standard_functions(mut self) -> Self {
        self.functions = FunctionRegistry::new();
        self
    }

    pub fn settings(mut self, settings: &Settings) -> Self {
        if let Some(n) = settings.max_length {
            self.max_length = n;
        }
        if let Some(t) = settings.timeout {
            self.timeout = Some(t);
        }
        if let Some(p) = settings.precision {
            self.math.precision = p;
        }
        if let Some(r) = settings.rounding {
            self.math.rounding = r;
        }
        self
    }

    /// Apply a settings string; see [`crate::config`].
    pub fn load_str(self, s: &str) -> (Self, Vec<ConfigError>) {
        let (settings, errors) = Settings::load_str(s);
        (self.settings(&settings), errors)
    }

    /// Apply a settings file.
    pub fn load_file(self, path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let (settings, errors) = Settings::load_file(path)?;
        Ok((self.settings(&settings), errors))
    }

    pub fn build(self) -> Context {
        Context {
            inner: Arc::new(Inner {
                max_length: self.max_length.max(MIN_LIMIT),
                timeout: self.timeout.filter(|t| !t.is_zero()),
                math: self.math,
                functions: self.functions,
                pool: ValuePool::new(),
                timer: Timer::default(),
            }),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
