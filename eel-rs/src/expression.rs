//! Compiled expressions.
//!
//! An [`Expression`] is the immutable result of compiling one template. It
//! can be evaluated any number of times, from any number of threads, each
//! time against its own [`SymbolsTable`].

use std::collections::HashMap;
use std::fmt;
use std::io::Read;

use tracing::debug;

use crate::context::Context;
use crate::error::Result;
use crate::lang::compiler::{ClosureCompiler, Executor};
use crate::lang::parser::Parser;
use crate::lang::source::Source;
use crate::runtime;
use crate::symbols::{Properties, SymbolsTable};
use crate::value::Value;

#[derive(Clone)]
pub struct Expression {
    root: Executor,
    context: Context,
    text: Option<String>,
}

impl Expression {
    /// Compile `text` under `context`.
    pub fn compile(text: &str, context: &Context) -> Result<Expression> {
        let source = Source::from_str(text, context.max_length())?;
        let root = Self::build(source, context)?;
        debug!(bytes = text.len(), "compiled expression");
        Ok(Expression {
            root,
            context: context.clone(),
            text: Some(text.to_owned()),
        })
    }

    /// Compile from a byte stream holding UTF-8 text.
    pub fn compile_reader<R: Read>(reader: R, context: &Context) -> Result<Expression> {
        let source = Source::new(reader, context.max_length())?;
        let root = Self::build(source, context)?;
        debug!("compiled expression from reader");
        Ok(Expression {
            root,
            context: context.clone(),
            text: None,
        })
    }

    fn build(source: Source<'_>, context: &Context) -> Result<Executor> {
        let compiler = ClosureCompiler::new(context);
        Parser::new(source, &compiler).parse()
    }

    /// The source text, when compiled from a string.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    // ── Evaluation ────────────────────────────────────────────────────────────

    pub fn evaluate(&self, symbols: &SymbolsTable) -> Result<Value> {
        runtime::run(&self.root, symbols, &self.context)
    }

    /// Evaluate with [`evaluate`](Self::evaluate) from a runtime task
    /// without blocking its worker.
    pub async fn evaluate_async(&self, symbols: &SymbolsTable) -> Result<Value> {
        runtime::run_async(&self.root, symbols, &self.context).await
    }

    /// No variables defined.
    pub fn evaluate_empty(&self) -> Result<Value> {
        self.evaluate(&SymbolsTable::empty())
    }

    pub fn evaluate_map(&self, map: &HashMap<String, String>) -> Result<Value> {
        self.evaluate(&SymbolsTable::from_map(map.clone()))
    }

    pub fn evaluate_with<F>(&self, lookup: F) -> Result<Value>
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.evaluate(&SymbolsTable::from_fn(lookup))
    }

    /// Every variable reads as `value`.
    pub fn evaluate_default(&self, value: &str) -> Result<Value> {
        self.evaluate(&SymbolsTable::default_value(value))
    }

    pub fn evaluate_env(&self) -> Result<Value> {
        self.evaluate(&SymbolsTable::environment())
    }

    pub fn evaluate_properties(&self, properties: &Properties) -> Result<Value> {
        self.evaluate(&SymbolsTable::properties(properties.clone()))
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Expression")
            .field("text", &self.text)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
