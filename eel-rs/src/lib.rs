//! Eel: an embeddable expression language for string templates.
//!
//! A template is literal text with interpolations: `${name}` reads a
//! variable, `$( … )` evaluates an expression, `$name( … )` calls a
//! function and `$[n]` repeats an earlier value. Templates compile once
//! into an [`Expression`] and evaluate many times against a
//! [`SymbolsTable`].
//!
//! ```rust
//! use eel::SymbolsTable;
//!
//! let greeting = eel::compile("Hello, ${name-'World'}!").unwrap();
//! let v = greeting.evaluate(&SymbolsTable::empty()).unwrap();
//! assert_eq!(v.as_text(), "Hello, World!");
//!
//! let sum = eel::compile("$(2 * 3 ** 2 + (4 - 1))").unwrap();
//! assert_eq!(sum.evaluate_empty().unwrap().as_text(), "21");
//! ```

pub mod builtins;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod expression;
pub mod functions;
pub mod lang;
pub mod runtime;
pub mod symbols;
pub mod value;

// Re-exports for convenience.
pub use config::{ConfigError, Settings};
pub use context::{Context, ContextBuilder};
pub use error::{BoxError, Error, FunctionError, Result};
pub use expression::Expression;
pub use functions::{Function, FunctionRegistry};
pub use symbols::{Properties, SymbolsTable};
pub use value::{Decimal, Kind, MathContext, RoundingMode, Value};

/// Compile `text` under a default [`Context`].
pub fn compile(text: &str) -> Result<Expression> {
    Expression::compile(text, &Context::default())
}
