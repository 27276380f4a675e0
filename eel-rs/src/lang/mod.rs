//! Front end: from source bytes to executors.
//!
//! [`source`] decodes and bounds the input, [`number`] reads numeric
//! literals, [`lexer`] switches between template text and expression
//! tokens, and [`parser`] drives a [`compiler::Compiler`] one production at
//! a time. The parser never builds a tree of its own; what a production
//! turns into is entirely up to the compiler.

pub mod compiler;
pub mod lexer;
pub mod number;
pub mod parser;
pub mod source;
