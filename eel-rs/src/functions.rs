//! Function registry.
//!
//! Functions are registered up front as a name, a typed parameter list and
//! a body closure. Calls are bound when the expression is compiled, so an
//! unknown name or an impossible argument count never reaches evaluation.
//! At call time the arguments are evaluated, coerced to the declared
//! parameter kinds (omitted optionals take their defaults, extra arguments
//! fill the variadic tail), the body runs, and its result is coerced to the
//! declared return kind.
//!
//! ```rust
//! use eel::{Function, Kind, Value};
//!
//! let twice = Function::new("twice", |args: &[Value]| {
//!     Ok(Value::text(args[0].as_text().repeat(2)))
//! })
//! .param("text", Kind::Text);
//! assert_eq!(twice.name(), "twice");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{BoxError, Error, FunctionError, Result};
use crate::lang::compiler::Executor;
use crate::value::{Kind, Value};

/// A function body: receives the coerced arguments.
pub type Body = dyn Fn(&[Value]) -> std::result::Result<Value, BoxError> + Send + Sync;

type Provider = dyn Fn() -> Value + Send + Sync;

#[derive(Clone)]
enum Fallback {
    Constant(Value),
    Computed(Arc<Provider>),
}

#[derive(Clone)]
struct Parameter {
    name: String,
    /// `None` accepts any value unchanged.
    kind: Option<Kind>,
    fallback: Option<Fallback>,
}

/// A registrable function and its signature.
#[derive(Clone)]
pub struct Function {
    name: String,
    params: Vec<Parameter>,
    variadic: Option<Option<Kind>>,
    returns: Option<Kind>,
    body: Arc<Body>,
}

impl Function {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&[Value]) -> std::result::Result<Value, BoxError> + Send + Sync + 'static,
    {
        Function {
            name: name.into(),
            params: Vec::new(),
            variadic: None,
            returns: None,
            body: Arc::new(body),
        }
    }

    /// A required parameter.
    pub fn param(mut self, name: impl Into<String>, kind: impl Into<Option<Kind>>) -> Self {
        self.params.push(Parameter {
            name: name.into(),
            kind: kind.into(),
            fallback: None,
        });
        self
    }

    /// An optional parameter with a constant default.
    pub fn optional(
        mut self,
        name: impl Into<String>,
        kind: impl Into<Option<Kind>>,
        default: impl Into<Value>,
    ) -> Self {
        self.params.push(Parameter {
            name: name.into(),
            kind: kind.into(),
            fallback: Some(Fallback::Constant(default.into())),
        });
        self
    }

    /// An optional parameter whose default is computed on each call.
    pub fn optional_with<P>(
        mut self,
        name: impl Into<String>,
        kind: impl Into<Option<Kind>>,
        provider: P,
    ) -> Self
    where
        P: Fn() -> Value + Send + Sync + 'static,
    {
        self.params.push(Parameter {
            name: name.into(),
            kind: kind.into(),
            fallback: Some(Fallback::Computed(Arc::new(provider))),
        });
        self
    }

    /// Accept any number of further arguments of `kind`.
    pub fn variadic(mut self, kind: impl Into<Option<Kind>>) -> Self {
        self.variadic = Some(kind.into());
        self
    }

    pub fn returns(mut self, kind: Kind) -> Self {
        self.returns = Some(kind);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check a call site with `given` arguments against the signature.
    fn check_arity(&self, given: usize) -> Result<()> {
        if self.variadic.is_none() && given > self.params.len() {
            return Err(FunctionError::TooManyArguments {
                name: self.name.clone(),
                max: self.params.len(),
                given,
            }
            .into());
        }
        if let Some((index, missing)) = self
            .params
            .iter()
            .enumerate()
            .skip(given)
            .find(|(_, p)| p.fallback.is_none())
        {
            return Err(FunctionError::MissingArgument {
                name: self.name.clone(),
                index: index + 1,
                param: missing.name.clone(),
            }
            .into());
        }
        Ok(())
    }

    fn coerce(&self, index: usize, kind: Option<Kind>, value: Value) -> Result<Value> {
        match kind {
            None => Ok(value),
            Some(kind) => value.convert(kind).map_err(|e| {
                FunctionError::BadArgument {
                    name: self.name.clone(),
                    index,
                    source: Box::new(e),
                }
                .into()
            }),
        }
    }

    /// Marshal `values`, run the body and coerce its result.
    pub fn invoke(&self, values: Vec<Value>) -> Result<Value> {
        self.check_arity(values.len())?;
        let mut args = Vec::with_capacity(values.len().max(self.params.len()));
        let mut values = values.into_iter();
        for (i, param) in self.params.iter().enumerate() {
            let value = match (values.next(), &param.fallback) {
                (Some(v), _) => v,
                (None, Some(Fallback::Constant(v))) => v.clone(),
                (None, Some(Fallback::Computed(provider))) => provider(),
                (None, None) => {
                    return Err(FunctionError::MissingArgument {
                        name: self.name.clone(),
                        index: i + 1,
                        param: param.name.clone(),
                    }
                    .into())
                }
            };
            args.push(self.coerce(i + 1, param.kind, value)?);
        }
        let tail = self.variadic.flatten();
        for (offset, value) in values.enumerate() {
            args.push(self.coerce(self.params.len() + offset + 1, tail, value)?);
        }

        let result = (self.body)(&args).map_err(|e| self.failure(e))?;
        match self.returns {
            None => Ok(result),
            Some(kind) => result.convert(kind).map_err(|e| {
                FunctionError::BadReturn {
                    name: self.name.clone(),
                    source: Box::new(e),
                }
                .into()
            }),
        }
    }

    /// Errors of the language's own family pass through; anything else is
    /// wrapped once.
    fn failure(&self, error: BoxError) -> Error {
        let error = match error.downcast::<Error>() {
            Ok(own) => return *own,
            Err(other) => other,
        };
        match error.downcast::<FunctionError>() {
            Ok(own) => Error::Function(*own),
            Err(other) => FunctionError::Invocation {
                name: self.name.clone(),
                source: other,
            }
            .into(),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                let kind = p.kind.map_or("Any".to_string(), |k| k.to_string());
                let mark = if p.fallback.is_some() { "?" } else { "" };
                format!("{}{mark}: {kind}", p.name)
            })
            .collect();
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &params)
            .field("variadic", &self.variadic)
            .field("returns", &self.returns)
            .finish()
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Name-to-function table consulted when calls are compiled.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<Function>>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the standard functions.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        crate::builtins::register(&mut registry);
        registry
    }

    /// Add `function`, replacing any function of the same name.
    pub fn register(&mut self, function: Function) {
        debug!(name = %function.name, params = function.params.len(), "registered function");
        self.functions
            .insert(function.name.clone(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&Function> {
        self.functions.get(name).map(Arc::as_ref)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Bind a call of `name` with already-compiled `arguments`.
    pub fn bind(&self, name: &str, arguments: Vec<Executor>, position: usize) -> Result<Executor> {
        let function = self
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| FunctionError::Unknown { name: name.to_string() })?;
        function.check_arity(arguments.len())?;
        trace!(function = name, arguments = arguments.len(), position, "bound function call");
        Ok(Arc::new(move |scope| {
            scope.checkpoint()?;
            let values = arguments
                .iter()
                .map(|argument| argument(scope))
                .collect::<Result<Vec<Value>>>()?;
            function.invoke(values)
        }))
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.names())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn join() -> Function {
        Function::new("join", |args: &[Value]| {
            Ok(Value::text(
                args.iter().map(Value::as_text).collect::<Vec<_>>().join("|"),
            ))
        })
    }

    fn registry(f: Function) -> FunctionRegistry {
        let mut r = FunctionRegistry::new();
        r.register(f);
        r
    }

    #[test]
    fn unknown_function_fails_to_bind() {
        let err = FunctionRegistry::new().bind("nope", Vec::new(), 1).err().unwrap();
        assert!(matches!(err, Error::Function(FunctionError::Unknown { ref name }) if name == "nope"));
    }

    #[test]
    fn too_many_arguments() {
        let f = join().param("a", Kind::Text);
        let err = f.invoke(vec![Value::text("x"), Value::text("y")]).unwrap_err();
        assert!(matches!(
            err,
            Error::Function(FunctionError::TooManyArguments { max: 1, given: 2, .. })
        ));
    }

    #[test]
    fn missing_argument_names_the_parameter() {
        let f = join().param("a", Kind::Text).param("b", Kind::Text);
        let err = f.invoke(vec![Value::text("x")]).unwrap_err();
        match err {
            Error::Function(FunctionError::MissingArgument { index, param, .. }) => {
                assert_eq!((index, param.as_str()), (2, "b"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn defaults_fill_omitted_optionals() {
        let f = join()
            .param("a", Kind::Text)
            .optional("b", Kind::Text, "B")
            .optional_with("c", None, || Value::number(3));
        assert_eq!(f.invoke(vec![Value::text("a")]).unwrap().as_text(), "a|B|3");
        assert_eq!(
            f.invoke(vec![Value::text("a"), Value::text("b")]).unwrap().as_text(),
            "a|b|3"
        );
    }

    #[test]
    fn variadic_tail_is_coerced() {
        let f = join().param("first", None).variadic(Kind::Number);
        let out = f
            .invoke(vec![Value::TRUE, Value::text("0x10"), Value::text("2.50")])
            .unwrap();
        assert_eq!(out.as_text(), "true|16|2.5");
    }

    #[test]
    fn bad_argument_carries_its_index() {
        let f = join().param("a", Kind::Text).param("n", Kind::Number);
        let err = f.invoke(vec![Value::text("x"), Value::text("many")]).unwrap_err();
        assert!(matches!(
            err,
            Error::Function(FunctionError::BadArgument { index: 2, .. })
        ));
    }

    #[test]
    fn bad_return_is_reported() {
        let f = join().param("a", None).returns(Kind::Logic);
        assert!(f.invoke(vec![Value::TRUE]).unwrap().as_logic().unwrap());
        let err = f.invoke(vec![Value::text("maybe")]).unwrap_err();
        assert!(matches!(err, Error::Function(FunctionError::BadReturn { .. })));
    }

    #[test]
    fn foreign_errors_are_wrapped_once() {
        let f = Function::new("io", |_: &[Value]| {
            Err(Box::new(std::io::Error::new(std::io::ErrorKind::Other, "disk")) as BoxError)
        });
        let err = f.invoke(Vec::new()).unwrap_err();
        match err {
            Error::Function(FunctionError::Invocation { name, source }) => {
                assert_eq!(name, "io");
                assert_eq!(source.to_string(), "disk");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn own_errors_pass_through_unchanged() {
        let f = Function::new("div", |_: &[Value]| {
            Err(Box::new(Error::Arithmetic("division by zero".into())) as BoxError)
        });
        assert!(matches!(f.invoke(Vec::new()), Err(Error::Arithmetic(_))));
    }

    #[test]
    fn bind_checks_arity_at_compile_time() {
        let r = registry(join().param("a", Kind::Text));
        assert!(r.bind("join", Vec::new(), 1).is_err());
    }

    #[test]
    fn register_replaces_by_name() {
        let mut r = registry(join());
        r.register(join().param("a", None));
        assert_eq!(r.len(), 1);
        assert_eq!(r.names(), vec!["join"]);
    }
}
