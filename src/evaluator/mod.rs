//! Source evaluation behind the interactive sessions
//!
//! Sessions hand each accumulated statement to an [`Evaluator`] together with
//! a [`Namespace`] and an output sink. The evaluator decides whether the source
//! is complete, runs it, and reports one of the [`Evaluation`] outcomes.
//! Output produced while running goes to the sink passed into the call and
//! nowhere else, so concurrent sessions can never see each other's output.
//!
//! [`MiniPython`] is the built-in evaluator: a small Python-flavoured language
//! with integers, floats, strings, lists, functions and `if` blocks.

mod interp;
mod lexer;
mod parser;
mod value;

pub use value::{Builtin, Exception, Function, Value};

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Outcome of evaluating one unit of source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Source ran to completion
    Complete,
    /// Statement is not finished; more lines are needed
    Incomplete,
    /// Source failed to compile or raised; `traceback` is ready to display
    Failed { traceback: String },
    /// Evaluated code asked to leave the session
    ExitRequested { code: i32 },
}

/// Executes source text against a namespace
pub trait Evaluator: Send + Sync {
    /// Human-readable version text shown in the session banner
    fn version(&self) -> String;

    /// Evaluate `source`, writing any produced output to `out`
    fn evaluate(&self, source: &str, namespace: &mut Namespace, out: &mut dyn Write) -> Evaluation;
}

/// Identifier → value bindings visible to evaluated code
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    bindings: HashMap<String, Value>,
}

impl Namespace {
    /// Create an empty namespace
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.bindings.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bound names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bindings.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Namespace handle that may be shared between sessions
///
/// The lock is held for exactly one evaluation step.
pub type SharedNamespace = Arc<Mutex<Namespace>>;

/// Built-in Python-flavoured evaluator
#[derive(Debug, Clone)]
pub struct MiniPython {
    filename: String,
}

impl MiniPython {
    /// Create an evaluator reporting errors against `<console>`
    pub fn new() -> Self {
        Self::with_filename("<console>")
    }

    /// Create an evaluator reporting errors against `filename`
    pub fn with_filename(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }
}

impl Default for MiniPython {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator for MiniPython {
    fn version(&self) -> String {
        format!(
            "SocketShell mini-python {} (rustc {}) on {}",
            env!("CARGO_PKG_VERSION"),
            rustc_version_runtime::version(),
            std::env::consts::OS
        )
    }

    fn evaluate(&self, source: &str, namespace: &mut Namespace, out: &mut dyn Write) -> Evaluation {
        let program = match parser::compile(source) {
            Ok(parser::Compiled::Program(program)) => program,
            Ok(parser::Compiled::Incomplete) => return Evaluation::Incomplete,
            Err(err) => {
                return Evaluation::Failed {
                    traceback: err.render(&self.filename),
                }
            }
        };

        match interp::Interpreter::new(namespace, out).run(&program) {
            Ok(()) => Evaluation::Complete,
            Err(interp::Signal::Raise(exc)) => Evaluation::Failed {
                traceback: exc.render(&self.filename),
            },
            Err(interp::Signal::Exit(code)) => Evaluation::ExitRequested { code },
        }
    }
}
