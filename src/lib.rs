pub mod ast;
pub mod callable;
pub mod class;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod parser;
pub mod resolver;
pub mod scanner;
pub mod stack;
pub mod token;
pub mod value;

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use log::{debug, info};

use error::{Diagnostics, Report};
use interpreter::Interpreter;

/// How a single [`Lox::run`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    /// Scan, parse or resolve errors; nothing was executed.
    StaticError,
    /// Execution started and stopped at a runtime error.
    RuntimeError,
}

/// One interpreter session: scan → parse → resolve → interpret.
///
/// Globals survive between calls to [`run`](Lox::run); the error flags are
/// reset at the start of each one.
pub struct Lox {
    interpreter: Interpreter,
    diagnostics: Diagnostics,
}

impl Default for Lox {
    fn default() -> Self {
        Self::new()
    }
}

impl Lox {
    pub fn new() -> Self {
        Self {
            interpreter: Interpreter::new(),
            diagnostics: Diagnostics::new(),
        }
    }

    /// A session whose `print` output goes to `output` instead of stdout.
    pub fn with_output(output: Rc<RefCell<dyn Write>>) -> Self {
        Self {
            interpreter: Interpreter::with_output(output),
            diagnostics: Diagnostics::new(),
        }
    }

    pub fn run(&mut self, source: &str) -> RunStatus {
        info!("Running {} bytes of source", source.len());

        self.diagnostics.reset();

        let tokens = scanner::scan(source, &mut self.diagnostics);
        let statements = parser::parse(tokens, &mut self.diagnostics);

        if self.diagnostics.had_error() {
            debug!("Static errors before resolution, skipping execution");
            return RunStatus::StaticError;
        }

        self.interpreter.resolve(&statements, &mut self.diagnostics);

        if self.diagnostics.had_error() {
            debug!("Resolution errors, skipping execution");
            return RunStatus::StaticError;
        }

        match self.interpreter.interpret(&statements) {
            Ok(()) => RunStatus::Ok,
            Err(e) => {
                debug!("Runtime error: {}", e);
                self.diagnostics.report(e);
                RunStatus::RuntimeError
            }
        }
    }

    /// Errors reported by the most recent run, in order.
    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }
}
