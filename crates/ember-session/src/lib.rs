//! High-level entry point for running Ember code.
//!
//! A [`Session`] owns one virtual machine and feeds it source chunk by
//! chunk: globals, interned strings, and compiled functions persist between
//! chunks, which is what makes the REPL stateful. The session also installs
//! the standard native functions.

use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use ember_core::{CompileError, Value};
use ember_vm::{CaptureSink, OutputSink, RuntimeError, Vm};

/// Why a chunk of source failed to run.
#[derive(Clone, PartialEq, Debug, Error)]
pub enum InterpretError {
    /// One line per independent parse error, in source order.
    #[error("{}", format_compile_errors(.0))]
    Compile(Vec<CompileError>),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

fn format_compile_errors(errors: &[CompileError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

impl InterpretError {
    /// True for compile-time failures, false for runtime ones. The CLI maps
    /// these to different exit codes.
    pub fn is_compile_error(&self) -> bool {
        matches!(self, InterpretError::Compile(_))
    }
}

/// A persistent interpreter: one heap, one set of globals, one output sink.
pub struct Session {
    vm: Vm,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A session printing to stdout.
    pub fn new() -> Self {
        Self::from_vm(Vm::new())
    }

    /// A session printing to `sink`.
    pub fn with_sink(sink: Box<dyn OutputSink>) -> Self {
        Self::from_vm(Vm::with_sink(sink))
    }

    /// A session plus a handle to everything it prints. Used by tests and
    /// embedders that want to inspect output.
    pub fn with_capture() -> (Self, CaptureSink) {
        let capture = CaptureSink::new();
        let session = Self::with_sink(Box::new(capture.clone()));
        (session, capture)
    }

    fn from_vm(mut vm: Vm) -> Self {
        vm.define_native("clock", native_clock);
        Self { vm }
    }

    /// Compile and run one chunk of source. State survives both success and
    /// runtime failure; later chunks see every global this one defined.
    pub fn interpret(&mut self, source: &str) -> Result<(), InterpretError> {
        let function =
            ember_lang::compile(source, self.vm.heap_mut()).map_err(InterpretError::Compile)?;
        self.vm.interpret(function)?;
        Ok(())
    }

    /// Dump instructions and the stack to stderr while running.
    pub fn set_trace(&mut self, enabled: bool) {
        self.vm.set_trace(enabled);
    }

    /// Value-stack height; zero whenever no chunk is mid-run.
    pub fn stack_depth(&self) -> usize {
        self.vm.stack_depth()
    }
}

/// Seconds since the Unix epoch, as a number.
fn native_clock(_args: &[Value]) -> Value {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0);
    Value::Number(seconds)
}
