//! The Ember virtual machine.
//!
//! A stack machine over the bytecode emitted by `ember-lang`: a value stack,
//! a call-frame stack, a table of globals, and a list of open upvalues. All
//! state lives in the [`Vm`] value; two machines never share anything.

pub mod debug;

mod error;
mod machine;
mod sink;

pub use error::RuntimeError;
pub use machine::Vm;
pub use sink::{CaptureSink, OutputSink, StdoutSink};
