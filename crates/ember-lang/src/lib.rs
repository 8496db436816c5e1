//! Ember language front end.
//!
//! A scanner producing a flat token stream, and a single-pass Pratt-parser
//! compiler that walks the tokens and emits bytecode directly, with no AST
//! in between. The
//! compiler resolves every identifier to a local slot, an upvalue chain, or a
//! global name at compile time, and patches jump offsets in place.

mod compiler;
mod scanner;

pub use compiler::compile;
pub use scanner::Scanner;
