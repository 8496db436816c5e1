//! Core types for the Ember language.
//!
//! This crate provides the foundational types shared by the compiler and the
//! virtual machine:
//! - Opcodes and bytecode chunks
//! - Runtime values and heap objects
//! - The handle-based heap with string interning
//! - Tables (interned-string keyed maps)
//! - Tokens and compile-time diagnostics

pub mod chunk;
pub mod error;
pub mod heap;
pub mod object;
pub mod opcode;
pub mod table;
pub mod token;
pub mod value;

// Re-export commonly used types at crate root
pub use chunk::{Chunk, MAX_CONSTANTS};
pub use error::CompileError;
pub use heap::Heap;
pub use object::{
    NativeFn, Obj, ObjBoundMethod, ObjClass, ObjClosure, ObjFunction, ObjInstance, ObjNative,
    ObjRef, ObjUpvalue,
};
pub use opcode::OpCode;
pub use table::Table;
pub use token::{Token, TokenType};
pub use value::Value;
