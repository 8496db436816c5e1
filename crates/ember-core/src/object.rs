use smallvec::SmallVec;

use crate::chunk::Chunk;
use crate::table::Table;
use crate::value::Value;

/// Handle to a heap object.
///
/// Handles are indices into the owning [`Heap`](crate::heap::Heap); they are
/// never reused while the heap is alive, so handle equality is object
/// identity.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ObjRef(u32);

impl ObjRef {
    /// Reconstruct a handle from a raw index. Only the heap (and tests)
    /// should need this.
    pub fn from_raw(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A host function callable from scripts.
pub type NativeFn = fn(&[Value]) -> Value;

/// A heap object. The variant set is closed; the VM dispatches on it with
/// exhaustive matches rather than virtual calls.
#[derive(Debug)]
pub enum Obj {
    /// Immutable interned string content.
    String(Box<str>),
    Function(ObjFunction),
    Native(ObjNative),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Class(ObjClass),
    Instance(ObjInstance),
    BoundMethod(ObjBoundMethod),
}

/// A compiled function: its bytecode plus call metadata.
#[derive(Debug, Default)]
pub struct ObjFunction {
    /// Declared parameter count.
    pub arity: u8,
    /// How many upvalues closures over this function carry.
    pub upvalue_count: usize,
    pub chunk: Chunk,
    /// None for the top-level script.
    pub name: Option<String>,
}

impl ObjFunction {
    /// Name shown in stack traces and disassembly.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("script")
    }
}

/// A host-provided function installed as a global.
pub struct ObjNative {
    pub name: String,
    pub function: NativeFn,
}

impl std::fmt::Debug for ObjNative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjNative").field("name", &self.name).finish()
    }
}

/// A function plus the upvalues it closed over.
#[derive(Debug)]
pub struct ObjClosure {
    pub function: ObjRef,
    pub upvalues: SmallVec<[ObjRef; 4]>,
}

/// A captured variable.
///
/// `Open` aliases a live VM stack slot by absolute index; once the slot's
/// scope ends the upvalue is `Closed` and owns the value itself. The tag is
/// the single source of truth: there is never a stale copy alongside a live
/// slot index.
#[derive(Copy, Clone, PartialEq, Debug)]
pub enum ObjUpvalue {
    Open(usize),
    Closed(Value),
}

/// A class: name plus method table (name handle -> closure value).
#[derive(Debug)]
pub struct ObjClass {
    pub name: String,
    pub methods: Table,
}

/// An instance: its class plus an open field table populated at runtime.
#[derive(Debug)]
pub struct ObjInstance {
    pub class: ObjRef,
    pub fields: Table,
}

/// A method closure paired with a fixed receiver, produced when a method is
/// referenced without being immediately called.
#[derive(Debug)]
pub struct ObjBoundMethod {
    pub receiver: Value,
    pub method: ObjRef,
}
