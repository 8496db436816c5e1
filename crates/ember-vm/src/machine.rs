use smallvec::SmallVec;

use ember_core::{
    Chunk, Heap, NativeFn, Obj, ObjBoundMethod, ObjClass, ObjClosure, ObjInstance, ObjNative,
    ObjRef, ObjUpvalue, OpCode, Table, Value,
};

use crate::debug;
use crate::error::RuntimeError;
use crate::sink::{OutputSink, StdoutSink};

/// Maximum call depth. Each frame addresses its locals with a one-byte slot,
/// so this also bounds the value stack.
const FRAMES_MAX: usize = 64;

/// One function activation: the closure being run, its instruction pointer,
/// and the stack slot its locals start at.
struct CallFrame {
    closure: ObjRef,
    ip: usize,
    base: usize,
}

/// What a callee value turned out to be, copied out of the heap so the
/// dispatch below can borrow it mutably again.
enum Callee {
    Closure,
    Native(NativeFn),
    Class,
    Bound(Value, ObjRef),
    NotCallable,
}

/// The virtual machine.
///
/// Owns the heap, the globals, the value stack, and the call-frame stack.
/// Compiled functions stay valid across calls to [`interpret`](Vm::interpret),
/// so a session can keep one machine alive and feed it chunk after chunk.
pub struct Vm {
    heap: Heap,
    globals: Table,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    /// Upvalues still aliasing live stack slots, sorted by slot ascending.
    open_upvalues: Vec<ObjRef>,
    sink: Box<dyn OutputSink>,
    trace: bool,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    pub fn new() -> Self {
        Self::with_sink(Box::new(StdoutSink))
    }

    /// A machine whose `print` output goes to `sink` instead of stdout.
    pub fn with_sink(sink: Box<dyn OutputSink>) -> Self {
        Self {
            heap: Heap::new(),
            globals: Table::new(),
            stack: Vec::new(),
            frames: Vec::new(),
            open_upvalues: Vec::new(),
            sink,
            trace: false,
        }
    }

    /// The heap compiled code must allocate into.
    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Number of values currently on the stack. Zero between top-level runs.
    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    /// Dump each instruction and the stack to stderr while running.
    pub fn set_trace(&mut self, enabled: bool) {
        self.trace = enabled;
    }

    /// Install a host function as a global.
    pub fn define_native(&mut self, name: &str, function: NativeFn) {
        let key = self.heap.intern(name);
        let native = self.heap.alloc(Obj::Native(ObjNative {
            name: name.to_string(),
            function,
        }));
        self.globals.set(key, Value::Obj(native));
    }

    /// Run a compiled top-level function to completion.
    ///
    /// On error the stack and frames are reset, so the machine stays usable;
    /// globals and the heap survive.
    pub fn interpret(&mut self, function: ObjRef) -> Result<(), RuntimeError> {
        let closure = self.heap.alloc(Obj::Closure(ObjClosure {
            function,
            upvalues: SmallVec::new(),
        }));
        self.stack.push(Value::Obj(closure));
        self.call(closure, 0)?;
        self.run()
    }

    // ------------------------------------------------------------------
    // Frame and stack primitives
    // ------------------------------------------------------------------

    fn frame(&self) -> &CallFrame {
        match self.frames.last() {
            Some(frame) => frame,
            None => unreachable!("no active call frame"),
        }
    }

    fn frame_mut(&mut self) -> &mut CallFrame {
        match self.frames.last_mut() {
            Some(frame) => frame,
            None => unreachable!("no active call frame"),
        }
    }

    fn chunk(&self) -> &Chunk {
        let function = self.heap.closure(self.frame().closure).function;
        &self.heap.function(function).chunk
    }

    fn read_byte(&mut self) -> u8 {
        let ip = self.frame().ip;
        let byte = self.chunk().read(ip);
        self.frame_mut().ip = ip + 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let high = self.read_byte() as u16;
        let low = self.read_byte() as u16;
        (high << 8) | low
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte();
        self.chunk().constant(index)
    }

    /// Read a constant the compiler guarantees is an interned string.
    fn read_string(&mut self) -> ObjRef {
        match self.read_constant() {
            Value::Obj(r) => r,
            other => unreachable!("expected string constant, found {:?}", other),
        }
    }

    fn pop(&mut self) -> Value {
        match self.stack.pop() {
            Some(value) => value,
            None => unreachable!("stack underflow"),
        }
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    /// Build the error, then reset execution state. The heap and globals are
    /// left intact so the machine can run again.
    fn runtime_error(&mut self, message: impl Into<String>) -> RuntimeError {
        let mut trace = Vec::with_capacity(self.frames.len());
        for frame in self.frames.iter().rev() {
            let function = self.heap.closure(frame.closure).function;
            let function = self.heap.function(function);
            let line = function.chunk.line(frame.ip.saturating_sub(1));
            let location = match &function.name {
                Some(name) => format!("{}()", name),
                None => "script".to_string(),
            };
            trace.push(format!("[line {}] in {}", line, location));
        }
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues.clear();
        RuntimeError {
            message: message.into(),
            trace,
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), RuntimeError> {
        let handle = match callee {
            Value::Obj(handle) => handle,
            _ => return Err(self.runtime_error("Can only call functions and classes.")),
        };
        let kind = match self.heap.get(handle) {
            Obj::Closure(_) => Callee::Closure,
            Obj::Native(native) => Callee::Native(native.function),
            Obj::Class(_) => Callee::Class,
            Obj::BoundMethod(bound) => Callee::Bound(bound.receiver, bound.method),
            _ => Callee::NotCallable,
        };

        match kind {
            Callee::Closure => self.call(handle, arg_count),
            Callee::Native(function) => {
                let start = self.stack.len() - arg_count as usize;
                let result = function(&self.stack[start..]);
                self.stack.truncate(start - 1);
                self.stack.push(result);
                Ok(())
            }
            Callee::Class => self.instantiate(handle, arg_count),
            Callee::Bound(receiver, method) => {
                // The receiver takes the callee's slot, becoming `this`.
                let slot = self.stack.len() - arg_count as usize - 1;
                self.stack[slot] = receiver;
                self.call(method, arg_count)
            }
            Callee::NotCallable => Err(self.runtime_error("Can only call functions and classes.")),
        }
    }

    fn call(&mut self, closure: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        let function = self.heap.closure(closure).function;
        let arity = self.heap.function(function).arity;
        if arg_count != arity {
            return Err(self.runtime_error(format!(
                "Expected {} arguments but got {}.",
                arity, arg_count
            )));
        }
        if self.frames.len() == FRAMES_MAX {
            return Err(self.runtime_error("Stack overflow."));
        }
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            base: self.stack.len() - arg_count as usize - 1,
        });
        Ok(())
    }

    fn instantiate(&mut self, class: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        let instance = self.heap.alloc(Obj::Instance(ObjInstance {
            class,
            fields: Table::new(),
        }));
        let slot = self.stack.len() - arg_count as usize - 1;
        self.stack[slot] = Value::Obj(instance);

        let init_name = self.heap.intern("init");
        if let Some(initializer) = self.heap.class(class).methods.get(init_name) {
            let Value::Obj(initializer) = initializer else {
                unreachable!("initializer is not a closure")
            };
            self.call(initializer, arg_count)
        } else if arg_count != 0 {
            Err(self.runtime_error(format!("Expected 0 arguments but got {}.", arg_count)))
        } else {
            Ok(())
        }
    }

    fn invoke(&mut self, name: ObjRef, arg_count: u8) -> Result<(), RuntimeError> {
        let receiver = self.peek(arg_count as usize);
        let info = match receiver {
            Value::Obj(r) => match self.heap.get(r) {
                Obj::Instance(instance) => Some((instance.class, instance.fields.get(name))),
                _ => None,
            },
            _ => None,
        };
        let Some((class, field)) = info else {
            return Err(self.runtime_error("Only instances have methods."));
        };

        // A field holding a callable shadows any method of the same name.
        if let Some(field) = field {
            let slot = self.stack.len() - arg_count as usize - 1;
            self.stack[slot] = field;
            return self.call_value(field, arg_count);
        }
        self.invoke_from_class(class, name, arg_count)
    }

    fn invoke_from_class(
        &mut self,
        class: ObjRef,
        name: ObjRef,
        arg_count: u8,
    ) -> Result<(), RuntimeError> {
        let Some(method) = self.heap.class(class).methods.get(name) else {
            let name = self.heap.string(name).to_string();
            return Err(self.runtime_error(format!("Undefined property '{}'.", name)));
        };
        let Value::Obj(method) = method else {
            unreachable!("method is not a closure")
        };
        self.call(method, arg_count)
    }

    /// Replace the receiver on top of the stack with `class`'s method bound
    /// to it.
    fn bind_method(&mut self, class: ObjRef, name: ObjRef) -> Result<(), RuntimeError> {
        let Some(method) = self.heap.class(class).methods.get(name) else {
            let name = self.heap.string(name).to_string();
            return Err(self.runtime_error(format!("Undefined property '{}'.", name)));
        };
        let Value::Obj(method) = method else {
            unreachable!("method is not a closure")
        };
        let receiver = self.peek(0);
        let bound = self.heap.alloc(Obj::BoundMethod(ObjBoundMethod { receiver, method }));
        self.pop();
        self.stack.push(Value::Obj(bound));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Upvalues
    // ------------------------------------------------------------------

    /// Find or create the open upvalue for a stack slot. At most one open
    /// upvalue exists per slot, so closures capturing the same variable share
    /// it.
    fn capture_upvalue(&mut self, slot: usize) -> ObjRef {
        let position = self.open_upvalues.binary_search_by_key(&slot, |&r| {
            match self.heap.upvalue(r) {
                ObjUpvalue::Open(open_slot) => *open_slot,
                ObjUpvalue::Closed(_) => unreachable!("closed upvalue in open list"),
            }
        });
        match position {
            Ok(index) => self.open_upvalues[index],
            Err(index) => {
                let handle = self.heap.alloc(Obj::Upvalue(ObjUpvalue::Open(slot)));
                self.open_upvalues.insert(index, handle);
                handle
            }
        }
    }

    /// Close every open upvalue at or above `from_slot`: each takes its
    /// current stack value and stops aliasing the stack.
    fn close_upvalues(&mut self, from_slot: usize) {
        while let Some(&handle) = self.open_upvalues.last() {
            let slot = match *self.heap.upvalue(handle) {
                ObjUpvalue::Open(slot) => slot,
                ObjUpvalue::Closed(_) => unreachable!("closed upvalue in open list"),
            };
            if slot < from_slot {
                break;
            }
            let value = self.stack[slot];
            *self.heap.upvalue_mut(handle) = ObjUpvalue::Closed(value);
            self.open_upvalues.pop();
        }
    }

    // ------------------------------------------------------------------
    // The dispatch loop
    // ------------------------------------------------------------------

    fn run(&mut self) -> Result<(), RuntimeError> {
        loop {
            if self.trace {
                let mut line = String::from("          ");
                for &value in &self.stack {
                    line.push_str(&format!("[ {} ]", self.heap.format_value(value)));
                }
                eprintln!("{}", line);
                let ip = self.frame().ip;
                let (text, _) = debug::disassemble_instruction(&self.heap, self.chunk(), ip);
                eprintln!("{}", text);
            }

            let byte = self.read_byte();
            let op = match OpCode::from_byte(byte) {
                Some(op) => op,
                None => unreachable!("invalid opcode {}", byte),
            };

            match op {
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.stack.push(value);
                }
                OpCode::Nil => self.stack.push(Value::Nil),
                OpCode::True => self.stack.push(Value::Bool(true)),
                OpCode::False => self.stack.push(Value::Bool(false)),
                OpCode::Pop => {
                    self.pop();
                }

                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let value = self.stack[self.frame().base + slot];
                    self.stack.push(value);
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frame().base;
                    self.stack[base + slot] = self.peek(0);
                }

                OpCode::GetGlobal => {
                    let name = self.read_string();
                    let Some(value) = self.globals.get(name) else {
                        let name = self.heap.string(name).to_string();
                        return Err(
                            self.runtime_error(format!("Undefined variable '{}'.", name))
                        );
                    };
                    self.stack.push(value);
                }
                OpCode::DefineGlobal => {
                    let name = self.read_string();
                    let value = self.pop();
                    self.globals.set(name, value);
                }
                OpCode::SetGlobal => {
                    let name = self.read_string();
                    let value = self.peek(0);
                    // Assignment never creates a global.
                    if self.globals.set(name, value) {
                        self.globals.delete(name);
                        let name = self.heap.string(name).to_string();
                        return Err(
                            self.runtime_error(format!("Undefined variable '{}'.", name))
                        );
                    }
                }

                OpCode::GetUpvalue => {
                    let index = self.read_byte() as usize;
                    let upvalue = self.heap.closure(self.frame().closure).upvalues[index];
                    let value = match *self.heap.upvalue(upvalue) {
                        ObjUpvalue::Open(slot) => self.stack[slot],
                        ObjUpvalue::Closed(value) => value,
                    };
                    self.stack.push(value);
                }
                OpCode::SetUpvalue => {
                    let index = self.read_byte() as usize;
                    let upvalue = self.heap.closure(self.frame().closure).upvalues[index];
                    let value = self.peek(0);
                    match *self.heap.upvalue(upvalue) {
                        ObjUpvalue::Open(slot) => self.stack[slot] = value,
                        ObjUpvalue::Closed(_) => {
                            *self.heap.upvalue_mut(upvalue) = ObjUpvalue::Closed(value);
                        }
                    }
                }

                OpCode::GetProperty => {
                    let name = self.read_string();
                    let info = match self.peek(0) {
                        Value::Obj(r) => match self.heap.get(r) {
                            Obj::Instance(instance) => {
                                Some((instance.class, instance.fields.get(name)))
                            }
                            _ => None,
                        },
                        _ => None,
                    };
                    let Some((class, field)) = info else {
                        return Err(self.runtime_error("Only instances have properties."));
                    };
                    if let Some(value) = field {
                        self.pop();
                        self.stack.push(value);
                    } else {
                        self.bind_method(class, name)?;
                    }
                }
                OpCode::SetProperty => {
                    let name = self.read_string();
                    let instance = match self.peek(1) {
                        Value::Obj(r) if matches!(self.heap.get(r), Obj::Instance(_)) => r,
                        _ => return Err(self.runtime_error("Only instances have fields.")),
                    };
                    let value = self.peek(0);
                    self.heap.instance_mut(instance).fields.set(name, value);
                    // The assigned value is the expression's result.
                    let value = self.pop();
                    self.pop();
                    self.stack.push(value);
                }
                OpCode::GetSuper => {
                    let name = self.read_string();
                    let Value::Obj(superclass) = self.pop() else {
                        unreachable!("superclass slot holds a non-object")
                    };
                    self.bind_method(superclass, name)?;
                }

                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.stack.push(Value::Bool(a == b));
                }
                OpCode::Greater => self.binary_number_op(op)?,
                OpCode::Less => self.binary_number_op(op)?,
                OpCode::Add => {
                    match (self.peek(1), self.peek(0)) {
                        (Value::Number(a), Value::Number(b)) => {
                            self.pop();
                            self.pop();
                            self.stack.push(Value::Number(a + b));
                        }
                        (Value::Obj(a), Value::Obj(b))
                            if matches!(self.heap.get(a), Obj::String(_))
                                && matches!(self.heap.get(b), Obj::String(_)) =>
                        {
                            let mut result = self.heap.string(a).to_string();
                            result.push_str(self.heap.string(b));
                            let handle = self.heap.intern_owned(result);
                            self.pop();
                            self.pop();
                            self.stack.push(Value::Obj(handle));
                        }
                        _ => {
                            return Err(self.runtime_error(
                                "Operands must be two numbers or two strings.",
                            ));
                        }
                    }
                }
                OpCode::Subtract => self.binary_number_op(op)?,
                OpCode::Multiply => self.binary_number_op(op)?,
                OpCode::Divide => self.binary_number_op(op)?,
                OpCode::Not => {
                    let value = self.pop();
                    self.stack.push(Value::Bool(value.is_falsey()));
                }
                OpCode::Negate => {
                    let Value::Number(n) = self.peek(0) else {
                        return Err(self.runtime_error("Operand must be a number."));
                    };
                    self.pop();
                    self.stack.push(Value::Number(-n));
                }

                OpCode::Print => {
                    let value = self.pop();
                    let text = self.heap.format_value(value);
                    self.sink.print(&text);
                }

                OpCode::Jump => {
                    let offset = self.read_short() as usize;
                    self.frame_mut().ip += offset;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short() as usize;
                    if self.peek(0).is_falsey() {
                        self.frame_mut().ip += offset;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short() as usize;
                    self.frame_mut().ip -= offset;
                }

                OpCode::Call => {
                    let arg_count = self.read_byte();
                    self.call_value(self.peek(arg_count as usize), arg_count)?;
                }
                OpCode::Invoke => {
                    let name = self.read_string();
                    let arg_count = self.read_byte();
                    self.invoke(name, arg_count)?;
                }
                OpCode::SuperInvoke => {
                    let name = self.read_string();
                    let arg_count = self.read_byte();
                    let Value::Obj(superclass) = self.pop() else {
                        unreachable!("superclass slot holds a non-object")
                    };
                    self.invoke_from_class(superclass, name, arg_count)?;
                }

                OpCode::Closure => {
                    let Value::Obj(function) = self.read_constant() else {
                        unreachable!("closure constant is not a function")
                    };
                    let upvalue_count = self.heap.function(function).upvalue_count;
                    let mut upvalues = SmallVec::with_capacity(upvalue_count);
                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte() == 1;
                        let index = self.read_byte() as usize;
                        let handle = if is_local {
                            let slot = self.frame().base + index;
                            self.capture_upvalue(slot)
                        } else {
                            self.heap.closure(self.frame().closure).upvalues[index]
                        };
                        upvalues.push(handle);
                    }
                    let closure = self.heap.alloc(Obj::Closure(ObjClosure { function, upvalues }));
                    self.stack.push(Value::Obj(closure));
                }
                OpCode::CloseUpvalue => {
                    self.close_upvalues(self.stack.len() - 1);
                    self.pop();
                }

                OpCode::Return => {
                    let result = self.pop();
                    let frame = match self.frames.pop() {
                        Some(frame) => frame,
                        None => unreachable!("return without a frame"),
                    };
                    self.close_upvalues(frame.base);
                    if self.frames.is_empty() {
                        // The value left is the script closure itself.
                        self.pop();
                        return Ok(());
                    }
                    self.stack.truncate(frame.base);
                    self.stack.push(result);
                }

                OpCode::Class => {
                    let name = self.read_string();
                    let name = self.heap.string(name).to_string();
                    let class = self.heap.alloc(Obj::Class(ObjClass {
                        name,
                        methods: Table::new(),
                    }));
                    self.stack.push(Value::Obj(class));
                }
                OpCode::Inherit => {
                    let superclass = match self.peek(1) {
                        Value::Obj(r) if matches!(self.heap.get(r), Obj::Class(_)) => r,
                        _ => return Err(self.runtime_error("Superclass must be a class.")),
                    };
                    let Value::Obj(subclass) = self.peek(0) else {
                        unreachable!("subclass slot holds a non-object")
                    };
                    // Copy-down inheritance: the subclass starts with every
                    // superclass method and overrides by re-binding later.
                    let mut methods = std::mem::take(&mut self.heap.class_mut(subclass).methods);
                    methods.merge_from(&self.heap.class(superclass).methods);
                    self.heap.class_mut(subclass).methods = methods;
                    self.pop();
                }
                OpCode::Method => {
                    let name = self.read_string();
                    let method = self.peek(0);
                    let Value::Obj(class) = self.peek(1) else {
                        unreachable!("class slot holds a non-object")
                    };
                    self.heap.class_mut(class).methods.set(name, method);
                    self.pop();
                }
            }
        }
    }

    fn binary_number_op(&mut self, op: OpCode) -> Result<(), RuntimeError> {
        let (Value::Number(a), Value::Number(b)) = (self.peek(1), self.peek(0)) else {
            return Err(self.runtime_error("Operands must be numbers."));
        };
        self.pop();
        self.pop();
        let result = match op {
            OpCode::Greater => Value::Bool(a > b),
            OpCode::Less => Value::Bool(a < b),
            OpCode::Subtract => Value::Number(a - b),
            OpCode::Multiply => Value::Number(a * b),
            OpCode::Divide => Value::Number(a / b),
            _ => unreachable!("not a binary numeric op: {:?}", op),
        };
        self.stack.push(result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CaptureSink;

    fn run(source: &str) -> Result<String, RuntimeError> {
        let capture = CaptureSink::new();
        let mut vm = Vm::with_sink(Box::new(capture.clone()));
        let function = ember_lang::compile(source, vm.heap_mut())
            .unwrap_or_else(|errs| panic!("compile failed: {:?}", errs));
        vm.interpret(function)?;
        assert_eq!(vm.stack_depth(), 0, "stack not balanced after run");
        Ok(capture.take())
    }

    fn run_err(source: &str) -> RuntimeError {
        match run(source) {
            Ok(output) => panic!("expected runtime error, got output {:?}", output),
            Err(err) => err,
        }
    }

    #[test]
    fn arithmetic_and_precedence() {
        assert_eq!(run("print 1 + 2 * 3;").unwrap(), "7\n");
        assert_eq!(run("print (1 + 2) * 3;").unwrap(), "9\n");
        assert_eq!(run("print -4 + 6;").unwrap(), "2\n");
        assert_eq!(run("print 1 / 2;").unwrap(), "0.5\n");
    }

    #[test]
    fn comparison_and_equality() {
        assert_eq!(run("print 1 < 2;").unwrap(), "true\n");
        assert_eq!(run("print 2 <= 1;").unwrap(), "false\n");
        assert_eq!(run("print 1 == 1;").unwrap(), "true\n");
        assert_eq!(run("print nil == false;").unwrap(), "false\n");
        assert_eq!(run("print !nil;").unwrap(), "true\n");
        assert_eq!(run("print !0;").unwrap(), "false\n");
    }

    #[test]
    fn string_concatenation_interns_the_result() {
        assert_eq!(run("print \"foo\" + \"bar\";").unwrap(), "foobar\n");
        // Equality is handle identity, valid only because the concatenation
        // result is interned.
        assert_eq!(run("print \"ab\" == \"a\" + \"b\";").unwrap(), "true\n");
    }

    #[test]
    fn globals_define_assign_read() {
        let out = run("var a = 1; a = a + 2; print a;").unwrap();
        assert_eq!(out, "3\n");
    }

    #[test]
    fn undefined_variable_read() {
        let err = run_err("print missing;");
        assert_eq!(err.message, "Undefined variable 'missing'.");
        assert_eq!(err.trace, vec!["[line 1] in script"]);
    }

    #[test]
    fn undefined_variable_assignment() {
        let err = run_err("missing = 1;");
        assert_eq!(err.message, "Undefined variable 'missing'.");
    }

    #[test]
    fn locals_shadow_and_unwind() {
        let out = run("var a = \"global\"; { var a = \"local\"; print a; } print a;").unwrap();
        assert_eq!(out, "local\nglobal\n");
    }

    #[test]
    fn control_flow() {
        assert_eq!(run("if (1 < 2) print \"yes\"; else print \"no\";").unwrap(), "yes\n");
        assert_eq!(run("if (nil) print \"yes\"; else print \"no\";").unwrap(), "no\n");
        let out = run("var i = 0; while (i < 3) { print i; i = i + 1; }").unwrap();
        assert_eq!(out, "0\n1\n2\n");
        let out = run("for (var i = 0; i < 3; i = i + 1) print i;").unwrap();
        assert_eq!(out, "0\n1\n2\n");
    }

    #[test]
    fn logical_operators_short_circuit() {
        assert_eq!(run("print false and missing;").unwrap(), "false\n");
        assert_eq!(run("print true or missing;").unwrap(), "true\n");
        assert_eq!(run("print 1 and 2;").unwrap(), "2\n");
        assert_eq!(run("print nil or 3;").unwrap(), "3\n");
    }

    #[test]
    fn function_call_and_return() {
        let out = run("fun add(a, b) { return a + b; } print add(1, 2);").unwrap();
        assert_eq!(out, "3\n");
        let out = run("fun noReturn() {} print noReturn();").unwrap();
        assert_eq!(out, "nil\n");
    }

    #[test]
    fn recursion() {
        let out = run("fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } print fib(10);")
            .unwrap();
        assert_eq!(out, "55\n");
    }

    #[test]
    fn arity_mismatch() {
        let err = run_err("fun f(a, b) {} f(1);");
        assert_eq!(err.message, "Expected 2 arguments but got 1.");
    }

    #[test]
    fn calling_a_non_callable() {
        let err = run_err("var x = 1; x();");
        assert_eq!(err.message, "Can only call functions and classes.");
        let err = run_err("\"not a function\"();");
        assert_eq!(err.message, "Can only call functions and classes.");
    }

    #[test]
    fn unbounded_recursion_overflows() {
        let err = run_err("fun f() { f(); } f();");
        assert_eq!(err.message, "Stack overflow.");
    }

    #[test]
    fn type_errors() {
        assert_eq!(run_err("print -\"s\";").message, "Operand must be a number.");
        assert_eq!(run_err("print 1 < \"s\";").message, "Operands must be numbers.");
        assert_eq!(
            run_err("print 1 + \"s\";").message,
            "Operands must be two numbers or two strings."
        );
    }

    #[test]
    fn error_trace_lists_frames_innermost_first() {
        let source = "\
fun inner() { return missing; }
fun outer() { return inner(); }
outer();";
        let err = run_err(source);
        assert_eq!(err.message, "Undefined variable 'missing'.");
        assert_eq!(
            err.trace,
            vec![
                "[line 1] in inner()",
                "[line 2] in outer()",
                "[line 3] in script",
            ]
        );
    }

    #[test]
    fn closure_keeps_variable_alive_after_scope_exit() {
        let source = "\
fun makeCounter() {
  var n = 0;
  fun increment() {
    n = n + 1;
    print n;
  }
  return increment;
}
var counter = makeCounter();
counter();
counter();";
        assert_eq!(run(source).unwrap(), "1\n2\n");
    }

    #[test]
    fn closures_share_one_upvalue_per_variable() {
        let source = "\
fun pair() {
  var x = 0;
  fun get() { print x; }
  fun set(v) { x = v; }
  set(9);
  get();
  return get;
}
var g = pair();
g();";
        // The shared upvalue stays consistent across the open -> closed
        // transition at pair's return.
        assert_eq!(run(source).unwrap(), "9\n9\n");
    }

    #[test]
    fn sibling_closures_capture_independent_iterations() {
        let source = "\
var first;
var second;
{
  var i = 0;
  while (i < 2) {
    var j = i;
    fun show() { print j; }
    if (first == nil) first = show;
    else second = show;
    i = i + 1;
  }
}
first();
second();";
        assert_eq!(run(source).unwrap(), "0\n1\n");
    }

    #[test]
    fn native_function_call() {
        let capture = CaptureSink::new();
        let mut vm = Vm::with_sink(Box::new(capture.clone()));
        vm.define_native("answer", |_| Value::Number(42.0));
        let function = ember_lang::compile("print answer();", vm.heap_mut()).unwrap();
        vm.interpret(function).unwrap();
        assert_eq!(capture.take(), "42\n");
        assert_eq!(vm.stack_depth(), 0);
    }

    #[test]
    fn native_receives_its_arguments() {
        let capture = CaptureSink::new();
        let mut vm = Vm::with_sink(Box::new(capture.clone()));
        vm.define_native("sum", |args| {
            let mut total = 0.0;
            for arg in args {
                if let Value::Number(n) = arg {
                    total += n;
                }
            }
            Value::Number(total)
        });
        let function = ember_lang::compile("print sum(1, 2, 3);", vm.heap_mut()).unwrap();
        vm.interpret(function).unwrap();
        assert_eq!(capture.take(), "6\n");
    }

    #[test]
    fn class_instances_and_fields() {
        let source = "\
class Box {}
var b = Box();
b.contents = \"beans\";
print b.contents;
print b;";
        assert_eq!(run(source).unwrap(), "beans\nBox instance\n");
    }

    #[test]
    fn methods_and_this() {
        let source = "\
class Greeter {
  greet(name) { print \"hello \" + name; }
  self() { return this; }
}
var g = Greeter();
g.greet(\"world\");
print g.self() == g;";
        assert_eq!(run(source).unwrap(), "hello world\ntrue\n");
    }

    #[test]
    fn initializer_runs_and_returns_the_instance() {
        let source = "\
class Point {
  init(x, y) {
    this.x = x;
    this.y = y;
  }
}
var p = Point(3, 4);
print p.x + p.y;";
        assert_eq!(run(source).unwrap(), "7\n");
    }

    #[test]
    fn default_constructor_rejects_arguments() {
        let err = run_err("class Empty {} Empty(1);");
        assert_eq!(err.message, "Expected 0 arguments but got 1.");
    }

    #[test]
    fn bound_method_remembers_its_receiver() {
        let source = "\
class Cell {
  init() { this.value = 7; }
  read() { print this.value; }
}
var m = Cell().read;
m();";
        assert_eq!(run(source).unwrap(), "7\n");
    }

    #[test]
    fn callable_field_shadows_method() {
        let source = "\
class Widget {
  act() { print \"method\"; }
}
fun replacement() { print \"field\"; }
var w = Widget();
w.act = replacement;
w.act();";
        assert_eq!(run(source).unwrap(), "field\n");
    }

    #[test]
    fn inheritance_and_super() {
        let source = "\
class A {
  describe() { print \"A\"; }
}
class B < A {
  describe() {
    super.describe();
    print \"B\";
  }
}
B().describe();";
        assert_eq!(run(source).unwrap(), "A\nB\n");
    }

    #[test]
    fn inherited_method_is_callable_directly() {
        let source = "\
class A { hello() { print \"hi\"; } }
class B < A {}
B().hello();";
        assert_eq!(run(source).unwrap(), "hi\n");
    }

    #[test]
    fn property_errors() {
        assert_eq!(
            run_err("var x = 1; print x.field;").message,
            "Only instances have properties."
        );
        assert_eq!(
            run_err("var x = 1; x.field = 2;").message,
            "Only instances have fields."
        );
        assert_eq!(
            run_err("var x = 1; x.method();").message,
            "Only instances have methods."
        );
        assert_eq!(
            run_err("class C {} C().missing;").message,
            "Undefined property 'missing'."
        );
        assert_eq!(
            run_err("class C {} C().missing();").message,
            "Undefined property 'missing'."
        );
    }

    #[test]
    fn superclass_must_be_a_class() {
        let err = run_err("var NotAClass = 1; class Sub < NotAClass {}");
        assert_eq!(err.message, "Superclass must be a class.");
    }

    #[test]
    fn machine_recovers_after_a_runtime_error() {
        let capture = CaptureSink::new();
        let mut vm = Vm::with_sink(Box::new(capture.clone()));

        let bad = ember_lang::compile("print missing;", vm.heap_mut()).unwrap();
        assert!(vm.interpret(bad).is_err());
        assert_eq!(vm.stack_depth(), 0);

        // Globals and heap survive; the machine runs again cleanly.
        let define = ember_lang::compile("var a = 5;", vm.heap_mut()).unwrap();
        vm.interpret(define).unwrap();
        let read = ember_lang::compile("print a;", vm.heap_mut()).unwrap();
        vm.interpret(read).unwrap();
        assert_eq!(capture.take(), "5\n");
    }

    #[test]
    fn globals_persist_across_interpreted_chunks() {
        let capture = CaptureSink::new();
        let mut vm = Vm::with_sink(Box::new(capture.clone()));
        let first = ember_lang::compile("var x = 1;", vm.heap_mut()).unwrap();
        vm.interpret(first).unwrap();
        let second = ember_lang::compile("x = x + 1; print x;", vm.heap_mut()).unwrap();
        vm.interpret(second).unwrap();
        assert_eq!(capture.take(), "2\n");
    }
}
